use std::sync::Arc;

use assistant_relay::admission::AdmissionPolicy;
use assistant_relay::config::ServerArgs;
use assistant_relay::router::{build_router, AppState};
use assistant_relay::sessions::SessionRegistry;
use assistant_relay::tools::{builtin_sources, ToolDispatcher};
use assistant_relay_assistants_client::{HttpAssistantsClient, HttpClientConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "assistant-relay", bin_name = "assistant-relay", version)]
#[command(about = "Relay streamed assistant runs between HTTP clients and a remote assistants API")]
struct RelayCli {
    #[command(flatten)]
    server: ServerArgs,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_logfmt::builder()
                .layer()
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = RelayCli::parse();
    init_tracing();

    let args = cli.server;
    let api = HttpAssistantsClient::new(HttpClientConfig {
        base_url: args.api_base_url.clone(),
        api_key: args.api_key.clone(),
        assistant_id: args.assistant_id.clone(),
    })?;

    let turn = args.turn_config();
    let admission: AdmissionPolicy = args.admission_policy();
    let state = Arc::new(AppState {
        registry: SessionRegistry::new(),
        api: Arc::new(api),
        dispatcher: Arc::new(ToolDispatcher::new(builtin_sources())),
        turn,
        admission,
    });

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "assistant-relay listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
