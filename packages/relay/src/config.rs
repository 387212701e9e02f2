use std::time::Duration;

use clap::Args;

use crate::admission::AdmissionPolicy;
use crate::turn::TurnConfig;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 2480;

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Base URL of the remote assistants API.
    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub api_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Assistant to attach runs to.
    #[arg(long, env = "ASSISTANT_ID")]
    pub assistant_id: String,

    /// Status text emitted when a run stays silent past the waiting delay.
    /// No waiting frame is emitted when unset.
    #[arg(long)]
    pub waiting_message: Option<String>,

    #[arg(long, default_value_t = 4_000)]
    pub waiting_delay_ms: u64,

    #[arg(long, default_value_t = 3)]
    pub admission_max_retries: u32,

    #[arg(long, default_value_t = 1_000)]
    pub admission_base_delay_ms: u64,
}

impl ServerArgs {
    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            waiting_message: self.waiting_message.clone(),
            waiting_delay: Duration::from_millis(self.waiting_delay_ms),
        }
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            max_retries: self.admission_max_retries,
            base_delay: Duration::from_millis(self.admission_base_delay_ms),
        }
    }
}
