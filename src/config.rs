//! Operator configuration loaded from environment variables

use envconfig::Envconfig;

use crate::error::Result;

/// Runtime configuration of the operator process
#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Port of the metrics and health HTTP server
    #[envconfig(from = "METRICS_PORT", default = "8080")]
    pub metrics_port: u16,

    /// Restrict the controller to a single namespace (all namespaces when unset)
    #[envconfig(from = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Log output format: `json` or `text`
    #[envconfig(from = "LOG_FORMAT", default = "json")]
    pub log_format: String,

    /// Field manager used for server-side apply of rendered resources
    #[envconfig(from = "FIELD_MANAGER", default = "integration-operator")]
    pub field_manager: String,
}

impl OperatorConfig {
    /// Load the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::init_from_env()?)
    }

    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        !self.log_format.eq_ignore_ascii_case("text")
    }
}
