//! Connection settings shared by every remote command.

use std::path::Path;
use std::time::Duration;

use clap::Args;
use tracing::debug;

use crate::api::client::TatorClient;
use crate::error::TatorError;

pub const DEFAULT_HOST: &str = "https://tator.whoi.edu";

#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ConnectionArgs {
    /// Tator server URL.
    #[arg(long, env = "TATOR_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// API token, or a path to a file containing it.
    #[arg(long, env = "TATOR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Request timeout in seconds (no timeout when unset).
    #[arg(long, env = "TATOR_TIMEOUT", value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl Default for ConnectionArgs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            token: None,
            timeout: None,
        }
    }
}

impl ConnectionArgs {
    /// The API token, read from a file when `--token` names one.
    pub fn resolve_token(&self) -> Result<String, TatorError> {
        let raw = self.token.as_deref().ok_or(TatorError::MissingToken)?;
        let path = Path::new(raw);
        let token = if path.is_file() {
            debug!(path = %path.display(), "reading token from file");
            std::fs::read_to_string(path)
                .map_err(TatorError::Io)?
                .trim()
                .to_string()
        } else {
            raw.trim().to_string()
        };

        if token.is_empty() {
            return Err(TatorError::MissingToken);
        }
        Ok(token)
    }

    /// Builds an authenticated client.
    pub fn client(&self) -> Result<TatorClient, TatorError> {
        let token = self.resolve_token()?;
        TatorClient::new(&self.host, &token, self.timeout.map(Duration::from_secs))
    }
}
