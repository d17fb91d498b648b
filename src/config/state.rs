// Application state module
// Immutable per-process state shared by every connection

use super::types::Config;
use crate::upstream::UpstreamClient;

/// Application state
pub struct AppState {
    pub config: Config,
    /// Pooled client for the prediction service
    pub upstream: UpstreamClient,
}

impl AppState {
    /// Build the state once at startup; fails if the upstream URL is unusable
    pub fn new(config: &Config) -> Result<Self, String> {
        let upstream = UpstreamClient::new(config.get_upstream_uri()?, config.upstream_timeout());

        Ok(Self {
            config: config.clone(),
            upstream,
        })
    }
}
