use std::time::Duration;

/// Tunables for the gateway. The server binary fills these from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Messages pushed in the connect-time `message_history` snapshot
    pub history_limit: u32,
    /// Page size of `load_more_messages` when the client gives none
    pub default_page_size: u32,
    /// Upper bound on any requested page size
    pub max_page_size: u32,
    /// Longest accepted message body, in characters
    pub max_message_len: usize,
    /// Server sends a Ping this often; two missed Pongs drop the connection
    pub heartbeat_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            default_page_size: 10,
            max_page_size: 100,
            max_message_len: 4000,
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

impl GatewayConfig {
    /// Resolve a client-requested page size: default when absent, clamped to `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}
