use std::net::SocketAddr;
use std::time::Duration;

/// Runtime settings for a [`Hub`](crate::network::Hub).
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address the TCP listener binds to.
    pub bind_address: SocketAddr,
    /// Grace period for a new socket to send its `Register` frame.
    pub registration_timeout: Duration,
    /// Largest payload accepted from a game server.
    pub max_frame_len: usize,
    /// Queue depth of each event subscriber before events are dropped.
    pub event_buffer: usize,
    /// Frames queued per game server before dispatch is refused.
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5005)),
            registration_timeout: Duration::from_secs(5),
            max_frame_len: shared::MAX_FRAME_LEN,
            event_buffer: 256,
            outbound_buffer: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.bind_address.port(), 5005);
        assert_eq!(config.registration_timeout, Duration::from_secs(5));
        assert_eq!(config.max_frame_len, shared::MAX_FRAME_LEN);
        assert!(config.event_buffer > 0);
        assert_eq!(config.outbound_buffer, 1024);
    }
}
