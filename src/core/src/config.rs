use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1:3000).
    pub bind: SocketAddr,
    /// Interval between server→client pings.
    pub heartbeat_interval: Duration,
    /// Close the connection after this duration without any message.
    pub idle_timeout: Duration,
    /// How long a session outlives its last connection before teardown.
    pub session_retention: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
            heartbeat_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(120),
            session_retention: Duration::from_secs(300),
            outbound_buffer: 256,
        }
    }
}
