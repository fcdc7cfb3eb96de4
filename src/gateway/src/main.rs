use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use huddle_core::{build_router, load_huddle_config, OllamaBackend, ServerConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_filter())
        .init();

    let defaults = ServerConfig::default();

    let bind = parse_socket("HUDDLE_BIND", defaults.bind);
    let heartbeat_interval = parse_duration("HUDDLE_HEARTBEAT_SECS", defaults.heartbeat_interval);
    let idle_timeout = parse_duration("HUDDLE_IDLE_SECS", defaults.idle_timeout);
    let session_retention =
        parse_duration("HUDDLE_SESSION_RETENTION_SECS", defaults.session_retention);
    let outbound_buffer = parse_usize("HUDDLE_OUTBOUND_BUFFER", defaults.outbound_buffer);

    let config = ServerConfig {
        bind,
        heartbeat_interval,
        idle_timeout,
        session_retention,
        outbound_buffer,
    };

    let huddle_config = load_huddle_config();
    let backend = OllamaBackend::new(&huddle_config.backend)?;
    if huddle_config.backend.api_key().is_none() {
        tracing::warn!(
            env = %huddle_config.backend.api_key_env,
            "no completion API key set; requests will be unauthenticated"
        );
    }
    tracing::info!(endpoint = %backend.endpoint(), "completion backend configured");

    let app = build_router(config.clone(), huddle_config, Arc::new(backend));

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn parse_socket(key: &str, default: SocketAddr) -> SocketAddr {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_duration(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map(Duration::from_secs).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_usize(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(v) => v.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

fn tracing_filter() -> tracing_subscriber::EnvFilter {
    let explicit = env::var("HUDDLE_LOG").or_else(|_| env::var("RUST_LOG")).ok();
    if let Some(filter) = explicit {
        return tracing_subscriber::EnvFilter::new(filter);
    }
    if matches!(
        env::var("HUDDLE_DEBUG").as_deref(),
        Ok("1" | "true" | "TRUE" | "yes" | "YES")
    ) {
        return tracing_subscriber::EnvFilter::new("debug");
    }
    tracing_subscriber::EnvFilter::new("info")
}
