//! Tracing initialization (§6 ambient stack grounding): `EnvFilter` seeded from
//! `agento_config::log_level()`, matching the teacher's `tracing_subscriber::fmt()` setup in
//! `cli/src/main.rs`.

pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(agento_config::log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
