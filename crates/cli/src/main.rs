mod server;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use translate_balancer_core::config::{
    resolve_endpoints, BalancerConfig, DispatchConfig, EndpointList, Env, HealthConfig, StdEnv,
    DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_HEALTH_FAILURE_THRESHOLD, DEFAULT_HEALTH_INTERVAL_SECS,
    DEFAULT_LISTEN_ADDR, DEFAULT_LOG_BUFFER_LINES, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_SEGMENT_LEN,
    DEFAULT_MAX_WORKERS, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS, ENV_ENDPOINTS,
    ENV_LISTEN_ADDR,
};
use translate_balancer_core::logsink::LogBuffer;
use translate_balancer_core::Balancer;

#[derive(Parser, Debug)]
#[command(name = "translate-balancer")]
#[command(about = "Fault-tolerant load balancer for a pool of translation servers")]
struct Args {
    /// Backend translate URL; repeat for more. Falls back to TRANSLATE_BALANCER_ENDPOINTS.
    #[arg(long = "endpoint")]
    endpoints: Vec<String>,

    /// File with one backend URL per line.
    #[arg(long)]
    endpoints_file: Option<PathBuf>,

    #[arg(long, env = ENV_LISTEN_ADDR, default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    request_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_ATTEMPT_TIMEOUT_MS)]
    attempt_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    max_workers: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_SEGMENT_LEN)]
    max_segment_len: usize,

    #[arg(long, default_value_t = DEFAULT_HEALTH_INTERVAL_SECS)]
    health_interval_secs: u64,

    #[arg(long, default_value_t = DEFAULT_HEALTH_FAILURE_THRESHOLD)]
    health_failure_threshold: u32,

    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_MS)]
    probe_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_LOG_BUFFER_LINES)]
    log_buffer_lines: usize,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let logs = LogBuffer::new(args.log_buffer_lines);
    init_tracing(&args.log_level, logs.clone())?;

    let listen = args.listen.clone();
    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        endpoints = cfg.endpoints.len(),
        listen = %listen,
        max_segment_len = cfg.max_segment_len,
        "config loaded"
    );

    let balancer = Arc::new(Balancer::start(cfg).context("failed to start balancer")?);
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(listen = %listen, "listening");

    let app = server::router(server::AppState::new(Arc::clone(&balancer), logs));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    balancer.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

fn init_tracing(level: &str, logs: LogBuffer) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(logs))
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<BalancerConfig> {
    let mut addresses = args.endpoints;
    if let Some(path) = &args.endpoints_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        addresses.extend(EndpointList::parse_lines(&contents)?.into_inner());
    }
    let endpoints = resolve_endpoints(addresses, ENV_ENDPOINTS, env)?;

    let dispatch = DispatchConfig::new(
        Duration::from_millis(args.attempt_timeout_ms),
        args.max_attempts,
        args.max_workers,
    )?;
    let health = HealthConfig::new(
        Duration::from_secs(args.health_interval_secs),
        Duration::from_millis(args.probe_timeout_ms),
        args.health_failure_threshold,
    )?;

    let mut cfg = BalancerConfig::new(endpoints)
        .with_max_segment_len(args.max_segment_len)?
        .with_request_timeout(Duration::from_millis(args.request_timeout_ms))?;
    cfg.dispatch = dispatch;
    cfg.health = health;
    Ok(cfg)
}
