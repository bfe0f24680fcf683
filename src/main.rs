mod collectors;
mod config;
mod http;
mod metrics;
mod power;

use axum::serve;
use clap::Parser;
use config::Config;
use http::HttpAppState;
use metrics::Metrics;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostpulse")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides `listen` from the config file.
    #[arg(long)]
    listen: Option<String>,
    /// Environment variable whose non-empty value replaces `shutdown_password`.
    #[arg(long)]
    shutdown_password_env: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    if !Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }
    let mut cfg = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
    }
    if let Some(env_name) = cli.shutdown_password_env.as_deref() {
        match resolve_password_from_env(env_name) {
            Some(password) => cfg.shutdown_password = password,
            None => warn!(env = env_name, "shutdown password variable is unset or empty"),
        }
    }
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }

    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "invalid listen address");
            std::process::exit(1);
        }
    };

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let app = http::build_router(HttpAppState {
        metrics,
        collect: Arc::new(cfg.collect.clone()),
        power: Arc::new(cfg.power.clone()),
        shutdown_password: Arc::from(cfg.shutdown_password.as_str()),
    });

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, %addr, "failed to start HTTP server");
            std::process::exit(1);
        }
    };

    info!(
        listen = %addr,
        parallel = cfg.collect.parallel,
        "starting hostpulse"
    );

    let server = serve(listener, app).with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to wait for Ctrl+C");
        }
        info!("received Ctrl+C, shutting down");
    });

    if let Err(err) = server.await {
        error!(error = %err, "HTTP server error");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_password_from_env(env_name: &str) -> Option<String> {
    std::env::var(env_name).ok().filter(|v| !v.is_empty())
}
