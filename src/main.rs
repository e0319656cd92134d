// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Entry point for the lilith-bridge MCP gateway
use anyhow::{anyhow, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use lilith_bridge::config::{Config, GatewayConfig};
use lilith_bridge::mcp::gateway::McpGateway;
use lilith_bridge::mcp::http::ReqwestBackend;
use lilith_bridge::mcp::server;

#[derive(Parser, Debug)]
#[command(version, about = "MCP protocol gateway", long_about = None)]
struct Cli {
    /// Path to the gateway YAML configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (e.g. "127.0.0.1:8080")
    #[arg(short, long)]
    listen: Option<String>,

    /// Validate the configuration, print a summary and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    install_panic_hook();

    let mut config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from env, using defaults: {}", e);
        Config::default()
    });
    if let Some(path) = cli.config {
        config.gateway_config_path = Some(path);
    }
    if let Some(listen) = cli.listen {
        config.listen_address = listen;
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    let path = config
        .gateway_config_path
        .clone()
        .ok_or_else(|| anyhow!("no gateway configuration: pass --config or set LILITH_BRIDGE_CONFIG"))?;
    let gateway_config = GatewayConfig::load(&path)?;

    if cli.check {
        let server = &gateway_config.server;
        println!(
            "Configuration OK: server '{}' ({:?}) at {}, {} security scheme(s), {} tool(s)",
            server.name,
            server.transport,
            server.url,
            server.security_schemes.len(),
            gateway_config.tools.len()
        );
        return Ok(());
    }

    let client = Arc::new(ReqwestBackend::new()?);
    let gateway = Arc::new(McpGateway::from_config(gateway_config, client)?);

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_address))?;
    info!(
        addr = %listener.local_addr()?,
        path = %gateway.config().path,
        backend = %gateway.config().server.url,
        "lilith-bridge listening"
    );

    server::serve(listener, gateway, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("lilith_bridge=debug,info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
