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


//! lilith-gateway binary: `lilith-gateway <stdio|http|stateless-http>`.

use clap::Parser;
use tracing::{error, info, warn};

use lilith_gateway::config::Config;
use lilith_gateway::engine::{builtin, ProtocolEngine};
use lilith_gateway::http::HttpMode;
use lilith_gateway::lifecycle::{self, LifecycleController, Mode};

#[derive(Parser, Debug)]
#[command(name = "lilith-gateway", version, about = "Dual-transport MCP protocol server")]
struct Cli {
    /// Transport to serve
    #[arg(value_enum)]
    mode: Mode,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    install_panic_hook();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) if cli.mode == Mode::Stdio => {
            eprintln!("Warning: Failed to load config from env, using defaults: {}", e);
            Config::default()
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to init tracing: {}", e);
    }

    let code = match run(cli.mode, config).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Fatal error");
            1
        }
    };

    // Stdin is read on a blocking thread that never observes cancellation,
    // so leave explicitly instead of waiting for runtime teardown.
    std::process::exit(code);
}

async fn run(mode: Mode, config: Config) -> anyhow::Result<()> {
    info!(mode = ?mode, version = env!("CARGO_PKG_VERSION"), "Starting lilith-gateway");

    let engine = ProtocolEngine::new(builtin::handler_set)?;
    let lifecycle = LifecycleController::new();

    match mode {
        Mode::Stdio => {
            let reason = lifecycle::run_stdio(&engine, &lifecycle, lifecycle::shutdown_signal()).await?;
            info!(reason = ?reason, "Stdio transport finished");
        }
        Mode::Http | Mode::StatelessHttp => {
            let http_mode = if mode == Mode::Http {
                HttpMode::SessionAffine
            } else {
                HttpMode::Stateless
            };
            if config.allowed_origins.iter().any(|o| o == "*") {
                warn!("ALLOWED_ORIGINS contains '*'; any browser origin may call this server");
            }
            lifecycle::run_http(&config, engine, http_mode, lifecycle, lifecycle::shutdown_signal())
                .await?;
        }
    }
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

// Logs always go to stderr: stdout is the stdio protocol channel.
fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.json_logs() {
        subscriber.json().try_init()?;
    } else {
        subscriber.try_init()?;
    }
    Ok(())
}
