mod clock;
mod commands;
mod config;
mod generator;
mod goals;
mod inject;
mod maintenance;
mod message;
mod pipeline;
mod schedule;
mod timewindow;

#[cfg(test)]
mod integration_tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::clock::Clock;
use crate::commands::CommandHandler;
use crate::config::AppConfig;
use crate::generator::NullGenerator;
use crate::goals::GoalStore;
use crate::maintenance::MaintenanceLoop;
use crate::message::MessageEnvelope;
use crate::pipeline::InjectPipeline;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("agendad {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("agendad {}", env!("CARGO_PKG_VERSION"));
                println!("Agenda daemon: goal store plus injection pipeline.\n");
                println!("Usage: agendad [OPTIONS]\n");
                println!("Reads messages from stdin, one per line, and prints the");
                println!("prompt that would be sent downstream.\n");
                println!("Options:");
                println!("  -h, --help       Print help");
                println!("  -V, --version    Print version");
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
    }

    let config_path = PathBuf::from("config.toml");
    let config = if config_path.exists() {
        AppConfig::load(&config_path)?
    } else {
        info!("No config.toml found, using defaults");
        AppConfig::default()
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let store = GoalStore::open(
        config.store.data_dir.clone(),
        Duration::from_millis(config.store.save_delay_ms),
    )?;
    let clock = Clock::new(&config.schedule.timezone);

    let maintenance = MaintenanceLoop::new(
        store.clone(),
        clock,
        Duration::from_secs(config.maintenance.cleanup_interval_secs),
        config.maintenance.retention_days,
    );
    let shutdown = CancellationToken::new();
    let maintenance_task = tokio::spawn(maintenance.run(shutdown.clone()));

    let pipeline = InjectPipeline::new(config, store.clone(), Arc::new(NullGenerator));
    let commands = CommandHandler::new(store.clone());

    // Warm the global schedule snapshot so the first message hits the cache
    pipeline.resolver().resolve(goals::GLOBAL_SCOPE).await;
    info!("agendad ready, reading messages from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        if let Some(reply) = commands.handle(&text).await {
                            println!("{reply}");
                            continue;
                        }
                        let mut envelope = MessageEnvelope {
                            prompt: "Reply to the user.".to_string(),
                            base_message: Some(text),
                            stream_id: Some("cli".to_string()),
                            user_id: Some("local".to_string()),
                            ..Default::default()
                        };
                        let injected = pipeline.handle_message(&mut envelope).await;
                        if injected {
                            println!("--- prompt with injection ---\n{}", envelope.prompt);
                        } else {
                            println!("--- no injection ---");
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                }
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = maintenance_task.await {
        warn!("Maintenance task join failed: {e}");
    }
    store.shutdown().await;
    info!("agendad stopped");
    Ok(())
}
