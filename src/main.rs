use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use quota_engine::clock::SystemClock;
use quota_engine::config;
use quota_engine::host::{HostEvent, QuotaHost};
use quota_engine::metrics::EngineMetrics;
use quota_engine::modal::{ScenarioRequest, WidgetModal};
use quota_engine::store::open_store;
use quota_engine::widget::{self, SurfaceHandle};
use quota_engine::Mode;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quota_engine=info".parse()?)
        )
        .init();

    info!("Starting quota engine host");

    let config = config::load_config()?;
    info!("Configuration loaded");

    let store = open_store(&config.store.path)?;
    let metrics = Arc::new(EngineMetrics::new());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let host = Arc::new(QuotaHost::new(
        &config,
        store.clone(),
        Arc::new(SystemClock),
        events_tx,
        metrics.clone(),
    ));
    let _rollover_poll = host.spawn_rollover_poll(Duration::from_secs(config.timer.rollover_poll_secs));

    let modal = WidgetModal::new(&config, store, host.clone());
    let (surface, signals) = widget::surface();
    let driver = tokio::spawn(widget::drive(modal.clone(), signals));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                if !handle_command(line.trim(), &modal, &surface, &host, &metrics)? {
                    break;
                }
            }
            Some(event) = events_rx.recv() => {
                print_event(&event, &host);
            }
        }
    }

    drop(surface);
    driver.await?;
    info!("Quota engine host stopped");
    Ok(())
}

fn handle_command(
    line: &str,
    modal: &WidgetModal,
    surface: &SurfaceHandle,
    host: &QuotaHost,
    metrics: &EngineMetrics,
) -> Result<bool> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("open") => {
            let mode = match parts.next() {
                Some("demo") | None => Mode::Demo,
                Some("account") => Mode::Authenticated,
                Some(other) => {
                    warn!("Unknown mode {:?}, expected demo or account", other);
                    return Ok(true);
                }
            };
            let request = ScenarioRequest {
                mode,
                agent_id: parts.next().map(str::to_string),
            };
            surface.open(request);
        }
        Some("tap") => {
            surface.interact();
        }
        Some("close") => {
            surface.dismiss();
        }
        Some("upgrade") => {
            surface.upgrade();
        }
        Some("status") => {
            println!("{}", serde_json::to_string(&modal.view())?);
            println!("monthly allowance left: {}", host.allowance_display());
            if let Some(renews_on) = host.renewal_display() {
                println!("renews on: {}", renews_on);
            }
        }
        Some("metrics") => print!("{}", metrics.format_prometheus()),
        Some("quit") | Some("exit") => return Ok(false),
        Some(other) => println!("unknown command: {}", other),
        None => {}
    }
    Ok(true)
}

fn print_event(event: &HostEvent, host: &QuotaHost) {
    match event {
        HostEvent::UsageChanged { remaining_secs, .. } => {
            info!("Navigation bar: {} left", quota_engine::gating::format_allowance(*remaining_secs));
        }
        HostEvent::QuotaRenewed { .. } => {
            println!("monthly allowance renewed, next renewal {}", host.renewal_display().unwrap_or_default());
        }
        HostEvent::SessionExpired { mode } => {
            println!("{} session expired", mode);
        }
        HostEvent::UpgradeRequested => {
            println!("navigating to subscription page");
        }
    }
}
