//! # recsync
//!
//! Command-line front end for the recording-session sync client: follows a
//! recording service live, or prints its current recording status once.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use recsync_client::{HttpSnapshotSource, ServerAddress, SessionSyncClient, SnapshotSource};
use recsync_core::{Alert, DeviceId, SessionRecord, SnapshotResponse, SyncConfig, SyncEvent};
use recsync_settings::{load_settings, load_settings_from_path, RecsyncSettings};
use recsync_telemetry::{init_telemetry, TelemetryConfig};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Follow live recording sessions on a recording service.
#[derive(Parser, Debug)]
#[command(name = "recsync", version)]
struct Cli {
    /// Settings file (default: ~/.recsync/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stay connected and print alerts and session changes until Ctrl-C.
    Watch {
        /// Server address, e.g. `http://192.168.2.2:6060`. Falls back to settings.
        address: Option<String>,

        /// Only follow this device.
        #[arg(long)]
        device: Option<String>,

        /// Print one JSON object per line instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Fetch the current recording status once and print it.
    Snapshot {
        /// Server address. Falls back to settings.
        address: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;

    let _ = init_telemetry(&TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));
    debug!(?settings, "settings loaded");

    match cli.command {
        Command::Watch {
            address,
            device,
            json,
        } => {
            let address = resolve_address(address, &settings)?;
            let mut config = settings.sync.clone();
            if let Some(device) = device {
                config.device_filter = Some(DeviceId::from_raw(device));
            }
            watch(config, &address, json).await
        }
        Command::Snapshot { address, json } => {
            let address = resolve_address(address, &settings)?;
            snapshot(&settings.sync, &address, json).await
        }
    }
}

fn resolve_address(arg: Option<String>, settings: &RecsyncSettings) -> Result<String> {
    arg.or_else(|| settings.server.address.clone())
        .context("no server address given and none configured (set RECSYNC_SERVER)")
}

async fn watch(config: SyncConfig, address: &str, json: bool) -> Result<()> {
    let (alert_tx, mut alerts) = mpsc::unbounded_channel::<Alert>();
    let client = SessionSyncClient::with_defaults(config, Arc::new(alert_tx));
    let mut events = client.subscribe();

    client
        .start(address)
        .await
        .with_context(|| format!("cannot sync against {address}"))?;
    info!(address, "watching recording sessions");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            res = &mut shutdown => {
                res.context("failed to listen for ctrl+c")?;
                info!("shutting down");
                break Ok(());
            }
            Some(alert) = alerts.recv() => print_alert(&alert, json)?,
            event = events.next() => {
                let Some(event) = event else { break Ok(()) };
                print_event(&event, json)?;
                if let SyncEvent::ReconnectionExhausted { attempts } = event {
                    // Drain the terminal alert before leaving.
                    while let Ok(alert) = alerts.try_recv() {
                        print_alert(&alert, json)?;
                    }
                    break Err(anyhow::anyhow!(
                        "recording service unreachable after {attempts} reconnect attempts"
                    ));
                }
            }
        }
    };

    client.stop().await;
    outcome
}

async fn snapshot(config: &SyncConfig, address: &str, json: bool) -> Result<()> {
    let address = ServerAddress::parse(address)?;
    let source = HttpSnapshotSource::new(config.snapshot_timeout());
    let mut records = source.fetch(&address.snapshot_url()).await?;
    if let Some(device) = &config.device_filter {
        records.retain(|r| &r.device_id == device);
    }
    records.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    if json {
        let body = SnapshotResponse {
            all_recording_status: records,
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if records.is_empty() {
        bail!("{address} reported no devices");
    }
    println!("{:<38} {:<9} STARTED", "DEVICE", "STATE");
    for record in &records {
        println!("{}", session_line(record));
    }
    Ok(())
}

fn print_alert(alert: &Alert, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "type": "alert", "alert": alert }));
    } else {
        println!(
            "[{}] {}: {}",
            alert.severity.as_str(),
            alert.title,
            alert.message
        );
    }
    Ok(())
}

fn print_event(event: &SyncEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        SyncEvent::SessionUpdated { record, .. } => println!("{}", session_line(record)),
        SyncEvent::SnapshotApplied { applied, skipped } => {
            println!("snapshot: {applied} devices ({skipped} already streamed)");
        }
        SyncEvent::SnapshotFailed { reason } | SyncEvent::FrameDropped { reason } => {
            eprintln!("warning: {reason}");
        }
        other => debug!(event = ?other, "sync event"),
    }
    Ok(())
}

fn session_line(record: &SessionRecord) -> String {
    let state = if record.is_active { "recording" } else { "idle" };
    let started = record
        .start_time
        .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
    format!("{:<38} {:<9} {}", record.device_id.as_str(), state, started)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_watch() {
        let cli = Cli::try_parse_from([
            "recsync",
            "watch",
            "http://10.0.0.2:6060",
            "--device",
            "D1",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Watch {
                address,
                device,
                json,
            } => {
                assert_eq!(address.as_deref(), Some("http://10.0.0.2:6060"));
                assert_eq!(device.as_deref(), Some("D1"));
                assert!(json);
            }
            Command::Snapshot { .. } => panic!("expected watch"),
        }
    }

    #[test]
    fn cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn address_falls_back_to_settings() {
        let mut settings = RecsyncSettings::default();
        assert!(resolve_address(None, &settings).is_err());
        settings.server.address = Some("http://blueos.local".into());
        assert_eq!(
            resolve_address(None, &settings).unwrap(),
            "http://blueos.local"
        );
        assert_eq!(
            resolve_address(Some("h:1".into()), &settings).unwrap(),
            "h:1"
        );
    }

    #[test]
    fn session_line_formats_state() {
        let line = session_line(&SessionRecord::new("D1", true));
        assert!(line.starts_with("D1"));
        assert!(line.contains("recording"));
        assert!(line.ends_with('-'));
    }
}
