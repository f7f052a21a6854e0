//! lacpd - LACP Daemon
//!
//! Entry point for the lacpd daemon.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use sonic_orch_common::{KeyOpFieldsValues, Orch};
use sonic_types::MacAddress;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

use sonic_lacpd::{
    BondStatus, InterfaceStateRecord, LacpCallbacks, LacpMgr, LacpdConfig,
    CFG_LACP_SYSTEM_TABLE_NAME, CFG_LAG_MEMBER_TABLE_NAME, CFG_LAG_TABLE_NAME,
    CFG_PORT_TABLE_NAME, DEFAULT_CONFIG_PATH,
};

/// SONiC LACP daemon
#[derive(Parser, Debug)]
#[command(name = "lacpd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// System MAC address
    #[arg(short = 'm', long)]
    system_mac: Option<MacAddress>,

    /// System priority
    #[arg(long)]
    system_priority: Option<u16>,

    /// Timer tick in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// config_db.json style file with initial PORTCHANNEL, PORTCHANNEL_MEMBER,
    /// PORT and LACP_SYSTEM entries
    #[arg(long)]
    config_db: Option<PathBuf>,
}

/// Publishes engine output to the log.
struct LogCallbacks;

impl LacpCallbacks for LogCallbacks {
    fn transmit(&self, interface: &str, frame: &[u8]) {
        trace!(interface = %interface, len = frame.len(), "TX slow-protocols frame");
    }

    fn write_interface_state(&self, interface: &str, record: &InterfaceStateRecord) {
        debug!(
            interface = %interface,
            actor = %record.actor_state,
            partner = %record.partner_state,
            bond_status = ?record.bond_status,
            "LAG_MEMBER_TABLE set"
        );
    }

    fn remove_interface_state(&self, interface: &str) {
        debug!(interface = %interface, "LAG_MEMBER_TABLE del");
    }

    fn write_lag_state(&self, lag: &str, status: BondStatus) {
        info!(lag = %lag, bond_status = %status, "LAG_TABLE set");
    }

    fn remove_lag_state(&self, lag: &str) {
        info!(lag = %lag, "LAG_TABLE del");
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Reads the LACP-related tables of a config_db.json style document.
fn load_config_db(path: &Path) -> Result<Vec<(&'static str, Vec<KeyOpFieldsValues>)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let doc: Value =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    let mut tables = Vec::new();
    for table in [
        CFG_LACP_SYSTEM_TABLE_NAME,
        CFG_PORT_TABLE_NAME,
        CFG_LAG_TABLE_NAME,
        CFG_LAG_MEMBER_TABLE_NAME,
    ] {
        let Some(rows) = doc.get(table).and_then(Value::as_object) else {
            continue;
        };
        let entries = rows
            .iter()
            .map(|(key, row)| {
                let fvs = row
                    .as_object()
                    .map(|fields| {
                        fields
                            .iter()
                            .map(|(field, value)| {
                                let value = match value {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                };
                                (field.clone(), value)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                KeyOpFieldsValues::set(key.clone(), fvs)
            })
            .collect();
        tables.push((table, entries));
    }
    Ok(tables)
}

async fn run(args: Args) -> Result<()> {
    let mut config = LacpdConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(mac) = args.system_mac {
        config.system.mac = Some(mac);
    }
    if let Some(priority) = args.system_priority {
        config.system.priority = priority;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.daemon.tick_interval_ms = tick_ms;
    }
    config.validate()?;

    let system = config.system_context();
    info!(
        system_mac = %system.mac,
        system_priority = system.priority,
        max_lag_members = config.engine.max_lag_members,
        tick_ms = config.daemon.tick_interval_ms,
        "Configuration loaded"
    );

    let mut mgr = LacpMgr::new(system, config.engine.max_lag_members);
    mgr.set_callbacks(Arc::new(LogCallbacks));

    if let Some(path) = &args.config_db {
        for (table, entries) in load_config_db(path)? {
            info!(table = %table, entries = entries.len(), "Loaded initial entries");
            mgr.add_config_entries(table, entries)?;
        }
    }

    let start = Instant::now();
    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("lacpd running");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                mgr.on_timer(now_ms);
                if mgr.has_pending_tasks() {
                    mgr.do_task().await;
                }
            }
            result = signal::ctrl_c() => {
                result.context("waiting for shutdown signal")?;
                info!("Received shutdown signal");
                break;
            }
        }
    }

    for lag in mgr.lag_names() {
        if let Ok(counters) = mgr.lag_counters(&lag) {
            info!(
                lag = %lag,
                sent = counters.lacpdus_sent,
                received = counters.lacpdus_received,
                "Final LACPDU counters"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // The file's log level is only known after loading it.
    let log_level = args.log_level.clone().unwrap_or_else(|| {
        LacpdConfig::load_or_default(&args.config)
            .map(|c| c.daemon.log_level)
            .unwrap_or_else(|_| "info".to_string())
    });
    init_logging(&log_level);

    info!("--- Starting lacpd ---");

    match run(args).await {
        Ok(()) => {
            info!("lacpd exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("lacpd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
