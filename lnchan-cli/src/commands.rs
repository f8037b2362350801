use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use tokio::runtime::Handle;
use tracing::Level;

use lnchan::bitcoin::OutPoint;
use lnchan::channel::{ChannelId, ChannelSetup, NodeId};
use lnchan::close::CloseHandle;
use lnchan::config::EngineConfig;
use lnchan::error::{insufficient_balance, ChannelError};
use lnchan::services::ChainService;
use lnchan::util::loopback::initial_commitment_tx;
use lnchan::util::MSAT_PER_SAT;

use crate::format::{format_row, status_line};
use crate::snapshot::{Engine, Snapshot, SNAPSHOT_FILE};

/// Local amount of a new channel when not given, in sat
pub const DEFAULT_LOCAL_AMOUNT_SAT: u64 = 200_000;
/// Each side's reserve, in percent of the channel value
const RESERVE_PERCENT: u64 = 1;
/// Relative timelock on our unilateral close
const TO_SELF_DELAY: u16 = 144;

#[derive(Parser, Debug)]
#[clap(name = "lnchan", author, version, about, long_about = None)]
#[clap(after_help = "Flags can also be given in a toml file with --config FILE")]
pub struct Cli {
    #[clap(long, help = "data directory, defaults to ~/.lnchan", value_parser)]
    pub datadir: Option<PathBuf>,

    #[clap(long, help = "channel snapshot, defaults to <datadir>/snapshot.json", value_parser)]
    pub snapshot: Option<PathBuf>,

    #[clap(long, help = "log level used when RUST_LOG is not set", default_value = "info")]
    pub log_level: Level,

    #[clap(long, help = "confirmations before a funded channel opens")]
    pub funding_depth: Option<u32>,

    #[clap(long, help = "confirmations before a closing transaction is final")]
    pub safety_depth: Option<u32>,

    #[clap(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The snapshot path, relative to `datadir` unless given explicitly
    pub fn snapshot_path(&self, datadir: &Path) -> PathBuf {
        self.snapshot.clone().unwrap_or_else(|| datadir.join(SNAPSHOT_FILE))
    }

    /// `base` with the command line overrides applied
    pub fn engine_config(&self, base: EngineConfig) -> EngineConfig {
        let mut config = base;
        if let Some(depth) = self.funding_depth {
            config.funding_depth = depth;
        }
        if let Some(depth) = self.safety_depth {
            config.safety_depth = depth;
        }
        config.sanitized()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// One row per channel: node id, what each side can spend, state
    #[clap(name = "list")]
    List {
        #[clap(long, help = "print channel summaries as json")]
        json: bool,
    },
    /// Peer, node and graph channel counts
    #[clap(name = "status")]
    Status,
    /// A node worth opening a channel to
    #[clap(name = "suggest")]
    Suggest,
    /// Fund a new channel
    #[clap(name = "open")]
    Open {
        #[clap(help = "remote node id or node_id@host:port, defaults to a suggested peer")]
        node: Option<String>,
        #[clap(long, help = "channel value in sat", default_value_t = DEFAULT_LOCAL_AMOUNT_SAT)]
        local_amount: u64,
        #[clap(long, help = "amount given to the remote side at open, in sat", default_value_t = 0)]
        push_amount: u64,
    },
    /// Cooperatively close a channel
    #[clap(name = "close")]
    Close { channel_id: ChannelId },
    /// Unilaterally close a channel
    #[clap(name = "force-close")]
    ForceClose { channel_id: ChannelId },
}

fn write_error<W: Write>(out: &mut W, e: &ChannelError) -> Result<()> {
    writeln!(out, "{}: {}", e.kind_name(), e.message())?;
    Ok(())
}

/// The node id of `node_id` or `node_id@host:port`
pub fn parse_node_id(s: &str) -> Result<NodeId> {
    let pubkey = s.trim().split('@').next().unwrap_or_default();
    NodeId::from_str(pubkey).with_context(|| format!("invalid node id {}", s))
}

async fn open_channel<W: Write>(
    engine: &Engine,
    node_id: NodeId,
    local_amount: u64,
    push_amount: u64,
    out: &mut W,
) -> Result<bool> {
    if local_amount == 0 || push_amount > local_amount {
        let e = insufficient_balance(format!(
            "push {} sat with local amount {} sat",
            push_amount, local_amount
        ));
        write_error(out, &e)?;
        return Ok(false);
    }
    // the loopback wallet restarts with every run, skip funding outpoints
    // already in use
    let funding = loop {
        let tx = engine.chain.fund(local_amount);
        let outpoint = OutPoint { txid: tx.compute_txid(), vout: 0 };
        if engine.registry.get(&ChannelId::from_funding_outpoint(&outpoint)).is_err() {
            break tx;
        }
    };
    let txid = match engine.chain.broadcast(&funding).await {
        Ok(txid) => txid,
        Err(e) => {
            write_error(out, &ChannelError::from(e))?;
            return Ok(false);
        }
    };
    let reserve_msat = local_amount * MSAT_PER_SAT * RESERVE_PERCENT / 100;
    let setup = ChannelSetup {
        is_outbound: true,
        channel_value_sat: local_amount,
        push_value_msat: push_amount * MSAT_PER_SAT,
        funding_outpoint: OutPoint { txid, vout: 0 },
        local_reserve_msat: reserve_msat,
        remote_reserve_msat: reserve_msat,
        counterparty_selected_contest_delay: TO_SELF_DELAY,
    };
    match engine.registry.open_channel(node_id, setup, initial_commitment_tx(&setup)) {
        Ok(id) => {
            info!("opened channel {} to {}", id, node_id);
            writeln!(out, "{}", id)?;
            Ok(true)
        }
        Err(e) => {
            write_error(out, &e)?;
            Ok(false)
        }
    }
}

async fn report_close<W: Write>(
    started: Result<CloseHandle, ChannelError>,
    out: &mut W,
) -> Result<bool> {
    let handle = match started {
        Ok(handle) => handle,
        Err(e) => {
            write_error(out, &e)?;
            return Ok(false);
        }
    };
    let kind = handle.kind();
    let channel_id = *handle.channel_id();
    match handle.outcome().await {
        Ok(txid) => {
            info!("{} close of {} broadcast", kind, channel_id);
            writeln!(out, "{}", txid)?;
        }
        Err(e) => write_error(out, &e)?,
    }
    // a force close changes state even when the broadcast fails
    Ok(true)
}

/// Run one command against `engine`, writing its output to `out`.  Returns
/// whether channel state changed and should be saved.
pub async fn execute<W: Write>(engine: &Engine, command: &Commands, out: &mut W) -> Result<bool> {
    match command {
        Commands::List { json } => {
            let infos = engine.registry.list_info();
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&infos)?)?;
            } else {
                for info in &infos {
                    writeln!(out, "{}", format_row(info))?;
                }
            }
            Ok(false)
        }
        Commands::Status => {
            let line = status_line(
                engine.registry.peers().len(),
                engine.graph.node_count(),
                engine.graph.channel_count(),
            );
            writeln!(out, "{}", line)?;
            Ok(false)
        }
        Commands::Suggest => {
            match engine.registry.suggest_peer(&engine.graph) {
                Some(node_id) => writeln!(out, "{}", node_id)?,
                None => writeln!(out, "no suggestion")?,
            }
            Ok(false)
        }
        Commands::Open { node, local_amount, push_amount } => {
            let node_id = match node {
                Some(node) => parse_node_id(node)?,
                None => match engine.registry.suggest_peer(&engine.graph) {
                    Some(node_id) => node_id,
                    None => {
                        writeln!(out, "no suggestion")?;
                        return Ok(false);
                    }
                },
            };
            open_channel(engine, node_id, *local_amount, *push_amount, out).await
        }
        Commands::Close { channel_id } =>
            report_close(engine.registry.close(channel_id), out).await,
        Commands::ForceClose { channel_id } =>
            report_close(engine.registry.force_close(channel_id), out).await,
    }
}

/// Load the snapshot, run the command, and save the snapshot back if the
/// command changed it
pub async fn run<W: Write>(
    command: &Commands,
    config: EngineConfig,
    snapshot_path: &Path,
    out: &mut W,
) -> Result<()> {
    let snapshot = Snapshot::load(snapshot_path)?;
    let engine = Engine::from_snapshot(snapshot, config, Handle::current())?;
    if execute(&engine, command, out).await? {
        engine.to_snapshot().save(snapshot_path)?;
    }
    Ok(())
}
