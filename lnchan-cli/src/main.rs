use std::fs;
use std::io;

use anyhow::{anyhow, Context};
use clap::Parser;

use lnchan_cli::commands::{run, Cli};
use lnchan_util::config::{default_datadir, expand_config_args, load_engine_config};
use lnchan_util::observability::init_tracing_subscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = expand_config_args(&std::env::args().collect::<Vec<_>>())?;
    let cli = Cli::parse_from(args);
    let datadir = cli.datadir.clone().unwrap_or_else(default_datadir);
    fs::create_dir_all(&datadir).with_context(|| format!("creating {}", datadir.display()))?;
    let _guard = init_tracing_subscriber(&datadir, "lnchan", cli.log_level)
        .map_err(|e| anyhow!("initializing logging: {}", e))?;

    let config = cli.engine_config(load_engine_config(&datadir)?);
    let snapshot_path = cli.snapshot_path(&datadir);
    tracing::debug!("using {:?} with {:?}", snapshot_path, config);
    run(&cli.command, config, &snapshot_path, &mut io::stdout()).await
}
