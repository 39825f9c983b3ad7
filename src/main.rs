// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xbridge_witness::config::WitnessNodeConfig;
use xbridge_witness::node::run_witness_node;

#[derive(Parser)]
#[clap(name = env!("CARGO_BIN_NAME"), rename_all = "kebab-case")]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = WitnessNodeConfig::load(&args.config_path)?;
    let registry = prometheus::Registry::new();
    run_witness_node(config, &registry).await
}
