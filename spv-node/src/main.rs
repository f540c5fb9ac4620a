//! Entry point: parses CLI flags, installs logging, opens the node's
//! persistent state, and runs the network core until the process is asked
//! to stop.

mod cli;
mod config;
mod node;

use std::sync::Arc;

use gumdrop::Options;
use tracing_subscriber::layer::SubscriberExt;

use cli::Cli;
use config::NodeConfig;
use node::Node;

fn install_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::Layer::default();
    let subscriber = tracing_subscriber::Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting the global tracing subscriber should only happen once");
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    install_tracing();

    let cli = Cli::parse_args_default_or_exit();
    let config = NodeConfig::from_cli(&cli);

    let node = Node::open(&config)?;
    Arc::new(node).run().await;

    Ok(())
}
