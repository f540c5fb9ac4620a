//! The merged node configuration (§6 "Config root"): where persistent state
//! lives on disk, which coin profile this node runs, and the handful of
//! runtime knobs the CLI and an optional `config.toml` in the same
//! directory can set.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use spv_chain::parameters::Network;

use crate::cli::Cli;

const APP_NAME: &str = "spv-node";
const COIN_NAME: &str = "Bitcoin";

/// Runtime settings this binary reads beyond what `spv_state::Config`
/// already covers (the chain/txdb cache paths), merged from `config.toml`
/// (if present) and then overridden by CLI flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// How many peer connections this node tries to maintain at once
    /// (pyspv's `peer_goal`, default 8).
    pub peer_goal: usize,

    /// Connect through a SOCKS proxy instead of dialing directly.
    #[serde(default)]
    pub tor: bool,

    /// The SOCKS proxy to dial through when `tor` is set.
    #[serde(default)]
    pub tor_proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Config {
        Config { peer_goal: 8, tor: false, tor_proxy: None }
    }
}

/// Everything `main` needs to open the node's persistent state and start
/// the network core: the merged [`Config`] above, the state crate's own
/// path/network config, and whether to wipe existing state first.
pub struct NodeConfig {
    pub runtime: Config,
    pub state: spv_state::Config,
    pub network: Network,
    pub resync: bool,
}

impl NodeConfig {
    pub fn from_cli(cli: &Cli) -> NodeConfig {
        let network = if cli.testnet { Network::Testnet } else { Network::Mainnet };

        let state = match &cli.datadir {
            Some(dir) => spv_state::Config::with_cache_dir(PathBuf::from(dir), network),
            None => spv_state::Config::new(APP_NAME, COIN_NAME, network),
        };

        let mut runtime = load_runtime_config(&state.cache_dir.join("config.toml"));
        if cli.tor {
            runtime.tor = true;
        }
        if cli.torproxy.is_some() {
            runtime.tor_proxy = cli.torproxy.clone();
        }

        NodeConfig { runtime, state, network, resync: cli.resync }
    }

    pub fn wallet_db_path(&self) -> PathBuf {
        self.state.cache_dir.join("wallet")
    }
}

fn load_runtime_config(path: &std::path::Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_else(|error| {
            tracing::warn!(%error, path = %path.display(), "ignoring unparseable config.toml");
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use gumdrop::Options;

    #[test]
    fn default_config_matches_pyspvs_peer_goal() {
        assert_eq!(Config::default().peer_goal, 8);
    }

    #[test]
    fn cli_tor_flags_override_an_empty_config_toml() {
        let dir = tempdir::TempDir::new("spv-node-config").unwrap();
        let cli = Cli::parse_args_default(&[
            "--testnet",
            "--datadir",
            dir.path().to_str().unwrap(),
            "--tor",
            "--torproxy",
            "127.0.0.1:9050",
        ])
        .unwrap();

        let config = NodeConfig::from_cli(&cli);
        assert_eq!(config.network, Network::Testnet);
        assert!(config.runtime.tor);
        assert_eq!(config.runtime.tor_proxy.as_deref(), Some("127.0.0.1:9050"));
        assert!(!config.resync);
    }

    #[test]
    fn missing_config_toml_falls_back_to_defaults() {
        let dir = tempdir::TempDir::new("spv-node-config").unwrap();
        let config = load_runtime_config(&dir.path().join("config.toml"));
        assert_eq!(config.peer_goal, 8);
    }
}
