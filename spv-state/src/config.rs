//! On-disk layout configuration shared by the chain engine and transaction
//! database (§6 "Config root").

use std::path::PathBuf;

use spv_chain::parameters::Network;

/// Where this node keeps its persistent state.
///
/// Resolves to `<app-data-dir>/<app_name>/<coin_name_lowercase>[/testnet]`,
/// following the OS-appropriate application data directory convention spec.md
/// §6 calls for, unless the caller supplies an explicit override (used by
/// tests and `--datadir`-style CLI overrides).
#[derive(Clone, Debug)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub network: Network,
}

impl Config {
    pub fn new(app_name: &str, coin_name: &str, network: Network) -> Config {
        let mut cache_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        cache_dir.push(app_name);
        cache_dir.push(coin_name.to_lowercase());
        if network == Network::Testnet {
            cache_dir.push("testnet");
        }
        Config { cache_dir, network }
    }

    /// Use an explicit directory instead of the OS default, e.g. for tests
    /// or a `--datadir` override.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>, network: Network) -> Config {
        Config { cache_dir: cache_dir.into(), network }
    }

    pub fn chain_db_path(&self) -> PathBuf {
        self.cache_dir.join("chain")
    }

    pub fn txdb_path(&self) -> PathBuf {
        self.cache_dir.join("txdb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testnet_gets_its_own_subdirectory() {
        let mainnet = Config::new("spv-node", "Bitcoin", Network::Mainnet);
        let testnet = Config::new("spv-node", "Bitcoin", Network::Testnet);
        assert_ne!(mainnet.cache_dir, testnet.cache_dir);
        assert!(testnet.cache_dir.ends_with("testnet"));
    }
}
