//! Command-line flags (§6 "CLI surface"): the core reads a small, fixed set
//! of them directly; everything else (an RPC/CLI layer) is out of scope and
//! talks to the core only through the library crates' own APIs.

use gumdrop::Options;

#[derive(Debug, Options)]
pub struct Cli {
    #[options(help = "print this help message")]
    pub help: bool,

    #[options(help = "drop the chain index, transaction database, and wallet spend state, then resync from genesis")]
    pub resync: bool,

    #[options(help = "use the testnet coin profile instead of mainnet")]
    pub testnet: bool,

    #[options(help = "connect to peers over Tor instead of directly")]
    pub tor: bool,

    #[options(help = "the Tor SOCKS proxy to dial through, as host[:port]", meta = "ADDR")]
    pub torproxy: Option<String>,

    #[options(help = "application data directory override (defaults to the OS-appropriate location)", meta = "DIR")]
    pub datadir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_testnet_and_torproxy_flags_together() {
        let cli = Cli::parse_args_default(&["--testnet", "--tor", "--torproxy", "127.0.0.1:9050"]).unwrap();
        assert!(cli.testnet);
        assert!(cli.tor);
        assert_eq!(cli.torproxy.as_deref(), Some("127.0.0.1:9050"));
        assert!(!cli.resync);
    }

    #[test]
    fn defaults_to_no_flags_set() {
        let cli = Cli::parse_args_default(&[] as &[&str]).unwrap();
        assert!(!cli.testnet);
        assert!(!cli.resync);
        assert!(cli.datadir.is_none());
    }
}
