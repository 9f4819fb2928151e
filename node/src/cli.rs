//! # CLI Interface
//!
//! Command-line arguments for `edelivery-node`, defined with `clap`
//! derive. Every `run` flag can also come from an `EDELIVERY_*`
//! environment variable.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use edelivery_contracts::{DeliveryPolicy, LapseOutcome};
use edelivery_protocol::config::{
    DEFAULT_API_PORT, DEFAULT_METRICS_PORT, DEFAULT_MIN_DEPOSIT, DEFAULT_TERM1_SECS,
    DEFAULT_TERM2_SECS, MAX_RECEIVERS,
};

use crate::logging::LogFormat;

/// Registered e-delivery devnet node.
///
/// Hosts a reference ledger and blob store behind an HTTP API, and
/// bundles key generation and a local end-to-end demo.
#[derive(Parser, Debug)]
#[command(
    name = "edelivery-node",
    about = "Registered e-delivery devnet node",
    version,
    propagate_version = true
)]
pub struct NodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "EDELIVERY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the ledger and blob store over HTTP.
    Run(RunArgs),
    /// Generate a secp256k1 key pair and print it with its address.
    Keygen(KeygenArgs),
    /// Run a full create → accept → finish → open exchange in process.
    Demo(DemoArgs),
    /// Print version information and exit.
    Version,
}

/// What happens to the share of a receiver whose finish window lapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LapsePolicyArg {
    /// The receiver keeps the share.
    ForfeitToReceiver,
    /// The sender gets the share back.
    RefundSender,
}

impl From<LapsePolicyArg> for LapseOutcome {
    fn from(arg: LapsePolicyArg) -> Self {
        match arg {
            LapsePolicyArg::ForfeitToReceiver => LapseOutcome::ForfeitToReceiver,
            LapsePolicyArg::RefundSender => LapseOutcome::RefundSender,
        }
    }
}

/// Ledger rules shared by `run` and `demo`.
#[derive(Args, Debug, Clone)]
pub struct PolicyArgs {
    /// Smallest deposit accepted at creation.
    #[arg(long, env = "EDELIVERY_MIN_DEPOSIT", default_value_t = DEFAULT_MIN_DEPOSIT)]
    pub min_deposit: u64,

    /// Largest receiver set accepted at creation.
    #[arg(long, env = "EDELIVERY_MAX_RECEIVERS", default_value_t = MAX_RECEIVERS)]
    pub max_receivers: usize,

    /// Record finishes without checking `r·G + c·B == V`.
    #[arg(long, env = "EDELIVERY_SKIP_RESPONSE_CHECK")]
    pub skip_response_check: bool,

    /// Settlement of shares whose finish window lapsed.
    #[arg(long, env = "EDELIVERY_LAPSED_FINISH", value_enum, default_value_t = LapsePolicyArg::ForfeitToReceiver)]
    pub lapsed_finish: LapsePolicyArg,
}

impl PolicyArgs {
    /// The ledger policy these flags describe.
    pub fn to_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            min_deposit: self.min_deposit,
            max_receivers: self.max_receivers,
            verify_response: !self.skip_response_check,
            lapsed_finish: self.lapsed_finish.into(),
        }
    }
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory holding the sled blob store.
    #[arg(long, short = 'd', env = "EDELIVERY_DATA_DIR", default_value = "./edelivery-data")]
    pub data_dir: PathBuf,

    /// Keep blobs in memory instead of on disk.
    #[arg(long, env = "EDELIVERY_IN_MEMORY")]
    pub in_memory: bool,

    /// Bind address for both listeners.
    #[arg(long, env = "EDELIVERY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP API.
    #[arg(long, env = "EDELIVERY_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "EDELIVERY_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Network name reported by `/status`.
    #[arg(long, env = "EDELIVERY_NETWORK", default_value = "devnet")]
    pub network: String,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

/// Arguments for the `keygen` subcommand.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `demo` subcommand.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Message to deliver. At most 32 bytes.
    #[arg(long, short = 'm', default_value = "registered hello")]
    pub message: String,

    /// Number of receivers.
    #[arg(long, default_value_t = 1)]
    pub receivers: usize,

    /// Escrowed deposit.
    #[arg(long, default_value_t = 10)]
    pub deposit: u64,

    /// Acceptance window in seconds.
    #[arg(long, default_value_t = DEFAULT_TERM1_SECS)]
    pub term1: u64,

    /// Finish window in seconds.
    #[arg(long, default_value_t = DEFAULT_TERM2_SECS)]
    pub term2: u64,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        NodeCli::command().debug_assert();
    }

    #[test]
    fn policy_flags_map_onto_policy() {
        let cli = NodeCli::parse_from([
            "edelivery-node",
            "run",
            "--min-deposit",
            "5",
            "--skip-response-check",
            "--lapsed-finish",
            "refund-sender",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let policy = args.policy.to_policy();
        assert_eq!(policy.min_deposit, 5);
        assert!(!policy.verify_response);
        assert_eq!(policy.lapsed_finish, LapseOutcome::RefundSender);
        assert_eq!(args.api_port, DEFAULT_API_PORT);
    }
}
