//! Command line interface.

use std::path::PathBuf;

use ballast_api::Allowance;
use ballast_primitives::{Currency, Network, NetworkParams};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// CLI argument for network selection. Maps to [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NetworkArg {
    /// Production parameters.
    #[default]
    Standard,
    /// Local development parameters.
    Dev,
    /// Unit-test parameters.
    Testing,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Standard => Network::Standard,
            NetworkArg::Dev => Network::Dev,
            NetworkArg::Testing => Network::Testing,
        }
    }
}

/// Logging verbosity.
#[derive(Debug, Args, Clone)]
pub struct LogArgs {
    /// Increase verbosity (-v warn, -vv info, -vvv debug, -vvvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Only log errors.
    #[arg(long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl LogArgs {
    /// The tracing filter directive for these flags.
    pub fn directive(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbosity {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    }
}

/// Allowance fields that influence scoring; zero fields take defaults.
#[derive(Debug, Args, Clone)]
pub struct AllowanceArgs {
    /// Allowance funds, in whole coins.
    #[arg(long, default_value_t = 500)]
    pub funds: u64,

    /// Target number of hosts under contract.
    #[arg(long, default_value_t = 50)]
    pub hosts: u64,

    /// Contract period in blocks.
    #[arg(long, default_value_t = 12_096)]
    pub period: u64,

    /// Renew window in blocks (0: half the period).
    #[arg(long, default_value_t = 0)]
    pub renew_window: u64,
}

impl AllowanceArgs {
    /// Build the allowance these flags describe.
    pub fn allowance(&self) -> Allowance {
        Allowance {
            funds: Currency::from_coins(self.funds),
            hosts: self.hosts,
            period: self.period,
            renew_window: self.renew_window,
            ..Allowance::default()
        }
        .with_defaults()
    }
}

/// Inspect and manage the renter's host database.
#[derive(Debug, Parser)]
#[command(name = "ballast", version, about)]
pub struct Cli {
    /// Database directory.
    #[arg(long, default_value = "./ballast-data", global = true)]
    pub data_dir: PathBuf,

    /// Network parameter profile.
    #[arg(long, value_enum, default_value_t = NetworkArg::Standard, global = true)]
    pub network: NetworkArg,

    /// Block height to evaluate age factors at.
    #[arg(long, default_value_t = 0, global = true)]
    pub height: u64,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(flatten)]
    pub allowance: AllowanceArgs,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Network parameters for the selected profile.
    pub fn params(&self) -> NetworkParams {
        NetworkParams::for_network(self.network.into())
    }
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List known hosts with their scores.
    Hosts {
        /// Only hosts that are accepting contracts and answering probes.
        #[arg(long)]
        active: bool,
    },
    /// Show the score breakdown of one host.
    Score {
        /// Host public key, hex.
        public_key: String,
    },
    /// Estimate the score a host would earn with the given settings.
    Estimate {
        /// Storage price per byte per block, base units.
        #[arg(long, default_value_t = 0)]
        storage_price: u64,
        /// Collateral per byte per block, base units.
        #[arg(long, default_value_t = 0)]
        collateral: u64,
        /// Maximum collateral per contract, whole coins.
        #[arg(long, default_value_t = 1_000)]
        max_collateral: u64,
        /// Flat contract price, base units.
        #[arg(long, default_value_t = 0)]
        contract_price: u64,
        /// Remaining storage, bytes.
        #[arg(long, default_value_t = 20_000_000_000_000)]
        remaining_storage: u64,
        /// Advertised protocol version.
        #[arg(long, default_value = "0.4.0")]
        version: String,
    },
    /// Remove a host from the database.
    Remove {
        /// Host public key, hex.
        public_key: String,
    },
}
