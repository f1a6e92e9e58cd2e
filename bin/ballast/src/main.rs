//! Ballast renter CLI: inspect and manage the host database.
//!
//! The network-facing collaborators (consensus, wallet, host RPC, gateway)
//! plug into the core through the `ballast-api` traits from the daemon that
//! embeds it; this binary covers the operator surface, which only needs the
//! journaled database.

use std::str::FromStr;

use ballast_api::{HostScoreBreakdown, HostSettings};
use ballast_hostdb::{HostDb, HostDbConfig};
use ballast_primitives::{Currency, HostPublicKey};
use clap::Parser;
use eyre::{WrapErr, eyre};
use semver::Version;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{Cli, Command};

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(cli.log.directive().parse()?),
        )
        .with_target(true)
        .init();

    let db = HostDb::open(
        &cli.data_dir,
        HostDbConfig::default(),
        cli.params(),
        cli.allowance.allowance(),
        cli.height,
    )
    .wrap_err_with(|| format!("opening host database in {}", cli.data_dir.display()))?;
    tracing::debug!(hosts = db.len(), height = cli.height, "database ready");

    match cli.command {
        Command::Hosts { active } => {
            let mut hosts = if active { db.active_hosts() } else { db.all_hosts() };
            hosts.sort_by_key(|e| std::cmp::Reverse(db.weight_of(&e.public_key)));
            println!("{} hosts", hosts.len());
            for entry in hosts {
                let weight = db
                    .weight_of(&entry.public_key)
                    .map(|w| w.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{}  {:<28} v{}  scans:{}  weight:{}",
                    entry.public_key,
                    entry.net_address,
                    entry.settings.version,
                    entry.scan_history.len(),
                    weight,
                );
            }
        }
        Command::Score { public_key } => {
            let key = parse_key(&public_key)?;
            let breakdown = db.score_breakdown(&key)?;
            print_breakdown(&breakdown);
        }
        Command::Estimate {
            storage_price,
            collateral,
            max_collateral,
            contract_price,
            remaining_storage,
            version,
        } => {
            let settings = HostSettings {
                storage_price: Currency::from_base(storage_price),
                collateral: Currency::from_base(collateral),
                max_collateral: Currency::from_coins(max_collateral),
                contract_price: Currency::from_base(contract_price),
                remaining_storage,
                total_storage: remaining_storage,
                version: Version::parse(&version).wrap_err("parsing --version")?,
                accepting_contracts: true,
                ..Default::default()
            };
            let breakdown = db.estimate_host_score(settings, None);
            print_breakdown(&breakdown);
        }
        Command::Remove { public_key } => {
            let key = parse_key(&public_key)?;
            if db.remove_host(&key)? {
                db.flush()?;
                println!("removed {key}");
            } else {
                return Err(eyre!("unknown host {key}"));
            }
        }
    }

    Ok(())
}

fn parse_key(s: &str) -> eyre::Result<HostPublicKey> {
    HostPublicKey::from_str(s.trim_start_matches("0x"))
        .map_err(|e| eyre!("invalid host public key: {e}"))
}

fn print_breakdown(b: &HostScoreBreakdown) {
    println!("score:             {}", b.score);
    println!("conversion rate:   {:.2}%", b.conversion_rate);
    println!("  age:             {:.6}", b.age_adjustment);
    println!("  collateral:      {:.6}", b.collateral_adjustment);
    println!("  interactions:    {:.6}", b.interaction_adjustment);
    println!("  price:           {:.6}", b.price_adjustment);
    println!("  storage left:    {:.6}", b.storage_remaining_adjustment);
    println!("  uptime:          {:.6}", b.uptime_adjustment);
    println!("  version:         {:.6}", b.version_adjustment);
}
