//! Host catalogue, scoring, and weighted selection.
//!
//! This crate is the renter's memory of the host network:
//!
//! - [`HostEntry`] - advertised settings plus observed scan and interaction
//!   history, one per known host public key
//! - [`weight`] - the pure seven-factor scoring function and its published
//!   design constants
//! - [`HostTree`] - weighted tree supporting O(log n) proportional sampling
//!   with key, subnet, and predicate exclusions
//! - [`Scanner`] - background probing with bounded concurrency and backoff
//! - [`Journal`] - append-only persistence with snapshot + replay
//! - [`HostDb`] - the coordinator owning the tree and journal, exposing the
//!   query and mutation API everything else goes through

mod config;
mod entry;
mod error;
mod hostdb;
mod journal;
mod scanner;
mod subnet;
mod tree;
pub mod weight;

pub use config::HostDbConfig;
pub use entry::{HostEntry, ScanRecord};
pub use error::HostDbError;
pub use hostdb::HostDb;
pub use journal::{Journal, JournalRecord};
pub use scanner::Scanner;
pub use subnet::HostSubnet;
pub use tree::{HostTree, SelectParams};
pub use weight::{Usage, WeightContext};
