//! cv-chain: read/append access to hash-linked channels
//!
//! # Overview
//! - `cache`: the local hash → block store ([`Cache`]) and its in-memory implementation
//! - `disk`: a sharded on-disk [`Cache`] with size-bounded eviction
//! - `network`: the remote peer boundary ([`Network`]) and admission callbacks
//! - `ledger`: a [`Network`] that stores blocks in any [`Cache`] and admits records locally
//! - `channel`: head lookup and lazy newest → genesis traversal with one-shot network fill

pub mod cache;
pub mod channel;
pub mod disk;
pub mod ledger;
pub mod network;

pub use cache::{Cache, MemoryCache};
pub use channel::{ChainWalk, ChannelResolver, Freshness};
pub use disk::DiskCache;
pub use ledger::LocalLedger;
pub use network::{AdmissionListener, Network, OfflineNetwork, Submission};
