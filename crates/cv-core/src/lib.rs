//! cv-core: shared types for the chainvault ledger client
//!
//! - `types`: the on-chain envelope (Block, BlockEntry, Record, AccessEntry, Reference)
//! - `content`: decoded record kinds (Meta, Share, Tag) carried inside encrypted payloads
//! - `error`: the error taxonomy shared by every crate in the workspace
//! - `config`: TOML configuration schema

pub mod config;
pub mod content;
pub mod error;
pub mod types;

pub use content::{Content, Meta, Share, Tag};
pub use error::{ChainVaultError, ChainVaultResult};
pub use types::{AccessEntry, Block, BlockEntry, Hash, Record, RecordKind, Reference};

/// Channel holding the shares addressed to `identity`.
pub fn shares_channel(identity: &str) -> String {
    format!("shares/{identity}")
}

/// Channel holding the tags authored by `identity`.
pub fn tags_channel(identity: &str) -> String {
    format!("tags/{identity}")
}

/// Default channel holding the files published by `identity`.
pub fn files_channel(identity: &str) -> String {
    format!("files/{identity}")
}
