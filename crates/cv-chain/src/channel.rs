//! Channel head lookup and backward traversal.
//!
//! A channel is a singly-linked list of blocks traversed head → genesis. The
//! walk is lazy: each step is a cache lookup, and a block missing from the
//! cache costs at most one network fetch before the chain is treated as
//! truncated at that point.

use std::collections::HashSet;
use std::iter::FusedIterator;
use std::sync::Arc;

use cv_core::{Block, ChainVaultResult, Hash, Reference};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::network::Network;

/// Where a head lookup is answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Cache first, network only on a miss
    Cached,
    /// Ask the network, fall back to the cache if it is unreachable
    Refresh,
}

#[derive(Clone)]
pub struct ChannelResolver {
    cache: Arc<dyn Cache>,
    network: Arc<dyn Network>,
}

impl ChannelResolver {
    pub fn new(cache: Arc<dyn Cache>, network: Arc<dyn Network>) -> Self {
        Self { cache, network }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Current head block hash of `channel`; network results are persisted to the cache.
    pub fn head(&self, channel: &str, freshness: Freshness) -> ChainVaultResult<Option<Hash>> {
        if freshness == Freshness::Cached {
            if let Some(head) = self.cache.get_head(channel)? {
                return Ok(Some(head));
            }
        }

        match self.network.get_head(channel) {
            Ok(Some(reference)) => {
                self.cache.set_head(channel, &reference.hash)?;
                Ok(Some(reference.hash))
            }
            Ok(None) => self.cache.get_head(channel),
            Err(e) if freshness == Freshness::Refresh => {
                let cached = self.cache.get_head(channel)?;
                if cached.is_none() {
                    return Err(e);
                }
                warn!(channel, error = %e, "head refresh failed, using cached head");
                Ok(cached)
            }
            Err(e) => Err(e),
        }
    }

    /// Load one block: cache first, then exactly one network fetch.
    ///
    /// Never fails; an unreachable or corrupt block is reported as absent.
    pub fn block(&self, channel: &str, hash: &Hash) -> Option<Block> {
        match self.cache.get_block(hash) {
            Ok(Some(block)) => return Some(block),
            Ok(None) => {}
            Err(e) => warn!(hash = %hash.short(), error = %e, "cache read failed"),
        }

        let fetched = match self
            .network
            .get_block(&Reference::new(channel, hash.clone(), 0))
        {
            Ok(Some(block)) => block,
            Ok(None) => {
                debug!(channel, hash = %hash.short(), "block unavailable from network");
                return None;
            }
            Err(e) => {
                warn!(channel, hash = %hash.short(), error = %e, "block fetch failed");
                return None;
            }
        };

        if &fetched.hash != hash || !fetched.verify() {
            warn!(channel, hash = %hash.short(), "network returned a block that does not match its hash");
            return None;
        }

        if let Err(e) = self.cache.put_block(&fetched) {
            warn!(hash = %hash.short(), error = %e, "caching fetched block failed");
        }
        Some(fetched)
    }

    /// Walk `channel` backwards starting at `start`.
    pub fn walk(&self, channel: &str, start: Hash) -> ChainWalk<'_> {
        ChainWalk {
            resolver: self,
            channel: channel.to_string(),
            next: Some(start),
            seen: HashSet::new(),
        }
    }
}

/// Lazy, finite, forward-only sequence of blocks from a start block to genesis.
///
/// Ends at genesis, at the first block that cannot be loaded, or if a block
/// links back to one already visited.
pub struct ChainWalk<'a> {
    resolver: &'a ChannelResolver,
    channel: String,
    next: Option<Hash>,
    seen: HashSet<Hash>,
}

impl Iterator for ChainWalk<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let hash = self.next.take()?;
        if !self.seen.insert(hash.clone()) {
            warn!(channel = %self.channel, hash = %hash.short(), "chain links back on itself");
            return None;
        }

        let Some(block) = self.resolver.block(&self.channel, &hash) else {
            warn!(channel = %self.channel, hash = %hash.short(), "chain truncated");
            return None;
        };
        if block.channel != self.channel {
            warn!(
                channel = %self.channel,
                found = %block.channel,
                hash = %hash.short(),
                "block belongs to another channel"
            );
            return None;
        }

        self.next = block.previous.clone();
        Some(block)
    }
}

impl FusedIterator for ChainWalk<'_> {}
