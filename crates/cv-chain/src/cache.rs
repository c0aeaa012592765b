//! Local block cache.
//!
//! Blocks are immutable and content-addressed, so concurrent writers racing
//! to insert the same hash store identical bytes and the second write is a
//! no-op in effect.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use cv_core::{Block, ChainVaultError, ChainVaultResult, Hash};

/// Hash → block store shared by every resolution on a device.
pub trait Cache: Send + Sync {
    fn get_block(&self, hash: &Hash) -> ChainVaultResult<Option<Block>>;

    /// Store a block under its own hash and index the records it carries.
    fn put_block(&self, block: &Block) -> ChainVaultResult<()>;

    /// The cached block of `channel` that carries `record_hash`, if indexed.
    fn get_block_containing_record(
        &self,
        channel: &str,
        record_hash: &Hash,
    ) -> ChainVaultResult<Option<Block>>;

    fn get_head(&self, channel: &str) -> ChainVaultResult<Option<Hash>>;

    fn set_head(&self, channel: &str, head: &Hash) -> ChainVaultResult<()>;
}

#[derive(Default)]
struct Inner {
    blocks: HashMap<Hash, Block>,
    heads: HashMap<String, Hash>,
    /// (channel, record hash) → block hash
    records: HashMap<(String, Hash), Hash>,
}

/// Thread-safe in-process cache.
#[derive(Default)]
pub struct MemoryCache {
    inner: RwLock<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> ChainVaultResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| ChainVaultError::Cache("memory cache lock poisoned".into()))
    }

    fn write(&self) -> ChainVaultResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| ChainVaultError::Cache("memory cache lock poisoned".into()))
    }

    /// Drop a block (as an external eviction policy would). Heads are kept.
    pub fn evict(&self, hash: &Hash) -> ChainVaultResult<bool> {
        let mut inner = self.write()?;
        let removed = inner.blocks.remove(hash).is_some();
        inner.records.retain(|_, block_hash| block_hash != hash);
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.read().map(|i| i.blocks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get_block(&self, hash: &Hash) -> ChainVaultResult<Option<Block>> {
        Ok(self.read()?.blocks.get(hash).cloned())
    }

    fn put_block(&self, block: &Block) -> ChainVaultResult<()> {
        let mut inner = self.write()?;
        for entry in &block.entries {
            inner.records.insert(
                (block.channel.clone(), entry.record_hash.clone()),
                block.hash.clone(),
            );
        }
        inner.blocks.insert(block.hash.clone(), block.clone());
        Ok(())
    }

    fn get_block_containing_record(
        &self,
        channel: &str,
        record_hash: &Hash,
    ) -> ChainVaultResult<Option<Block>> {
        let inner = self.read()?;
        let block = inner
            .records
            .get(&(channel.to_string(), record_hash.clone()))
            .and_then(|block_hash| inner.blocks.get(block_hash))
            .cloned();
        Ok(block)
    }

    fn get_head(&self, channel: &str) -> ChainVaultResult<Option<Hash>> {
        Ok(self.read()?.heads.get(channel).cloned())
    }

    fn set_head(&self, channel: &str, head: &Hash) -> ChainVaultResult<()> {
        self.write()?.heads.insert(channel.to_string(), head.clone());
        Ok(())
    }
}
