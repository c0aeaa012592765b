//! On-disk block cache.
//!
//! Blocks are stored as JSON keyed by block hash. Files are written
//! atomically (temp → rename) and the oldest blocks are evicted when the
//! block directory exceeds `max_bytes`.
//!
//! Layout:
//! ```text
//! {dir}/blocks/{hash[0..2]}/{hash}.json
//! {dir}/heads/{channel}
//! {dir}/records/{channel}/{record_hash}     (contains the block hash)
//! ```
//! Channel names are percent-escaped into a single path component.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use cv_core::{Block, ChainVaultError, ChainVaultResult, Hash};
use tracing::{debug, warn};

use crate::cache::Cache;

pub struct DiskCache {
    dir: PathBuf,
    max_bytes: u64,
    tmp_counter: AtomicU64,
}

impl DiskCache {
    /// Open (creating if needed) a cache rooted at `dir` with the given capacity.
    pub fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> ChainVaultResult<Self> {
        let dir = dir.into();
        for sub in ["blocks", "heads", "records"] {
            fs::create_dir_all(dir.join(sub)).map_err(|e| {
                ChainVaultError::Cache(format!("creating cache dir {}: {e}", dir.display()))
            })?;
        }
        Ok(DiskCache {
            dir,
            max_bytes,
            tmp_counter: AtomicU64::new(0),
        })
    }

    fn block_path(&self, hash: &Hash) -> PathBuf {
        let key = hash.as_str();
        self.dir
            .join("blocks")
            .join(&key[..2])
            .join(format!("{key}.json"))
    }

    fn head_path(&self, channel: &str) -> PathBuf {
        self.dir.join("heads").join(escape_channel(channel))
    }

    fn record_path(&self, channel: &str, record_hash: &Hash) -> PathBuf {
        self.dir
            .join("records")
            .join(escape_channel(channel))
            .join(record_hash.as_str())
    }

    /// Atomic write with a per-writer temp name so racing writers never share a file.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> ChainVaultResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ChainVaultError::Cache(format!("creating cache dir {}: {e}", parent.display()))
            })?;
        }
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{n}", std::process::id()));
        fs::write(&tmp, data)
            .map_err(|e| ChainVaultError::Cache(format!("writing {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| ChainVaultError::Cache(format!("renaming {}: {e}", path.display())))
    }

    fn read_optional(path: &Path) -> ChainVaultResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChainVaultError::Cache(format!(
                "reading {}: {e}",
                path.display()
            ))),
        }
    }

    /// Evict the oldest block files until the block directory fits `max_bytes`.
    ///
    /// An unbounded cache (`u64::MAX`) never scans.
    fn evict_if_needed(&self) -> ChainVaultResult<()> {
        if self.max_bytes == u64::MAX {
            return Ok(());
        }

        let mut entries: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
        let mut total: u64 = 0;

        for shard in fs::read_dir(self.dir.join("blocks"))? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let meta = entry.metadata()?;
                if meta.is_file() && entry.file_name().to_string_lossy().ends_with(".json") {
                    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    total += meta.len();
                    entries.push((entry.path(), meta.len(), mtime));
                }
            }
        }

        if total <= self.max_bytes {
            return Ok(());
        }

        entries.sort_by_key(|(_, _, mtime)| *mtime);
        for (path, size, _) in entries {
            if total <= self.max_bytes {
                break;
            }
            debug!(path = %path.display(), "evicting cached block");
            self.remove_block_file(&path);
            total = total.saturating_sub(size);
        }

        Ok(())
    }

    /// Remove a block file together with the record index entries pointing at it.
    fn remove_block_file(&self, path: &Path) {
        let indexed = fs::read(path)
            .ok()
            .and_then(|data| serde_json::from_slice::<Block>(&data).ok());
        if let Some(block) = indexed {
            for entry in &block.entries {
                let index = self.record_path(&block.channel, &entry.record_hash);
                // only drop entries that still name this block
                let points_here = Self::read_optional(&index)
                    .ok()
                    .flatten()
                    .is_some_and(|data| {
                        String::from_utf8_lossy(&data).trim() == block.hash.as_str()
                    });
                if points_here {
                    let _ = fs::remove_file(&index);
                }
            }
        }
        let _ = fs::remove_file(path);
    }
}

impl Cache for DiskCache {
    fn get_block(&self, hash: &Hash) -> ChainVaultResult<Option<Block>> {
        let Some(data) = Self::read_optional(&self.block_path(hash))? else {
            return Ok(None);
        };
        match serde_json::from_slice::<Block>(&data) {
            Ok(block) if &block.hash == hash => Ok(Some(block)),
            Ok(_) | Err(_) => {
                warn!(hash = %hash.short(), "discarding unreadable cached block");
                Ok(None)
            }
        }
    }

    fn put_block(&self, block: &Block) -> ChainVaultResult<()> {
        let data = serde_json::to_vec(block)?;
        self.write_atomic(&self.block_path(&block.hash), &data)?;
        for entry in &block.entries {
            self.write_atomic(
                &self.record_path(&block.channel, &entry.record_hash),
                block.hash.as_str().as_bytes(),
            )?;
        }

        // Best-effort eviction; failure is non-fatal
        if let Err(e) = self.evict_if_needed() {
            warn!(error = %e, "cache eviction failed");
        }
        Ok(())
    }

    fn get_block_containing_record(
        &self,
        channel: &str,
        record_hash: &Hash,
    ) -> ChainVaultResult<Option<Block>> {
        let Some(data) = Self::read_optional(&self.record_path(channel, record_hash))? else {
            return Ok(None);
        };
        let block_hash = String::from_utf8_lossy(&data);
        match Hash::from_hex(block_hash.trim()) {
            Ok(h) => self.get_block(&h),
            Err(_) => Ok(None),
        }
    }

    fn get_head(&self, channel: &str) -> ChainVaultResult<Option<Hash>> {
        let Some(data) = Self::read_optional(&self.head_path(channel))? else {
            return Ok(None);
        };
        Hash::from_hex(String::from_utf8_lossy(&data).trim()).map(Some)
    }

    fn set_head(&self, channel: &str, head: &Hash) -> ChainVaultResult<()> {
        self.write_atomic(&self.head_path(channel), head.as_str().as_bytes())
    }
}

/// Percent-escape everything outside `[A-Za-z0-9._-]`.
fn escape_channel(channel: &str) -> String {
    let mut out = String::with_capacity(channel.len());
    for b in channel.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    // "." and ".." are valid path components with special meaning
    if out.chars().all(|c| c == '.') {
        out = out.replace('.', "%2E");
    }
    out
}
