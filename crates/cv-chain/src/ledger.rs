//! A ledger peer that lives in-process.
//!
//! Stores its chain in any [`Cache`] and admits each submitted record as a
//! new single-entry block on top of the channel head. No proof-of-work is
//! performed. Used as the admission peer by the CLI (backed by a
//! [`DiskCache`](crate::DiskCache)) and by tests (backed by a
//! [`MemoryCache`](crate::MemoryCache)).

use std::sync::{Arc, Mutex};

use cv_core::{Block, BlockEntry, ChainVaultError, ChainVaultResult, Reference};
use tracing::info;

use crate::cache::Cache;
use crate::network::{AdmissionListener, Network, Submission};

pub struct LocalLedger {
    store: Arc<dyn Cache>,
    /// Serializes appends so two admissions never build on the same head
    append: Mutex<()>,
}

impl LocalLedger {
    pub fn new(store: Arc<dyn Cache>) -> Self {
        Self {
            store,
            append: Mutex::new(()),
        }
    }

    /// The ledger's own block store.
    pub fn store(&self) -> &Arc<dyn Cache> {
        &self.store
    }
}

impl Network for LocalLedger {
    fn get_block(&self, reference: &Reference) -> ChainVaultResult<Option<Block>> {
        Ok(self
            .store
            .get_block(&reference.hash)?
            .filter(|b| b.channel == reference.channel))
    }

    fn get_head(&self, channel: &str) -> ChainVaultResult<Option<Reference>> {
        Ok(self
            .store
            .get_head(channel)?
            .map(|hash| Reference::new(channel, hash, 0)))
    }

    fn post_record(
        &self,
        submission: &Submission,
        listener: &mut dyn AdmissionListener,
    ) -> ChainVaultResult<()> {
        let _guard = self
            .append
            .lock()
            .map_err(|_| ChainVaultError::Transport("ledger append lock poisoned".into()))?;

        let channel = submission.channel.as_str();
        let entry = BlockEntry::new(submission.record.clone())?;
        let record_hash = entry.record_hash.clone();
        let previous = self.store.get_head(channel)?;
        let block = Block::seal(previous, channel, vec![entry])?;

        self.store.put_block(&block)?;
        self.store.set_head(channel, &block.hash)?;

        info!(
            channel,
            kind = %submission.kind,
            record = %record_hash.short(),
            block = %block.hash.short(),
            "record admitted"
        );

        for _ in 0..submission.expected_results.max(1) {
            listener.on_reference(Reference::new(
                channel,
                record_hash.clone(),
                submission.record.timestamp,
            ));
        }
        listener.on_block(block.hash.clone(), block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::record;
    use crate::cache::MemoryCache;
    use cv_core::{Hash, RecordKind};

    #[derive(Default)]
    struct Collect {
        references: Vec<Reference>,
        blocks: Vec<(Hash, Block)>,
    }

    impl AdmissionListener for Collect {
        fn on_reference(&mut self, reference: Reference) {
            self.references.push(reference);
        }
        fn on_block(&mut self, hash: Hash, block: Block) {
            self.blocks.push((hash, block));
        }
    }

    fn submit(ledger: &LocalLedger, channel: &str, payload: &[u8]) -> Collect {
        let mut out = Collect::default();
        ledger
            .post_record(
                &Submission {
                    endpoint: "local".into(),
                    channel: channel.into(),
                    kind: RecordKind::Chunk,
                    record: record(payload),
                    expected_results: 1,
                },
                &mut out,
            )
            .unwrap();
        out
    }

    #[test]
    fn admission_appends_on_head() {
        let ledger = LocalLedger::new(Arc::new(MemoryCache::new()));
        let first = submit(&ledger, "files/a", b"1");
        let second = submit(&ledger, "files/a", b"2");

        assert_eq!(first.references.len(), 1);
        assert_eq!(first.blocks.len(), 1);
        let (h1, b1) = &first.blocks[0];
        let (h2, b2) = &second.blocks[0];
        assert!(b1.is_genesis());
        assert_eq!(b2.previous.as_ref(), Some(h1));
        assert_eq!(ledger.get_head("files/a").unwrap().unwrap().hash, *h2);
    }

    #[test]
    fn get_block_checks_channel() {
        let ledger = LocalLedger::new(Arc::new(MemoryCache::new()));
        let out = submit(&ledger, "files/a", b"1");
        let hash = out.blocks[0].0.clone();

        assert!(ledger
            .get_block(&Reference::new("files/a", hash.clone(), 0))
            .unwrap()
            .is_some());
        assert!(ledger
            .get_block(&Reference::new("files/b", hash, 0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn channels_grow_independently() {
        let ledger = LocalLedger::new(Arc::new(MemoryCache::new()));
        submit(&ledger, "files/a", b"1");
        let other = submit(&ledger, "files/b", b"1");
        assert!(other.blocks[0].1.is_genesis());
    }
}
