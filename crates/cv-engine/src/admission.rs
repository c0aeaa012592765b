//! Record submission with a bounded retry loop.
//!
//! Each record gets its own sequential loop of at most `max_attempts` posts.
//! Independent records (e.g. the chunks of one file) are submitted in
//! parallel, each with its own loop; results come back in input order.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cv_chain::{AdmissionListener, Cache, ChannelResolver, Network, Submission};
use cv_core::config::AdmissionConfig;
use cv_core::{Block, ChainVaultError, ChainVaultResult, Hash, Record, RecordKind, Reference};
use rayon::prelude::*;
use tracing::{debug, warn};

/// Outcome of one successful admission; always carries at least one reference.
#[derive(Debug, Clone)]
pub struct Admitted {
    first: Reference,
    copies: Vec<Reference>,
    block: Block,
}

impl Admitted {
    /// Reference to the first admitted copy.
    pub fn reference(&self) -> Reference {
        self.first.clone()
    }

    /// One reference per admitted copy, in the order they were reported.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        std::iter::once(&self.first).chain(&self.copies)
    }

    pub fn block(&self) -> &Block {
        &self.block
    }
}

#[derive(Default)]
struct Collector {
    references: Vec<Reference>,
    blocks: Vec<(Hash, Block)>,
}

impl AdmissionListener for Collector {
    fn on_reference(&mut self, reference: Reference) {
        self.references.push(reference);
    }

    fn on_block(&mut self, hash: Hash, block: Block) {
        self.blocks.push((hash, block));
    }
}

#[derive(Clone)]
pub struct Admission {
    network: Arc<dyn Network>,
    cache: Arc<dyn Cache>,
    endpoint: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Admission {
    pub fn new(channels: &ChannelResolver, endpoint: impl Into<String>, config: &AdmissionConfig) -> Self {
        Self {
            network: Arc::clone(channels.network()),
            cache: Arc::clone(channels.cache()),
            endpoint: endpoint.into(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Submit one record to `channel`, retrying up to the configured bound.
    pub fn submit(&self, channel: &str, record: Record) -> ChainVaultResult<Admitted> {
        if !record.has_unique_readers() {
            return Err(ChainVaultError::Codec(
                "record lists the same reader more than once".into(),
            ));
        }

        let kind = record.kind;
        let submission = Submission {
            endpoint: self.endpoint.clone(),
            channel: channel.to_string(),
            kind,
            record,
            expected_results: 1,
        };

        let mut last = String::new();
        for attempt in 1..=self.max_attempts {
            match self.post_once(&submission) {
                Ok(admitted) => {
                    debug!(channel, %kind, attempt, block = %admitted.block().hash.short(), "admitted");
                    return Ok(admitted);
                }
                Err(e) => {
                    warn!(channel, %kind, attempt, max = self.max_attempts, error = %e, "admission attempt failed");
                    last = e.to_string();
                    if attempt < self.max_attempts && !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        Err(ChainVaultError::Admission {
            kind: kind.to_string(),
            attempts: self.max_attempts,
            last,
        })
    }

    /// Submit independent records concurrently; results keep input order.
    pub fn submit_all(
        &self,
        channel: &str,
        records: Vec<Record>,
    ) -> ChainVaultResult<Vec<Admitted>> {
        records
            .into_par_iter()
            .map(|record| self.submit(channel, record))
            .collect()
    }

    fn post_once(&self, submission: &Submission) -> ChainVaultResult<Admitted> {
        let mut collector = Collector::default();
        self.network.post_record(submission, &mut collector)?;

        let (hash, block) = match collector.blocks.len() {
            1 => collector.blocks.remove(0),
            n => {
                return Err(ChainVaultError::Transport(format!(
                    "admission reported {n} blocks, expected exactly one"
                )))
            }
        };
        let mut references = collector.references.into_iter();
        let Some(first) = references.next() else {
            return Err(ChainVaultError::Transport(
                "admission reported no references".into(),
            ));
        };
        if hash != block.hash {
            return Err(ChainVaultError::Transport(
                "admitted block hash does not match its content".into(),
            ));
        }

        self.remember(&block);
        Ok(Admitted {
            first,
            copies: references.collect(),
            block,
        })
    }

    /// Cache the admitted block; advance the cached head only if it extends it.
    fn remember(&self, block: &Block) {
        if let Err(e) = self.cache.put_block(block) {
            warn!(block = %block.hash.short(), error = %e, "caching admitted block failed");
            return;
        }
        let extends_head = match self.cache.get_head(&block.channel) {
            Ok(current) => current.is_none() || current == block.previous,
            Err(_) => false,
        };
        if extends_head {
            if let Err(e) = self.cache.set_head(&block.channel, &block.hash) {
                warn!(channel = %block.channel, error = %e, "updating cached head failed");
            }
        }
    }
}
