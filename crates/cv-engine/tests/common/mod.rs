//! Shared fixtures: fixed key pairs, one in-process ledger, one cache per device.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, RwLock};

use cv_chain::{
    AdmissionListener, Cache, ChannelResolver, LocalLedger, MemoryCache, Network, Submission,
};
use cv_core::config::ChainVaultConfig;
use cv_core::{AccessEntry, Block, ChainVaultResult, Hash, Record, RecordKind, Reference};
use cv_crypto::{encrypt, generate_content_key, wrap_key, KeyPair, PublicKey};
use cv_engine::{Admission, PublishRequest, Session, Vault};

fn keys() -> &'static [KeyPair; 3] {
    static KEYS: OnceLock<[KeyPair; 3]> = OnceLock::new();
    KEYS.get_or_init(|| {
        let gen = || KeyPair::generate_with_bits(1024).expect("keygen");
        [gen(), gen(), gen()]
    })
}

pub fn alice() -> Session {
    Session::new(keys()[0].clone())
}

pub fn bob() -> Session {
    Session::new(keys()[1].clone())
}

pub fn carol() -> Session {
    Session::new(keys()[2].clone())
}

pub fn config() -> ChainVaultConfig {
    let mut config = ChainVaultConfig::default();
    config.admission.retry_delay_ms = 0;
    config.chunking.min_size = 256;
    config.chunking.avg_size = 1024;
    config.chunking.max_size = 4096;
    config
}

/// A ledger whose blocks can be made unreachable, as after pruning.
pub struct Ledger {
    inner: LocalLedger,
    hidden: RwLock<HashSet<Hash>>,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: LocalLedger::new(Arc::new(MemoryCache::new())),
            hidden: RwLock::new(HashSet::new()),
        })
    }

    pub fn hide(&self, block: &Hash) {
        self.hidden.write().unwrap().insert(block.clone());
    }

    pub fn store(&self) -> &Arc<dyn Cache> {
        self.inner.store()
    }
}

impl Network for Ledger {
    fn get_block(&self, reference: &Reference) -> ChainVaultResult<Option<Block>> {
        if self.hidden.read().unwrap().contains(&reference.hash) {
            return Ok(None);
        }
        self.inner.get_block(reference)
    }

    fn get_head(&self, channel: &str) -> ChainVaultResult<Option<Reference>> {
        self.inner.get_head(channel)
    }

    fn post_record(
        &self,
        submission: &Submission,
        listener: &mut dyn AdmissionListener,
    ) -> ChainVaultResult<()> {
        self.inner.post_record(submission, listener)
    }
}

/// One device: its own cache, talking to the shared ledger.
pub struct Device {
    pub vault: Vault,
    pub cache: Arc<MemoryCache>,
}

pub fn device(ledger: &Arc<Ledger>) -> Device {
    let cache = Arc::new(MemoryCache::new());
    let vault = Vault::new(cache.clone(), ledger.clone(), &config());
    Device { vault, cache }
}

impl Device {
    pub fn admission(&self) -> Admission {
        Admission::new(self.vault.resolver.channels(), "local", &config().admission)
    }

    pub fn channels(&self) -> &ChannelResolver {
        self.vault.resolver.channels()
    }

    /// Publish `parts` as the chunks of one file in the session's files channel.
    pub fn publish_parts(&self, session: &Session, name: &str, parts: &[&str]) -> Reference {
        let data = parts.concat().into_bytes();
        let chunks: Vec<&[u8]> = parts.iter().map(|p| p.as_bytes()).collect();
        self.vault
            .publisher
            .publish_chunks(
                session,
                &session.files_channel(),
                PublishRequest {
                    name,
                    mime_type: "text/plain",
                    data: &data,
                    preview: None,
                },
                &chunks,
            )
            .expect("publish")
    }
}

/// Build a record by hand, bypassing the engine's own sealing.
pub fn hand_sealed(
    kind: RecordKind,
    plaintext: &[u8],
    readers: &[&PublicKey],
    references: Vec<Reference>,
) -> Record {
    let key = generate_content_key();
    Record {
        timestamp: 1,
        kind,
        access: readers
            .iter()
            .map(|r| AccessEntry {
                reader: r.identity().to_string(),
                wrapped_key: wrap_key(r, &key).unwrap(),
            })
            .collect(),
        references,
        payload: encrypt(&key, plaintext).unwrap(),
    }
}
