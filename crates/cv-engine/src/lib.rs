//! cv-engine: resolve, reassemble, publish, share and tag records on a chainvault ledger
//!
//! Every call takes an explicit [`Session`] (the active key pair). All
//! operations block the calling thread; independent chunk work fans out
//! over rayon.

pub mod admission;
pub mod content;
pub mod publish;
pub mod resolver;
mod seal;
pub mod session;
pub mod share;
pub mod tag;

use std::sync::Arc;

use cv_chain::{Cache, ChannelResolver, Network};
use cv_core::config::ChainVaultConfig;

pub use admission::{Admission, Admitted};
pub use content::{CancelToken, ContentReader, File, OpenedShare};
pub use publish::{chunk_data, PublishRequest, Publisher};
pub use resolver::{Authorization, Located, RecordResolver, Resolved, VisibleRecords};
pub use session::Session;
pub use share::{ShareReceipt, SharingEngine};
pub use tag::{TagReceipt, Tagger};

/// All engine components wired over one cache and one network.
#[derive(Clone)]
pub struct Vault {
    pub resolver: RecordResolver,
    pub reader: ContentReader,
    pub publisher: Publisher,
    pub sharing: SharingEngine,
    pub tagger: Tagger,
}

impl Vault {
    pub fn new(cache: Arc<dyn Cache>, network: Arc<dyn Network>, config: &ChainVaultConfig) -> Self {
        let channels = ChannelResolver::new(cache, network);
        let admission = Admission::new(&channels, config.ledger.endpoint.clone(), &config.admission);
        let resolver = RecordResolver::new(channels);
        Self {
            reader: ContentReader::new(resolver.clone()),
            publisher: Publisher::new(admission.clone(), config.chunking.clone()),
            sharing: SharingEngine::new(resolver.clone(), admission.clone()),
            tagger: Tagger::new(resolver.clone(), admission),
            resolver,
        }
    }
}
