//! Boundary with remote peers and the admission (mining) endpoint.

use cv_core::{Block, ChainVaultError, ChainVaultResult, Hash, Record, RecordKind, Reference};

/// A record handed to the admission endpoint.
#[derive(Debug, Clone)]
pub struct Submission {
    pub endpoint: String,
    /// Channel the record should be appended to
    pub channel: String,
    pub kind: RecordKind,
    pub record: Record,
    /// Number of admitted copies the caller expects references for
    pub expected_results: usize,
}

/// Receives admission results for one submission.
///
/// A successful admission reports zero or more references (one per admitted
/// copy) followed by exactly one block.
pub trait AdmissionListener {
    fn on_reference(&mut self, reference: Reference);
    fn on_block(&mut self, hash: Hash, block: Block);
}

/// Remote peers. Implementations perform blocking I/O.
pub trait Network: Send + Sync {
    /// Fetch the block `reference.hash` of channel `reference.channel`.
    fn get_block(&self, reference: &Reference) -> ChainVaultResult<Option<Block>>;

    /// Current head block of `channel`, if the channel exists.
    fn get_head(&self, channel: &str) -> ChainVaultResult<Option<Reference>>;

    /// Submit a record for admission. Retrying is the caller's job.
    fn post_record(
        &self,
        submission: &Submission,
        listener: &mut dyn AdmissionListener,
    ) -> ChainVaultResult<()>;
}

/// A network with no reachable peers: every fetch misses, every post fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineNetwork;

impl Network for OfflineNetwork {
    fn get_block(&self, _reference: &Reference) -> ChainVaultResult<Option<Block>> {
        Ok(None)
    }

    fn get_head(&self, _channel: &str) -> ChainVaultResult<Option<Reference>> {
        Ok(None)
    }

    fn post_record(
        &self,
        submission: &Submission,
        _listener: &mut dyn AdmissionListener,
    ) -> ChainVaultResult<()> {
        Err(ChainVaultError::Transport(format!(
            "offline: cannot reach admission endpoint '{}'",
            submission.endpoint
        )))
    }
}
