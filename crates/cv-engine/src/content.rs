//! Logical file reassembly from a meta record and its chunk records.
//!
//! Chunks are resolved one by one in the order the meta lists them and their
//! plaintexts are concatenated. That order is the file's byte order.
//!
//! Shared files take the same path, except that every key comes from the
//! share capability instead of the records' own access lists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cv_core::{ChainVaultError, ChainVaultResult, Meta, RecordKind, Reference, Share};
use tracing::{debug, info};

use crate::resolver::{Authorization, RecordResolver, Resolved};
use crate::session::Session;

/// Cooperative cancellation, checked between chunk resolutions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A reassembled logical file.
#[derive(Debug, Clone)]
pub struct File {
    pub meta_reference: Reference,
    pub meta: Meta,
    pub bytes: Vec<u8>,
}

/// An opened share record.
#[derive(Debug, Clone)]
pub struct OpenedShare {
    pub record: Resolved,
    pub share: Share,
}

#[derive(Clone)]
pub struct ContentReader {
    resolver: RecordResolver,
}

impl ContentReader {
    pub fn new(resolver: RecordResolver) -> Self {
        Self { resolver }
    }

    /// Resolve a meta record and reassemble its file from the session's own access.
    pub fn read_file(
        &self,
        session: &Session,
        meta_ref: &Reference,
        cancel: Option<&CancelToken>,
    ) -> ChainVaultResult<File> {
        let record = self.resolver.resolve(session, meta_ref)?;
        record.expect_kind(RecordKind::Meta)?;
        let meta = record.meta()?;
        let (chunks, _) = meta.layout(&record.references)?;
        let keys = vec![None; chunks.len()];
        let bytes = self.assemble(session, chunks, &keys, cancel)?;
        finish(meta_ref.clone(), meta, bytes)
    }

    /// Resolve a share record from the session's share channel.
    pub fn open_share(
        &self,
        session: &Session,
        share_ref: &Reference,
    ) -> ChainVaultResult<OpenedShare> {
        let record = self.resolver.resolve(session, share_ref)?;
        record.expect_kind(RecordKind::Share)?;
        let share = record.share()?;
        Ok(OpenedShare { record, share })
    }

    /// Reassemble a file the session reaches only through a share capability.
    pub fn read_shared(
        &self,
        session: &Session,
        share_ref: &Reference,
        cancel: Option<&CancelToken>,
    ) -> ChainVaultResult<File> {
        let OpenedShare { share, .. } = self.open_share(session, share_ref)?;
        let (meta_record, meta) = self.shared_meta(session, &share)?;
        let (chunks, _) = meta.layout(&meta_record.references)?;
        let keys: Vec<Option<&[u8]>> = share.chunk_keys.iter().map(|k| Some(k.as_slice())).collect();
        let bytes = self.assemble(session, chunks, &keys, cancel)?;
        finish(share.meta_reference.clone(), meta, bytes)
    }

    /// Resolve the meta a share points at, checking the capability lines up with it.
    pub fn shared_meta(&self, session: &Session, share: &Share) -> ChainVaultResult<(Resolved, Meta)> {
        let record = self.resolver.resolve_with(
            session,
            &share.meta_reference,
            Authorization::Capability(&share.meta_key),
        )?;
        record.expect_kind(RecordKind::Meta)?;
        let meta = record.meta()?;
        let (chunks, preview) = meta.layout(&record.references)?;
        if chunks.len() != share.chunk_keys.len() {
            return Err(ChainVaultError::ShareMismatch {
                expected: chunks.len(),
                actual: share.chunk_keys.len(),
            });
        }
        let preview_matches = match (preview, &share.preview_reference) {
            (None, None) => share.preview_key.is_none(),
            (Some(own), Some(granted)) => {
                own.channel == granted.channel
                    && own.hash == granted.hash
                    && share.preview_key.is_some()
            }
            _ => false,
        };
        if !preview_matches {
            return Err(ChainVaultError::SharePreviewMismatch);
        }
        Ok((record, meta))
    }

    /// The preview bytes of an owned file, if it has one.
    pub fn read_preview(
        &self,
        session: &Session,
        meta_ref: &Reference,
    ) -> ChainVaultResult<Option<Vec<u8>>> {
        let record = self.resolver.resolve(session, meta_ref)?;
        record.expect_kind(RecordKind::Meta)?;
        let meta = record.meta()?;
        let Some(preview_ref) = meta.layout(&record.references)?.1 else {
            return Ok(None);
        };
        let preview = self.resolver.resolve(session, preview_ref)?;
        preview.expect_kind(RecordKind::Preview)?;
        Ok(Some(preview.plaintext))
    }

    /// The preview bytes of a shared file, if the share grants one.
    pub fn read_shared_preview(
        &self,
        session: &Session,
        share_ref: &Reference,
    ) -> ChainVaultResult<Option<Vec<u8>>> {
        let OpenedShare { share, .. } = self.open_share(session, share_ref)?;
        self.shared_meta(session, &share)?;
        let (Some(preview_ref), Some(preview_key)) = (&share.preview_reference, &share.preview_key)
        else {
            return Ok(None);
        };
        let preview = self.resolver.resolve_with(
            session,
            preview_ref,
            Authorization::Capability(preview_key),
        )?;
        preview.expect_kind(RecordKind::Preview)?;
        Ok(Some(preview.plaintext))
    }

    /// Read the file `reference` names, either a meta record or a share pointing at one.
    ///
    /// Dispatches on the record's kind, not on the channel it lives in.
    pub fn read_any(
        &self,
        session: &Session,
        reference: &Reference,
        cancel: Option<&CancelToken>,
    ) -> ChainVaultResult<File> {
        match self.kind_of(reference)? {
            RecordKind::Share => self.read_shared(session, reference, cancel),
            _ => self.read_file(session, reference, cancel),
        }
    }

    /// Preview counterpart of [`read_any`](Self::read_any).
    pub fn read_any_preview(
        &self,
        session: &Session,
        reference: &Reference,
    ) -> ChainVaultResult<Option<Vec<u8>>> {
        match self.kind_of(reference)? {
            RecordKind::Share => self.read_shared_preview(session, reference),
            _ => self.read_preview(session, reference),
        }
    }

    fn kind_of(&self, reference: &Reference) -> ChainVaultResult<RecordKind> {
        let located = self.resolver.locate(&reference.channel, &reference.hash)?;
        debug!(channel = %reference.channel, kind = %located.record.kind, "dispatching read");
        Ok(located.record.kind)
    }

    /// Resolve chunks in order and concatenate; `keys[i]` overrides the ACL for chunk `i`.
    fn assemble(
        &self,
        session: &Session,
        chunks: &[Reference],
        keys: &[Option<&[u8]>],
        cancel: Option<&CancelToken>,
    ) -> ChainVaultResult<Vec<u8>> {
        let mut bytes = Vec::new();
        for (index, (chunk_ref, key)) in chunks.iter().zip(keys).enumerate() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                info!(index, total = chunks.len(), "file read cancelled");
                return Err(ChainVaultError::Cancelled);
            }
            let auth = match key {
                Some(k) => Authorization::Capability(k),
                None => Authorization::Acl,
            };
            let chunk = self.resolver.resolve_with(session, chunk_ref, auth)?;
            chunk.expect_kind(RecordKind::Chunk)?;
            debug!(index, len = chunk.plaintext.len(), "chunk resolved");
            bytes.extend_from_slice(&chunk.plaintext);
        }
        Ok(bytes)
    }
}

fn finish(meta_reference: Reference, meta: Meta, bytes: Vec<u8>) -> ChainVaultResult<File> {
    if bytes.len() as u64 != meta.size {
        return Err(ChainVaultError::Codec(format!(
            "reassembled {} bytes but meta declares {}",
            bytes.len(),
            meta.size
        )));
    }
    Ok(File {
        meta_reference,
        meta,
        bytes,
    })
}
