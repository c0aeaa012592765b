//! Sharing by key re-wrapping.
//!
//! A share never touches the shared ciphertext. The sharer recovers each
//! content key (meta, every chunk, preview), wraps it again for the
//! recipient's public key, and admits one small share record listing those
//! wrapped keys. Cost grows with the number of chunks, not with file size.

use cv_core::{ChainVaultResult, Content, RecordKind, Reference, Share};
use cv_crypto::{generate_content_key, unwrap_key, wrap_key, PublicKey};
use rayon::prelude::*;
use tracing::info;

use crate::admission::Admission;
use crate::content::{ContentReader, OpenedShare};
use crate::resolver::RecordResolver;
use crate::seal::seal;
use crate::session::Session;

/// A share admitted to the recipient's share channel.
#[derive(Debug, Clone)]
pub struct ShareReceipt {
    pub reference: Reference,
    pub share: Share,
}

#[derive(Clone)]
pub struct SharingEngine {
    resolver: RecordResolver,
    reader: ContentReader,
    admission: Admission,
}

impl SharingEngine {
    pub fn new(resolver: RecordResolver, admission: Admission) -> Self {
        Self {
            reader: ContentReader::new(resolver.clone()),
            resolver,
            admission,
        }
    }

    /// Grant `recipient` access to a file the session owns.
    pub fn share(
        &self,
        session: &Session,
        meta_ref: &Reference,
        recipient: &PublicKey,
    ) -> ChainVaultResult<ShareReceipt> {
        let meta_record = self.resolver.resolve(session, meta_ref)?;
        meta_record.expect_kind(RecordKind::Meta)?;
        let meta = meta_record.meta()?;
        let (chunks, preview) = meta.layout(&meta_record.references)?;

        let meta_key = wrap_key(recipient, meta_record.key())?;

        let chunk_keys = chunks
            .par_iter()
            .map(|chunk_ref| {
                let chunk = self.resolver.resolve(session, chunk_ref)?;
                chunk.expect_kind(RecordKind::Chunk)?;
                Ok(wrap_key(recipient, chunk.key())?)
            })
            .collect::<ChainVaultResult<Vec<Vec<u8>>>>()?;

        let (preview_reference, preview_key) = match preview {
            Some(preview_ref) => {
                let record = self.resolver.resolve(session, preview_ref)?;
                record.expect_kind(RecordKind::Preview)?;
                (
                    Some(preview_ref.clone()),
                    Some(wrap_key(recipient, record.key())?),
                )
            }
            None => (None, None),
        };

        let share = Share {
            meta_reference: meta_ref.clone(),
            meta_key,
            chunk_keys,
            preview_reference,
            preview_key,
        };
        self.admit(session, recipient, share)
    }

    /// Pass on access the session itself only holds through a share.
    pub fn reshare(
        &self,
        session: &Session,
        share_ref: &Reference,
        recipient: &PublicKey,
    ) -> ChainVaultResult<ShareReceipt> {
        let OpenedShare { share: held, .. } = self.reader.open_share(session, share_ref)?;
        // Confirms the held keys open the meta and line up with its chunks
        self.reader.shared_meta(session, &held)?;

        let rewrap = |wrapped: &[u8]| -> ChainVaultResult<Vec<u8>> {
            let key = unwrap_key(session.keys(), wrapped)?;
            Ok(wrap_key(recipient, &key)?)
        };

        let chunk_keys = held
            .chunk_keys
            .par_iter()
            .map(|k| rewrap(k.as_slice()))
            .collect::<ChainVaultResult<Vec<Vec<u8>>>>()?;
        let preview_key = held.preview_key.as_deref().map(rewrap).transpose()?;

        let share = Share {
            meta_key: rewrap(held.meta_key.as_slice())?,
            meta_reference: held.meta_reference,
            chunk_keys,
            preview_reference: held.preview_reference,
            preview_key,
        };
        self.admit(session, recipient, share)
    }

    /// Shares addressed to the session, newest first.
    pub fn received<'a>(
        &'a self,
        session: &'a Session,
    ) -> ChainVaultResult<impl Iterator<Item = ChainVaultResult<ShareReceipt>> + 'a> {
        let records = self.resolver.visible(session, &session.shares_channel())?;
        Ok(records
            .filter(|r| !matches!(r, Ok(resolved) if resolved.kind != RecordKind::Share))
            .map(|r| {
                let resolved = r?;
                Ok(ShareReceipt {
                    share: resolved.share()?,
                    reference: resolved.reference(),
                })
            }))
    }

    /// Seal the share for {sharer, recipient} and admit it to the recipient's share channel.
    fn admit(
        &self,
        session: &Session,
        recipient: &PublicKey,
        share: Share,
    ) -> ChainVaultResult<ShareReceipt> {
        let plaintext = Content::Share(share.clone()).encode()?;
        let record = seal(
            RecordKind::Share,
            &plaintext,
            &generate_content_key(),
            &[session.public(), recipient],
            vec![share.meta_reference.clone()],
        )?;
        let channel = cv_core::shares_channel(recipient.identity());
        let reference = self.admission.submit(&channel, record)?.reference();

        info!(
            recipient = recipient.identity(),
            meta = %share.meta_reference.hash.short(),
            chunks = share.chunk_keys.len(),
            share = %reference.hash.short(),
            "share admitted"
        );
        Ok(ShareReceipt { reference, share })
    }
}
