//! Authoring new files: chunk → encrypt → admit chunks → admit meta.
//!
//! Chunk boundaries come from FastCDC. Every chunk, the optional preview,
//! and the meta get their own content key; all are readable only by the
//! publisher until shared.

use cv_core::config::ChunkingConfig;
use cv_core::{ChainVaultResult, Content, Meta, Record, RecordKind, Reference};
use cv_crypto::generate_content_key;
use rayon::prelude::*;
use tracing::info;

use crate::admission::Admission;
use crate::seal::seal;
use crate::session::Session;

/// A file to publish.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub name: &'a str,
    pub mime_type: &'a str,
    pub data: &'a [u8],
    pub preview: Option<&'a [u8]>,
}

#[derive(Clone)]
pub struct Publisher {
    admission: Admission,
    chunking: ChunkingConfig,
}

impl Publisher {
    pub fn new(admission: Admission, chunking: ChunkingConfig) -> Self {
        Self {
            admission,
            chunking,
        }
    }

    /// Split `request.data` with FastCDC and publish it to `channel`.
    pub fn publish(
        &self,
        session: &Session,
        channel: &str,
        request: PublishRequest<'_>,
    ) -> ChainVaultResult<Reference> {
        let chunks = chunk_data(request.data, &self.chunking)?;
        self.publish_chunks(session, channel, request, &chunks)
    }

    /// Publish `request.data` using caller-chosen chunk boundaries.
    ///
    /// `chunks` must concatenate to `request.data`.
    pub fn publish_chunks(
        &self,
        session: &Session,
        channel: &str,
        request: PublishRequest<'_>,
        chunks: &[&[u8]],
    ) -> ChainVaultResult<Reference> {
        debug_assert_eq!(
            chunks.iter().map(|c| c.len()).sum::<usize>(),
            request.data.len()
        );

        let owner = [session.public()];
        let chunk_records = chunks
            .par_iter()
            .map(|chunk| seal(RecordKind::Chunk, chunk, &generate_content_key(), &owner, vec![]))
            .collect::<ChainVaultResult<Vec<Record>>>()?;

        let mut references: Vec<Reference> = self
            .admission
            .submit_all(channel, chunk_records)?
            .iter()
            .map(|a| a.reference())
            .collect();

        if let Some(preview) = request.preview {
            let record = seal(
                RecordKind::Preview,
                preview,
                &generate_content_key(),
                &owner,
                vec![],
            )?;
            references.push(self.admission.submit(channel, record)?.reference());
        }

        let meta = Meta {
            name: request.name.to_string(),
            mime_type: request.mime_type.to_string(),
            size: request.data.len() as u64,
            preview: request.preview.is_some(),
        };
        let plaintext = Content::Meta(meta).encode()?;
        let record = seal(
            RecordKind::Meta,
            &plaintext,
            &generate_content_key(),
            &owner,
            references,
        )?;
        let reference = self.admission.submit(channel, record)?.reference();

        info!(
            channel,
            name = request.name,
            chunks = chunks.len(),
            bytes = request.data.len(),
            meta = %reference.hash.short(),
            "file published"
        );
        Ok(reference)
    }
}

/// Content-defined chunk boundaries for `data`; empty input gives no chunks.
///
/// Sizes outside FastCDC's accepted ranges are a `Config` error.
pub fn chunk_data<'a>(data: &'a [u8], sizes: &ChunkingConfig) -> ChainVaultResult<Vec<&'a [u8]>> {
    sizes.validate()?;
    if data.is_empty() {
        return Ok(vec![]);
    }
    Ok(
        fastcdc::v2020::FastCDC::new(data, sizes.min_size, sizes.avg_size, sizes.max_size)
            .map(|c| &data[c.offset..c.offset + c.length])
            .collect(),
    )
}
