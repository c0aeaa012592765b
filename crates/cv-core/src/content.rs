//! Decoded record payloads
//!
//! Every record carries one opaque ciphertext. After decryption the plaintext
//! is interpreted according to the record's [`RecordKind`]: chunk and preview
//! records hold raw bytes, the rest hold JSON documents.

use serde::{Deserialize, Serialize};

use crate::error::{ChainVaultError, ChainVaultResult};
use crate::types::{b64, RecordKind, Reference};

/// Description of a logical file.
///
/// The owning record's references list the content chunks in order, followed
/// by the preview record when `preview` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub name: String,
    pub mime_type: String,
    /// Total plaintext size across all chunks
    pub size: u64,
    #[serde(default)]
    pub preview: bool,
}

impl Meta {
    /// Split a meta record's references into (chunks, preview).
    pub fn layout<'a>(
        &self,
        references: &'a [Reference],
    ) -> ChainVaultResult<(&'a [Reference], Option<&'a Reference>)> {
        if self.preview {
            match references.split_last() {
                Some((preview, chunks)) => Ok((chunks, Some(preview))),
                None => Err(ChainVaultError::Codec(
                    "meta declares a preview but has no references".into(),
                )),
            }
        } else {
            Ok((references, None))
        }
    }
}

/// Capability transfer: keys re-wrapped for a recipient.
///
/// `chunk_keys[i]` opens the chunk at position `i` of the shared meta's
/// chunk references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub meta_reference: Reference,
    #[serde(with = "b64")]
    pub meta_key: Vec<u8>,
    #[serde(with = "b64::vec")]
    pub chunk_keys: Vec<Vec<u8>>,
    #[serde(default)]
    pub preview_reference: Option<Reference>,
    #[serde(default, with = "b64::option")]
    pub preview_key: Option<Vec<u8>>,
}

/// A small annotation attached to another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    #[serde(with = "b64")]
    pub value: Vec<u8>,
}

/// A decrypted payload, decoded according to its record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Bytes(Vec<u8>),
    Meta(Meta),
    Share(Share),
    Tag(Tag),
}

impl Content {
    pub fn decode(kind: RecordKind, plaintext: &[u8]) -> ChainVaultResult<Self> {
        Ok(match kind {
            RecordKind::Chunk | RecordKind::Preview => Content::Bytes(plaintext.to_vec()),
            RecordKind::Meta => Content::Meta(serde_json::from_slice(plaintext)?),
            RecordKind::Share => Content::Share(serde_json::from_slice(plaintext)?),
            RecordKind::Tag => Content::Tag(serde_json::from_slice(plaintext)?),
        })
    }

    /// Encode into the plaintext form stored (encrypted) in a record payload.
    pub fn encode(&self) -> ChainVaultResult<Vec<u8>> {
        Ok(match self {
            Content::Bytes(b) => b.clone(),
            Content::Meta(m) => serde_json::to_vec(m)?,
            Content::Share(s) => serde_json::to_vec(s)?,
            Content::Tag(t) => serde_json::to_vec(t)?,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Content::Bytes(_) => "bytes",
            Content::Meta(_) => "meta",
            Content::Share(_) => "share",
            Content::Tag(_) => "tag",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hash;

    fn reference(n: u8) -> Reference {
        Reference::new("files/x", Hash::of(&[n]), n as u64)
    }

    #[test]
    fn layout_without_preview() {
        let meta = Meta {
            name: "a.txt".into(),
            mime_type: "text/plain".into(),
            size: 12,
            preview: false,
        };
        let refs = vec![reference(1), reference(2)];
        let (chunks, preview) = meta.layout(&refs).unwrap();
        assert_eq!(chunks, &refs[..]);
        assert!(preview.is_none());
    }

    #[test]
    fn layout_with_preview_takes_last() {
        let meta = Meta {
            name: "a.png".into(),
            mime_type: "image/png".into(),
            size: 3,
            preview: true,
        };
        let refs = vec![reference(1), reference(2), reference(9)];
        let (chunks, preview) = meta.layout(&refs).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(preview, Some(&refs[2]));
    }

    #[test]
    fn layout_preview_without_references_is_error() {
        let meta = Meta {
            name: "a".into(),
            mime_type: "x".into(),
            size: 0,
            preview: true,
        };
        assert!(meta.layout(&[]).is_err());
    }

    #[test]
    fn share_decodes_by_kind() {
        let share = Share {
            meta_reference: reference(1),
            meta_key: vec![9; 4],
            chunk_keys: vec![vec![1], vec![2, 2]],
            preview_reference: None,
            preview_key: None,
        };
        let bytes = Content::Share(share.clone()).encode().unwrap();
        assert_eq!(
            Content::decode(RecordKind::Share, &bytes).unwrap(),
            Content::Share(share)
        );
        assert!(Content::decode(RecordKind::Meta, &bytes).is_err());
    }

    #[test]
    fn chunk_bytes_pass_through() {
        let c = Content::decode(RecordKind::Chunk, b"\x00raw").unwrap();
        assert_eq!(c, Content::Bytes(b"\x00raw".to_vec()));
    }
}
