//! Tagging: a small labelled value attached to any record the author can see.

use cv_core::{ChainVaultError, ChainVaultResult, Content, RecordKind, Reference, Tag};
use cv_crypto::generate_content_key;
use tracing::{debug, info};

use crate::admission::Admission;
use crate::resolver::RecordResolver;
use crate::seal::seal;
use crate::session::Session;

/// A tag together with the record it lives in.
#[derive(Debug, Clone)]
pub struct TagReceipt {
    pub reference: Reference,
    pub target: Reference,
    pub tag: Tag,
}

#[derive(Clone)]
pub struct Tagger {
    resolver: RecordResolver,
    admission: Admission,
}

impl Tagger {
    pub fn new(resolver: RecordResolver, admission: Admission) -> Self {
        Self {
            resolver,
            admission,
        }
    }

    /// Attach `label = value` to `target` in the session's tag channel.
    ///
    /// The target must exist. Records the session reaches only through a
    /// share have no access entry for it, so those are checked by location.
    pub fn tag(
        &self,
        session: &Session,
        target: &Reference,
        label: &str,
        value: &[u8],
    ) -> ChainVaultResult<TagReceipt> {
        match self.resolver.resolve(session, target) {
            Ok(resolved) => debug!(target = %target.hash.short(), kind = %resolved.kind, "tag target resolved"),
            Err(ChainVaultError::NotAuthorized { .. }) => {
                self.resolver.locate(&target.channel, &target.hash)?;
                debug!(target = %target.hash.short(), "tag target located without access entry");
            }
            Err(e) => return Err(e),
        }

        let tag = Tag {
            label: label.to_string(),
            value: value.to_vec(),
        };
        let plaintext = Content::Tag(tag.clone()).encode()?;
        let record = seal(
            RecordKind::Tag,
            &plaintext,
            &generate_content_key(),
            &[session.public()],
            vec![target.clone()],
        )?;
        let reference = self
            .admission
            .submit(&session.tags_channel(), record)?
            .reference();

        info!(label, target = %target.hash.short(), tag = %reference.hash.short(), "tag admitted");
        Ok(TagReceipt {
            reference,
            target: target.clone(),
            tag,
        })
    }

    /// The session's tags on `target`, newest first.
    pub fn tags_for(&self, session: &Session, target: &Reference) -> ChainVaultResult<Vec<TagReceipt>> {
        let mut found = Vec::new();
        for resolved in self.resolver.visible(session, &session.tags_channel())? {
            let resolved = resolved?;
            if resolved.kind != RecordKind::Tag {
                continue;
            }
            let Some(tagged) = resolved.references.first() else {
                continue;
            };
            if tagged.channel != target.channel || tagged.hash != target.hash {
                continue;
            }
            found.push(TagReceipt {
                target: tagged.clone(),
                tag: resolved.tag()?,
                reference: resolved.reference(),
            });
        }
        Ok(found)
    }
}
