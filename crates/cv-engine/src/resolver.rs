//! Record resolution: locate → authorize → decrypt → expose.
//!
//! One resolution walks a single channel from its head towards genesis until
//! it finds the requested record, picks the key the caller may use (its own
//! access entry, or a capability key taken from a share), and decrypts the
//! payload. Resolving linked records (meta → chunks) is up to the caller; each
//! link is an independent resolution.

use cv_chain::{ChainWalk, ChannelResolver, Freshness};
use cv_core::{
    BlockEntry, ChainVaultError, ChainVaultResult, Content, Hash, Meta, Record, RecordKind,
    Reference, Share, Tag,
};
use cv_crypto::{decrypt, unwrap_key, ContentKey};
use tracing::{debug, warn};

use crate::session::Session;

/// Which wrapped key opens the record.
#[derive(Debug, Clone, Copy)]
pub enum Authorization<'a> {
    /// The caller's own entry in the record's access list
    Acl,
    /// A key wrapped for the caller by a share capability
    Capability(&'a [u8]),
}

/// A record located in its block but not yet opened.
#[derive(Debug, Clone)]
pub struct Located {
    pub block_hash: Hash,
    pub record_hash: Hash,
    pub record: Record,
}

/// A decrypted record.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub channel: String,
    pub record_hash: Hash,
    pub block_hash: Hash,
    pub timestamp: u64,
    pub kind: RecordKind,
    pub references: Vec<Reference>,
    pub plaintext: Vec<u8>,
    key: ContentKey,
}

impl Resolved {
    /// The record's content key, as recovered by this resolution.
    pub fn key(&self) -> &ContentKey {
        &self.key
    }

    /// A reference to this record.
    pub fn reference(&self) -> Reference {
        Reference::new(self.channel.clone(), self.record_hash.clone(), self.timestamp)
    }

    pub fn content(&self) -> ChainVaultResult<Content> {
        Content::decode(self.kind, &self.plaintext)
    }

    pub fn expect_kind(&self, expected: RecordKind) -> ChainVaultResult<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ChainVaultError::UnexpectedKind {
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            })
        }
    }

    pub fn meta(&self) -> ChainVaultResult<Meta> {
        match self.content()? {
            Content::Meta(m) => Ok(m),
            other => Err(unexpected("meta", &other)),
        }
    }

    pub fn share(&self) -> ChainVaultResult<Share> {
        match self.content()? {
            Content::Share(s) => Ok(s),
            other => Err(unexpected("share", &other)),
        }
    }

    pub fn tag(&self) -> ChainVaultResult<Tag> {
        match self.content()? {
            Content::Tag(t) => Ok(t),
            other => Err(unexpected("tag", &other)),
        }
    }
}

fn unexpected(expected: &str, found: &Content) -> ChainVaultError {
    ChainVaultError::UnexpectedKind {
        expected: expected.to_string(),
        actual: found.kind_name().to_string(),
    }
}

#[derive(Clone)]
pub struct RecordResolver {
    channels: ChannelResolver,
}

impl RecordResolver {
    pub fn new(channels: ChannelResolver) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &ChannelResolver {
        &self.channels
    }

    /// Find a record in `channel` without opening it.
    ///
    /// Tries the cache's record index, then walks from the cached head, then
    /// refreshes the head once and walks the part of the chain added since.
    pub fn locate(&self, channel: &str, record_hash: &Hash) -> ChainVaultResult<Located> {
        match self
            .channels
            .cache()
            .get_block_containing_record(channel, record_hash)
        {
            Ok(Some(block)) => {
                if let Some(entry) = block.entry(record_hash) {
                    debug!(channel, record = %record_hash.short(), "located via cache index");
                    return Ok(Located {
                        block_hash: block.hash.clone(),
                        record_hash: record_hash.clone(),
                        record: entry.record.clone(),
                    });
                }
            }
            Ok(None) => {}
            Err(e) => warn!(channel, error = %e, "cache record index lookup failed"),
        }

        let cached_head = self.channels.head(channel, Freshness::Cached)?;
        if let Some(head) = &cached_head {
            if let Some(found) = scan(self.channels.walk(channel, head.clone()), record_hash, None)
            {
                return Ok(found);
            }
        }

        let fresh_head = self.channels.head(channel, Freshness::Refresh)?;
        if let Some(head) = fresh_head {
            if cached_head.as_ref() != Some(&head) {
                debug!(channel, head = %head.short(), "rescanning after head refresh");
                let walk = self.channels.walk(channel, head);
                if let Some(found) = scan(walk, record_hash, cached_head.as_ref()) {
                    return Ok(found);
                }
            }
        }

        Err(ChainVaultError::not_found(channel, record_hash))
    }

    /// Resolve a record through the caller's own access entry.
    pub fn resolve(&self, session: &Session, reference: &Reference) -> ChainVaultResult<Resolved> {
        self.resolve_with(session, reference, Authorization::Acl)
    }

    pub fn resolve_with(
        &self,
        session: &Session,
        reference: &Reference,
        auth: Authorization<'_>,
    ) -> ChainVaultResult<Resolved> {
        let located = self.locate(&reference.channel, &reference.hash)?;
        let wrapped = match auth {
            Authorization::Acl => located
                .record
                .access_for(session.identity())
                .map(|e| e.wrapped_key.clone())
                .ok_or_else(|| ChainVaultError::NotAuthorized {
                    record: located.record_hash.clone(),
                    reader: session.identity().to_string(),
                })?,
            Authorization::Capability(w) => w.to_vec(),
        };
        open(session, &reference.channel, located, &wrapped)
    }

    /// Records of `channel` readable by the session, newest first.
    ///
    /// The sequence is lazy and finite; pull as many as needed. Records whose
    /// access entry cannot be opened are yielded as errors, not skipped.
    pub fn visible<'a>(
        &'a self,
        session: &'a Session,
        channel: &str,
    ) -> ChainVaultResult<VisibleRecords<'a>> {
        let walk = self
            .channels
            .head(channel, Freshness::Refresh)?
            .map(|head| self.channels.walk(channel, head));
        Ok(VisibleRecords {
            walk,
            session,
            channel: channel.to_string(),
            pending: Vec::new(),
        })
    }

    /// The most recent record of `channel` the session can read.
    pub fn first_visible(
        &self,
        session: &Session,
        channel: &str,
    ) -> ChainVaultResult<Option<Resolved>> {
        self.visible(session, channel)?.next().transpose()
    }
}

fn scan(walk: ChainWalk<'_>, record_hash: &Hash, stop_at: Option<&Hash>) -> Option<Located> {
    for (depth, block) in walk.enumerate() {
        if Some(&block.hash) == stop_at {
            break;
        }
        if let Some(entry) = block.entry(record_hash) {
            debug!(record = %record_hash.short(), depth, "located via chain walk");
            return Some(Located {
                block_hash: block.hash.clone(),
                record_hash: record_hash.clone(),
                record: entry.record.clone(),
            });
        }
    }
    None
}

fn open(
    session: &Session,
    channel: &str,
    located: Located,
    wrapped: &[u8],
) -> ChainVaultResult<Resolved> {
    let key = unwrap_key(session.keys(), wrapped)?;
    let plaintext = decrypt(&key, &located.record.payload)?;
    let Record {
        timestamp,
        kind,
        references,
        ..
    } = located.record;
    Ok(Resolved {
        channel: channel.to_string(),
        record_hash: located.record_hash,
        block_hash: located.block_hash,
        timestamp,
        kind,
        references,
        plaintext,
        key,
    })
}

/// Lazy sequence of the session's readable records in one channel.
pub struct VisibleRecords<'a> {
    walk: Option<ChainWalk<'a>>,
    session: &'a Session,
    channel: String,
    /// Entries of the current block, oldest first (popped from the back)
    pending: Vec<(Hash, BlockEntry)>,
}

impl Iterator for VisibleRecords<'_> {
    type Item = ChainVaultResult<Resolved>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((block_hash, entry)) = self.pending.pop() {
                let Some(access) = entry.record.access_for(self.session.identity()) else {
                    continue;
                };
                let wrapped = access.wrapped_key.clone();
                let located = Located {
                    block_hash,
                    record_hash: entry.record_hash,
                    record: entry.record,
                };
                return Some(open(self.session, &self.channel, located, &wrapped));
            }

            let block = self.walk.as_mut()?.next()?;
            let block_hash = block.hash;
            self.pending = block
                .entries
                .into_iter()
                .map(|e| (block_hash.clone(), e))
                .collect();
        }
    }
}
