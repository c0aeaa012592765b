use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChainVaultError, ChainVaultResult};

/// A BLAKE3 content identifier, stored as 64 lowercase hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash(String);

impl Hash {
    /// Hash a byte slice.
    pub fn of(data: &[u8]) -> Self {
        Hash(blake3::hash(data).to_hex().to_string())
    }

    /// Parse a 64-char hex string.
    pub fn from_hex(hex: &str) -> ChainVaultResult<Self> {
        blake3::Hash::from_hex(hex)
            .map(|h| Hash(h.to_hex().to_string()))
            .map_err(|e| ChainVaultError::Codec(format!("invalid hash '{hex}': {e}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Hash {
    type Err = ChainVaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}

impl TryFrom<String> for Hash {
    type Error = ChainVaultError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Hash::from_hex(&s)
    }
}

impl From<Hash> for String {
    fn from(h: Hash) -> Self {
        h.0
    }
}

/// What a record's payload decodes to once decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// A slice of a logical file's bytes
    Chunk,
    /// A small rendition of a logical file (thumbnail, excerpt)
    Preview,
    /// File description pointing at chunk records
    Meta,
    /// Re-wrapped keys granting a recipient access to a meta and its chunks
    Share,
    /// An annotation on another record
    Tag,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Chunk => "chunk",
            RecordKind::Preview => "preview",
            RecordKind::Meta => "meta",
            RecordKind::Share => "share",
            RecordKind::Tag => "tag",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pointer into a channel: a record (or, for heads, a block) by hash.
///
/// Purely a lookup key; it carries no ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub channel: String,
    pub hash: Hash,
    pub timestamp: u64,
}

impl Reference {
    pub fn new(channel: impl Into<String>, hash: Hash, timestamp: u64) -> Self {
        Self {
            channel: channel.into(),
            hash,
            timestamp,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.channel, self.hash)
    }
}

/// Parses the `channel@hash` form printed by `Display`. The timestamp is unknown and left at 0.
impl FromStr for Reference {
    type Err = ChainVaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (channel, hash) = s
            .rsplit_once('@')
            .ok_or_else(|| ChainVaultError::Codec(format!("reference {s:?} is not channel@hash")))?;
        if channel.is_empty() {
            return Err(ChainVaultError::Codec(format!("reference {s:?} has no channel")));
        }
        Ok(Reference::new(channel, Hash::from_hex(hash)?, 0))
    }
}

/// One authorized reader of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    /// Reader identity (hash of the reader's public key)
    pub reader: String,
    /// The record's content key, wrapped with the reader's public key
    #[serde(with = "b64")]
    pub wrapped_key: Vec<u8>,
}

/// The unit of encrypted application data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Logical ordering hint, not a trusted wall clock
    pub timestamp: u64,
    pub kind: RecordKind,
    pub access: Vec<AccessEntry>,
    /// Positional: meaning of each slot depends on `kind`
    pub references: Vec<Reference>,
    /// AES-GCM ciphertext of the encoded content
    #[serde(with = "b64")]
    pub payload: Vec<u8>,
}

impl Record {
    /// Content hash of the record's canonical JSON encoding.
    pub fn hash(&self) -> ChainVaultResult<Hash> {
        Ok(Hash::of(&serde_json::to_vec(self)?))
    }

    /// The access entry for `reader`, if any.
    pub fn access_for(&self, reader: &str) -> Option<&AccessEntry> {
        self.access.iter().find(|e| e.reader == reader)
    }

    pub fn is_readable_by(&self, reader: &str) -> bool {
        self.access_for(reader).is_some()
    }

    /// True when no reader appears twice in the access list.
    pub fn has_unique_readers(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.access.iter().all(|e| seen.insert(e.reader.as_str()))
    }
}

/// Associates a record with its content hash inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub record_hash: Hash,
    pub record: Record,
}

impl BlockEntry {
    pub fn new(record: Record) -> ChainVaultResult<Self> {
        Ok(Self {
            record_hash: record.hash()?,
            record,
        })
    }
}

/// An immutable, content-addressed container of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: Hash,
    /// Hash of the prior block in the same channel; `None` for genesis
    pub previous: Option<Hash>,
    pub channel: String,
    pub entries: Vec<BlockEntry>,
}

#[derive(Serialize)]
struct BlockHeader<'a> {
    previous: Option<&'a Hash>,
    channel: &'a str,
    entries: &'a [BlockEntry],
}

impl Block {
    /// Build a block and derive its hash from its content.
    pub fn seal(
        previous: Option<Hash>,
        channel: impl Into<String>,
        entries: Vec<BlockEntry>,
    ) -> ChainVaultResult<Self> {
        let channel = channel.into();
        let hash = Self::content_hash(previous.as_ref(), &channel, &entries)?;
        Ok(Self {
            hash,
            previous,
            channel,
            entries,
        })
    }

    fn content_hash(
        previous: Option<&Hash>,
        channel: &str,
        entries: &[BlockEntry],
    ) -> ChainVaultResult<Hash> {
        let header = BlockHeader {
            previous,
            channel,
            entries,
        };
        Ok(Hash::of(&serde_json::to_vec(&header)?))
    }

    /// Check that the block hash and every entry's record hash match content.
    pub fn verify(&self) -> bool {
        let header_ok = Self::content_hash(self.previous.as_ref(), &self.channel, &self.entries)
            .map(|h| h == self.hash)
            .unwrap_or(false);
        header_ok
            && self.entries.iter().all(|e| {
                e.record
                    .hash()
                    .map(|h| h == e.record_hash)
                    .unwrap_or(false)
            })
    }

    pub fn entry(&self, record_hash: &Hash) -> Option<&BlockEntry> {
        self.entries.iter().find(|e| &e.record_hash == record_hash)
    }

    pub fn is_genesis(&self) -> bool {
        self.previous.is_none()
    }
}

/// Serde adapters for binary fields, stored as standard base64.
pub mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, T: AsRef<[u8]>>(bytes: T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }

    pub mod vec {
        use super::*;
        use serde::Serialize;

        pub fn serialize<S: Serializer>(items: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
            let encoded: Vec<String> = items.iter().map(|b| STANDARD.encode(b)).collect();
            encoded.serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
            Vec::<String>::deserialize(d)?
                .into_iter()
                .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
                .collect()
        }
    }

    pub mod option {
        use super::*;
        use serde::Serialize;

        pub fn serialize<S: Serializer>(item: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
            item.as_ref().map(|b| STANDARD.encode(b)).serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_record(payload: &[u8]) -> Record {
        Record {
            timestamp: 7,
            kind: RecordKind::Chunk,
            access: vec![AccessEntry {
                reader: "alice".into(),
                wrapped_key: vec![1, 2, 3],
            }],
            references: vec![],
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn hash_rejects_bad_hex() {
        assert!(Hash::from_hex("not-a-hash").is_err());
        let h = Hash::of(b"x");
        assert_eq!(Hash::from_hex(h.as_str()).unwrap(), h);
    }

    #[test]
    fn hash_deserialization_validates() {
        let bad: Result<Hash, _> = serde_json::from_str("\"zz\"");
        assert!(bad.is_err());
    }

    #[test]
    fn block_links_to_predecessor() {
        let genesis =
            Block::seal(None, "files/a", vec![BlockEntry::new(sample_record(b"1")).unwrap()])
                .unwrap();
        let next = Block::seal(
            Some(genesis.hash.clone()),
            "files/a",
            vec![BlockEntry::new(sample_record(b"2")).unwrap()],
        )
        .unwrap();

        assert!(genesis.is_genesis());
        assert_eq!(next.previous.as_ref(), Some(&genesis.hash));
        assert!(genesis.verify());
        assert!(next.verify());
    }

    #[test]
    fn tampered_block_fails_verification() {
        let mut block =
            Block::seal(None, "files/a", vec![BlockEntry::new(sample_record(b"1")).unwrap()])
                .unwrap();
        block.entries[0].record.payload = b"evil".to_vec();
        assert!(!block.verify());
    }

    #[test]
    fn record_survives_json_with_same_hash() {
        let record = sample_record(b"\x00\xffbinary");
        let json = serde_json::to_vec(&record).unwrap();
        let back: Record = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.hash().unwrap(), record.hash().unwrap());
    }

    #[test]
    fn reference_parses_its_display_form() {
        let r = Reference::new("files/abc", Hash::of(b"x"), 0);
        let parsed: Reference = r.to_string().parse().unwrap();
        assert_eq!(parsed, r);
        assert!("files/abc".parse::<Reference>().is_err());
        assert!("@deadbeef".parse::<Reference>().is_err());
        assert!("files/abc@nothex".parse::<Reference>().is_err());
    }

    #[test]
    fn duplicate_readers_detected() {
        let mut record = sample_record(b"p");
        assert!(record.has_unique_readers());
        record.access.push(record.access[0].clone());
        assert!(!record.has_unique_readers());
    }

    proptest! {
        #[test]
        fn record_hash_tracks_payload(a in proptest::collection::vec(any::<u8>(), 0..256),
                                      b in proptest::collection::vec(any::<u8>(), 0..256)) {
            let ha = sample_record(&a).hash().unwrap();
            let hb = sample_record(&b).hash().unwrap();
            prop_assert_eq!(a == b, ha == hb);
        }
    }
}
