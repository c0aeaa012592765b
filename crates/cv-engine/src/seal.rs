//! Building new records: encrypt once, wrap the key once per reader.

use std::time::{SystemTime, UNIX_EPOCH};

use cv_core::{AccessEntry, ChainVaultResult, Record, RecordKind, Reference};
use cv_crypto::{encrypt, wrap_key, ContentKey, PublicKey};

/// Milliseconds since the Unix epoch; an ordering hint only.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Encrypt `plaintext` under `key` and grant each distinct reader an access entry.
pub(crate) fn seal(
    kind: RecordKind,
    plaintext: &[u8],
    key: &ContentKey,
    readers: &[&PublicKey],
    references: Vec<Reference>,
) -> ChainVaultResult<Record> {
    let payload = encrypt(key, plaintext)?;

    let mut access: Vec<AccessEntry> = Vec::with_capacity(readers.len());
    for reader in readers {
        if access.iter().any(|e| e.reader == reader.identity()) {
            continue;
        }
        access.push(AccessEntry {
            reader: reader.identity().to_string(),
            wrapped_key: wrap_key(reader, key)?,
        });
    }

    Ok(Record {
        timestamp: now_millis(),
        kind,
        access,
        references,
        payload,
    })
}
