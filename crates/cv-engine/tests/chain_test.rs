//! Chain traversal from the engine's side: pruned history, cache fill, cancellation.

mod common;

use common::{alice, bob, device, Ledger};
use cv_chain::Cache;
use cv_core::ChainVaultError;
use cv_engine::CancelToken;

#[test]
fn pruned_history_is_not_found_while_recent_records_resolve() {
    let ledger = Ledger::new();
    let alice = alice();
    let dev = device(&ledger);

    let old_ref = dev.publish_parts(&alice, "old.txt", &["old"]);
    let old_meta = dev.vault.resolver.resolve(&alice, &old_ref).unwrap();
    let old_chunk = dev
        .vault
        .resolver
        .locate(&old_meta.references[0].channel, &old_meta.references[0].hash)
        .unwrap();

    let new_ref = dev.publish_parts(&alice, "new.txt", &["new"]);

    // the old blocks disappear from both the network and the local cache
    for block in [&old_meta.block_hash, &old_chunk.block_hash] {
        ledger.hide(block);
        assert!(dev.cache.evict(block).unwrap());
    }

    let err = dev.vault.resolver.resolve(&alice, &old_ref).unwrap_err();
    assert!(matches!(err, ChainVaultError::NotFound { .. }));
    let err = dev.vault.reader.read_file(&alice, &old_ref, None).unwrap_err();
    assert!(matches!(err, ChainVaultError::NotFound { .. }));

    let file = dev.vault.reader.read_file(&alice, &new_ref, None).unwrap();
    assert_eq!(file.bytes, b"new");

    // the walk stops at the gap instead of failing
    let visible: Vec<_> = dev
        .vault
        .resolver
        .visible(&alice, &alice.files_channel())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(visible.len(), 2);
}

#[test]
fn fresh_device_fills_its_cache_from_the_network() {
    let ledger = Ledger::new();
    let (alice, bob) = (alice(), bob());
    let alice_dev = device(&ledger);
    let meta_ref = alice_dev.publish_parts(&alice, "fill.txt", &["fi", "ll"]);
    let receipt = alice_dev.vault.sharing.share(&alice, &meta_ref, bob.public()).unwrap();

    let bob_dev = device(&ledger);
    assert!(bob_dev.cache.is_empty());

    let file = bob_dev
        .vault
        .reader
        .read_shared(&bob, &receipt.reference, None)
        .unwrap();
    assert_eq!(file.bytes, b"fill");

    let meta_block = bob_dev
        .cache
        .get_block_containing_record(&meta_ref.channel, &meta_ref.hash)
        .unwrap()
        .expect("meta block cached");
    assert!(meta_block.verify());
    assert_eq!(
        bob_dev.cache.get_head(&alice.files_channel()).unwrap(),
        ledger.store().get_head(&alice.files_channel()).unwrap()
    );
}

#[test]
fn records_admitted_after_caching_are_found_by_refresh() {
    let ledger = Ledger::new();
    let alice = alice();
    let writer = device(&ledger);
    let reader = device(&ledger);

    let first = writer.publish_parts(&alice, "1.txt", &["one"]);
    reader.vault.reader.read_file(&alice, &first, None).unwrap();

    // the reader's cached head is now stale
    let second = writer.publish_parts(&alice, "2.txt", &["two"]);
    let file = reader.vault.reader.read_file(&alice, &second, None).unwrap();
    assert_eq!(file.bytes, b"two");
}

#[test]
fn cancelled_read_stops_with_cancelled() {
    let ledger = Ledger::new();
    let alice = alice();
    let dev = device(&ledger);
    let meta_ref = dev.publish_parts(&alice, "c.txt", &["a", "b", "c"]);

    let token = CancelToken::new();
    let file = dev.vault.reader.read_file(&alice, &meta_ref, Some(&token)).unwrap();
    assert_eq!(file.bytes, b"abc");

    token.cancel();
    assert!(token.is_cancelled());
    let err = dev
        .vault
        .reader
        .read_file(&alice, &meta_ref, Some(&token))
        .unwrap_err();
    assert!(matches!(err, ChainVaultError::Cancelled));
}

#[test]
fn empty_file_round_trips() {
    let ledger = Ledger::new();
    let alice = alice();
    let dev = device(&ledger);
    let meta_ref = dev.publish_parts(&alice, "empty.txt", &[]);
    let file = dev.vault.reader.read_file(&alice, &meta_ref, None).unwrap();
    assert!(file.bytes.is_empty());
    assert_eq!(file.meta.size, 0);
}
