//! Who can open what: access entries, share capabilities, and their limits.

mod common;

use common::{alice, bob, carol, device, Ledger};
use cv_core::{ChainVaultError, Hash, RecordKind, Reference};
use cv_engine::Authorization;

#[test]
fn stranger_cannot_open_owner_records() {
    let ledger = Ledger::new();
    let (alice, carol) = (alice(), carol());
    let dev = device(&ledger);

    let meta_ref = dev.publish_parts(&alice, "private.txt", &["secret ", "stuff"]);
    let meta = dev.vault.resolver.resolve(&alice, &meta_ref).unwrap();

    let err = dev.vault.resolver.resolve(&carol, &meta_ref).unwrap_err();
    assert!(matches!(err, ChainVaultError::NotAuthorized { .. }));

    for chunk in &meta.references {
        let err = dev.vault.resolver.resolve(&carol, chunk).unwrap_err();
        assert!(matches!(err, ChainVaultError::NotAuthorized { .. }));
    }

    let err = dev.vault.reader.read_file(&carol, &meta_ref, None).unwrap_err();
    assert!(matches!(err, ChainVaultError::NotAuthorized { .. }));
}

#[test]
fn recipient_gains_capability_not_access_entries() {
    let ledger = Ledger::new();
    let (alice, bob) = (alice(), bob());
    let alice_dev = device(&ledger);
    let bob_dev = device(&ledger);

    let meta_ref = alice_dev.publish_parts(&alice, "shared.txt", &["shared"]);
    let receipt = alice_dev.vault.sharing.share(&alice, &meta_ref, bob.public()).unwrap();

    // the original records still only list alice
    let err = bob_dev.vault.resolver.resolve(&bob, &meta_ref).unwrap_err();
    assert!(matches!(err, ChainVaultError::NotAuthorized { .. }));

    let meta = bob_dev
        .vault
        .resolver
        .resolve_with(&bob, &meta_ref, Authorization::Capability(&receipt.share.meta_key))
        .unwrap();
    assert_eq!(meta.kind, RecordKind::Meta);
    assert_eq!(meta.meta().unwrap().name, "shared.txt");
}

#[test]
fn share_for_someone_else_is_unusable() {
    let ledger = Ledger::new();
    let (alice, bob, carol) = (alice(), bob(), carol());
    let dev = device(&ledger);

    let meta_ref = dev.publish_parts(&alice, "for-bob.txt", &["bob only"]);
    let receipt = dev.vault.sharing.share(&alice, &meta_ref, bob.public()).unwrap();

    let err = dev
        .vault
        .reader
        .read_shared(&carol, &receipt.reference, None)
        .unwrap_err();
    assert!(matches!(err, ChainVaultError::NotAuthorized { .. }));

    // a capability key wrapped for bob does not unwrap with carol's key
    let err = dev
        .vault
        .resolver
        .resolve_with(&carol, &meta_ref, Authorization::Capability(&receipt.share.meta_key))
        .unwrap_err();
    assert!(matches!(err, ChainVaultError::KeyUnwrap(_)));
}

#[test]
fn garbage_capability_is_key_unwrap_error() {
    let ledger = Ledger::new();
    let alice = alice();
    let dev = device(&ledger);
    let meta_ref = dev.publish_parts(&alice, "x.txt", &["x"]);

    let err = dev
        .vault
        .resolver
        .resolve_with(&alice, &meta_ref, Authorization::Capability(&[1, 2, 3]))
        .unwrap_err();
    assert!(matches!(err, ChainVaultError::KeyUnwrap(_)));
}

#[test]
fn visible_records_are_only_the_readers_own() {
    let ledger = Ledger::new();
    let (alice, carol) = (alice(), carol());
    let dev = device(&ledger);

    let meta_ref = dev.publish_parts(&alice, "list.txt", &["a", "b"]);

    let visible: Vec<_> = dev
        .vault
        .resolver
        .visible(&alice, &alice.files_channel())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    // two chunks and the meta, newest first
    assert_eq!(visible.len(), 3);
    assert_eq!(visible[0].record_hash, meta_ref.hash);
    assert_eq!(visible[0].kind, RecordKind::Meta);

    let first = dev
        .vault
        .resolver
        .first_visible(&alice, &alice.files_channel())
        .unwrap()
        .unwrap();
    assert_eq!(first.record_hash, meta_ref.hash);

    assert_eq!(
        dev.vault
            .resolver
            .visible(&carol, &alice.files_channel())
            .unwrap()
            .count(),
        0
    );
    assert!(dev
        .vault
        .resolver
        .first_visible(&carol, &alice.files_channel())
        .unwrap()
        .is_none());
}

#[test]
fn unknown_record_is_not_found() {
    let ledger = Ledger::new();
    let alice = alice();
    let dev = device(&ledger);
    dev.publish_parts(&alice, "x.txt", &["x"]);

    let missing = Reference::new(alice.files_channel(), Hash::of(b"never admitted"), 0);
    let err = dev.vault.resolver.resolve(&alice, &missing).unwrap_err();
    assert!(matches!(err, ChainVaultError::NotFound { .. }));
    assert!(err.is_retryable());

    let nowhere = Reference::new("files/nobody", Hash::of(b"x"), 0);
    let err = dev.vault.resolver.resolve(&alice, &nowhere).unwrap_err();
    assert!(matches!(err, ChainVaultError::NotFound { .. }));
}
