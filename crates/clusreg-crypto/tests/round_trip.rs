//! Integration tests for the encrypt/decrypt round trip.

use clusreg_crypto::{
    CryptoError, CryptoProvider, MemoryCrypto, OpenFlags, ProviderType, MS_ENH_RSA_AES_PROV,
};
use clusreg_core::Status;
use proptest::prelude::*;

fn open(crypto: &MemoryCrypto) -> CryptoProvider<'_, MemoryCrypto> {
    CryptoProvider::open(
        crypto,
        "Cluster IP Address",
        MS_ENH_RSA_AES_PROV,
        ProviderType::RSA_AES,
        OpenFlags::CREATE_CONTAINER_IF_NOT_FOUND,
    )
    .expect("open provider")
}

#[test]
fn decrypt_inverts_encrypt() {
    let crypto = MemoryCrypto::new();
    let provider = open(&crypto);

    let payloads: [&[u8]; 3] = [
        b"",
        b"x",
        b"a longer payload spanning more than one keystream block",
    ];
    for data in payloads {
        let sealed = provider.encrypt(data).expect("encrypt");
        assert_ne!(sealed, data);
        assert_eq!(provider.decrypt(&sealed).expect("decrypt"), data);
    }

    let stats = crypto.stats();
    assert_eq!(stats.allocated, 6);
    assert_eq!(stats.freed, 6);
    assert_eq!(stats.outstanding, 0);
}

#[test]
fn allocation_is_freed_when_copy_fails() {
    let crypto = MemoryCrypto::new();
    let provider = open(&crypto);
    crypto.fail_copy_out(true);

    let err = provider.encrypt(b"payload").unwrap_err();
    assert!(matches!(err, CryptoError::Native { operation: "copy result", .. }), "got {err}");

    let stats = crypto.stats();
    assert_eq!(stats.allocated, 1);
    assert_eq!(stats.freed, 1);
    assert_eq!(stats.outstanding, 0);
}

#[test]
fn failed_transform_allocates_nothing() {
    let crypto = MemoryCrypto::new();
    let provider = open(&crypto);

    let err = provider.decrypt(b"not a sealed payload at all, far too broken").unwrap_err();
    assert_eq!(err.status(), Some(Status::INVALID_DATA));
    assert_eq!(crypto.stats().allocated, 0);
}

#[test]
fn providers_share_a_container() {
    let crypto = MemoryCrypto::with_secret(b"cluster-secret");
    let sealed = open(&crypto).encrypt(b"shared").expect("encrypt");

    let again = CryptoProvider::open(
        &crypto,
        "cluster ip address",
        MS_ENH_RSA_AES_PROV,
        ProviderType::RSA_AES,
        OpenFlags::NONE,
    )
    .expect("reopen existing container");
    assert_eq!(again.decrypt(&sealed).expect("decrypt"), b"shared");
}

#[test]
fn named_key_is_a_separate_container() {
    let crypto = MemoryCrypto::new();
    let sealed = open(&crypto).encrypt(b"secret").expect("encrypt");

    let err = CryptoProvider::open_with_key(
        &crypto,
        "Cluster IP Address",
        "Backup",
        MS_ENH_RSA_AES_PROV,
        ProviderType::RSA_AES,
        OpenFlags::NONE,
    )
    .unwrap_err();
    assert_eq!(err.status(), Some(Status::BAD_KEYSET));

    let keyed = CryptoProvider::open_with_key(
        &crypto,
        "Cluster IP Address",
        "Backup",
        MS_ENH_RSA_AES_PROV,
        ProviderType::RSA_AES,
        OpenFlags::CREATE_CONTAINER_IF_NOT_FOUND,
    )
    .expect("create keyed container");
    assert_eq!(keyed.decrypt(&sealed).unwrap_err().status(), Some(Status::INVALID_DATA));
}

#[test]
fn names_with_nul_are_rejected() {
    let crypto = MemoryCrypto::new();
    let err = CryptoProvider::open(
        &crypto,
        "bad\0resource",
        MS_ENH_RSA_AES_PROV,
        ProviderType::RSA_AES,
        OpenFlags::NONE,
    )
    .unwrap_err();
    assert!(matches!(err, CryptoError::InvalidName { .. }));
}

proptest! {
    #[test]
    fn round_trip_any_payload(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let crypto = MemoryCrypto::new();
        {
            let provider = open(&crypto);
            let sealed = provider.encrypt(&data).unwrap();
            prop_assert_eq!(provider.decrypt(&sealed).unwrap(), data);
        }
        let stats = crypto.stats();
        prop_assert_eq!(stats.allocated, stats.freed);
        prop_assert_eq!(stats.outstanding, 0);
    }
}
