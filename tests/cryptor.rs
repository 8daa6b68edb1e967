//! Property tests for record protection.
//!
//! 1. **Round-trip**: what one side seals the other opens, for every suite
//! 2. **Split input**: sealing `head ++ tail` equals sealing the joined slice
//! 3. **Tamper detection**: any flipped bit of ciphertext, tag or record
//!    header fails and releases nothing
//! 4. **Sequence**: each call advances the sequence number exactly once

use proptest::prelude::*;
use reactls::tls::cipher::TAG_LEN;
use reactls::{CipherSuite, ErrorKind, RecordCryptor};

fn pair(suite: CipherSuite, key_byte: u8) -> (RecordCryptor, RecordCryptor) {
    let key = vec![key_byte; suite.key_len()];
    let iv = [key_byte ^ 0x5a; 12];

    let mut sender = RecordCryptor::new();
    sender.set_cipher_suite(suite);
    sender.set_sender_key(&key, iv).expect("sender key");

    let mut receiver = RecordCryptor::new();
    receiver.set_cipher_suite(suite);
    receiver.set_receiver_key(&key, iv).expect("receiver key");

    (sender, receiver)
}

fn suite_strategy() -> impl Strategy<Value = CipherSuite> {
    prop::sample::select(CipherSuite::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sealed_records_open(
        suite in suite_strategy(),
        key_byte in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 0..=16_384),
        aad in prop::array::uniform5(any::<u8>()),
    ) {
        let (mut sender, mut receiver) = pair(suite, key_byte);

        let mut ciphertext = vec![0u8; payload.len()];
        let mut tag = [0u8; TAG_LEN];
        let written = sender.encrypt(&payload, &aad, &mut ciphertext, &mut tag).unwrap();
        prop_assert_eq!(written, payload.len());

        let mut plaintext = vec![0u8; payload.len()];
        let read = receiver.decrypt(&ciphertext, &aad, &tag, &mut plaintext).unwrap();
        prop_assert_eq!(read, payload.len());
        prop_assert_eq!(plaintext, payload);
    }

    #[test]
    fn split_input_matches_joined(
        suite in suite_strategy(),
        payload in prop::collection::vec(any::<u8>(), 1..=2048),
        split in any::<prop::sample::Index>(),
    ) {
        let (mut joined, _) = pair(suite, 7);
        let (mut parted, _) = pair(suite, 7);
        let at = split.index(payload.len());

        let mut first = vec![0u8; payload.len()];
        let mut first_tag = [0u8; TAG_LEN];
        joined.encrypt(&payload, b"aad", &mut first, &mut first_tag).unwrap();

        let mut second = vec![0u8; payload.len()];
        let mut second_tag = [0u8; TAG_LEN];
        parted
            .encrypt2(&payload[..at], &payload[at..], b"aad", &mut second, &mut second_tag)
            .unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(first_tag, second_tag);
    }

    #[test]
    fn flipped_bits_are_rejected(
        suite in suite_strategy(),
        payload in prop::collection::vec(any::<u8>(), 1..=512),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let (mut sender, mut receiver) = pair(suite, 3);

        let mut sealed = vec![0u8; payload.len()];
        let mut tag = [0u8; TAG_LEN];
        sender.encrypt(&payload, &[23, 3, 3, 0, 0], &mut sealed, &mut tag).unwrap();

        // Flip a bit in either the ciphertext or the tag.
        let index = position.index(sealed.len() + TAG_LEN);
        if index < sealed.len() {
            sealed[index] ^= 1 << bit;
        } else {
            tag[index - sealed.len()] ^= 1 << bit;
        }

        let mut plaintext = vec![0xffu8; payload.len()];
        let err = receiver.decrypt(&sealed, &[23, 3, 3, 0, 0], &tag, &mut plaintext).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Authentication);
        prop_assert!(plaintext.iter().all(|&b| b == 0));
        prop_assert_eq!(receiver.receiver_sequence(), Some(1));
    }

    #[test]
    fn flipped_header_bits_are_rejected(
        suite in suite_strategy(),
        payload in prop::collection::vec(any::<u8>(), 1..=512),
        position in 0usize..5,
        bit in 0u8..8,
    ) {
        let (mut sender, mut receiver) = pair(suite, 5);
        let header = [23u8, 3, 3, 0, 0];

        let mut sealed = vec![0u8; payload.len()];
        let mut tag = [0u8; TAG_LEN];
        sender.encrypt(&payload, &header, &mut sealed, &mut tag).unwrap();

        let mut tampered = header;
        tampered[position] ^= 1 << bit;

        let mut plaintext = vec![0xffu8; payload.len()];
        let err = receiver.decrypt(&sealed, &tampered, &tag, &mut plaintext).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Authentication);
        prop_assert!(plaintext.iter().all(|&b| b == 0));
    }
}

#[test]
fn sequence_advances_once_per_record() {
    let (mut sender, mut receiver) = pair(CipherSuite::Chacha20Poly1305Sha256, 9);
    let mut records = Vec::new();

    for index in 0u8..5 {
        let payload = [0x42u8; 10];
        let mut sealed = [0u8; 10];
        let mut tag = [0u8; TAG_LEN];
        sender.encrypt(&payload, &[], &mut sealed, &mut tag).unwrap();
        records.push((sealed, tag));
        assert_eq!(sender.sender_sequence(), Some(u64::from(index) + 1));
    }

    // Same payload under a new sequence number gives new ciphertext.
    assert_ne!(records[0].0, records[1].0);

    let mut out = [0u8; 10];
    receiver.decrypt(&records[0].0, &[], &records[0].1, &mut out).unwrap();
    assert_eq!(out, [0x42u8; 10]);

    // Out of order records fail and still use up a sequence number.
    assert!(receiver.decrypt(&records[2].0, &[], &records[2].1, &mut out).is_err());
    assert!(receiver.decrypt(&records[1].0, &[], &records[1].1, &mut out).is_err());
    assert_eq!(receiver.receiver_sequence(), Some(3));
}
