use bffkv::{BuildError, Filter, Key};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

const MODULO: u64 = 1024;
const LABEL: u64 = 1;

fn random_pairs(rng: &mut ChaCha20Rng, n: usize) -> (Vec<Key>, Vec<u32>) {
    let keys = (0..n).map(|_| Key::new(rng.gen())).collect();
    let values = (0..n).map(|_| rng.gen_range(0..MODULO) as u32).collect();
    (keys, values)
}

/// Construction can fail for an unlucky seed; callers retry with a fresh one.
fn build_retrying(rng: &mut ChaCha20Rng, keys: &[Key], values: &[u32]) -> Filter {
    for _ in 0..16 {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        match Filter::build(&seed, keys, values, MODULO, LABEL) {
            Ok(filter) => return filter,
            Err(BuildError::ConstructionFailed) => continue,
            Err(err) => panic!("unexpected build error: {err}"),
        }
    }
    panic!("no seed produced a peelable filter");
}

#[test]
fn test_build_recovers_every_value_at_100k() {
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let (keys, values) = random_pairs(&mut rng, 100_000);
    let filter = build_retrying(&mut rng, &keys, &values);

    for (key, &value) in keys.iter().zip(&values) {
        assert_eq!(filter.recover(key), value);
    }
}

#[test]
fn test_serialized_filter_agrees_and_stays_compact() {
    let mut rng = ChaCha20Rng::seed_from_u64(2);
    let (keys, values) = random_pairs(&mut rng, 100_000);
    let filter = build_retrying(&mut rng, &keys, &values);

    let bytes = filter.to_bytes();
    assert_eq!(bytes.len(), 68 + filter.array_length() as usize * 4);

    let decoded = Filter::from_bytes(&bytes).unwrap();
    for (key, &value) in keys.iter().zip(&values) {
        let recovered = decoded.recover(key);
        assert_eq!(recovered, filter.recover(key));
        assert_eq!(recovered, value);
    }

    // log2(1024) = 10 bits of payload; the table overhead must stay under
    // two extra bits per entry at this scale.
    assert!(filter.bits_per_entry() < 12, "bits/entry = {}", filter.bits_per_entry());

    // Serializing the decoded filter reproduces the input bytes exactly.
    assert_eq!(decoded.to_bytes(), bytes);
}

#[test]
fn test_duplicate_key_is_rejected() {
    let mut rng = ChaCha20Rng::seed_from_u64(3);
    let (mut keys, values) = random_pairs(&mut rng, 100_000);
    keys[1] = keys[0];
    let err = Filter::build(&[0u8; 32], &keys, &values, MODULO, LABEL).unwrap_err();
    assert_eq!(err, BuildError::DuplicateKey);
}

#[test]
fn test_small_modulo_is_rejected() {
    let mut rng = ChaCha20Rng::seed_from_u64(4);
    let (keys, values) = random_pairs(&mut rng, 100_000);
    let err = Filter::build(&[0u8; 32], &keys, &values, 255, LABEL).unwrap_err();
    assert_eq!(err, BuildError::ModuloTooSmall);
}

#[test]
fn test_mismatched_lengths_are_rejected() {
    let mut rng = ChaCha20Rng::seed_from_u64(5);
    let (keys, mut values) = random_pairs(&mut rng, 100_000);
    values.pop();
    let err = Filter::build(&[0u8; 32], &keys, &values, MODULO, LABEL).unwrap_err();
    assert_eq!(err, BuildError::MismatchedSizes);
}

#[test]
fn test_empty_and_singleton_maps() {
    let filter = Filter::build(&[7u8; 32], &[], &[], MODULO, LABEL).unwrap();
    assert!(filter.recover(&Key::from_keyword(b"anything")) < MODULO as u32);

    let key = Key::from_keyword(b"only");
    let filter = Filter::build(&[7u8; 32], &[key], &[999], MODULO, LABEL).unwrap();
    assert_eq!(filter.recover(&key), 999);
}

#[test]
fn test_build_recovers_every_value_at_1m() {
    // Expensive; opt in the way the slower data-dependent suites do.
    if std::env::var("BFFKV_LARGE_TESTS").is_err() {
        return;
    }

    let mut rng = ChaCha20Rng::seed_from_u64(6);
    let (keys, values) = random_pairs(&mut rng, 1_000_000);
    let filter = build_retrying(&mut rng, &keys, &values);

    for (key, &value) in keys.iter().zip(&values) {
        assert_eq!(filter.recover(key), value);
    }
}
