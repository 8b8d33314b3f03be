//! Property tests: random operation sequences against the model, and crash
//! images of random last writes.

use mapkv_testkit::crash::{CrashRecoveryHarness, LastWrite};
use mapkv_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn store_matches_model_across_reopen(ops in operation_sequence_strategy(1, 60)) {
        let mut fixture = TestStore::new();
        let model = run_operations(&fixture, &ops);
        prop_assert_eq!(fixture.get_all(), model.entries.clone());

        fixture.reopen();
        prop_assert_eq!(fixture.get_all(), model.entries);
        prop_assert!(mapkv_core::inspect(&fixture.file_bytes()).is_clean());
    }

    #[test]
    fn wide_keys_round_trip(entries in prop::collection::hash_map(wide_key_strategy(), value_strategy(), 1..20)) {
        let mut fixture = TestStore::new();
        fixture.put_all(entries.clone()).unwrap();
        fixture.reopen();
        prop_assert_eq!(fixture.get_all(), entries);
    }

    #[test]
    fn torn_last_write_recovers_previous_state(
        ops in operation_sequence_strategy(0, 20),
        key in key_strategy(),
        value in value_strategy(),
    ) {
        let fixture = TestStore::new();
        run_operations(&fixture, &ops);
        // Operation keys never carry this prefix, so the write always appends
        let key = format!("fresh-{key}");
        let last = LastWrite::capture(&fixture, |s| s.put_value(&key, value.clone()).unwrap());
        let mut harness = CrashRecoveryHarness::new();
        harness.check_last_write(&last);
        harness.assert_all_passed();
    }
}

#[test]
fn compaction_crash_points_recover() {
    let fixture = scenarios::populated_store(200);
    for i in 0..100 {
        fixture.remove(&format!("key-{i:04}")).unwrap();
    }
    let mut harness = CrashRecoveryHarness::new();
    harness.check_compaction(&fixture);
    harness.assert_all_passed();
}

#[test]
fn fuzz_corpus_smoke() {
    let fixture = scenarios::all_types_store();
    fixture.commit().unwrap();
    let image = fixture.file_bytes();

    fuzz_inspect(&image);
    fuzz_record_parse(&image[..512.min(image.len())]);
    for cut in [0, 7, 31, 32, 40, 100] {
        fuzz_store_open(&image[..cut.min(image.len())]);
    }
    let mut flipped = image.clone();
    for i in (32..200).step_by(13) {
        flipped[i] ^= 0x5a;
    }
    fuzz_store_open(&flipped);
}
