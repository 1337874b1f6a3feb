//! Property-based tests for lshdb.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Hashing is a pure function of the coefficients and the vector
//! - Keys stay inside their tables and outside the reserved token range
//! - FORMAT2 streams round-trip, and every proper prefix is rejected
//! - A row never holds more entries than its cap, so it always fits on disk
//! - The ascending-ID rule holds for any insert sequence

use lshdb::hash::{product_mod_prime, BucketChainStore, HashFunctionFamily, UH_PRIME_DEFAULT};
use lshdb::persistence::format2;
use lshdb::{HashComposition, LshError, LshIndex, LshParams};
use proptest::prelude::*;
use std::io::Cursor;

prop_compose! {
    fn arb_vector(dim: usize)(vec in prop::collection::vec(-100.0f32..100.0, dim)) -> Vec<f32> {
        vec
    }
}

fn arb_composition() -> impl Strategy<Value = HashComposition> {
    prop_oneof![
        Just(HashComposition::Independent),
        Just(HashComposition::Pairwise),
        Just(HashComposition::Direct),
    ]
}

/// Inserts as `(table, row, t2, point)` against a 2 x 16 store.
fn arb_inserts() -> impl Strategy<Value = Vec<(usize, u32, u32, u32)>> {
    prop::collection::vec((0usize..2, 0u32..16, 0u32..40, 0u32..1000), 0..200)
}

mod hashing_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn hashing_is_deterministic(
            seed in any::<u64>(),
            composition in arb_composition(),
            v in arb_vector(10),
        ) {
            let params = LshParams::new(2.0, 4, 3, 10)
                .with_rows(997, 10)
                .with_composition(composition)
                .with_seed(seed)
                .validate()
                .unwrap();
            let a = HashFunctionFamily::new(&params);
            let b = HashFunctionFamily::new(&params);
            let keys = a.hash_keys(&v).unwrap();
            prop_assert_eq!(&keys, &a.hash_keys(&v).unwrap());
            prop_assert_eq!(&keys, &b.hash_keys(&v).unwrap());
            for key in keys {
                prop_assert!(key.t1 < 997);
                prop_assert!((key.t2 as u64) < UH_PRIME_DEFAULT);
                prop_assert!(key.t2 < format2::RESERVED_MIN);
            }
        }

        #[test]
        fn fold_matches_wide_arithmetic(
            pairs in prop::collection::vec((any::<u32>(), 1u32..=(1 << 29)), 0..64),
        ) {
            let (a, b): (Vec<u32>, Vec<u32>) = pairs.into_iter().unzip();
            let exact = a
                .iter()
                .zip(&b)
                .map(|(&x, &y)| x as u128 * y as u128)
                .sum::<u128>()
                % UH_PRIME_DEFAULT as u128;
            prop_assert_eq!(product_mod_prime(&a, &b) as u128, exact);
        }
    }
}

mod store_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn format2_round_trip(inserts in arb_inserts()) {
            let mut store = BucketChainStore::new(2, 16, 8, true);
            for &(j, y, t2, p) in &inserts {
                store.insert(j, y, t2, p);
            }
            let mut buf = Vec::new();
            format2::write_tables(&mut buf, &store).unwrap();

            let mut back = BucketChainStore::new(2, 16, 8, true);
            format2::read_tables(Cursor::new(&buf), &mut back).unwrap();
            for j in 0..2 {
                for y in 0..16 {
                    let want = store.row(j, y).map(|r| r.buckets().to_vec()).unwrap_or_default();
                    let got = back.row(j, y).map(|r| r.buckets().to_vec()).unwrap_or_default();
                    prop_assert_eq!(want, got);
                }
            }
        }

        #[test]
        fn format2_prefix_rejected(inserts in arb_inserts(), cut in any::<prop::sample::Index>()) {
            let mut store = BucketChainStore::new(2, 16, 8, true);
            for &(j, y, t2, p) in &inserts {
                store.insert(j, y, t2, p);
            }
            let mut buf = Vec::new();
            format2::write_tables(&mut buf, &store).unwrap();
            let cut = cut.index(buf.len());

            let mut back = BucketChainStore::new(2, 16, 8, true);
            let result = format2::read_tables(Cursor::new(&buf[..cut]), &mut back);
            prop_assert!(matches!(result, Err(LshError::Format(_))));
        }

        #[test]
        fn collision_cap_holds(keys in prop::collection::vec(any::<u32>(), 0..50), cap in 1u32..12) {
            let mut store = BucketChainStore::new(1, 1, cap, true);
            for (p, &t2) in keys.iter().enumerate() {
                store.insert(0, 0, t2, p as u32);
            }
            let kept = store.row(0, 0).map_or(0, |r| r.buckets().iter().map(|b| b.points().len()).sum::<usize>());
            prop_assert_eq!(kept, keys.len().min(cap as usize));
            prop_assert_eq!(store.row(0, 0).map_or(0, |r| r.collision_count()) as usize, kept);
            let saturated = store.row(0, 0).is_some_and(|r| r.is_saturated());
            prop_assert_eq!(saturated, keys.len() > cap as usize);
            prop_assert_eq!(store.overfull_row(cap), None);
        }
    }
}

mod index_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn only_ascending_ids_accepted(ids in prop::collection::vec(0u32..50, 1..30)) {
            let mut index = LshIndex::new(LshParams::new(1.0, 3, 3, 4).with_rows(64, 4).with_seed(1)).unwrap();
            let mut max: Option<u32> = None;
            for id in ids {
                let result = index.insert_point(&[0.5; 4], id);
                if max.map_or(true, |m| id > m) {
                    prop_assert!(result.is_ok());
                    max = Some(id);
                } else {
                    let is_ordering_violation = matches!(result, Err(LshError::OrderingViolation { .. }));
                    prop_assert!(is_ordering_violation);
                }
                prop_assert_eq!(index.max_point(), max);
            }
        }

        #[test]
        fn inserted_point_always_found(v in arb_vector(6), id in 0u32..1_000_000) {
            let mut index = LshIndex::new(LshParams::new(4.0, 4, 3, 6).with_rows(512, 10).with_seed(3)).unwrap();
            index.insert_point(&v, id).unwrap();
            let mut hits = 0;
            index.retrieve_point(&v, 0, |h| {
                if h.point_id == id {
                    hits += 1;
                }
            }).unwrap();
            prop_assert_eq!(hits, index.num_tables());
        }
    }
}
