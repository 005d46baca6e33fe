// tests/property/roundtrip_test.rs

//! Property-based tests for cache and lock roundtrips
//! Tests that stored values come back unchanged and that lock records only
//! ever leave the store through their holder.

use crate::test_helpers::{FakeStore, open_cache, open_lock};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use spinelkv::{Cache, Lock};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    name: String,
    count: i64,
    ratio: Option<u32>,
    labels: BTreeMap<String, String>,
}

fn record_strategy() -> impl Strategy<Value = Record> {
    (
        ".{0,200}",
        any::<i64>(),
        proptest::option::of(any::<u32>()),
        proptest::collection::btree_map("[a-z]{1,8}", ".{0,32}", 0..8),
    )
        .prop_map(|(name, count, ratio, labels)| Record {
            name,
            count,
            ratio,
            labels,
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_store_retrieve_string_roundtrip(
        key in "[a-zA-Z0-9_:.-]{1,100}",
        value in ".{0,5000}"
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = FakeStore::start().await;
            let cache = open_cache(&store).await;

            let stored = cache.store(&key, value.clone(), 10_000).await.unwrap();
            assert_eq!(stored.as_deref(), Some(value.as_str()));

            let retrieved: Option<String> = cache.retrieve(&key).await.unwrap();
            assert_eq!(retrieved, Some(value));
        });
    }

    #[test]
    fn test_store_retrieve_struct_roundtrip(
        key in "[a-zA-Z0-9_]{1,50}",
        record in record_strategy()
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = FakeStore::start().await;
            let cache = open_cache(&store).await;

            cache.store(&key, record.clone(), 10_000).await.unwrap();
            let retrieved: Option<Record> = cache.retrieve(&key).await.unwrap();
            assert_eq!(retrieved, Some(record));
        });
    }

    #[test]
    fn test_remove_always_leaves_key_absent(
        key in "[a-zA-Z0-9_]{1,50}",
        present in any::<bool>()
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = FakeStore::start().await;
            let cache = open_cache(&store).await;

            if present {
                cache.store(&key, 1u8, 10_000).await.unwrap();
            }
            cache.remove(&key).await.unwrap();
            let retrieved: Option<u8> = cache.retrieve(&key).await.unwrap();
            assert_eq!(retrieved, None);
        });
    }

    #[test]
    fn test_lock_released_only_by_holder(
        key in "[a-zA-Z0-9_:-]{1,50}",
        holder_index in 0usize..3
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = FakeStore::start().await;
            let mut locks = Vec::new();
            for _ in 0..3 {
                locks.push(open_lock(&store).await);
            }

            assert!(locks[holder_index].try_acquire(&key, 10_000).await.unwrap());
            for (i, lock) in locks.iter().enumerate() {
                if i != holder_index {
                    assert!(!lock.try_acquire(&key, 10_000).await.unwrap());
                    assert!(!lock.release(&key).await.unwrap());
                }
            }
            let holder = &locks[holder_index];
            assert_eq!(store.raw(&key).unwrap(), holder.token().as_bytes());
            assert!(holder.release(&key).await.unwrap());
            assert!(store.raw(&key).is_none());
        });
    }
}
