//! Hot cache admission, hits, and heat-ordered eviction.

use crate::cache::HotCache;

#[test]
fn insert_then_get_hits() {
    let cache = HotCache::new(8);
    cache.insert(b"k".to_vec(), b"v".to_vec(), 12.0);

    assert_eq!(cache.get(b"k"), Some(b"v".to_vec()));
    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.misses(), 0);
}

#[test]
fn get_miss_is_counted() {
    let cache = HotCache::new(8);
    assert_eq!(cache.get(b"absent"), None);
    assert_eq!(cache.misses(), 1);
}

#[test]
fn hit_refreshes_usage_stats() {
    let cache = HotCache::new(8);
    cache.insert(b"k".to_vec(), b"v".to_vec(), 5.0);

    let before = cache.peek(b"k").unwrap();
    assert_eq!(before.access_count, 0);

    cache.get(b"k");
    cache.get(b"k");

    let after = cache.peek(b"k").unwrap();
    assert_eq!(after.access_count, 2);
    assert!(after.last_access >= before.last_access);
}

#[test]
fn full_cache_evicts_lowest_heat() {
    let cache = HotCache::new(3);
    cache.insert(b"a".to_vec(), b"1".to_vec(), 30.0);
    cache.insert(b"b".to_vec(), b"2".to_vec(), 10.0);
    cache.insert(b"c".to_vec(), b"3".to_vec(), 20.0);

    cache.insert(b"d".to_vec(), b"4".to_vec(), 40.0);

    assert_eq!(cache.len(), 3);
    assert!(cache.peek(b"b").is_none(), "lowest-heat entry must go");
    assert!(cache.peek(b"a").is_some());
    assert!(cache.peek(b"c").is_some());
    assert!(cache.peek(b"d").is_some());
}

#[test]
fn heat_ties_evict_the_oldest() {
    let cache = HotCache::new(2);
    cache.insert(b"old".to_vec(), b"1".to_vec(), 10.0);
    // A measurably later insert with identical heat.
    std::thread::sleep(std::time::Duration::from_millis(2));
    cache.insert(b"new".to_vec(), b"2".to_vec(), 10.0);
    std::thread::sleep(std::time::Duration::from_millis(2));

    cache.insert(b"third".to_vec(), b"3".to_vec(), 10.0);

    assert!(cache.peek(b"old").is_none(), "tie must break by oldest access");
    assert!(cache.peek(b"new").is_some());
    assert!(cache.peek(b"third").is_some());
}

#[test]
fn reinsert_refreshes_instead_of_evicting() {
    let cache = HotCache::new(2);
    cache.insert(b"a".to_vec(), b"1".to_vec(), 10.0);
    cache.insert(b"b".to_vec(), b"2".to_vec(), 20.0);

    // Refreshing an existing key must not evict anyone.
    cache.insert(b"a".to_vec(), b"1-new".to_vec(), 15.0);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(b"a"), Some(b"1-new".to_vec()));
    assert_eq!(cache.get(b"b"), Some(b"2".to_vec()));
}

#[test]
fn remove_invalidates_stale_values() {
    let cache = HotCache::new(4);
    cache.insert(b"k".to_vec(), b"old".to_vec(), 10.0);
    cache.remove(b"k");
    assert_eq!(cache.get(b"k"), None);
}

#[test]
fn zero_capacity_disables_caching() {
    let cache = HotCache::new(0);
    cache.insert(b"k".to_vec(), b"v".to_vec(), 100.0);
    assert!(cache.is_empty());
    assert_eq!(cache.get(b"k"), None);
}

#[test]
fn clear_empties_the_cache() {
    let cache = HotCache::new(4);
    for i in 0..4u8 {
        cache.insert(vec![i], vec![i], f64::from(i));
    }
    assert_eq!(cache.len(), 4);
    cache.clear();
    assert!(cache.is_empty());
}
