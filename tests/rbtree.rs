use std::convert::TryInto;
use std::sync::Arc;

use odb::datastore::bank::Bank;
use odb::datastore::Datastore;
use odb::index::rbtree::RbTreeIndex;
use odb::index::{Comparator, Index, Merger};
use odb::MetaFlags;

fn u32_cmp() -> Comparator {
    Arc::new(|a: &[u8], b: &[u8]| {
        let a = u32::from_ne_bytes(a.try_into().unwrap());
        let b = u32::from_ne_bytes(b.try_into().unwrap());
        a.cmp(&b) as i32
    })
}

fn bank() -> Arc<dyn Datastore> {
    Arc::new(Bank::new(4, 16, MetaFlags::none()).unwrap())
}

fn ordered_values(index: &RbTreeIndex, ds: &Arc<dyn Datastore>) -> Vec<u32> {
    let mut out = Vec::new();
    for addr in index.snapshot() {
        let (real, len) = ds.deref_addr(addr);
        let bytes = unsafe { real.as_slice(len) };
        out.push(u32::from_ne_bytes(bytes.try_into().unwrap()));
    }
    out.sort_unstable();
    out
}

#[test]
fn inserts_land_in_sorted_order() {
    let ds = bank();
    let index = RbTreeIndex::new(1, 1, ds.clone(), u32_cmp(), None, None, false).unwrap();
    for n in [9u32, 1, 5, 3, 7, 2, 8, 4, 6] {
        let addr = ds.add(&n.to_ne_bytes()).unwrap();
        index.add_data_v(addr, 1).unwrap();
    }
    assert_eq!(index.count(), 9);
    assert_eq!(ordered_values(&index, &ds), (1..=9).collect::<Vec<_>>());
    assert!(index.rbt_verify() > 0);
}

#[test]
fn embedded_duplicates_all_survive_without_a_merger() {
    let ds = bank();
    let index = RbTreeIndex::new(1, 1, ds.clone(), u32_cmp(), None, None, false).unwrap();
    for _ in 0..5 {
        let addr = ds.add(&42u32.to_ne_bytes()).unwrap();
        index.add_data_v(addr, 1).unwrap();
    }
    assert_eq!(index.count(), 5);
}

#[test]
fn drop_duplicates_keeps_exactly_one() {
    let ds = bank();
    let index = RbTreeIndex::new(1, 1, ds.clone(), u32_cmp(), None, None, true).unwrap();
    for _ in 0..5 {
        let addr = ds.add(&42u32.to_ne_bytes()).unwrap();
        index.add_data_v(addr, 1).unwrap();
    }
    assert_eq!(index.count(), 1);
}

#[test]
fn merger_replaces_the_kept_duplicate() {
    let ds = bank();
    let replace_with_newest: Merger = Arc::new(|newest, _oldest| newest);
    let index = RbTreeIndex::new(
        1,
        1,
        ds.clone(),
        u32_cmp(),
        None,
        Some(replace_with_newest),
        false,
    )
    .unwrap();
    let first = ds.add(&42u32.to_ne_bytes()).unwrap();
    index.add_data_v(first, 1).unwrap();
    let second = ds.add(&42u32.to_ne_bytes()).unwrap();
    index.add_data_v(second, 1).unwrap();
    assert_eq!(index.count(), 1);
    assert_eq!(index.snapshot(), vec![second]);
}

#[test]
fn merger_and_drop_duplicates_are_mutually_exclusive() {
    let ds = bank();
    let merger: Merger = Arc::new(|_new, old| old);
    let err = RbTreeIndex::new(1, 1, ds, u32_cmp(), None, Some(merger), true).unwrap_err();
    assert!(format!("{}", err).contains("mutually exclusive"));
}

#[test]
fn remove_sweep_prunes_marked_addresses_only() {
    let ds = bank();
    let index = RbTreeIndex::new(1, 1, ds.clone(), u32_cmp(), None, None, false).unwrap();
    let mut addrs = Vec::new();
    for n in 0..6u32 {
        let addr = ds.add(&n.to_ne_bytes()).unwrap();
        index.add_data_v(addr, 1).unwrap();
        addrs.push(addr);
    }
    let mut marked: Vec<_> = addrs.iter().step_by(2).copied().collect();
    marked.sort_unstable();
    index.remove_sweep(&marked);
    assert_eq!(index.count(), 3);
    assert_eq!(ordered_values(&index, &ds), vec![1, 3, 5]);
}

#[test]
fn a_caller_with_the_wrong_ident_is_silently_declined() {
    let ds = bank();
    let index = RbTreeIndex::new(7, 1, ds.clone(), u32_cmp(), None, None, false).unwrap();
    let addr = ds.add(&1u32.to_ne_bytes()).unwrap();
    index.add_data_v(addr, 99).unwrap();
    assert_eq!(index.count(), 0);
}
