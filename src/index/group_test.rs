use std::convert::TryInto;
use std::sync::Arc;

use super::*;
use crate::datastore::bank::Bank;
use crate::datastore::Datastore;
use crate::index::rbtree::RbTreeIndex;
use crate::metadata::MetaFlags;

fn u32_cmp(a: &[u8], b: &[u8]) -> i32 {
    let a = u32::from_ne_bytes(a.try_into().unwrap());
    let b = u32::from_ne_bytes(b.try_into().unwrap());
    a.cmp(&b) as i32
}

#[test]
fn test_group_fans_out_and_checks_ident() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 4, MetaFlags::none()).unwrap());
    let idx1 = Arc::new(
        RbTreeIndex::new(1, 100, ds.clone(), Arc::new(u32_cmp), None, None, true).unwrap(),
    );
    let idx2 = Arc::new(
        RbTreeIndex::new(1, 101, ds.clone(), Arc::new(u32_cmp), None, None, true).unwrap(),
    );
    let group = IndexGroup::new(1);
    group.add_member(Member::Index(idx1.clone())).unwrap();
    group.add_member(Member::Index(idx2.clone())).unwrap();

    let addr = ds.add(&10u32.to_ne_bytes()).unwrap();
    group.add_data_v(addr, 1).unwrap();
    assert_eq!(idx1.count(), 1);
    assert_eq!(idx2.count(), 1);

    let other_group = IndexGroup::new(2);
    assert!(other_group.add_member(Member::Index(idx1.clone())).is_err());
}

#[test]
fn test_query_unions_across_members() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let idx1 = Arc::new(
        RbTreeIndex::new(1, 100, ds.clone(), Arc::new(u32_cmp), None, None, true).unwrap(),
    );
    let idx2 = Arc::new(
        RbTreeIndex::new(1, 101, ds.clone(), Arc::new(u32_cmp), None, None, true).unwrap(),
    );
    let group = IndexGroup::new(1);
    group.add_member(Member::Index(idx1.clone())).unwrap();
    group.add_member(Member::Index(idx2.clone())).unwrap();

    for n in [1u32, 2, 3, 4] {
        let addr = ds.add(&n.to_ne_bytes()).unwrap();
        idx1.add_data_v(addr, 1).unwrap();
        if n % 2 == 0 {
            idx2.add_data_v(addr, 1).unwrap();
        }
    }

    let even = Arc::new(|bytes: &[u8]| u32::from_ne_bytes(bytes.try_into().unwrap()) % 2 == 0);
    let hits = group.query(&even);
    // idx1 holds {2,4} matching, idx2 holds {2,4} matching: union repeats.
    assert_eq!(hits.len(), 4);
}

#[test]
fn test_add_data_accepts_a_handle() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 4, MetaFlags::none()).unwrap());
    let idx = Arc::new(
        RbTreeIndex::new(1, 100, ds.clone(), Arc::new(u32_cmp), None, None, true).unwrap(),
    );
    let group = IndexGroup::new(1);
    group.add_member(Member::Index(idx.clone())).unwrap();

    let addr = ds.add(&5u32.to_ne_bytes()).unwrap();
    group.add_data(Handle { ident: 1, addr }).unwrap();
    assert_eq!(idx.count(), 1);

    // A handle carrying the wrong ident declines silently, same as
    // add_data_v.
    group.add_data(Handle { ident: 2, addr }).unwrap();
    assert_eq!(idx.count(), 1);
}

#[test]
fn test_flatten_transitive() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 4, MetaFlags::none()).unwrap());
    let idx1 = Arc::new(
        RbTreeIndex::new(1, 100, ds.clone(), Arc::new(u32_cmp), None, None, true).unwrap(),
    );
    let inner = Arc::new(IndexGroup::new(1));
    inner.add_member(Member::Index(idx1.clone())).unwrap();
    let outer = IndexGroup::new(1);
    outer.add_member(Member::Group(inner)).unwrap();

    let leaves = outer.flatten();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].luid(), 100);
}
