use std::sync::Arc;

use super::*;
use crate::datastore::bank::Bank;

fn rec(n: u32) -> Vec<u8> {
    n.to_ne_bytes().to_vec()
}

#[test]
fn test_add_indirect_and_deref() {
    let parent: Arc<dyn Datastore> = Arc::new(Bank::new(4, 4, MetaFlags::none()).unwrap());
    let pa = parent.add(&rec(7)).unwrap();

    let ind = Indirect::new(parent.clone(), 4).unwrap();
    let ia = ind.add_indirect(pa).unwrap();

    let (real_addr, len) = ind.deref_addr(ia);
    assert_eq!(len, 4);
    unsafe { assert_eq!(real_addr.as_slice(len), &7u32.to_ne_bytes()) };
}

#[test]
fn test_observes_parent_mutation() {
    let parent: Arc<dyn Datastore> = Arc::new(Bank::new(4, 4, MetaFlags::none()).unwrap());
    let pa = parent.add(&rec(1)).unwrap();
    let ind = Indirect::new(parent.clone(), 4).unwrap();
    ind.add_indirect(pa).unwrap();

    unsafe { pa.as_slice_mut(4).copy_from_slice(&99u32.to_ne_bytes()) };

    let snaps = ind.it_first();
    assert_eq!(snaps.len(), 1);
    let bytes = unsafe { snaps[0].addr.as_slice(snaps[0].len) };
    assert_eq!(bytes, &99u32.to_ne_bytes());
}

#[test]
fn test_add_rejects_raw_bytes() {
    let parent: Arc<dyn Datastore> = Arc::new(Bank::new(4, 4, MetaFlags::none()).unwrap());
    let ind = Indirect::new(parent, 4).unwrap();
    assert!(ind.add(&rec(1)).is_err());
}

#[test]
fn test_remove_addr_only_drops_reference() {
    let parent: Arc<dyn Datastore> = Arc::new(Bank::new(4, 4, MetaFlags::none()).unwrap());
    let pa = parent.add(&rec(5)).unwrap();
    let ind = Indirect::new(parent.clone(), 4).unwrap();
    let ia = ind.add_indirect(pa).unwrap();

    ind.remove_addr(ia).unwrap();
    assert_eq!(ind.count(), 0);
    // the parent record itself is untouched.
    unsafe { assert_eq!(pa.as_slice(4), &5u32.to_ne_bytes()) };
}

#[test]
fn test_sweep_prunes_by_dereferenced_bytes() {
    let parent: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let ind = Indirect::new(parent.clone(), 8).unwrap();
    let addrs: Vec<_> = (0..6u32)
        .map(|n| {
            let pa = parent.add(&rec(n)).unwrap();
            ind.add_indirect(pa).unwrap()
        })
        .collect();
    assert_eq!(addrs.len(), 6);

    let is_even = |bytes: &[u8]| {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        u32::from_ne_bytes(buf) % 2 == 0
    };
    let result = ind.sweep(&is_even, None).unwrap();
    assert_eq!(result.marked.len(), 3);
    ind.cleanup(&result);
    assert_eq!(ind.count(), 3);
}

#[test]
fn test_purge_hook_sees_parent_address() {
    let parent: Arc<dyn Datastore> = Arc::new(Bank::new(4, 4, MetaFlags::none()).unwrap());
    let pa = parent.add(&rec(3)).unwrap();
    let ind = Indirect::new(parent.clone(), 4).unwrap();
    ind.add_indirect(pa).unwrap();

    let seen = std::cell::RefCell::new(Vec::new());
    ind.purge(Some(&|addr| {
        let bytes = unsafe { addr.as_slice(4) };
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        seen.borrow_mut().push(u32::from_ne_bytes(buf));
    }));
    assert_eq!(seen.into_inner(), vec![3]);
}
