use super::*;
use crate::metadata::MetaFlags;

fn rec(n: u32) -> Vec<u8> {
    n.to_ne_bytes().to_vec()
}

#[test]
fn test_add_and_get_at() {
    let bank = Bank::new(4, 2, MetaFlags::none()).unwrap();
    let a0 = bank.add(&rec(10)).unwrap();
    let a1 = bank.add(&rec(20)).unwrap();
    let a2 = bank.add(&rec(30)).unwrap(); // forces a second chunk

    assert_eq!(bank.count(), 3);
    assert_eq!(bank.get_at(0).unwrap(), a0);
    assert_eq!(bank.get_at(1).unwrap(), a1);
    assert_eq!(bank.get_at(2).unwrap(), a2);
    assert!(bank.get_at(3).is_err());

    unsafe {
        assert_eq!(a0.as_slice(4), &10u32.to_ne_bytes());
        assert_eq!(a2.as_slice(4), &30u32.to_ne_bytes());
    }
}

#[test]
fn test_remove_reuses_slot() {
    let bank = Bank::new(4, 4, MetaFlags::none()).unwrap();
    let a0 = bank.add(&rec(1)).unwrap();
    bank.add(&rec(2)).unwrap();
    bank.remove_addr(a0).unwrap();

    // a second remove of the same address must fail: not found.
    assert!(bank.remove_addr(a0).is_err());

    let a2 = bank.add(&rec(3)).unwrap();
    assert_eq!(a2, a0, "freed slot should be reused by the next add");
}

#[test]
fn test_remove_at_out_of_range() {
    let bank = Bank::new(4, 4, MetaFlags::none()).unwrap();
    assert!(bank.remove_at(0).is_err());
    bank.add(&rec(1)).unwrap();
    assert!(bank.remove_at(5).is_err());
    assert!(bank.remove_at(0).is_ok());
}

#[test]
fn test_sweep_and_cleanup() {
    let bank = Bank::new(4, 4, MetaFlags::none()).unwrap();
    let addrs: Vec<_> = (0..10u32).map(|n| bank.add(&rec(n)).unwrap()).collect();

    let is_even = |bytes: &[u8]| {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        u32::from_ne_bytes(buf) % 2 == 0
    };
    let result = bank.sweep(&is_even, None).unwrap();
    assert_eq!(result.marked.len(), 5);
    assert!(result.relocated.is_none());

    bank.cleanup(&result);

    let remaining: Vec<u32> = bank
        .it_first()
        .into_iter()
        .map(|s| {
            let bytes = unsafe { s.addr.as_slice(s.len) };
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            u32::from_ne_bytes(buf)
        })
        .collect();
    let mut sorted = remaining.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 3, 5, 7, 9]);
    assert_eq!(addrs.len(), 10);
}

#[test]
fn test_purge_calls_free_hook() {
    let bank = Bank::new(4, 4, MetaFlags::none()).unwrap();
    for n in 0..6u32 {
        bank.add(&rec(n)).unwrap();
    }
    let freed = std::cell::RefCell::new(Vec::new());
    bank.purge(Some(&|addr| {
        let bytes = unsafe { addr.as_slice(4) };
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        freed.borrow_mut().push(u32::from_ne_bytes(buf));
    }));
    let mut got = freed.into_inner();
    got.sort_unstable();
    assert_eq!(got, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(bank.it_first().len(), 0);
}

#[test]
fn test_metadata_stamped() {
    let meta = MetaFlags {
        timestamp: true,
        query_count: true,
    };
    let bank = Bank::new(4, 4, meta).unwrap();
    let addr = bank.add(&rec(42)).unwrap();
    let tail = unsafe { std::slice::from_raw_parts(addr.as_ptr().add(4), meta.width()) };
    assert!(crate::metadata::read_timestamp(tail) > 0);
}
