use std::convert::TryInto;
use std::sync::Arc;

use odb::datastore::bank::Bank;
use odb::datastore::Datastore;
use odb::index::{Comparator, Index};
use odb::{IndexKind, IndexSpec, MetaFlags, Odb, OdbConfig};

fn as_i32(bytes: &[u8]) -> i32 {
    i32::from_ne_bytes(bytes.try_into().unwrap())
}

fn i32_cmp() -> Comparator {
    Arc::new(|a: &[u8], b: &[u8]| as_i32(a).cmp(&as_i32(b)) as i32)
}

fn clone_values(clone: &Odb) -> Vec<i32> {
    let mut v: Vec<i32> = clone
        .it_first()
        .into_iter()
        .map(|(addr, len)| as_i32(unsafe { addr.as_slice(len) }))
        .collect();
    v.sort_unstable();
    v
}

#[test]
fn query_returns_a_clone_holding_only_the_matches() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let odb = Odb::new(ds, OdbConfig::default());
    let by_value = odb
        .create_index(IndexSpec::new(IndexKind::RbTree, i32_cmp()))
        .unwrap();
    for n in [-4i32, -2, 0, 2, 4] {
        odb.add_data(&n.to_ne_bytes(), true).unwrap();
    }
    assert_eq!(by_value.count(), 5);

    let negatives = odb
        .query(&by_value, Arc::new(|bytes: &[u8]| as_i32(bytes) < 0))
        .unwrap();

    assert_eq!(clone_values(&negatives), vec![-4, -2]);
}

#[test]
fn mutating_an_original_record_is_observed_through_the_clone() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let odb = Odb::new(ds, OdbConfig::default());
    let by_value = odb
        .create_index(IndexSpec::new(IndexKind::RbTree, i32_cmp()))
        .unwrap();
    for n in [-4i32, -2, 0, 2, 4] {
        odb.add_data(&n.to_ne_bytes(), true).unwrap();
    }

    let negatives = odb
        .query(&by_value, Arc::new(|bytes: &[u8]| as_i32(bytes) < 0))
        .unwrap();
    assert_eq!(clone_values(&negatives), vec![-4, -2]);

    // The clone stores pointers into the parent's own records, so a
    // mutation made through the parent's address space must show up the
    // next time the clone is iterated (spec "Parent/clone relation").
    let original_addr = odb
        .it_first()
        .into_iter()
        .find(|(addr, len)| as_i32(unsafe { addr.as_slice(*len) }) == -4)
        .map(|(addr, _)| addr)
        .expect("the -4 record must still be live in the parent");
    unsafe {
        original_addr.as_slice_mut(4).copy_from_slice(&(-100i32).to_ne_bytes());
    }

    assert_eq!(clone_values(&negatives), vec![-100, -2]);
}

#[test]
fn a_clone_has_its_own_ident_and_starts_with_no_indexes() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let odb = Odb::new(ds, OdbConfig::default());
    let by_value = odb
        .create_index(IndexSpec::new(IndexKind::RbTree, i32_cmp()))
        .unwrap();
    odb.add_data(&1i32.to_ne_bytes(), true).unwrap();

    let clone = odb
        .query(&by_value, Arc::new(|_: &[u8]| true))
        .unwrap();

    assert_ne!(clone.ident(), odb.ident());
    assert!(clone.all().flatten().is_empty());
}

#[test]
fn a_query_that_matches_nothing_yields_an_empty_clone() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let odb = Odb::new(ds, OdbConfig::default());
    let by_value = odb
        .create_index(IndexSpec::new(IndexKind::RbTree, i32_cmp()))
        .unwrap();
    odb.add_data(&1i32.to_ne_bytes(), true).unwrap();

    let clone = odb
        .query(&by_value, Arc::new(|bytes: &[u8]| as_i32(bytes) > 1000))
        .unwrap();

    assert!(clone_values(&clone).is_empty());
}
