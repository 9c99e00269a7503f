//! End-to-end accounting: several containers sharing one ledger under an
//! open account, across both heap implementations.

use std::rc::Rc;

use mem_quota::MemoryQuota;
use metered_vec::{Error, MeteredVec};
use raw_heap::SystemHeap;

#[test]
fn account_lifecycle_with_shared_ledger() {
    let quota = Rc::new(MemoryQuota::new());
    let key = quota.open_account(1024).unwrap();

    let mut a = MeteredVec::<u64>::with_len(Rc::clone(&quota), 16).unwrap();
    let b = MeteredVec::<u32, _>::with_len_in(Rc::clone(&quota), 32, SystemHeap).unwrap();

    // Both containers charge the same ledger regardless of heap.
    assert_eq!(
        quota.used_bytes(),
        16 * size_of::<u64>() + 32 * size_of::<u32>()
    );

    // 1024 - 128 - 128 = 768 bytes of headroom; 128 u64 will not fit.
    assert_eq!(a.resize(16 + 128), Err(Error::MemoryExhausted));
    assert_eq!(a.len(), 16);

    drop(a);
    drop(b);
    assert_eq!(quota.used_bytes(), 0);

    quota.close_account(key).unwrap();
    assert!(!quota.is_account_open());
}

#[test]
fn push_then_trim_settles_to_exact_usage() {
    let quota = Rc::new(MemoryQuota::new());
    let key = quota.open_account(64 * 1024).unwrap();

    let mut values = MeteredVec::<u64>::new(Rc::clone(&quota));
    for i in 0..1000 {
        values.push(i).unwrap();
    }

    // Growth overshoots; the ledger tracks capacity, not length.
    assert!(values.capacity() > 1000);
    assert_eq!(
        quota.used_bytes(),
        values.capacity() * size_of::<u64>()
    );

    values.trim().unwrap();

    assert_eq!(values.capacity(), 1000);
    assert_eq!(quota.used_bytes(), 1000 * size_of::<u64>());

    drop(values);
    quota.close_account(key).unwrap();
}

#[test]
fn push_erase_trim_lifecycle_settles_on_the_system_heap() {
    let quota = Rc::new(MemoryQuota::new());

    let mut values = MeteredVec::<u64, _>::new_in(Rc::clone(&quota), SystemHeap);
    for v in [5, 7, 9] {
        values.push(v).unwrap();
    }
    assert_eq!(values.capacity(), 4);

    values.erase(0, 1).unwrap();
    assert_eq!(values.as_slice(), &[7, 9]);

    values.trim().unwrap();
    assert_eq!(values.capacity(), 2);
    assert_eq!(quota.used_bytes(), 2 * size_of::<u64>());
}

#[test]
fn failed_growth_leaves_every_container_intact() {
    let quota = Rc::new(MemoryQuota::new());
    let _key = quota.open_account(100).unwrap();

    let mut a = MeteredVec::<u8>::with_len(Rc::clone(&quota), 60).unwrap();
    let mut b = MeteredVec::<u8>::with_len(Rc::clone(&quota), 30).unwrap();

    // 10 bytes of headroom left on the account.
    assert_eq!(b.reserve(60), Err(Error::MemoryExhausted));
    assert_eq!(b.capacity(), 30);
    assert_eq!(quota.used_bytes(), 90);

    // The headroom is still usable afterwards.
    a.reserve(70).unwrap();
    assert_eq!(quota.used_bytes(), 100);
}
