//! End-to-end accounting: grids and vectors charging one shared ledger under
//! an open account.

use std::rc::Rc;

use mem_quota::MemoryQuota;
use metered_grid::{Error, MeteredGrid};
use metered_vec::MeteredVec;

#[test]
fn grids_and_vectors_share_one_ledger() {
    let quota = Rc::new(MemoryQuota::new());
    let key = quota.open_account(4096).unwrap();

    let grid = MeteredGrid::<u64>::with_dims(Rc::clone(&quota), 8, 8).unwrap();
    let values = MeteredVec::<u32>::with_len(Rc::clone(&quota), 64).unwrap();

    assert_eq!(
        quota.used_bytes(),
        64 * size_of::<u64>() + 64 * size_of::<u32>()
    );

    drop(grid);
    drop(values);
    assert_eq!(quota.used_bytes(), 0);

    quota.close_account(key).unwrap();
}

#[test]
fn row_growth_charges_capacity_and_trim_settles_it() {
    let quota = Rc::new(MemoryQuota::new());
    let key = quota.open_account(64 * 1024).unwrap();

    let mut grid = MeteredGrid::<u64>::with_dims(Rc::clone(&quota), 0, 4).unwrap();
    for i in 0..100 {
        grid.push_row(&[i, i, i, i]).unwrap();
    }

    // Row growth overshoots; the ledger tracks capacity, not the row count.
    assert!(grid.capacity() > 400);
    assert_eq!(quota.used_bytes(), grid.capacity() * size_of::<u64>());

    grid.trim().unwrap();

    assert_eq!(grid.capacity(), 400);
    assert_eq!(quota.used_bytes(), 400 * size_of::<u64>());

    drop(grid);
    quota.close_account(key).unwrap();
}

#[test]
fn failed_row_growth_leaves_the_grid_intact() {
    let quota = Rc::new(MemoryQuota::new());
    let _key = quota.open_account(100).unwrap();

    let mut grid = MeteredGrid::<u8>::with_dims(Rc::clone(&quota), 10, 8).unwrap();
    grid.row_mut(9).copy_from_slice(&[7; 8]);

    // 20 bytes of headroom: the next ladder rung (13 rows, 24 extra bytes)
    // will not fit.
    assert_eq!(grid.push_row(&[1; 8]), Err(Error::MemoryExhausted));

    assert_eq!(grid.rows(), 10);
    assert_eq!(grid.capacity(), 80);
    assert_eq!(grid.row(9), &[7; 8]);
    assert_eq!(quota.used_bytes(), 80);
}
