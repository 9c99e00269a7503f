//! Allocation quota accounting for quota-metered containers.
//!
//! This package provides [`MemoryQuota`], a byte-count ledger shared by every
//! container that allocates against the same budget. The ledger enforces a
//! single ceiling through an open/close accounting protocol:
//!
//! - [`open_account()`][MemoryQuota::open_account] establishes a ceiling and
//!   mints a capability key; only one account can be open at a time.
//! - While the account is open, containers charge bytes before allocating and
//!   release them when storage is freed; a charge that would exceed the ceiling
//!   fails without mutating the ledger.
//! - [`close_account()`][MemoryQuota::close_account] requires the minted key,
//!   preventing an unrelated call site from tearing down someone else's budget.
//!
//! With no account open the ledger is effectively unlimited, so code paths that
//! never open an account keep working unmetered.
//!
//! The ledger is deliberately single-threaded: containers share it through
//! [`std::rc::Rc`] and the caller serializes any cross-thread use, per the
//! resource model of the container packages.
//!
//! # Examples
//!
//! ```rust
//! use mem_quota::MemoryQuota;
//!
//! let quota = MemoryQuota::new();
//!
//! let key = quota.open_account(1024).unwrap();
//!
//! quota.charge(512).unwrap();
//! assert_eq!(quota.used_bytes(), 512);
//!
//! // Exceeding the ceiling fails without mutating the ledger.
//! assert!(quota.charge(1024).is_err());
//! assert_eq!(quota.used_bytes(), 512);
//!
//! quota.release(512);
//! quota.close_account(key).unwrap();
//! ```

mod quota;

pub use quota::{AccountKey, MemoryQuota};

use thiserror::Error;

/// Errors surfaced by the quota ledger.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// An account is already open; only one accounting session may exist at a time.
    #[error("a quota account is already open; close it before opening another")]
    AccountAlreadyOpen,

    /// The supplied key does not match the key minted when the account was opened.
    #[error("the supplied key does not match the open quota account")]
    KeyMismatch,

    /// A charge would push usage past the account ceiling.
    #[error("quota exhausted: requested {requested} bytes with {used} of {limit} bytes in use")]
    Exhausted {
        /// Bytes the failed charge asked for.
        requested: usize,

        /// Bytes in use at the time of the failed charge.
        used: usize,

        /// The ceiling of the open account.
        limit: usize,
    },
}

/// A specialized `Result` type for quota operations, returning the crate's
/// [`QuotaError`] type as the error value.
pub type Result<T> = std::result::Result<T, QuotaError>;
