use std::cell::Cell;
use std::num::NonZero;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{QuotaError, Result};

/// The capability key minted when an account is opened.
///
/// Closing the account requires presenting the same key, which stops two
/// independent call sites from opening overlapping accounting sessions.
pub type AccountKey = NonZero<u64>;

/// Sentinel meaning "no account open" - the ledger behaves as unlimited.
const NO_LIMIT: usize = usize::MAX;

/// A byte-count ledger with a single-tenant account protocol.
///
/// Containers hold the ledger through `Rc<MemoryQuota>` and consult it on every
/// allocation-affecting operation: [`charge()`](Self::charge) before growing,
/// [`release()`](Self::release) after shrinking or freeing. See the crate-level
/// documentation for the protocol.
///
/// The type uses [`Cell`] internally and is therefore `!Sync`; sharing one
/// ledger across threads is the caller's problem to serialize.
#[derive(Debug, Default)]
pub struct MemoryQuota {
    /// Bytes currently attributed to live allocations across all containers
    /// sharing this ledger.
    used: Cell<usize>,

    /// The account ceiling; `NO_LIMIT` means no account is open.
    limit: Cell<usize>,

    /// The live account key; zero means closed.
    key: Cell<u64>,
}

impl MemoryQuota {
    /// Creates a ledger with no account open (unlimited).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mem_quota::MemoryQuota;
    ///
    /// let quota = MemoryQuota::new();
    /// assert!(!quota.is_account_open());
    /// assert_eq!(quota.used_bytes(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            used: Cell::new(0),
            limit: Cell::new(NO_LIMIT),
            key: Cell::new(0),
        }
    }

    /// Opens the accounting session: sets the ceiling, zeroes usage, and mints
    /// a fresh key.
    ///
    /// Fails with [`QuotaError::AccountAlreadyOpen`] if a session is already
    /// open; the existing session is left untouched.
    ///
    /// A `limit_bytes` of `usize::MAX` coincides with the internal "no account
    /// open" sentinel: such a session behaves as unlimited, is not reported by
    /// [`is_account_open()`](Self::is_account_open), and a later open can
    /// displace it. Pass a smaller ceiling for an account that must stay
    /// exclusive.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mem_quota::MemoryQuota;
    ///
    /// let quota = MemoryQuota::new();
    ///
    /// let key = quota.open_account(4096).unwrap();
    /// assert!(quota.open_account(4096).is_err());
    ///
    /// quota.close_account(key).unwrap();
    /// ```
    pub fn open_account(&self, limit_bytes: usize) -> Result<AccountKey> {
        if self.limit.get() != NO_LIMIT {
            return Err(QuotaError::AccountAlreadyOpen);
        }

        self.limit.set(limit_bytes);
        self.used.set(0);

        // The key is minted from the wall clock, re-sampled until nonzero so
        // zero can keep meaning "closed".
        let key = loop {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock reports a time before the Unix epoch")
                .as_millis();

            #[expect(
                clippy::cast_possible_truncation,
                reason = "truncating epoch milliseconds to 64 bits loses nothing for half a billion years"
            )]
            if let Some(key) = NonZero::new(millis as u64) {
                break key;
            }
        };

        self.key.set(key.get());
        Ok(key)
    }

    /// Closes the accounting session identified by `key`.
    ///
    /// Fails with [`QuotaError::KeyMismatch`] unless `key` matches the live
    /// account key. On success the ledger returns to the unlimited state with
    /// zero usage.
    pub fn close_account(&self, key: AccountKey) -> Result<()> {
        if self.key.get() != key.get() {
            return Err(QuotaError::KeyMismatch);
        }

        self.key.set(0);
        self.limit.set(NO_LIMIT);
        self.used.set(0);
        Ok(())
    }

    /// Attributes `bytes` additional bytes to the ledger.
    ///
    /// Fails with [`QuotaError::Exhausted`] - without mutating the ledger -
    /// when the charge would push usage past the ceiling. Callers charge
    /// *before* physically allocating and hand the charge back via
    /// [`release()`](Self::release) if the allocation itself fails, so a failed
    /// operation leaves the ledger exactly as it found it.
    pub fn charge(&self, bytes: usize) -> Result<()> {
        let used = self.used.get();
        let limit = self.limit.get();

        let proposed = used.checked_add(bytes).ok_or(QuotaError::Exhausted {
            requested: bytes,
            used,
            limit,
        })?;

        if proposed > limit {
            return Err(QuotaError::Exhausted {
                requested: bytes,
                used,
                limit,
            });
        }

        self.used.set(proposed);
        Ok(())
    }

    /// Returns `bytes` previously charged bytes to the ledger.
    pub fn release(&self, bytes: usize) {
        self.used.set(self.used.get().saturating_sub(bytes));
    }

    /// Bytes currently attributed to live allocations.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used.get()
    }

    /// The current ceiling; `usize::MAX` while no account is open.
    #[must_use]
    pub fn limit_bytes(&self) -> usize {
        self.limit.get()
    }

    /// Whether an accounting session is currently open.
    #[must_use]
    pub fn is_account_open(&self) -> bool {
        self.limit.get() != NO_LIMIT
    }
}
