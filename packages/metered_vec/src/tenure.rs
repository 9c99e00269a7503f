/// Who controls a container's storage.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tenure {
    /// The container allocated the storage and will reallocate and free it.
    Owned,

    /// The storage belongs to someone else; the container may read and write
    /// elements but must never reallocate, free or claim it.
    Borrowed,
}
