use std::result;

/// Alias for results produced by this crate.
pub type Result<T, E = Error> = result::Result<T, E>;

/// Errors surfaced by store operations.
///
/// Backend (LMDB) failures are passed through untouched in
/// [`Error::Backend`]; everything else belongs to the store's own
/// taxonomy. [`Error::code`] projects both onto the stable integer
/// domain used by embedders that carry statuses across a non-Rust
/// boundary.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An argument failed validation, or a pointer's kind tag does not
    /// match the entity kind the operation expects.
    #[error("invalid parameter")]
    InvalidParam,

    /// A member name is empty or longer than
    /// [`MAX_MEMBER_NAME_LEN`](crate::MAX_MEMBER_NAME_LEN).
    #[error("member name length out of range")]
    MemberTooLong,

    /// The pointer has no membership row; the entity does not exist.
    #[error("entity not found")]
    EntityNotFound,

    /// A payload row exists for a name outside the membership set.
    #[error("ghost member detected")]
    GhostMember,

    /// A pointer string is not 34 hex characters.
    #[error("malformed pointer string")]
    InvalidPointer,

    /// The caller-supplied buffer cannot hold the result.
    #[error("result buffer too small")]
    BufferTooSmall,

    /// The host could not provide memory or another resource.
    #[error("allocation failed")]
    AllocationFailed,

    /// The member has no payload row.
    #[error("member not found")]
    MemberNotFound,

    /// `register` was called for a pointer that already exists.
    #[error("entity already exists")]
    EntityExists,

    /// A pointer's kind tag names a different entity kind.
    #[error("entity type mismatch")]
    EntityTypeMismatch,

    /// The member name is already registered.
    #[error("member already exists")]
    MemberExists,

    /// The member is registered but carries no value.
    #[error("member value missing")]
    MemberMissing,

    /// A write operation was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnlyTxn,

    /// A read-only transaction was used as a nested-transaction parent.
    #[error("read-only transaction cannot be a parent")]
    ReadOnlyParent,

    /// A required pointer argument was absent.
    #[error("null pointer")]
    NullPointer,

    /// Root initialization named a pointer different from the
    /// registered root.
    #[error("different root already registered")]
    RootMismatch,

    /// An error reported by the LMDB backend, unchanged.
    #[error(transparent)]
    Backend(#[from] heed::Error),
}

impl Error {
    /// Returns the stable integer code for this error.
    ///
    /// Store-domain errors map to the negative `-320xx` band; LMDB
    /// errors keep their native code and I/O errors keep the OS errno.
    /// Remaining backend conditions (codec and open-options misuse)
    /// collapse onto [`Error::InvalidParam`]'s code.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidParam => -32000,
            Self::MemberTooLong => -32001,
            Self::EntityNotFound => -32002,
            Self::GhostMember => -32003,
            Self::InvalidPointer => -32004,
            Self::BufferTooSmall => -32005,
            Self::AllocationFailed => -32006,
            Self::MemberNotFound => -32008,
            Self::EntityExists => -32009,
            Self::EntityTypeMismatch => -32010,
            Self::MemberExists => -32011,
            Self::MemberMissing => -32012,
            Self::ReadOnlyTxn => -32013,
            Self::ReadOnlyParent => -32014,
            Self::NullPointer => -32015,
            Self::RootMismatch => -33001,
            Self::Backend(heed::Error::Mdb(err)) => err.to_err_code(),
            Self::Backend(heed::Error::Io(err)) => err.raw_os_error().unwrap_or(-32006),
            Self::Backend(_) => -32000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::InvalidParam.code(), -32000);
        assert_eq!(Error::EntityNotFound.code(), -32002);
        assert_eq!(Error::BufferTooSmall.code(), -32005);
        assert_eq!(Error::MemberNotFound.code(), -32008);
    }

    #[test]
    fn backend_codes_pass_through() {
        let err = Error::from(heed::Error::Mdb(heed::MdbError::NotFound));
        assert_eq!(err.code(), heed::MdbError::NotFound.to_err_code());
    }
}
