#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub use heed;
pub use heed::{RoTxn, RwTxn, WithoutTls};

mod array;

mod audit;
pub use audit::{AUDIT_ENTRY_LEN, AUDIT_HEADER_LEN, AuditEntries, AuditEntry, AuditReport};

mod config;
pub use config::CONFIG_OBJECT_PTR;

mod error;
pub use error::{Error, Result};

mod generator;
pub use generator::{PtrGenerator, UuidPtrGenerator};

mod object;
pub use object::EntityStat;

mod ptr;
pub use ptr::{EntityKind, MAX_KEY_LEN, MAX_MEMBER_NAME_LEN, PTR_LEN, PTR_STR_LEN, Ptr};

mod read;
pub use read::{
    ArrayResult, ELEMENT_DESCRIPTOR_LEN, Elements, Errors, MAX_READ_ERRORS, MEMBER_DESCRIPTOR_LEN,
    Member, Members, ObjectResult, RESULT_HEADER_LEN, ReadError, ReadErrorCode,
};

mod root;

mod store;
pub use store::{OpenFlags, Store, StoreBuilder};
