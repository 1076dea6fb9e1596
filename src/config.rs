//! The well-known configuration object.
//!
//! Every store reserves one object at a fixed pointer (the object tag
//! followed by an all-zero body) as a place for small per-store
//! settings. These helpers are thin delegations to the object
//! operations with the pointer filled in.

use heed::{RoTxn, RwTxn, WithoutTls};

use crate::ptr::check_member_name;
use crate::{Error, ObjectResult, Ptr, Result, Store};

/// Pointer of the per-store configuration object.
pub const CONFIG_OBJECT_PTR: Ptr = Ptr::from_bytes([
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00,
]);

impl Store {
    /// Creates the configuration object if it does not exist yet.
    pub fn ensure_config(&self, txn: &mut RwTxn) -> Result<()> {
        if self.entity_exists(txn, &CONFIG_OBJECT_PTR)? {
            return Ok(());
        }
        self.register_object(txn, &CONFIG_OBJECT_PTR)
    }

    /// Reports whether the configuration object exists.
    pub fn config_exists(&self, txn: &RoTxn<WithoutTls>) -> Result<bool> {
        self.entity_exists(txn, &CONFIG_OBJECT_PTR)
    }

    /// Stores a configuration entry, creating the configuration object
    /// on first use.
    pub fn set_config(&self, txn: &mut RwTxn, key: &[u8], value: &[u8]) -> Result<()> {
        check_member_name(key)?;
        self.ensure_config(txn)?;
        self.put_member(txn, &CONFIG_OBJECT_PTR, key, value)
    }

    /// Returns a configuration entry, borrowed from the transaction.
    pub fn config<'t>(&self, txn: &'t RoTxn<WithoutTls>, key: &[u8]) -> Result<&'t [u8]> {
        self.get_member(txn, &CONFIG_OBJECT_PTR, key)
    }

    /// Materializes the whole configuration object into `buf`.
    ///
    /// Unlike [`Store::get_object`], a store whose configuration object
    /// was never created fails hard with [`Error::EntityNotFound`].
    pub fn config_object<'b>(
        &self,
        txn: &RoTxn<WithoutTls>,
        buf: &'b mut [u8],
    ) -> Result<ObjectResult<'b>> {
        if !self.config_exists(txn)? {
            return Err(Error::EntityNotFound);
        }
        self.get_object(txn, &CONFIG_OBJECT_PTR, buf)
    }
}
