//! Array lifecycle and element operations.
//!
//! An array is an ordered set of byte strings: the backend's sorted
//! duplicate storage both orders elements lexicographically and
//! deduplicates them by value. There are no positional semantics and no
//! `main` rows; the duplicate set under `arr[ptr]` is the whole array.

use heed::{PutFlags, RoTxn, RwTxn, WithoutTls};

use crate::{EntityKind, EntityStat, Error, Ptr, Result, Store};

impl Store {
    /// Creates an empty array under a freshly generated pointer.
    pub fn create_array(&self, txn: &mut RwTxn) -> Result<Ptr> {
        let ptr = Ptr::from_bytes(self.generator.generate()?).with_kind(EntityKind::Array);
        self.arr.put(txn, ptr.as_bytes(), &[])?;
        tracing::trace!(target: "lodestore", %ptr, "array created");
        Ok(ptr)
    }

    /// Creates an empty array under a caller-supplied pointer.
    ///
    /// Fails with [`Error::EntityExists`] when the pointer is already
    /// registered.
    pub fn register_array(&self, txn: &mut RwTxn, ptr: &Ptr) -> Result<()> {
        ptr.expect_kind(EntityKind::Array)?;
        if self.entity_exists(txn, ptr)? {
            return Err(Error::EntityExists);
        }
        self.arr.put(txn, ptr.as_bytes(), &[])?;
        Ok(())
    }

    /// Inserts `element` into the array.
    ///
    /// Re-appending an element that is already present is a silent
    /// no-op. A zero-length element coincides with the empty-entity
    /// sentinel and stays invisible to reads. Element size is bounded
    /// by the backend's duplicate-value limit (the key size limit);
    /// oversized elements surface the backend's error.
    pub fn append(&self, txn: &mut RwTxn, ptr: &Ptr, element: &[u8]) -> Result<()> {
        ptr.expect_kind(EntityKind::Array)?;
        match self.arr.put_with_flags(txn, PutFlags::NO_DUP_DATA, ptr.as_bytes(), element) {
            Ok(_) => Ok(()),
            Err(heed::Error::Mdb(heed::MdbError::KeyExist)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes the element matching `element` byte-for-byte.
    ///
    /// Returns whether it was present.
    pub fn delete_element(&self, txn: &mut RwTxn, ptr: &Ptr, element: &[u8]) -> Result<bool> {
        ptr.expect_kind(EntityKind::Array)?;
        Ok(self.arr.delete_one_duplicate(txn, ptr.as_bytes(), element)?)
    }

    /// Deletes the array and all its elements.
    ///
    /// Returns whether the array existed.
    pub fn delete_array(&self, txn: &mut RwTxn, ptr: &Ptr) -> Result<bool> {
        ptr.expect_kind(EntityKind::Array)?;
        let existed = self.arr.delete(txn, ptr.as_bytes())?;
        if existed {
            tracing::trace!(target: "lodestore", %ptr, "array deleted");
        }
        Ok(existed)
    }

    /// Sums element bytes and count over the array.
    pub fn stat_array_elements(&self, txn: &RoTxn<WithoutTls>, ptr: &Ptr) -> Result<EntityStat> {
        ptr.expect_kind(EntityKind::Array)?;
        self.stat_membership(txn, ptr)
    }
}
