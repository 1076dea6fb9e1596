//! Object lifecycle and member operations.
//!
//! An object is a map from member names to byte-string values. The
//! membership set lives as sorted duplicates under `arr[ptr]`; each
//! member's payload lives at `main[ptr ‖ name]`. A name may be
//! registered without a payload row (the legal missing-value state),
//! which bulk reads surface as a soft error.

use heed::{PutFlags, RoTxn, RwTxn, WithoutTls};

use crate::ptr::{check_member_name, member_key};
use crate::{EntityKind, Error, Ptr, Result, Store};

/// Totals reported by the statistics operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityStat {
    /// Sum of the scanned value lengths in bytes.
    pub total_bytes: u64,
    /// Number of scanned rows.
    pub count: u64,
}

impl Store {
    /// Creates an empty object under a freshly generated pointer.
    pub fn create_object(&self, txn: &mut RwTxn) -> Result<Ptr> {
        let ptr = Ptr::from_bytes(self.generator.generate()?).with_kind(EntityKind::Object);
        self.arr.put(txn, ptr.as_bytes(), &[])?;
        tracing::trace!(target: "lodestore", %ptr, "object created");
        Ok(ptr)
    }

    /// Creates an empty object under a caller-supplied pointer.
    ///
    /// Fails with [`Error::EntityExists`] when the pointer is already
    /// registered.
    pub fn register_object(&self, txn: &mut RwTxn, ptr: &Ptr) -> Result<()> {
        ptr.expect_kind(EntityKind::Object)?;
        if self.entity_exists(txn, ptr)? {
            return Err(Error::EntityExists);
        }
        self.arr.put(txn, ptr.as_bytes(), &[])?;
        Ok(())
    }

    /// Inserts a name into the membership set; an already-registered
    /// name counts as success.
    fn insert_membership(&self, txn: &mut RwTxn, ptr: &Ptr, name: &[u8]) -> Result<()> {
        match self.arr.put_with_flags(txn, PutFlags::NO_DUP_DATA, ptr.as_bytes(), name) {
            Ok(_) => Ok(()),
            Err(heed::Error::Mdb(heed::MdbError::KeyExist)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Registers `name` and stores its value, overwriting any prior
    /// value.
    ///
    /// A failed membership insert aborts the operation before the
    /// payload write.
    pub fn put_member(&self, txn: &mut RwTxn, ptr: &Ptr, name: &[u8], value: &[u8]) -> Result<()> {
        ptr.expect_kind(EntityKind::Object)?;
        check_member_name(name)?;
        self.insert_membership(txn, ptr, name)?;
        self.main.put(txn, &member_key(ptr, name), value)?;
        Ok(())
    }

    /// Registers `name` without storing a value, leaving the member in
    /// the missing-value state. Registration is idempotent.
    pub fn register_member(&self, txn: &mut RwTxn, ptr: &Ptr, name: &[u8]) -> Result<()> {
        ptr.expect_kind(EntityKind::Object)?;
        check_member_name(name)?;
        self.insert_membership(txn, ptr, name)
    }

    /// Returns a member's value, borrowed from the transaction.
    ///
    /// Fails with [`Error::EntityNotFound`] when the object does not
    /// exist and [`Error::MemberNotFound`] when no payload row exists
    /// for the name (unregistered or missing-value alike).
    pub fn get_member<'t>(
        &self,
        txn: &'t RoTxn<WithoutTls>,
        ptr: &Ptr,
        name: &[u8],
    ) -> Result<&'t [u8]> {
        ptr.expect_kind(EntityKind::Object)?;
        if !self.entity_exists(txn, ptr)? {
            return Err(Error::EntityNotFound);
        }
        check_member_name(name)?;
        self.main.get(txn, &member_key(ptr, name))?.ok_or(Error::MemberNotFound)
    }

    /// Deletes a member's value while keeping the name registered,
    /// transitioning it to the missing-value state.
    ///
    /// Returns whether a value row existed.
    pub fn delete_member_value(&self, txn: &mut RwTxn, ptr: &Ptr, name: &[u8]) -> Result<bool> {
        ptr.expect_kind(EntityKind::Object)?;
        check_member_name(name)?;
        Ok(self.main.delete(txn, &member_key(ptr, name))?)
    }

    /// Removes a member entirely: the membership entry and, when
    /// present, the payload row.
    ///
    /// Returns whether the name was registered.
    pub fn delete_member(&self, txn: &mut RwTxn, ptr: &Ptr, name: &[u8]) -> Result<bool> {
        ptr.expect_kind(EntityKind::Object)?;
        check_member_name(name)?;
        let registered = self.arr.delete_one_duplicate(txn, ptr.as_bytes(), name)?;
        self.main.delete(txn, &member_key(ptr, name))?;
        Ok(registered)
    }

    /// Deletes an object: every payload row first, then the whole
    /// membership row.
    ///
    /// Payload-first ordering keeps a mid-abort state recoverable as
    /// ghost members instead of orphaning the membership row. Returns
    /// whether the object existed.
    pub fn delete_object(&self, txn: &mut RwTxn, ptr: &Ptr) -> Result<bool> {
        ptr.expect_kind(EntityKind::Object)?;

        let mut existed = false;
        let mut names: Vec<Vec<u8>> = Vec::new();
        for entry in self.arr.prefix_iter(txn, ptr.as_bytes())? {
            let (_, name) = entry?;
            existed = true;
            if !name.is_empty() {
                names.push(name.to_vec());
            }
        }
        if !existed {
            return Ok(false);
        }

        for name in &names {
            self.main.delete(txn, &member_key(ptr, name))?;
        }
        self.arr.delete(txn, ptr.as_bytes())?;

        tracing::trace!(target: "lodestore", %ptr, members = names.len(), "object deleted");
        Ok(true)
    }

    /// Sums payload bytes and row count over every `main` row with the
    /// pointer prefix.
    ///
    /// Ghost rows are counted too; [`Store::stat_object_members`] gives
    /// the authoritative member count.
    pub fn stat_object_values(&self, txn: &RoTxn<WithoutTls>, ptr: &Ptr) -> Result<EntityStat> {
        ptr.expect_kind(EntityKind::Object)?;
        let mut stat = EntityStat::default();
        for entry in self.main.prefix_iter(txn, ptr.as_bytes())? {
            let (_, value) = entry?;
            stat.total_bytes += value.len() as u64;
            stat.count += 1;
        }
        Ok(stat)
    }

    /// Sums name bytes and count over the membership set.
    pub fn stat_object_members(&self, txn: &RoTxn<WithoutTls>, ptr: &Ptr) -> Result<EntityStat> {
        ptr.expect_kind(EntityKind::Object)?;
        self.stat_membership(txn, ptr)
    }

    /// Walks `arr[ptr]` duplicates, sentinel excluded. An absent entity
    /// yields zero totals.
    pub(crate) fn stat_membership(&self, txn: &RoTxn<WithoutTls>, ptr: &Ptr) -> Result<EntityStat> {
        let mut stat = EntityStat::default();
        for entry in self.arr.prefix_iter(txn, ptr.as_bytes())? {
            let (_, value) = entry?;
            if value.is_empty() {
                continue;
            }
            stat.total_bytes += value.len() as u64;
            stat.count += 1;
        }
        Ok(stat)
    }
}
