//! Ghost-member audit and repair.
//!
//! A ghost member is a `main` payload row whose name is absent from the
//! object's membership set, the fault a mid-abort whole-object delete
//! can leave behind. The audit walks the object's payload prefix,
//! checks each name against the membership set and records offenders in
//! a caller-supplied buffer with the same double-ended packing the bulk
//! reads use. Repair deletes exactly the recorded rows; committing or
//! aborting the enclosing write transaction decides whether the repair
//! sticks.
//!
//! Missing values are never repaired here: registering a name without
//! a value is a legal state. Ghost objects (payload under a pointer
//! with no membership row at all) are a documented fault class; this
//! audit is scoped to a single known object.

use std::collections::BTreeSet;

use byteorder::{ByteOrder, NativeEndian};
use heed::{RoTxn, RwTxn, WithoutTls};

use crate::ptr::{PTR_LEN, member_key};
use crate::read::{Packer, WORD};
use crate::{EntityKind, Error, Ptr, Result, Store};

/// Size in bytes of the audit report header.
pub const AUDIT_HEADER_LEN: usize = WORD;

/// Size in bytes of one audit entry.
pub const AUDIT_ENTRY_LEN: usize = PTR_LEN + 4 * WORD;

/// One recorded ghost member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditEntry<'b> {
    /// The object the ghost row belongs to.
    pub ptr: Ptr,
    /// The ghost member's name bytes.
    pub name: &'b [u8],
    /// The ghost member's stored value bytes.
    pub value: &'b [u8],
}

/// Zero-copy view of a packed audit report.
#[derive(Debug, Clone, Copy)]
pub struct AuditReport<'b> {
    buf: &'b [u8],
}

impl<'b> AuditReport<'b> {
    /// Parses a packed report, validating every entry against the
    /// buffer bounds.
    pub fn from_bytes(buf: &'b [u8]) -> Result<Self> {
        let report = Self { buf };
        let count = report.checked_count().ok_or(Error::InvalidParam)?;
        for index in 0..count {
            report.entry_at(index).ok_or(Error::InvalidParam)?;
        }
        Ok(report)
    }

    pub(crate) fn trusted(buf: &'b [u8]) -> Self {
        Self { buf }
    }

    /// The underlying packed bytes.
    pub fn as_bytes(&self) -> &'b [u8] {
        self.buf
    }

    /// Number of recorded ghost members.
    pub fn ghost_count(&self) -> usize {
        self.checked_count().unwrap_or(0)
    }

    /// Returns the entry at `index`.
    pub fn entry(&self, index: usize) -> Option<AuditEntry<'b>> {
        if index >= self.ghost_count() {
            return None;
        }
        self.entry_at(index)
    }

    /// Iterates recorded entries.
    pub fn iter(&self) -> AuditEntries<'b> {
        AuditEntries { report: *self, index: 0 }
    }

    fn checked_count(&self) -> Option<usize> {
        let raw = self.buf.get(..WORD).map(NativeEndian::read_u64)?;
        let count = usize::try_from(raw).ok()?;
        let end = AUDIT_HEADER_LEN.checked_add(count.checked_mul(AUDIT_ENTRY_LEN)?)?;
        (end <= self.buf.len()).then_some(count)
    }

    fn entry_at(&self, index: usize) -> Option<AuditEntry<'b>> {
        let at = AUDIT_HEADER_LEN + index * AUDIT_ENTRY_LEN;
        let raw_ptr = self.buf.get(at..at + PTR_LEN)?;
        let ptr = Ptr::from_bytes(<[u8; PTR_LEN]>::try_from(raw_ptr).ok()?);

        let word =
            |offset: usize| self.buf.get(offset..offset + WORD).map(NativeEndian::read_u64);
        let name_offset = usize::try_from(word(at + PTR_LEN)?).ok()?;
        let name_len = usize::try_from(word(at + PTR_LEN + WORD)?).ok()?;
        let value_offset = usize::try_from(word(at + PTR_LEN + 2 * WORD)?).ok()?;
        let value_len = usize::try_from(word(at + PTR_LEN + 3 * WORD)?).ok()?;

        let name = self.buf.get(name_offset..name_offset.checked_add(name_len)?)?;
        let value = self.buf.get(value_offset..value_offset.checked_add(value_len)?)?;
        Some(AuditEntry { ptr, name, value })
    }
}

impl<'b> IntoIterator for &AuditReport<'b> {
    type Item = AuditEntry<'b>;
    type IntoIter = AuditEntries<'b>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of an [`AuditReport`].
#[derive(Debug, Clone)]
pub struct AuditEntries<'b> {
    report: AuditReport<'b>,
    index: usize,
}

impl<'b> Iterator for AuditEntries<'b> {
    type Item = AuditEntry<'b>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.report.entry(self.index)?;
        self.index += 1;
        Some(entry)
    }
}

impl Store {
    /// Scans an object's payload prefix for ghost members and records
    /// them into `buf`.
    ///
    /// Entries pack forward from the header, name and value bytes pack
    /// backward from the buffer end; a buffer that cannot hold the full
    /// report fails hard with [`Error::BufferTooSmall`].
    pub fn audit_object<'b>(
        &self,
        txn: &RoTxn<WithoutTls>,
        ptr: &Ptr,
        buf: &'b mut [u8],
    ) -> Result<AuditReport<'b>> {
        ptr.expect_kind(EntityKind::Object)?;
        let mut packer = Packer::new(buf, AUDIT_HEADER_LEN, AUDIT_ENTRY_LEN)?;

        let mut members: BTreeSet<&[u8]> = BTreeSet::new();
        for entry in self.arr.prefix_iter(txn, ptr.as_bytes())? {
            let (_, name) = entry?;
            members.insert(name);
        }

        let mut count = 0u64;
        for entry in self.main.prefix_iter(txn, ptr.as_bytes())? {
            let (key, value) = entry?;
            let name = &key[PTR_LEN..];
            if members.contains(name) {
                continue;
            }

            let at = packer.reserve_descriptor(AUDIT_ENTRY_LEN)?;
            let name_at = packer.push_data(name)?;
            let value_at = packer.push_data(value)?;
            packer.write_bytes(at, ptr.as_bytes());
            packer.write_word(at + PTR_LEN, name_at as u64);
            packer.write_word(at + PTR_LEN + WORD, name.len() as u64);
            packer.write_word(at + PTR_LEN + 2 * WORD, value_at as u64);
            packer.write_word(at + PTR_LEN + 3 * WORD, value.len() as u64);
            count += 1;
        }
        packer.write_word(0, count);

        if count > 0 {
            tracing::debug!(target: "lodestore", %ptr, ghosts = count, "audit found ghost members");
        }
        Ok(AuditReport::trusted(packer.into_buf()))
    }

    /// Deletes the payload row of every ghost recorded in `report`.
    ///
    /// Rows already gone are skipped; the first backend failure stops
    /// the pass. Returns the number of rows removed. The repair becomes
    /// durable only when the enclosing write transaction commits.
    pub fn repair_object(&self, txn: &mut RwTxn, report: &AuditReport<'_>) -> Result<usize> {
        let mut repaired = 0;
        for entry in report.iter() {
            if self.main.delete(txn, &member_key(&entry.ptr, entry.name))? {
                repaired += 1;
            }
        }
        if repaired > 0 {
            tracing::debug!(target: "lodestore", repaired, "ghost members repaired");
        }
        Ok(repaired)
    }
}
