//! Bulk-read engine and zero-copy result views.
//!
//! Reads materialize an entity into a caller-supplied buffer with a
//! double-ended layout: a fixed header, descriptors growing forward
//! from it, and payload bytes growing backward from the buffer end.
//! Every location is an offset relative to the buffer start, never an
//! address, so a result can be copied or shipped and re-parsed as-is.
//!
//! ```text
//! [ header | descriptor[0] | descriptor[1] | ... →   ← data_K | ... | data_0 ]
//! ```
//!
//! Failures split into two channels. Hard errors (`BufferTooSmall`,
//! backend failures) abort the call. Soft conditions (absent entity,
//! registered member without a value) are recorded in the header's
//! error table and the call still succeeds with a usable partial
//! result.

use byteorder::{ByteOrder, NativeEndian};
use heed::{RoTxn, WithoutTls};

use crate::ptr::{PTR_LEN, member_key};
use crate::{EntityKind, Error, Ptr, Result, Store};

/// Capacity of the in-header soft error table; further soft errors are
/// dropped while `error_count` stays at the cap.
pub const MAX_READ_ERRORS: usize = 8;

pub(crate) const WORD: usize = size_of::<u64>();

const ERROR_ENTRY_LEN: usize = 3 * WORD + PTR_LEN;
const ERRORS_OFFSET: usize = WORD;
const COUNT_OFFSET: usize = ERRORS_OFFSET + MAX_READ_ERRORS * ERROR_ENTRY_LEN;

/// Size in bytes of the fixed result header.
pub const RESULT_HEADER_LEN: usize = COUNT_OFFSET + WORD;

/// Size in bytes of one object member descriptor.
pub const MEMBER_DESCRIPTOR_LEN: usize = 4 * WORD;

/// Size in bytes of one array element descriptor.
pub const ELEMENT_DESCRIPTOR_LEN: usize = 2 * WORD;

/// Soft error codes recorded in a result header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ReadErrorCode {
    /// The requested entity has no membership row.
    EntityNotFound = 1,
    /// A registered member has no payload row.
    MemberMissing = 2,
}

impl ReadErrorCode {
    fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            1 => Some(Self::EntityNotFound),
            2 => Some(Self::MemberMissing),
            _ => None,
        }
    }
}

/// One soft error recorded in a result header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadError {
    /// What went wrong.
    pub code: ReadErrorCode,
    /// Offset of the related element bytes within the result buffer;
    /// zero when the error refers to no packed element.
    pub element_offset: usize,
    /// Length of the related element bytes.
    pub element_len: usize,
    /// The entity the error refers to.
    pub entity_ptr: Ptr,
}

fn word_at(buf: &[u8], offset: usize) -> Option<u64> {
    buf.get(offset..offset + WORD).map(NativeEndian::read_u64)
}

fn span_ok(buf_len: usize, offset: u64, len: u64) -> bool {
    offset.checked_add(len).is_some_and(|end| end <= buf_len as u64)
}

/// Double-ended writer over a caller-supplied buffer.
///
/// Descriptors advance from `header_len`, payloads retreat from the
/// end; the two regions must never cross. The fixed header area below
/// `header_len` is written through [`Packer::write_word`] by the owner.
pub(crate) struct Packer<'b> {
    buf: &'b mut [u8],
    desc_offset: usize,
    data_offset: usize,
}

impl<'b> Packer<'b> {
    /// Zeroes the buffer and positions both regions; fails when the
    /// buffer cannot hold the header plus one descriptor.
    pub(crate) fn new(buf: &'b mut [u8], header_len: usize, min_descriptor_len: usize) -> Result<Self> {
        if buf.len() < header_len + min_descriptor_len {
            return Err(Error::BufferTooSmall);
        }
        buf.fill(0);
        let data_offset = buf.len();
        Ok(Self { buf, desc_offset: header_len, data_offset })
    }

    pub(crate) fn write_word(&mut self, offset: usize, value: u64) {
        NativeEndian::write_u64(&mut self.buf[offset..offset + WORD], value);
    }

    pub(crate) fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Claims `len` descriptor bytes and returns their offset.
    pub(crate) fn reserve_descriptor(&mut self, len: usize) -> Result<usize> {
        let end = self.desc_offset + len;
        if end > self.data_offset {
            return Err(Error::BufferTooSmall);
        }
        let at = self.desc_offset;
        self.desc_offset = end;
        Ok(at)
    }

    /// Packs `bytes` at the data tail and returns their offset.
    pub(crate) fn push_data(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.data_offset - self.desc_offset < bytes.len() {
            return Err(Error::BufferTooSmall);
        }
        let at = self.data_offset - bytes.len();
        self.buf[at..self.data_offset].copy_from_slice(bytes);
        self.data_offset = at;
        Ok(at)
    }

    /// Appends a soft error to the result header's table. Errors past
    /// the table capacity are dropped.
    fn record_error(&mut self, code: ReadErrorCode, offset: usize, len: usize, ptr: &Ptr) {
        let count = NativeEndian::read_u64(&self.buf[..WORD]) as usize;
        if count >= MAX_READ_ERRORS {
            return;
        }
        let at = ERRORS_OFFSET + count * ERROR_ENTRY_LEN;
        self.write_word(at, code as u64);
        self.write_word(at + WORD, offset as u64);
        self.write_word(at + 2 * WORD, len as u64);
        self.buf[at + 3 * WORD..at + 3 * WORD + PTR_LEN].copy_from_slice(ptr.as_bytes());
        self.write_word(0, (count + 1) as u64);
    }

    fn set_count(&mut self, count: u64) {
        self.write_word(COUNT_OFFSET, count);
    }

    pub(crate) fn into_buf(self) -> &'b [u8] {
        let Self { buf, .. } = self;
        buf
    }
}

/// Iterates the soft errors recorded in a result header.
#[derive(Debug, Clone)]
pub struct Errors<'b> {
    buf: &'b [u8],
    index: usize,
    count: usize,
}

impl<'b> Errors<'b> {
    fn new(buf: &'b [u8]) -> Self {
        let count = word_at(buf, 0)
            .and_then(|raw| usize::try_from(raw).ok())
            .unwrap_or(0)
            .min(MAX_READ_ERRORS);
        Self { buf, index: 0, count }
    }
}

impl Iterator for Errors<'_> {
    type Item = ReadError;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.count {
            let at = ERRORS_OFFSET + self.index * ERROR_ENTRY_LEN;
            self.index += 1;

            let Some(code) = word_at(self.buf, at).and_then(ReadErrorCode::from_raw) else {
                continue;
            };
            let offset = word_at(self.buf, at + WORD)?;
            let len = word_at(self.buf, at + 2 * WORD)?;
            let raw = self.buf.get(at + 3 * WORD..at + 3 * WORD + PTR_LEN)?;
            let entity_ptr = Ptr::from_bytes(<[u8; PTR_LEN]>::try_from(raw).ok()?);

            return Some(ReadError {
                code,
                element_offset: offset as usize,
                element_len: len as usize,
                entity_ptr,
            });
        }
        None
    }
}

/// One object member in a packed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member<'b> {
    /// The member name bytes.
    pub name: &'b [u8],
    /// The member value; `None` for the registered-without-value state.
    pub value: Option<&'b [u8]>,
}

/// Zero-copy view of a packed object read.
#[derive(Debug, Clone, Copy)]
pub struct ObjectResult<'b> {
    buf: &'b [u8],
}

impl<'b> ObjectResult<'b> {
    /// Parses a packed buffer, validating every descriptor and error
    /// entry against the buffer bounds.
    pub fn from_bytes(buf: &'b [u8]) -> Result<Self> {
        validate_header(buf)?;
        let count = result_count(buf, MEMBER_DESCRIPTOR_LEN)?;
        for index in 0..count {
            let at = RESULT_HEADER_LEN + index * MEMBER_DESCRIPTOR_LEN;
            let name_offset = word_at(buf, at).ok_or(Error::InvalidParam)?;
            let name_len = word_at(buf, at + WORD).ok_or(Error::InvalidParam)?;
            let value_offset = word_at(buf, at + 2 * WORD).ok_or(Error::InvalidParam)?;
            let value_len = word_at(buf, at + 3 * WORD).ok_or(Error::InvalidParam)?;
            if !span_ok(buf.len(), name_offset, name_len) {
                return Err(Error::InvalidParam);
            }
            if value_offset == 0 {
                if value_len != 0 {
                    return Err(Error::InvalidParam);
                }
            } else if !span_ok(buf.len(), value_offset, value_len) {
                return Err(Error::InvalidParam);
            }
        }
        Ok(Self { buf })
    }

    pub(crate) fn trusted(buf: &'b [u8]) -> Self {
        Self { buf }
    }

    /// The underlying packed bytes.
    pub fn as_bytes(&self) -> &'b [u8] {
        self.buf
    }

    /// Number of members in the result, missing-value members included.
    pub fn member_count(&self) -> usize {
        word_at(self.buf, COUNT_OFFSET).and_then(|raw| usize::try_from(raw).ok()).unwrap_or(0)
    }

    /// Number of soft errors recorded during the read.
    pub fn error_count(&self) -> usize {
        word_at(self.buf, 0).and_then(|raw| usize::try_from(raw).ok()).unwrap_or(0)
    }

    /// Iterates the recorded soft errors.
    pub fn errors(&self) -> Errors<'b> {
        Errors::new(self.buf)
    }

    /// Returns the member at `index`, in name order.
    pub fn member(&self, index: usize) -> Option<Member<'b>> {
        if index >= self.member_count() {
            return None;
        }
        let at = RESULT_HEADER_LEN + index * MEMBER_DESCRIPTOR_LEN;
        let name_offset = usize::try_from(word_at(self.buf, at)?).ok()?;
        let name_len = usize::try_from(word_at(self.buf, at + WORD)?).ok()?;
        let value_offset = usize::try_from(word_at(self.buf, at + 2 * WORD)?).ok()?;
        let value_len = usize::try_from(word_at(self.buf, at + 3 * WORD)?).ok()?;

        let name = self.buf.get(name_offset..name_offset.checked_add(name_len)?)?;
        let value = if value_offset == 0 {
            None
        } else {
            Some(self.buf.get(value_offset..value_offset.checked_add(value_len)?)?)
        };
        Some(Member { name, value })
    }

    /// Iterates members in name order.
    pub fn iter(&self) -> Members<'b> {
        Members { result: *self, index: 0 }
    }

    /// Finds a member by exact name bytes.
    pub fn find(&self, name: &[u8]) -> Option<Member<'b>> {
        self.iter().find(|member| member.name == name)
    }
}

impl<'b> IntoIterator for &ObjectResult<'b> {
    type Item = Member<'b>;
    type IntoIter = Members<'b>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the members of an [`ObjectResult`].
#[derive(Debug, Clone)]
pub struct Members<'b> {
    result: ObjectResult<'b>,
    index: usize,
}

impl<'b> Iterator for Members<'b> {
    type Item = Member<'b>;

    fn next(&mut self) -> Option<Self::Item> {
        let member = self.result.member(self.index)?;
        self.index += 1;
        Some(member)
    }
}

/// Zero-copy view of a packed array read or member list.
#[derive(Debug, Clone, Copy)]
pub struct ArrayResult<'b> {
    buf: &'b [u8],
}

impl<'b> ArrayResult<'b> {
    /// Parses a packed buffer, validating every descriptor and error
    /// entry against the buffer bounds.
    pub fn from_bytes(buf: &'b [u8]) -> Result<Self> {
        validate_header(buf)?;
        let count = result_count(buf, ELEMENT_DESCRIPTOR_LEN)?;
        for index in 0..count {
            let at = RESULT_HEADER_LEN + index * ELEMENT_DESCRIPTOR_LEN;
            let offset = word_at(buf, at).ok_or(Error::InvalidParam)?;
            let len = word_at(buf, at + WORD).ok_or(Error::InvalidParam)?;
            if !span_ok(buf.len(), offset, len) {
                return Err(Error::InvalidParam);
            }
        }
        Ok(Self { buf })
    }

    pub(crate) fn trusted(buf: &'b [u8]) -> Self {
        Self { buf }
    }

    /// The underlying packed bytes.
    pub fn as_bytes(&self) -> &'b [u8] {
        self.buf
    }

    /// Number of elements in the result.
    pub fn element_count(&self) -> usize {
        word_at(self.buf, COUNT_OFFSET).and_then(|raw| usize::try_from(raw).ok()).unwrap_or(0)
    }

    /// Number of soft errors recorded during the read.
    pub fn error_count(&self) -> usize {
        word_at(self.buf, 0).and_then(|raw| usize::try_from(raw).ok()).unwrap_or(0)
    }

    /// Iterates the recorded soft errors.
    pub fn errors(&self) -> Errors<'b> {
        Errors::new(self.buf)
    }

    /// Returns the element at `index`, in byte order.
    pub fn element(&self, index: usize) -> Option<&'b [u8]> {
        if index >= self.element_count() {
            return None;
        }
        let at = RESULT_HEADER_LEN + index * ELEMENT_DESCRIPTOR_LEN;
        let offset = usize::try_from(word_at(self.buf, at)?).ok()?;
        let len = usize::try_from(word_at(self.buf, at + WORD)?).ok()?;
        self.buf.get(offset..offset.checked_add(len)?)
    }

    /// Iterates elements in byte order.
    pub fn iter(&self) -> Elements<'b> {
        Elements { result: *self, index: 0 }
    }
}

impl<'b> IntoIterator for &ArrayResult<'b> {
    type Item = &'b [u8];
    type IntoIter = Elements<'b>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the elements of an [`ArrayResult`].
#[derive(Debug, Clone)]
pub struct Elements<'b> {
    result: ArrayResult<'b>,
    index: usize,
}

impl<'b> Iterator for Elements<'b> {
    type Item = &'b [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.result.element(self.index)?;
        self.index += 1;
        Some(element)
    }
}

fn validate_header(buf: &[u8]) -> Result<()> {
    if buf.len() < RESULT_HEADER_LEN {
        return Err(Error::InvalidParam);
    }
    let error_count =
        usize::try_from(word_at(buf, 0).ok_or(Error::InvalidParam)?).map_err(|_| Error::InvalidParam)?;
    if error_count > MAX_READ_ERRORS {
        return Err(Error::InvalidParam);
    }
    for index in 0..error_count {
        let at = ERRORS_OFFSET + index * ERROR_ENTRY_LEN;
        let offset = word_at(buf, at + WORD).ok_or(Error::InvalidParam)?;
        let len = word_at(buf, at + 2 * WORD).ok_or(Error::InvalidParam)?;
        if !span_ok(buf.len(), offset, len) {
            return Err(Error::InvalidParam);
        }
    }
    Ok(())
}

fn result_count(buf: &[u8], descriptor_len: usize) -> Result<usize> {
    let raw = word_at(buf, COUNT_OFFSET).ok_or(Error::InvalidParam)?;
    let count = usize::try_from(raw).map_err(|_| Error::InvalidParam)?;
    let descriptors = count.checked_mul(descriptor_len).ok_or(Error::InvalidParam)?;
    if RESULT_HEADER_LEN.checked_add(descriptors).is_none_or(|end| end > buf.len()) {
        return Err(Error::InvalidParam);
    }
    Ok(count)
}

impl Store {
    /// Materializes an object into `buf` and returns a view over it.
    ///
    /// An absent entity is a soft condition: the call succeeds with
    /// `member_count == 0` and an `EntityNotFound` entry in the error
    /// table. Registered members without a value appear with
    /// `value == None` plus a `MemberMissing` entry. A buffer that
    /// cannot hold the full result fails hard with
    /// [`Error::BufferTooSmall`].
    pub fn get_object<'b>(
        &self,
        txn: &RoTxn<WithoutTls>,
        ptr: &Ptr,
        buf: &'b mut [u8],
    ) -> Result<ObjectResult<'b>> {
        ptr.expect_kind(EntityKind::Object)?;
        let mut packer = Packer::new(buf, RESULT_HEADER_LEN, MEMBER_DESCRIPTOR_LEN)?;

        if self.arr.get(txn, ptr.as_bytes())?.is_none() {
            packer.record_error(ReadErrorCode::EntityNotFound, 0, 0, ptr);
            return Ok(ObjectResult::trusted(packer.into_buf()));
        }

        let mut count = 0u64;
        for entry in self.arr.prefix_iter(txn, ptr.as_bytes())? {
            let (_, name) = entry?;
            if name.is_empty() {
                // empty-entity sentinel
                continue;
            }
            let desc_at = packer.reserve_descriptor(MEMBER_DESCRIPTOR_LEN)?;
            match self.main.get(txn, &member_key(ptr, name))? {
                Some(value) => {
                    let value_at = packer.push_data(value)?;
                    let name_at = packer.push_data(name)?;
                    packer.write_word(desc_at, name_at as u64);
                    packer.write_word(desc_at + WORD, name.len() as u64);
                    packer.write_word(desc_at + 2 * WORD, value_at as u64);
                    packer.write_word(desc_at + 3 * WORD, value.len() as u64);
                }
                None => {
                    let name_at = packer.push_data(name)?;
                    packer.write_word(desc_at, name_at as u64);
                    packer.write_word(desc_at + WORD, name.len() as u64);
                    // value words stay zero: the missing-value marker
                    packer.record_error(ReadErrorCode::MemberMissing, name_at, name.len(), ptr);
                }
            }
            count += 1;
        }
        packer.set_count(count);
        Ok(ObjectResult::trusted(packer.into_buf()))
    }

    /// Materializes an array into `buf` and returns a view over it.
    ///
    /// An absent entity is a soft condition, as for
    /// [`Store::get_object`].
    pub fn get_array<'b>(
        &self,
        txn: &RoTxn<WithoutTls>,
        ptr: &Ptr,
        buf: &'b mut [u8],
    ) -> Result<ArrayResult<'b>> {
        ptr.expect_kind(EntityKind::Array)?;
        self.read_values(txn, ptr, buf)
    }

    /// Lists an object's member names into `buf`.
    pub fn list_members<'b>(
        &self,
        txn: &RoTxn<WithoutTls>,
        ptr: &Ptr,
        buf: &'b mut [u8],
    ) -> Result<ArrayResult<'b>> {
        ptr.expect_kind(EntityKind::Object)?;
        self.read_values(txn, ptr, buf)
    }

    /// Packs every duplicate under `arr[ptr]`, whatever the entity kind.
    fn read_values<'b>(
        &self,
        txn: &RoTxn<WithoutTls>,
        ptr: &Ptr,
        buf: &'b mut [u8],
    ) -> Result<ArrayResult<'b>> {
        let mut packer = Packer::new(buf, RESULT_HEADER_LEN, ELEMENT_DESCRIPTOR_LEN)?;

        if self.arr.get(txn, ptr.as_bytes())?.is_none() {
            packer.record_error(ReadErrorCode::EntityNotFound, 0, 0, ptr);
            return Ok(ArrayResult::trusted(packer.into_buf()));
        }

        let mut count = 0u64;
        for entry in self.arr.prefix_iter(txn, ptr.as_bytes())? {
            let (_, value) = entry?;
            if value.is_empty() {
                continue;
            }
            let desc_at = packer.reserve_descriptor(ELEMENT_DESCRIPTOR_LEN)?;
            let value_at = packer.push_data(value)?;
            packer.write_word(desc_at, value_at as u64);
            packer.write_word(desc_at + WORD, value.len() as u64);
            count += 1;
        }
        packer.set_count(count);
        Ok(ArrayResult::trusted(packer.into_buf()))
    }
}
