//! The root-object registry.
//!
//! Applications that hang their whole object graph off one entry point
//! register that entity here. The root pointer lives as an entry of the
//! configuration object, and initialization follows a once-only rule:
//! re-initializing with the registered pointer is a no-op,
//! re-initializing with a different one is refused. `force_set_root`
//! exists for recovery tooling that must override the registration.

use heed::{RoTxn, RwTxn, WithoutTls};

use crate::ptr::PTR_LEN;
use crate::{EntityKind, Error, Ptr, Result, Store};

const ROOT_KEY: &[u8] = b"root";

impl Store {
    /// Initializes the root object.
    ///
    /// With `None` a fresh object is created; with a caller-supplied
    /// pointer the entity is registered if absent. When a root is
    /// already registered, passing `None` or the same pointer returns
    /// it unchanged and a different pointer fails with
    /// [`Error::RootMismatch`].
    pub fn init_root(&self, txn: &mut RwTxn, root: Option<&Ptr>) -> Result<Ptr> {
        if let Some(existing) = self.stored_root(txn)? {
            return match root {
                None => Ok(existing),
                Some(requested) if *requested == existing => Ok(existing),
                Some(_) => Err(Error::RootMismatch),
            };
        }

        let ptr = match root {
            Some(requested) => {
                requested.expect_kind(EntityKind::Object)?;
                if !self.entity_exists(txn, requested)? {
                    self.register_object(txn, requested)?;
                }
                *requested
            }
            None => self.create_object(txn)?,
        };
        self.set_config(txn, ROOT_KEY, ptr.as_bytes())?;
        tracing::debug!(target: "lodestore", root = %ptr, "root object initialized");
        Ok(ptr)
    }

    /// Returns the registered root pointer.
    ///
    /// Fails with [`Error::EntityNotFound`] when no root was
    /// initialized.
    pub fn root_pointer(&self, txn: &RoTxn<WithoutTls>) -> Result<Ptr> {
        self.stored_root(txn)?.ok_or(Error::EntityNotFound)
    }

    /// Reports whether a root object is registered.
    pub fn root_initialized(&self, txn: &RoTxn<WithoutTls>) -> Result<bool> {
        Ok(self.stored_root(txn)?.is_some())
    }

    /// Overrides the root registration, registering the entity if
    /// absent. Recovery escape hatch; ordinary callers use
    /// [`Store::init_root`].
    pub fn force_set_root(&self, txn: &mut RwTxn, ptr: &Ptr) -> Result<()> {
        ptr.expect_kind(EntityKind::Object)?;
        if !self.entity_exists(txn, ptr)? {
            self.register_object(txn, ptr)?;
        }
        self.set_config(txn, ROOT_KEY, ptr.as_bytes())
    }

    fn stored_root(&self, txn: &RoTxn<WithoutTls>) -> Result<Option<Ptr>> {
        if !self.config_exists(txn)? {
            return Ok(None);
        }
        match self.config(txn, ROOT_KEY) {
            Ok(bytes) => {
                let raw: [u8; PTR_LEN] =
                    bytes.try_into().map_err(|_| Error::InvalidPointer)?;
                Ok(Some(Ptr::from_bytes(raw)))
            }
            Err(Error::MemberNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
