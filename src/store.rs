//! Store environment, open options and transaction management.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, DatabaseFlags, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn, WithoutTls};

use crate::ptr::{check_member_name, member_key};
use crate::{Error, EntityKind, Ptr, PtrGenerator, Result, UuidPtrGenerator};

const MAIN_DB: &str = "main";
const ARR_DB: &str = "arr";

const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

bitflags::bitflags! {
    /// Environment open flags.
    ///
    /// Their effect is delegated to the backend untouched. Read
    /// transactions are always opened without thread-local storage, so
    /// they may cross threads; that policy is part of the API rather
    /// than a flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpenFlags: u32 {
        /// Map the database at a fixed address.
        const FIXED_MAP = 1 << 0;
        /// Treat the path as a file instead of a directory.
        const NO_SUB_DIR = 1 << 1;
        /// Skip fsync after commit.
        const NO_SYNC = 1 << 2;
        /// Skip metadata fsync after commit.
        const NO_META_SYNC = 1 << 3;
        /// Use a writeable memory map.
        const WRITE_MAP = 1 << 4;
        /// Use asynchronous flushes with [`OpenFlags::WRITE_MAP`].
        const MAP_ASYNC = 1 << 5;
        /// Skip all locking; callers manage exclusion themselves.
        const NO_LOCK = 1 << 6;
        /// Disable readahead on the map.
        const NO_READ_AHEAD = 1 << 7;
        /// Skip zero-initialization of malloc'd pages.
        const NO_MEM_INIT = 1 << 8;
        /// Open the environment read-only.
        const READ_ONLY = 1 << 9;

        /// Fully synchronous commits, the default.
        const SAFE_SYNC = 0;
        /// Fastest configuration the backend offers.
        const MAX_PERF = Self::WRITE_MAP.bits() | Self::MAP_ASYNC.bits();
        /// No disk synchronization on commit.
        const NO_DISK_SYNC = Self::NO_SYNC.bits() | Self::NO_META_SYNC.bits();
    }
}

impl OpenFlags {
    fn to_env_flags(self) -> EnvFlags {
        let mut flags = EnvFlags::empty();
        if self.contains(Self::FIXED_MAP) {
            flags |= EnvFlags::FIXED_MAP;
        }
        if self.contains(Self::NO_SUB_DIR) {
            flags |= EnvFlags::NO_SUB_DIR;
        }
        if self.contains(Self::NO_SYNC) {
            flags |= EnvFlags::NO_SYNC;
        }
        if self.contains(Self::NO_META_SYNC) {
            flags |= EnvFlags::NO_META_SYNC;
        }
        if self.contains(Self::WRITE_MAP) {
            flags |= EnvFlags::WRITE_MAP;
        }
        if self.contains(Self::MAP_ASYNC) {
            flags |= EnvFlags::MAP_ASYNC;
        }
        if self.contains(Self::NO_LOCK) {
            flags |= EnvFlags::NO_LOCK;
        }
        if self.contains(Self::NO_READ_AHEAD) {
            flags |= EnvFlags::NO_READ_AHEAD;
        }
        if self.contains(Self::NO_MEM_INIT) {
            flags |= EnvFlags::NO_MEM_INIT;
        }
        if self.contains(Self::READ_ONLY) {
            flags |= EnvFlags::READ_ONLY;
        }
        flags
    }
}

/// Configures and opens a [`Store`].
pub struct StoreBuilder {
    map_size: usize,
    max_readers: Option<u32>,
    flags: OpenFlags,
    generator: Arc<dyn PtrGenerator>,
}

impl StoreBuilder {
    fn new() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
            max_readers: None,
            flags: OpenFlags::empty(),
            generator: Arc::new(UuidPtrGenerator),
        }
    }

    /// Sets the memory-map size in bytes. Defaults to 10 MiB.
    pub fn set_map_size(&mut self, map_size: usize) -> &mut Self {
        self.map_size = map_size;
        self
    }

    /// Sets the maximum number of concurrent reader slots.
    pub fn set_max_readers(&mut self, readers: u32) -> &mut Self {
        self.max_readers = Some(readers);
        self
    }

    /// Sets the environment open flags.
    pub fn set_flags(&mut self, flags: OpenFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Replaces the pointer generator used by the create operations.
    pub fn set_generator(&mut self, generator: Arc<dyn PtrGenerator>) -> &mut Self {
        self.generator = generator;
        self
    }

    /// Opens the environment at `path`, creating the two sub-stores if
    /// absent.
    ///
    /// Under [`OpenFlags::READ_ONLY`] the sub-stores are opened without
    /// create; a store that was never initialized fails with
    /// [`Error::InvalidParam`].
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Store> {
        let path = path.as_ref();

        let mut options = EnvOpenOptions::new().read_txn_without_tls();
        options.map_size(self.map_size);
        options.max_dbs(2);
        if let Some(readers) = self.max_readers {
            options.max_readers(readers);
        }
        if !self.flags.is_empty() {
            // SAFETY: flag semantics are the caller's contract with the
            // backend; this only translates names.
            unsafe { options.flags(self.flags.to_env_flags()) };
        }

        // SAFETY: each `open` call creates an independent environment
        // handle; the single-open-per-path rule is the caller's, exactly
        // as it is for the backend itself.
        let env = unsafe { options.open(path)? };

        let (main, arr) = if self.flags.contains(OpenFlags::READ_ONLY) {
            let rtxn = env.read_txn()?;
            let main = env
                .database_options()
                .types::<Bytes, Bytes>()
                .name(MAIN_DB)
                .open(&rtxn)?
                .ok_or(Error::InvalidParam)?;
            let arr = env
                .database_options()
                .types::<Bytes, Bytes>()
                .name(ARR_DB)
                .flags(DatabaseFlags::DUP_SORT)
                .open(&rtxn)?
                .ok_or(Error::InvalidParam)?;
            // Database handles opened under a read transaction persist
            // only if it commits.
            rtxn.commit()?;
            (main, arr)
        } else {
            let mut wtxn = env.write_txn()?;
            let main =
                env.database_options().types::<Bytes, Bytes>().name(MAIN_DB).create(&mut wtxn)?;
            let arr = env
                .database_options()
                .types::<Bytes, Bytes>()
                .name(ARR_DB)
                .flags(DatabaseFlags::DUP_SORT)
                .create(&mut wtxn)?;
            wtxn.commit()?;
            (main, arr)
        };

        tracing::debug!(
            target: "lodestore",
            path = %path.display(),
            map_size = self.map_size,
            flags = ?self.flags,
            "store opened"
        );

        Ok(Store { env, main, arr, generator: Arc::clone(&self.generator) })
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("map_size", &self.map_size)
            .field("max_readers", &self.max_readers)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// An open entity store.
///
/// Holds the backend environment and the handles to the two sub-stores:
/// `main` (unique keys, member payloads) and `arr` (sorted duplicate
/// sets, entity membership). Cloning is cheap; all clones share one
/// environment. Dropping the last clone closes it.
#[derive(Clone)]
pub struct Store {
    pub(crate) env: Env<WithoutTls>,
    pub(crate) main: Database<Bytes, Bytes>,
    pub(crate) arr: Database<Bytes, Bytes>,
    pub(crate) generator: Arc<dyn PtrGenerator>,
}

impl Store {
    /// Returns a builder with default options.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Opens a store at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().open(path)
    }

    /// Begins a read transaction pinned to a consistent snapshot.
    ///
    /// Read transactions run in parallel and may cross threads. Write
    /// operations demand a write transaction and do not type-check
    /// against a read transaction:
    ///
    /// ```compile_fail
    /// # fn demo(store: &lodestore::Store) -> lodestore::Result<()> {
    /// let mut rtxn = store.read_txn()?;
    /// let obj = store.create_object(&mut rtxn)?; // expected `&mut RwTxn`
    /// # Ok(())
    /// # }
    /// ```
    pub fn read_txn(&self) -> Result<RoTxn<'_, WithoutTls>> {
        self.env.read_txn().map_err(Into::into)
    }

    /// Begins the environment's single write transaction.
    pub fn write_txn(&self) -> Result<RwTxn<'_>> {
        self.env.write_txn().map_err(Into::into)
    }

    /// Begins a write transaction nested inside `parent`.
    ///
    /// Committing publishes the nested changes into the parent; aborting
    /// discards them. Only a write transaction can be a parent, which
    /// the signature enforces.
    pub fn nested_write_txn<'p>(&'p self, parent: &'p mut RwTxn<'_>) -> Result<RwTxn<'p>> {
        self.env.nested_write_txn(parent).map_err(Into::into)
    }

    /// Reports whether the entity behind `ptr` exists.
    ///
    /// Existence means the pointer has a membership row, even when only
    /// the empty-entity sentinel remains.
    pub fn entity_exists(&self, txn: &RoTxn<WithoutTls>, ptr: &Ptr) -> Result<bool> {
        Ok(self.arr.get(txn, ptr.as_bytes())?.is_some())
    }

    /// Reports whether an object member carries a value.
    ///
    /// False both for unknown names and for names registered without a
    /// value.
    pub fn member_value_exists(
        &self,
        txn: &RoTxn<WithoutTls>,
        ptr: &Ptr,
        name: &[u8],
    ) -> Result<bool> {
        ptr.expect_kind(EntityKind::Object)?;
        check_member_name(name)?;
        Ok(self.main.get(txn, &member_key(ptr, name))?.is_some())
    }

    /// Raw handle to the `main` payload sub-store.
    ///
    /// Escape hatch for audit tooling and tests that fabricate or
    /// inspect low-level rows; ordinary callers never need it.
    pub fn main_db(&self) -> Database<Bytes, Bytes> {
        self.main
    }

    /// Raw handle to the `arr` membership sub-store.
    pub fn arr_db(&self) -> Database<Bytes, Bytes> {
        self.arr
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
