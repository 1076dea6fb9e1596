//! Shared test infrastructure.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lodestore::{PTR_LEN, PtrGenerator, Store};
use tempfile::TempDir;

/// Opens a fresh store in a temporary directory.
///
/// The directory guard must stay alive for the store's lifetime.
pub fn store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

/// Deterministic generator: a counter in the last pointer bytes.
#[derive(Debug, Default)]
pub struct SequentialGenerator {
    next: AtomicU64,
}

impl PtrGenerator for SequentialGenerator {
    fn generate(&self) -> lodestore::Result<[u8; PTR_LEN]> {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        let mut out = [0u8; PTR_LEN];
        out[PTR_LEN - 8..].copy_from_slice(&seq.to_be_bytes());
        Ok(out)
    }
}

/// Opens a store whose create operations hand out sequential pointers.
pub fn sequential_store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::builder()
        .set_generator(Arc::new(SequentialGenerator::default()))
        .open(dir.path())
        .unwrap();
    (dir, store)
}
