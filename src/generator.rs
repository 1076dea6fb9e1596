//! Pluggable pointer generation.

use uuid::Uuid;

use crate::{PTR_LEN, Result};

/// Produces raw 17-byte pointer bodies.
///
/// The implementing value carries whatever state the generator needs and
/// is shared across concurrent transactions, so implementations must be
/// safe to call from any thread. Byte 0 of the returned array is left
/// untyped; the creating operation stamps the entity kind afterwards.
pub trait PtrGenerator: Send + Sync {
    /// Returns a fresh pointer body.
    fn generate(&self) -> Result<[u8; PTR_LEN]>;
}

/// Default generator: a version-4 UUID in bytes 1..16.
///
/// The version nibble and variant bits mandated by RFC 4122 land in
/// pointer bytes 7 and 9.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidPtrGenerator;

impl PtrGenerator for UuidPtrGenerator {
    fn generate(&self) -> Result<[u8; PTR_LEN]> {
        let mut out = [0u8; PTR_LEN];
        out[1..].copy_from_slice(Uuid::new_v4().as_bytes());
        Ok(out)
    }
}
