//! Stable, versioned key hashing for shard assignment.
//!
//! Partitioning must be reproducible across runs, processes and platforms, so the default
//! hash is pinned: [`HashAlgorithm::Sha256V1`] takes the first eight bytes of the SHA-256
//! digest of the key's canonical encoding ([`KeyBytes`]) as a big-endian `u64`. A new
//! algorithm gets a new variant; existing variants never change output.

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Canonical byte encoding of a key, fed into the stable hash.
///
/// Strings encode as their UTF-8 bytes and integers as fixed-width big-endian bytes.
/// Tuples and vectors length-prefix each element so that `("ab", "c")` and `("a", "bc")`
/// hash differently.
pub trait KeyBytes {
    fn write_key_bytes(&self, out: &mut Vec<u8>);

    fn key_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_key_bytes(&mut out);
        out
    }
}

impl KeyBytes for str {
    fn write_key_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl KeyBytes for String {
    fn write_key_bytes(&self, out: &mut Vec<u8>) {
        self.as_str().write_key_bytes(out);
    }
}

impl<T: KeyBytes + ?Sized> KeyBytes for &T {
    fn write_key_bytes(&self, out: &mut Vec<u8>) {
        (**self).write_key_bytes(out);
    }
}

macro_rules! impl_key_bytes_int {
    ($($t:ty),*) => {
        $(impl KeyBytes for $t {
            fn write_key_bytes(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }
        })*
    };
}

impl_key_bytes_int!(u8, u16, u32, u64, i8, i16, i32, i64);

fn write_prefixed<T: KeyBytes + ?Sized>(item: &T, out: &mut Vec<u8>) {
    let bytes = item.key_bytes();
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(&bytes);
}

impl<T: KeyBytes> KeyBytes for Vec<T> {
    fn write_key_bytes(&self, out: &mut Vec<u8>) {
        for item in self {
            write_prefixed(item, out);
        }
    }
}

impl<A: KeyBytes, B: KeyBytes> KeyBytes for (A, B) {
    fn write_key_bytes(&self, out: &mut Vec<u8>) {
        write_prefixed(&self.0, out);
        write_prefixed(&self.1, out);
    }
}

/// Hash over the canonical key bytes.
pub type CustomHashFn = Arc<dyn Fn(&[u8]) -> u64 + Send + Sync>;

/// The hash used by [`HashSplit`](crate::split::HashSplit).
#[derive(Clone, Default)]
pub enum HashAlgorithm {
    /// First 8 bytes of SHA-256, big-endian.
    #[default]
    Sha256V1,
    /// Caller-supplied hash over the canonical key bytes. The caller is responsible for its
    /// stability.
    Custom(CustomHashFn),
}

impl HashAlgorithm {
    /// Wrap a custom hash function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[u8]) -> u64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Short identifier recorded in reports (`sha256-v1` or `custom`).
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::Sha256V1 => "sha256-v1",
            Self::Custom(_) => "custom",
        }
    }

    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        match self {
            Self::Sha256V1 => sha256_v1(bytes),
            Self::Custom(f) => f(bytes),
        }
    }

    pub fn hash_key<K: KeyBytes + ?Sized>(&self, key: &K) -> u64 {
        self.hash_bytes(&key.key_bytes())
    }
}

impl fmt::Debug for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Stable 64-bit hash: leading 8 bytes of the SHA-256 digest as big-endian.
#[must_use]
pub fn sha256_v1(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_v1_is_pinned() {
        // sha256("") = e3b0c44298fc1c14...
        assert_eq!(sha256_v1(b""), 0xe3b0_c442_98fc_1c14);
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(sha256_v1(b"abc"), 0xba78_16bf_8f01_cfea);
    }

    #[test]
    fn string_and_str_hash_alike() {
        let h = HashAlgorithm::Sha256V1;
        assert_eq!(h.hash_key("apple"), h.hash_key(&"apple".to_string()));
    }

    #[test]
    fn tuple_encoding_is_unambiguous() {
        let h = HashAlgorithm::default();
        let a = ("ab".to_string(), "c".to_string());
        let b = ("a".to_string(), "bc".to_string());
        assert_ne!(h.hash_key(&a), h.hash_key(&b));
    }

    #[test]
    fn integers_encode_big_endian() {
        assert_eq!(1u32.key_bytes(), vec![0, 0, 0, 1]);
        assert_eq!((-1i16).key_bytes(), vec![0xff, 0xff]);
    }

    #[test]
    fn custom_hash_sees_key_bytes() {
        let h = HashAlgorithm::custom(|b| b.len() as u64);
        assert_eq!(h.hash_key("apple"), 5);
        assert_eq!(h.id(), "custom");
    }
}
