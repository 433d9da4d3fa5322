//! SHA-256 hashing primitive used to build every fingerprint in this crate.
//!
//! A `Copy`-able 32-byte newtype over a digest, fixed at SHA-256 per the
//! imprint format, with an incremental [`Digest`] for composing hashes of
//! hashes.

use std::io::Read;
use std::str::FromStr;

use derive_more::Display;
use sha2::{Digest as _, Sha256};

use crate::error::Error;

/// Size in bytes of a SHA-256 digest.
pub const HASH_BYTES: usize = 32;

/// Size of the buffer used when streaming file content through the hasher.
///
/// Bounds memory usage to O(1) regardless of file size.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// An opaque 32-byte SHA-256 digest.
///
/// Displays (and parses) as a lowercase 64-character hex checksum.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
#[display("{}", hex::encode(self.0))]
pub struct Hash([u8; HASH_BYTES]);

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl Hash {
    /// Hash a single buffer of bytes.
    pub fn hash(bytes: impl AsRef<[u8]>) -> Self {
        let mut digest = Digest::new();
        digest.update(bytes);
        digest.finalize()
    }

    /// Hash a UTF-8 string.
    pub fn hash_string(s: impl AsRef<str>) -> Self {
        Self::hash(s.as_ref().as_bytes())
    }

    /// Hash the contents of a stream, reading it in bounded chunks.
    pub fn hash_stream(mut reader: impl Read) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(Self::from_digest(hasher))
    }

    /// The hash of the empty byte string.
    ///
    /// Used as the content/children fingerprint of empty directories.
    pub fn empty() -> Self {
        Self::hash(b"")
    }

    /// View the raw bytes of this hash.
    pub fn as_bytes(&self) -> &[u8; HASH_BYTES] {
        &self.0
    }

    fn from_digest(hasher: Sha256) -> Self {
        let bytes: [u8; HASH_BYTES] = hasher.finalize().into();
        Self(bytes)
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_BYTES * 2 {
            return Err(Error::BadRecord {
                line: 0,
                reason: format!("checksum {s:?} is not {} hex characters", HASH_BYTES * 2),
            });
        }
        let bytes = hex::decode(s).map_err(|err| Error::BadRecord {
            line: 0,
            reason: format!("checksum {s:?} is not valid hex: {err}"),
        })?;
        let bytes: [u8; HASH_BYTES] = bytes.try_into().expect("length checked above");
        Ok(Self(bytes))
    }
}

impl TryFrom<&str> for Hash {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Incremental digest builder, allowing composition of bytes and other hashes
/// into a single resulting [`Hash`].
///
/// This is how directory fingerprints are built: each child's hash is fed in
/// with [`Digest::update_hash`] in order, then [`Digest::finalize`] yields the
/// parent's aggregate hash.
pub struct Digest(Sha256);

impl Digest {
    /// Start a new, empty digest.
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Feed raw bytes into the digest.
    pub fn update(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        self.0.update(bytes.as_ref());
        self
    }

    /// Feed another hash's bytes into the digest, preserving order.
    pub fn update_hash(&mut self, hash: &Hash) -> &mut Self {
        self.0.update(hash.as_bytes());
        self
    }

    /// Consume the digest, producing the final [`Hash`].
    pub fn finalize(self) -> Hash {
        Hash::from_digest(self.0)
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold an ordered sequence of hashes into a single hash.
///
/// Equivalent to feeding each hash into a fresh [`Digest`] in order and
/// finalizing; returns [`Hash::empty`] for an empty sequence.
pub fn fold_hashes<'a>(hashes: impl IntoIterator<Item = &'a Hash>) -> Hash {
    let mut digest = Digest::new();
    let mut any = false;
    for hash in hashes {
        digest.update_hash(hash);
        any = true;
    }
    if any {
        digest.finalize()
    } else {
        Hash::empty()
    }
}
