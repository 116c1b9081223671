//! Key Hashing and Shard Selection
//!
//! Every key is reduced to a 32-bit hash, and the shard index is that hash
//! masked by `shard_count - 1`. Shard counts are always powers of two, so the
//! mask replaces a modulo.
//!
//! ## Hash Strategies
//!
//! | Key type                         | Strategy                           |
//! |----------------------------------|------------------------------------|
//! | strings, byte strings, `Bytes`   | 32-bit FNV-1a over the bytes       |
//! | 8/16/32-bit integers, `char`     | widened to `u32`                   |
//! | 64-bit and pointer-sized ints    | low 32 bits XOR high 32 bits       |
//! | 128-bit integers                 | XOR of the four 32-bit lanes       |
//! | anything else                    | FNV-1a over its `Display` output   |
//!
//! FNV-1a is unseeded, so the same key lands on the same shard in every run.
//! Tests rely on that to assert distribution properties.

use bytes::Bytes;
use std::borrow::Cow;
use std::fmt::{self, Display, Write as _};
use std::sync::Arc;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
#[inline]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Hashes the `Display` output of a value without allocating.
pub fn hash_display<T: Display + ?Sized>(value: &T) -> u32 {
    let mut hasher = FnvWriter(FNV_OFFSET_BASIS);
    // FnvWriter never fails, only a broken Display impl can
    let _ = write!(hasher, "{}", value);
    hasher.0
}

struct FnvWriter(u32);

impl fmt::Write for FnvWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &b in s.as_bytes() {
            self.0 = (self.0 ^ u32::from(b)).wrapping_mul(FNV_PRIME);
        }
        Ok(())
    }
}

/// Rounds `n` up to the next power of two, with a minimum of 1.
#[inline]
pub fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// A key the store can place on a shard.
///
/// Implemented for strings, byte strings and the primitive integer types.
/// Other key types either implement it by hand or are wrapped in
/// [`ByDisplay`].
pub trait ShardKey {
    /// A stable 32-bit hash of the key.
    fn shard_hash(&self) -> u32;
}

impl<T: ShardKey + ?Sized> ShardKey for &T {
    #[inline]
    fn shard_hash(&self) -> u32 {
        (**self).shard_hash()
    }
}

impl<T: ShardKey + ?Sized> ShardKey for Box<T> {
    #[inline]
    fn shard_hash(&self) -> u32 {
        (**self).shard_hash()
    }
}

impl<T: ShardKey + ?Sized> ShardKey for Arc<T> {
    #[inline]
    fn shard_hash(&self) -> u32 {
        (**self).shard_hash()
    }
}

impl ShardKey for str {
    #[inline]
    fn shard_hash(&self) -> u32 {
        fnv1a_32(self.as_bytes())
    }
}

impl ShardKey for String {
    #[inline]
    fn shard_hash(&self) -> u32 {
        fnv1a_32(self.as_bytes())
    }
}

impl ShardKey for Cow<'_, str> {
    #[inline]
    fn shard_hash(&self) -> u32 {
        fnv1a_32(self.as_bytes())
    }
}

impl ShardKey for [u8] {
    #[inline]
    fn shard_hash(&self) -> u32 {
        fnv1a_32(self)
    }
}

impl ShardKey for Vec<u8> {
    #[inline]
    fn shard_hash(&self) -> u32 {
        fnv1a_32(self)
    }
}

impl ShardKey for Bytes {
    #[inline]
    fn shard_hash(&self) -> u32 {
        fnv1a_32(self)
    }
}

macro_rules! impl_shard_key_narrow {
    ($($t:ty),*) => {
        $(
            impl ShardKey for $t {
                #[inline]
                fn shard_hash(&self) -> u32 {
                    *self as u32
                }
            }
        )*
    };
}

macro_rules! impl_shard_key_wide {
    ($($t:ty),*) => {
        $(
            impl ShardKey for $t {
                #[inline]
                fn shard_hash(&self) -> u32 {
                    let v = *self as u64;
                    (v as u32) ^ ((v >> 32) as u32)
                }
            }
        )*
    };
}

impl_shard_key_narrow!(u8, u16, u32, i8, i16, i32);
impl_shard_key_wide!(u64, i64, usize, isize);

impl ShardKey for u128 {
    #[inline]
    fn shard_hash(&self) -> u32 {
        let v = *self;
        (v as u32) ^ ((v >> 32) as u32) ^ ((v >> 64) as u32) ^ ((v >> 96) as u32)
    }
}

impl ShardKey for i128 {
    #[inline]
    fn shard_hash(&self) -> u32 {
        (*self as u128).shard_hash()
    }
}

impl ShardKey for char {
    #[inline]
    fn shard_hash(&self) -> u32 {
        u32::from(*self)
    }
}

impl ShardKey for bool {
    #[inline]
    fn shard_hash(&self) -> u32 {
        u32::from(*self)
    }
}

/// Key wrapper that hashes through the inner value's `Display` output.
///
/// ```
/// use kavos::storage::{ByDisplay, ShardKey, hash_display};
/// use std::net::Ipv4Addr;
///
/// let key = ByDisplay(Ipv4Addr::new(10, 0, 0, 1));
/// assert_eq!(key.shard_hash(), hash_display("10.0.0.1"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByDisplay<T>(pub T);

impl<T: Display> ShardKey for ByDisplay<T> {
    #[inline]
    fn shard_hash(&self) -> u32 {
        hash_display(&self.0)
    }
}

impl<T: Display> Display for ByDisplay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
