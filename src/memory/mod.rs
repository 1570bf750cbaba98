// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read access to the observed process.
//!
//! The engine never owns the target's memory. Everything goes through
//! [`MemoryReader::read_bytes`], which is allowed to fail for any address.
//! Callers recover per node or per record; a failed read is never fatal.
//!
//! ```
//! use entity_engine::memory::{Address, MemoryReadExt};
//! use entity_engine::memory::simulated::SimulatedMemory;
//!
//! let memory = SimulatedMemory::new();
//! memory.write(Address::new(0x1000), &42u32.to_le_bytes());
//!
//! let value: u32 = memory.read(Address::new(0x1000)).unwrap();
//! assert_eq!(value, 42);
//! assert!(memory.read::<u64>(Address::new(0x9000)).is_err());
//! ```

pub mod simulated;

use std::fmt;

use thiserror::Error;

/// Opaque handle into the observed process's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` past this one (wrapping, the target decides validity).
    #[must_use]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }

    /// Whether the address lies strictly inside `(min, max)`.
    #[must_use]
    pub fn within(self, min: u64, max: u64) -> bool {
        self.0 > min && self.0 < max
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("address {address} (+{len} bytes) is not readable")]
    Unmapped { address: Address, len: usize },
    #[error("null pointer dereference")]
    NullPointer,
}

/// Raw read primitive supplied by the host.
pub trait MemoryReader: Send + Sync {
    /// Fill `buf` with the bytes at `address`. Partial reads are errors.
    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> Result<(), ReadError>;
}

/// Plain values that can be decoded from little-endian target memory.
pub trait Primitive: Sized + Copy {
    const SIZE: usize;
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($t:ty),*) => {
        $(
            impl Primitive for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_primitive!(u8, u16, u32, u64, i32, i64, f32, f64);

/// Typed reads on top of [`MemoryReader`].
pub trait MemoryReadExt: MemoryReader {
    /// `read<T>(address) -> T`, fallible.
    fn read<T: Primitive>(&self, address: Address) -> Result<T, ReadError> {
        if address.is_null() {
            return Err(ReadError::NullPointer);
        }
        let mut buf = [0u8; 16];
        let slot = &mut buf[..T::SIZE];
        self.read_bytes(address, slot)?;
        Ok(T::from_le_slice(slot))
    }

    /// Read a pointer-sized word as an [`Address`].
    fn read_address(&self, address: Address) -> Result<Address, ReadError> {
        self.read::<u64>(address).map(Address::new)
    }

    /// Read `len` bytes as lossy UTF-8.
    fn read_string(&self, address: Address, len: usize) -> Result<String, ReadError> {
        if address.is_null() {
            return Err(ReadError::NullPointer);
        }
        let mut buf = vec![0u8; len];
        self.read_bytes(address, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl<M: MemoryReader + ?Sized> MemoryReadExt for M {}

/// Externally-known handles into the target's game state.
pub trait GameContext: Send + Sync {
    /// Address of the entity list's sentinel node.
    fn entity_list_root(&self) -> Result<Address, ReadError>;

    /// Address of the current local actor.
    fn local_player(&self) -> Result<Address, ReadError>;
}
