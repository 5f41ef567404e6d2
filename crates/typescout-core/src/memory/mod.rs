//! Remote memory access
//!
//! Discovery only ever talks to the target through [`ReadMemory`]. Backends:
//! - [`ProcessMemory`]: a live process opened by pid
//! - [`SnapshotMemory`]: address-tagged regions held in memory, for offline replay and tests

pub mod layout;
mod process;
mod snapshot;
pub mod validate;

pub use process::ProcessMemory;
pub use snapshot::{SnapshotManifest, SnapshotMemory, SnapshotRegion};

use crate::error::{Error, Result};

/// A single `(address, length)` read used by [`ReadMemory::read_batch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub address: u64,
    pub len: usize,
}

impl ReadRequest {
    pub fn new(address: u64, len: usize) -> Self {
        Self { address, len }
    }
}

/// Read (and optionally write) access to a target address space.
pub trait ReadMemory {
    /// Read `size` bytes at `address`. Partial reads are failures.
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Read several ranges. Backends able to batch round trips override this.
    fn read_batch(&self, requests: &[ReadRequest]) -> Vec<Result<Vec<u8>>> {
        requests
            .iter()
            .map(|req| self.read_bytes(req.address, req.len))
            .collect()
    }

    /// Write bytes into the target. Read-only backends fail cleanly.
    fn write_bytes(&self, _address: u64, _data: &[u8]) -> Result<()> {
        Err(Error::WriteUnsupported)
    }

    fn read_u8(&self, address: u64) -> Result<u8> {
        let bytes = read_array::<1, _>(self, address)?;
        Ok(bytes[0])
    }

    fn read_u16(&self, address: u64) -> Result<u16> {
        let bytes = read_array::<2, _>(self, address)?;
        Ok(u16::from_le_bytes(bytes))
    }

    fn read_i32(&self, address: u64) -> Result<i32> {
        let bytes = read_array::<4, _>(self, address)?;
        Ok(i32::from_le_bytes(bytes))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        let bytes = read_array::<4, _>(self, address)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = read_array::<8, _>(self, address)?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_f32(&self, address: u64) -> Result<f32> {
        let bytes = read_array::<4, _>(self, address)?;
        Ok(f32::from_le_bytes(bytes))
    }

    fn read_f64(&self, address: u64) -> Result<f64> {
        let bytes = read_array::<8, _>(self, address)?;
        Ok(f64::from_le_bytes(bytes))
    }

    /// Read a pointer-sized value (targets are 64-bit)
    fn read_ptr(&self, address: u64) -> Result<u64> {
        self.read_u64(address)
    }
}

fn read_array<const N: usize, R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Result<[u8; N]> {
    let bytes = reader.read_bytes(address, N)?;
    bytes.try_into().map_err(|_| Error::MemoryReadFailed {
        address,
        message: format!("short read, expected {} bytes", N),
    })
}

impl<R: ReadMemory + ?Sized> ReadMemory for &R {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, size)
    }

    fn read_batch(&self, requests: &[ReadRequest]) -> Vec<Result<Vec<u8>>> {
        (**self).read_batch(requests)
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        (**self).write_bytes(address, data)
    }
}

/// Little-endian field access over a local byte buffer.
///
/// Out-of-range reads return `None` so scanners can treat them as rejected candidates.
pub trait ByteView {
    fn bytes(&self) -> &[u8];

    fn u16_at(&self, offset: usize) -> Option<u16> {
        self.array_at::<2>(offset).map(u16::from_le_bytes)
    }

    fn i32_at(&self, offset: usize) -> Option<i32> {
        self.array_at::<4>(offset).map(i32::from_le_bytes)
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        self.array_at::<4>(offset).map(u32::from_le_bytes)
    }

    fn u64_at(&self, offset: usize) -> Option<u64> {
        self.array_at::<8>(offset).map(u64::from_le_bytes)
    }

    fn array_at<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        self.bytes().get(offset..end)?.try_into().ok()
    }
}

impl ByteView for [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl ByteView for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
}
