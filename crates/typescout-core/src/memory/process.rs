//! Live process backend
//!
//! The caller supplies the pid; locating the process is not handled here.

use super::ReadMemory;
use crate::error::{Error, Result};

pub use imp::ProcessMemory;

#[cfg(target_os = "windows")]
mod imp {
    use std::ffi::c_void;

    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
        PROCESS_VM_WRITE,
    };

    use super::{Error, ReadMemory, Result};

    pub struct ProcessMemory {
        pid: u32,
        handle: HANDLE,
        writable: bool,
    }

    impl ProcessMemory {
        /// Open a process for reading only
        pub fn open(pid: u32) -> Result<Self> {
            Self::open_with_access(pid, false)
        }

        /// Open a process for reading and writing
        pub fn open_writable(pid: u32) -> Result<Self> {
            Self::open_with_access(pid, true)
        }

        fn open_with_access(pid: u32, writable: bool) -> Result<Self> {
            let mut access = PROCESS_VM_READ | PROCESS_QUERY_INFORMATION;
            if writable {
                access |= PROCESS_VM_WRITE | PROCESS_VM_OPERATION;
            }
            // SAFETY: OpenProcess has no memory-safety preconditions; failure is reported via Result.
            let handle = unsafe { OpenProcess(access, false, pid) }
                .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: {}", pid, e)))?;
            debug!("Opened process {} (writable: {})", pid, writable);
            Ok(Self {
                pid,
                handle,
                writable,
            })
        }

        pub fn pid(&self) -> u32 {
            self.pid
        }
    }

    impl ReadMemory for ProcessMemory {
        fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; size];
            let mut bytes_read = 0usize;
            // SAFETY: the buffer is valid for `size` bytes and outlives the call.
            unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as *const c_void,
                    buffer.as_mut_ptr() as *mut c_void,
                    size,
                    Some(&mut bytes_read as *mut usize),
                )
            }
            .map_err(|e| Error::MemoryReadFailed {
                address,
                message: e.to_string(),
            })?;

            if bytes_read != size {
                return Err(Error::MemoryReadFailed {
                    address,
                    message: format!("partial read: {} of {} bytes", bytes_read, size),
                });
            }
            Ok(buffer)
        }

        fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
            if !self.writable {
                return Err(Error::WriteUnsupported);
            }
            let mut written = 0usize;
            // SAFETY: `data` is valid for `data.len()` bytes for the duration of the call.
            unsafe {
                WriteProcessMemory(
                    self.handle,
                    address as *const c_void,
                    data.as_ptr() as *const c_void,
                    data.len(),
                    Some(&mut written as *mut usize),
                )
            }
            .map_err(|e| Error::MemoryWriteFailed {
                address,
                message: e.to_string(),
            })?;
            if written != data.len() {
                return Err(Error::MemoryWriteFailed {
                    address,
                    message: format!("partial write: {} of {} bytes", written, data.len()),
                });
            }
            Ok(())
        }
    }

    impl Drop for ProcessMemory {
        fn drop(&mut self) {
            // SAFETY: the handle came from OpenProcess and is closed exactly once.
            let _ = unsafe { CloseHandle(self.handle) };
        }
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::FileExt;

    use tracing::debug;

    use super::{Error, ReadMemory, Result};

    /// Reads through `/proc/<pid>/mem`
    pub struct ProcessMemory {
        pid: u32,
        file: File,
        writable: bool,
    }

    impl ProcessMemory {
        /// Open a process for reading only
        pub fn open(pid: u32) -> Result<Self> {
            Self::open_with_access(pid, false)
        }

        /// Open a process for reading and writing
        pub fn open_writable(pid: u32) -> Result<Self> {
            Self::open_with_access(pid, true)
        }

        fn open_with_access(pid: u32, writable: bool) -> Result<Self> {
            let path = format!("/proc/{}/mem", pid);
            let file = OpenOptions::new()
                .read(true)
                .write(writable)
                .open(&path)
                .map_err(|e| Error::ProcessOpenFailed(format!("{}: {}", path, e)))?;
            debug!("Opened {} (writable: {})", path, writable);
            Ok(Self {
                pid,
                file,
                writable,
            })
        }

        pub fn pid(&self) -> u32 {
            self.pid
        }
    }

    impl ReadMemory for ProcessMemory {
        fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; size];
            self.file
                .read_exact_at(&mut buffer, address)
                .map_err(|e| Error::MemoryReadFailed {
                    address,
                    message: e.to_string(),
                })?;
            Ok(buffer)
        }

        fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
            if !self.writable {
                return Err(Error::WriteUnsupported);
            }
            self.file
                .write_all_at(data, address)
                .map_err(|e| Error::MemoryWriteFailed {
                    address,
                    message: e.to_string(),
                })
        }
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod imp {
    use super::{Error, ReadMemory, Result};

    pub struct ProcessMemory {
        pid: u32,
    }

    impl ProcessMemory {
        pub fn open(pid: u32) -> Result<Self> {
            Err(Error::ProcessOpenFailed(format!(
                "pid {}: live attach is not supported on this platform",
                pid
            )))
        }

        pub fn open_writable(pid: u32) -> Result<Self> {
            Self::open(pid)
        }

        pub fn pid(&self) -> u32 {
            self.pid
        }
    }

    impl ReadMemory for ProcessMemory {
        fn read_bytes(&self, address: u64, _size: usize) -> Result<Vec<u8>> {
            Err(Error::MemoryReadFailed {
                address,
                message: "unsupported platform".to_string(),
            })
        }
    }
}
