//! SharedMemoryRegion - POSIX shared memory wrapper.
//!
//! Owns one `MAP_SHARED` mapping, either backed by a named `shm_open` object
//! or anonymous (inherited by children across `fork`). The mapping is
//! unmapped on drop; the creator of a named object also unlinks it.

use std::ffi::CString;
use std::ptr::NonNull;

use crate::error::SharedMemoryError;

/// Where the mapping comes from.
#[derive(Debug)]
enum Backing {
    Named { name: String, fd: i32, is_owner: bool },
    Anonymous,
}

/// Represents a mapped shared memory region.
///
/// This struct owns the mapped memory and will unmap it on drop.
pub struct SharedMemoryRegion {
    backing: Backing,
    /// Start of the mapping; page aligned.
    ptr: NonNull<u8>,
    /// Size of the mapped region in bytes.
    size: usize,
}

// SAFETY: the region owns its mapping. Everything placed into it is accessed
// through `ShmSafe` types, which synchronize with atomics.
unsafe impl Send for SharedMemoryRegion {}

// SAFETY: see above.
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Minimum size for a shared memory region.
    pub const MIN_SIZE: usize = 4096;

    /// Maximum size for a shared memory region (1 GB).
    pub const MAX_SIZE: usize = 1024 * 1024 * 1024;

    fn check_size(name: &str, size: usize) -> Result<(), SharedMemoryError> {
        if size < Self::MIN_SIZE {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("Size {} is below minimum {}", size, Self::MIN_SIZE),
            });
        }
        if size > Self::MAX_SIZE {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("Size {} exceeds maximum {}", size, Self::MAX_SIZE),
            });
        }
        Ok(())
    }

    fn c_name(name: &str) -> Result<CString, SharedMemoryError> {
        if name.is_empty() {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: "Name cannot be empty".to_string(),
            });
        }
        CString::new(format!("/{}", name)).map_err(|e| SharedMemoryError::CreateFailed {
            name: name.to_string(),
            reason: format!("Invalid name: {}", e),
        })
    }

    /// mmap `size` bytes read/write and shared. `fd` is -1 for anonymous.
    fn map(size: usize, fd: i32) -> Result<NonNull<u8>, SharedMemoryError> {
        let flags = if fd < 0 {
            libc::MAP_SHARED | libc::MAP_ANONYMOUS
        } else {
            libc::MAP_SHARED
        };

        // SAFETY: size is validated, fd is either -1 with MAP_ANONYMOUS or a
        // valid descriptor, offset 0 is valid.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(SharedMemoryError::MapFailed {
                reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        NonNull::new(ptr as *mut u8).ok_or_else(|| SharedMemoryError::MapFailed {
            reason: "mmap returned a null mapping".to_string(),
        })
    }

    /// Create a new named shared memory region.
    ///
    /// # Arguments
    /// * `name` - Name of the shared memory object (will be prefixed with /)
    /// * `size` - Size in bytes (must be between MIN_SIZE and MAX_SIZE)
    ///
    /// # Errors
    /// Fails if the object already exists or cannot be sized or mapped.
    pub fn create(name: &str, size: usize) -> Result<Self, SharedMemoryError> {
        Self::check_size(name, size)?;
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600,
            )
        };

        if fd < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::EEXIST) {
                return Err(SharedMemoryError::CreateFailed {
                    name: name.to_string(),
                    reason: "Shared memory already exists".to_string(),
                });
            }
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", errno),
            });
        }

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            // SAFETY: fd and c_name are valid; we created the object.
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        let ptr = match Self::map(size, fd) {
            Ok(ptr) => ptr,
            Err(e) => {
                // SAFETY: as above.
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(e);
            }
        };

        // A fresh object reads as zero already; a recycled name may not.
        // SAFETY: ptr is valid for size bytes.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, size);
        }

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            backing: Backing::Named {
                name: name.to_string(),
                fd,
                is_owner: true,
            },
            ptr,
            size,
        })
    }

    /// Open an existing named shared memory region.
    pub fn open(name: &str, size: usize) -> Result<Self, SharedMemoryError> {
        Self::check_size(name, size)?;
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        let ptr = match Self::map(size, fd) {
            Ok(ptr) => ptr,
            Err(e) => {
                // SAFETY: fd was opened above.
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Opened shared memory region");

        Ok(Self {
            backing: Backing::Named {
                name: name.to_string(),
                fd,
                is_owner: false,
            },
            ptr,
            size,
        })
    }

    /// Map an anonymous shared region.
    ///
    /// Nothing else can open it by name; it is shared with processes forked
    /// after this call.
    pub fn anonymous(size: usize) -> Result<Self, SharedMemoryError> {
        Self::check_size("<anonymous>", size)?;
        let ptr = Self::map(size, -1)?;

        tracing::debug!(size = size, "Mapped anonymous shared memory region");

        Ok(Self {
            backing: Backing::Anonymous,
            ptr,
            size,
        })
    }

    /// Name of the shared memory object, `None` for anonymous mappings.
    pub fn name(&self) -> Option<&str> {
        match &self.backing {
            Backing::Named { name, .. } => Some(name),
            Backing::Anonymous => None,
        }
    }

    /// Get the size of this shared memory region.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get a raw pointer to the start of the mapping.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl std::fmt::Debug for SharedMemoryRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemoryRegion")
            .field("name", &self.name())
            .field("size", &self.size)
            .finish()
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and size were set during creation
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };
        if result < 0 {
            tracing::error!(
                name = ?self.name(),
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }

        if let Backing::Named { name, fd, is_owner } = &self.backing {
            // SAFETY: fd was opened during creation
            unsafe { libc::close(*fd) };

            if *is_owner {
                if let Ok(c_name) = CString::new(format!("/{}", name)) {
                    // SAFETY: c_name is a valid CString
                    unsafe { libc::shm_unlink(c_name.as_ptr()) };
                    tracing::debug!(name = %name, "Unlinked shared memory region");
                }
            }
        }
    }
}
