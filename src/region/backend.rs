// Shared memory backend abstraction.
// Uses anonymous MAP_SHARED mmap: both ends of a link live in one process,
// so the mapping needs no filesystem name, and the kernel hands back
// page-aligned, zero-filled memory.

use std::fmt::Debug;
use std::io;
use std::ptr::NonNull;

/// Backing storage for one link's channel region.
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Pointer to the start of the mapped region.
    fn as_ptr(&self) -> *mut u8;

    /// Size of the mapped region in bytes.
    fn size(&self) -> usize;
}

/// Map a new zero-filled shared region of at least `size` bytes.
#[cfg(unix)]
pub fn create_shared_memory(size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(MmapRegion::new(size)?))
}

#[cfg(not(unix))]
pub fn create_shared_memory(_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory regions are only supported on unix platforms",
    ))
}

/// Anonymous shared mapping. Page-aligned, zeroed by the kernel, unmapped
/// on drop.
#[cfg(unix)]
#[derive(Debug)]
pub struct MmapRegion {
    ptr: NonNull<u8>,
    size: usize,
}

// SAFETY: the mapping has no thread-local state; concurrent access is
// governed by the atomic channel protocols layered on top.
#[cfg(unix)]
unsafe impl Send for MmapRegion {}
#[cfg(unix)]
unsafe impl Sync for MmapRegion {}

#[cfg(unix)]
impl MmapRegion {
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Cannot map a zero-sized region",
            ));
        }

        // SAFETY: anonymous mapping, no fd involved; arguments are valid
        // POSIX mmap constants and size is non-zero.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            // SAFETY: MAP_FAILED checked above, mmap never returns null on success.
            ptr: unsafe { NonNull::new_unchecked(ptr as *mut u8) },
            size,
        })
    }
}

#[cfg(unix)]
impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/size describe exactly the mapping created in `new`.
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

#[cfg(unix)]
impl SharedMemoryBackend for MmapRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_zeroed_and_writable() {
        let size = 8192;
        let region = MmapRegion::new(size).expect("mmap failed");
        assert_eq!(region.size(), size);

        let ptr = region.as_ptr();
        // Fresh anonymous mappings are zero-filled.
        for i in (0..size).step_by(512) {
            // SAFETY: i < size, region is mapped read/write.
            assert_eq!(unsafe { *ptr.add(i) }, 0, "byte {i} not zeroed");
        }

        // SAFETY: offsets below size.
        unsafe {
            *ptr = 0x42;
            *ptr.add(size - 1) = 0x24;
            assert_eq!(*ptr, 0x42);
            assert_eq!(*ptr.add(size - 1), 0x24);
        }
    }

    #[test]
    fn zero_size_rejected() {
        assert!(MmapRegion::new(0).is_err());
    }
}
