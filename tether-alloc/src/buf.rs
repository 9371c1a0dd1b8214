//! Raw byte allocations with malloc-compatible alignment.

use core::alloc::Layout;
use core::ptr::NonNull;

use tether::AllocError;

/// Every buffer is aligned for any ordinary C type, the way malloc's
/// max_align_t guarantees.
const BUF_ALIGN: usize = 16;

/// An owned, fixed-size byte allocation, freed on drop.
///
/// Zero-length buffers hold no allocation; their pointer is dangling and
/// must not be dereferenced, only compared or passed through.
pub struct ByteBuf {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: ByteBuf owns its allocation; the bytes carry no thread affinity.
// Callers that hand the raw pointer to foreign code are responsible for
// synchronizing access to the contents, as with any malloc'd region.
unsafe impl Send for ByteBuf {}
// SAFETY: see above.
unsafe impl Sync for ByteBuf {}

impl ByteBuf {
    fn layout(len: usize) -> Result<Layout, AllocError> {
        Layout::from_size_align(len, BUF_ALIGN).map_err(|_| AllocError)
    }

    /// Allocate `len` uninitialized bytes.
    pub fn uninit(len: usize) -> Result<Self, AllocError> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }
        let layout = Self::layout(len)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc(layout) };
        match NonNull::new(raw) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(AllocError),
        }
    }

    /// Allocate `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Result<Self, AllocError> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }
        let layout = Self::layout(len)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        match NonNull::new(raw) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(AllocError),
        }
    }

    /// Raw pointer to the first byte. Valid for `len()` bytes until this
    /// buffer is dropped; dangling when the buffer is empty.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the allocation in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for ByteBuf {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: allocated in uninit/zeroed with this exact layout;
            // from_size_align succeeded there.
            unsafe {
                std::alloc::dealloc(
                    self.ptr.as_ptr(),
                    Layout::from_size_align_unchecked(self.len, BUF_ALIGN),
                );
            }
        }
    }
}
