//! Allocation adapter: untyped allocations for non-owning callers, backed
//! by [`tether::Ptr`].
//!
//! Each allocation is registered in a global handle table under an opaque
//! `u64` id. The table entry holds one strong reference; the raw pointer
//! handed out stays valid until that entry is freed *and* every reference
//! taken with [`adopt`] has been released. Freeing is explicit — there is
//! no scope trick at the boundary, and a stale id is a safe no-op rather
//! than undefined behavior.
//!
//! # Example
//!
//! ```rust
//! use tether_alloc::{alloc_zeroed, adopt, free};
//!
//! let handle = alloc_zeroed(4, 8);
//! assert!(!handle.is_failure());
//!
//! // A managed caller takes an owning reference on top of the allocation.
//! let keeper = adopt(handle.id).unwrap();
//!
//! // The explicit free drops the table's reference...
//! assert!(free(handle.id));
//! assert!(!free(handle.id)); // ...and double-free is a safe no-op.
//!
//! // The bytes live on until the adopted reference is gone.
//! assert_eq!(keeper.len(), 32);
//! drop(keeper);
//! ```

#![warn(missing_docs)]

mod buf;
pub mod ffi;
mod table;

pub use buf::ByteBuf;

use core::mem;
use core::ptr;

use tether::Ptr;

/// Opaque allocation handle returned to non-owning callers.
///
/// The first field is the raw pointer, per the boundary contract; `id`
/// names the allocation in the handle table for [`adopt`] and [`free`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawAlloc {
    /// First byte of the allocation; null on failure.
    pub raw: *mut u8,
    /// Table id; 0 on failure.
    pub id: u64,
}

impl RawAlloc {
    /// The failure value: null pointer, id 0.
    pub const fn failed() -> Self {
        Self {
            raw: ptr::null_mut(),
            id: 0,
        }
    }

    /// Whether this handle reports an allocation failure.
    pub fn is_failure(&self) -> bool {
        self.id == 0
    }
}

fn register_buf(buf: ByteBuf) -> RawAlloc {
    // The buffer address outlives the move below: it points at the heap
    // bytes, not at the ByteBuf value.
    let raw = buf.as_mut_ptr();
    match Ptr::try_new(buf) {
        Ok(owner) => RawAlloc {
            raw,
            id: table::register(owner),
        },
        Err(_) => RawAlloc::failed(),
    }
}

/// Allocate `size` uninitialized bytes (malloc form).
pub fn alloc_bytes(size: usize) -> RawAlloc {
    match ByteBuf::uninit(size) {
        Ok(buf) => register_buf(buf),
        Err(_) => RawAlloc::failed(),
    }
}

/// Allocate `count * size` zeroed bytes (calloc form). An overflowing
/// product is an allocation failure, never a short allocation.
pub fn alloc_zeroed(count: usize, size: usize) -> RawAlloc {
    let Some(total) = count.checked_mul(size) else {
        return RawAlloc::failed();
    };
    match ByteBuf::zeroed(total) {
        Ok(buf) => register_buf(buf),
        Err(_) => RawAlloc::failed(),
    }
}

/// Allocate one uninitialized object-sized region for `T`
/// (allocate-one-of-type form). `T` must not require alignment above 16,
/// as with malloc.
pub fn alloc_one<T>() -> RawAlloc {
    alloc_bytes(mem::size_of::<T>())
}

/// Allocate a zeroed array region for `count` values of `T`
/// (allocate-array-of-type form).
pub fn alloc_array<T>(count: usize) -> RawAlloc {
    alloc_zeroed(count, mem::size_of::<T>())
}

/// Take an owning reference on top of the allocation named by `id`.
///
/// Returns `None` once the id has been freed. The allocation stays alive
/// until every adopted reference is released.
pub fn adopt(id: u64) -> Option<Ptr<ByteBuf>> {
    table::adopt(id)
}

/// Drop the table's owning reference for `id`. Returns false for unknown
/// or already-freed ids.
pub fn free(id: u64) -> bool {
    table::release(id)
}
