//! C ABI entry points.
//!
//! Mirrors the classic malloc/calloc shim shape, with the explicit free
//! call the handle-table design requires. All functions are callable from
//! C; none of them contain unsafe code — ownership stays on the Rust side
//! and only the raw pointer and the opaque id cross the boundary.

use crate::RawAlloc;

/// Allocate `size` uninitialized bytes. On failure the returned handle has
/// a null pointer and id 0.
#[no_mangle]
pub extern "C" fn tether_malloc(size: usize) -> RawAlloc {
    crate::alloc_bytes(size)
}

/// Allocate `count * size` zeroed bytes, with an overflow-checked product.
#[no_mangle]
pub extern "C" fn tether_calloc(count: usize, size: usize) -> RawAlloc {
    crate::alloc_zeroed(count, size)
}

/// Release the table's owning reference for `id`. Returns false for ids
/// that were never issued or were already freed; double-free is a safe
/// no-op. The memory itself is reclaimed once every adopted reference is
/// also gone.
#[no_mangle]
pub extern "C" fn tether_free(id: u64) -> bool {
    crate::free(id)
}
