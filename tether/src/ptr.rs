//! `Ptr<T>` — the user-facing handle.
//!
//! A handle is one machine word: a control-block pointer with the auto-weak
//! mode in the low tag bit. Packing reference and mode into a single unit
//! means a handle can never be observed with a block/mode pair that belongs
//! to neither its old nor its new state; mutating transitions additionally
//! take `&mut self`, so there is no direct swap operation to race against —
//! callers exchange handles with `core::mem::swap` under exclusive borrows.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::NonNull;

use alloc::alloc::handle_alloc_error;
use alloc::boxed::Box;

use crate::block::Block;
use crate::error::AllocError;

/// Low bit of the packed word: set when the handle is auto-weak.
const WEAK_TAG: usize = 0b1;

/// A thread-safe reference-counted handle that is either *strong* (owning),
/// *auto-weak* (non-owning but promotable), or *null*.
///
/// Strong handles keep the object alive and grant access through
/// [`get`](Ptr::get) and `Deref`. Auto-weak handles never grant access;
/// they are obtained from any strong handle via [`observe`](Ptr::observe)
/// or [`downgrade`](Ptr::downgrade) and can be promoted back with
/// [`promote`](Ptr::promote) while the object lives. Demoting the
/// back-edges of a reference cycle to auto-weak makes the strong reference
/// graph acyclic, so ordinary counting reclaims it — there is no cycle
/// detector.
///
/// # Example
///
/// ```rust
/// use tether::Ptr;
///
/// let strong = Ptr::new(7usize);
/// let weak = strong.downgrade();
///
/// assert_eq!(*strong.promote().unwrap(), 7);
/// assert_eq!(*weak.promote().unwrap(), 7);
///
/// drop(strong);
/// assert!(weak.expired());
/// assert!(weak.promote().is_none());
/// ```
pub struct Ptr<T> {
    /// Block pointer | WEAK_TAG; 0 is the null state.
    tagged: usize,
    _marker: PhantomData<*mut T>,
}

// SAFETY: Ptr hands out &T across threads and the last handle anywhere may
// run T's destructor, so both Send and Sync require T: Send + Sync, exactly
// as for std's Arc.
unsafe impl<T: Send + Sync> Send for Ptr<T> {}
// SAFETY: see above.
unsafe impl<T: Send + Sync> Sync for Ptr<T> {}

/// Destructor thunk stored in the block; the object was created by
/// `Box::into_raw::<T>`.
unsafe fn drop_boxed<T>(object: *mut ()) {
    // SAFETY: called exactly once, from the destroy latch winner.
    drop(unsafe { Box::from_raw(object as *mut T) });
}

impl<T> Ptr<T> {
    /// The null handle: no control block, no mode.
    pub const fn null() -> Self {
        Ptr {
            tagged: 0,
            _marker: PhantomData,
        }
    }

    /// Construct `value` on the heap and wrap it in one strong handle.
    ///
    /// Aborts the process if the control block cannot be allocated; use
    /// [`try_new`](Ptr::try_new) to handle that failure instead.
    pub fn new(value: T) -> Self {
        match Self::try_new(value) {
            Ok(ptr) => ptr,
            Err(_) => handle_alloc_error(Layout::new::<Block>()),
        }
    }

    /// Fallible [`new`](Ptr::new). On control-block allocation failure the
    /// value is dropped before the error is returned; nothing leaks.
    pub fn try_new(value: T) -> Result<Self, AllocError> {
        let object = Box::into_raw(Box::new(value));
        // SAFETY: object is non-null and uniquely owned by this call.
        unsafe { Self::try_from_raw(object) }
    }

    /// Take ownership of a raw heap object.
    ///
    /// A null `object` yields the null handle. Aborts on control-block
    /// allocation failure, as [`new`](Ptr::new) does.
    ///
    /// # Safety
    ///
    /// A non-null `object` must have been produced by `Box::into_raw` and
    /// must not be owned or freed by anything else afterwards.
    pub unsafe fn from_raw(object: *mut T) -> Self {
        // SAFETY: forwarded contract.
        match unsafe { Self::try_from_raw(object) } {
            Ok(ptr) => ptr,
            Err(_) => handle_alloc_error(Layout::new::<Block>()),
        }
    }

    /// Fallible [`from_raw`](Ptr::from_raw). On control-block allocation
    /// failure the object is destroyed before the error is returned.
    ///
    /// # Safety
    ///
    /// As for [`from_raw`](Ptr::from_raw).
    pub unsafe fn try_from_raw(object: *mut T) -> Result<Self, AllocError> {
        let Some(object) = NonNull::new(object) else {
            return Ok(Self::null());
        };
        match Block::alloc(object.cast(), drop_boxed::<T>) {
            Some(block) => Ok(Ptr {
                tagged: block.as_ptr() as usize,
                _marker: PhantomData,
            }),
            None => {
                // The failure path must not leak the object.
                // SAFETY: per the caller contract, we own it.
                drop(unsafe { Box::from_raw(object.as_ptr()) });
                Err(AllocError)
            }
        }
    }

    fn block_ptr(&self) -> Option<NonNull<Block>> {
        NonNull::new((self.tagged & !WEAK_TAG) as *mut Block)
    }

    fn block(&self) -> Option<&Block> {
        // SAFETY: a non-null word means this handle holds a count on the
        // block, which therefore outlives &self.
        self.block_ptr().map(|block| unsafe { &*block.as_ptr() })
    }

    /// Whether this handle is in auto-weak mode.
    #[inline]
    pub fn is_weak(&self) -> bool {
        self.tagged & WEAK_TAG != 0
    }

    /// Whether this handle references no object at all.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.tagged == 0
    }

    /// Demote this handle to an auto-weak reference on `other`'s object.
    ///
    /// Releases whatever this handle currently holds. If `other` is a
    /// strong handle, this handle attaches to its control block weakly —
    /// the target's strong count is untouched, so the edge no longer keeps
    /// the target alive. If `other` is null or itself auto-weak, this
    /// handle becomes null.
    ///
    /// This is the cycle-breaking operation: demote one edge of every
    /// ownership cycle and the strong graph is acyclic.
    pub fn observe(&mut self, other: &Ptr<T>) {
        let next = match other.block() {
            Some(block) if !other.is_weak() => {
                block.add_weak();
                Ptr {
                    tagged: other.tagged | WEAK_TAG,
                    _marker: PhantomData,
                }
            }
            _ => Ptr::null(),
        };
        // The replaced value's drop releases the old reference.
        *self = next;
    }

    /// A new auto-weak handle on this strong handle's object; null if this
    /// handle is not strong.
    pub fn downgrade(&self) -> Ptr<T> {
        match self.block() {
            Some(block) if !self.is_weak() => {
                block.add_weak();
                Ptr {
                    tagged: self.tagged | WEAK_TAG,
                    _marker: PhantomData,
                }
            }
            _ => Ptr::null(),
        }
    }

    /// Attempt to obtain a strong handle.
    ///
    /// On a strong handle this is a plain clone. On an auto-weak handle it
    /// succeeds only while the object is alive: the strong count is raised
    /// through a CAS loop that refuses to move off zero, so a destroyed
    /// object can never be resurrected. `None` is the defined promotion
    /// failure — callers branch on it.
    pub fn promote(&self) -> Option<Ptr<T>> {
        let block = self.block()?;
        if !self.is_weak() {
            return Some(self.clone());
        }
        if block.try_add_strong() {
            Some(Ptr {
                tagged: self.tagged & !WEAK_TAG,
                _marker: PhantomData,
            })
        } else {
            None
        }
    }

    /// Borrow the managed object. `None` unless this handle is strong:
    /// auto-weak references never grant direct access — promote first.
    pub fn get(&self) -> Option<&T> {
        if self.is_weak() {
            return None;
        }
        let block = self.block()?;
        // SAFETY: self holds a strong reference, so the object cannot be
        // destroyed while the returned borrow lives.
        unsafe { (block.object() as *const T).as_ref() }
    }

    /// Exclusively borrow the managed object, if this strong handle is the
    /// only reference of either kind.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.is_weak() {
            return None;
        }
        let block = self.block()?;
        if !block.is_unique() {
            return None;
        }
        // SAFETY: sole reference anywhere; no other handle exists to read
        // or clone from, and &mut self excludes reuse of this one.
        unsafe { (block.object() as *mut T).as_mut() }
    }

    /// Raw pointer to the managed object; null unless this handle is strong.
    pub fn as_ptr(&self) -> *const T {
        if self.is_weak() {
            return core::ptr::null();
        }
        match self.block() {
            Some(block) => block.object() as *const T,
            None => core::ptr::null(),
        }
    }

    /// True if there is no object to reach: null handle, or the object has
    /// already been destroyed.
    pub fn expired(&self) -> bool {
        match self.block() {
            Some(block) => !block.is_alive(),
            None => true,
        }
    }

    /// Number of strong references on the object; 0 for the null handle.
    pub fn strong_count(&self) -> usize {
        self.block().map_or(0, Block::strong_count)
    }

    /// Number of auto-weak references on the object; 0 for the null handle.
    pub fn weak_count(&self) -> usize {
        self.block().map_or(0, Block::weak_count)
    }

    /// Whether this is the only strong reference.
    pub fn is_unique(&self) -> bool {
        self.strong_count() == 1
    }

    /// Release the held reference and return to the null state.
    pub fn reset(&mut self) {
        *self = Ptr::null();
    }

    /// Move the reference out, leaving this handle null.
    pub fn take(&mut self) -> Ptr<T> {
        mem::take(self)
    }

    /// Retype the handle, leaving count bookkeeping and destruction alone.
    ///
    /// The clone references the same control block, so the object is still
    /// destroyed as the type it was created with.
    ///
    /// # Safety
    ///
    /// The managed object must be valid at type `U` at the same address
    /// for every access made through the returned handle.
    pub unsafe fn cast<U>(&self) -> Ptr<U> {
        if let Some(block) = self.block() {
            if self.is_weak() {
                block.add_weak();
            } else {
                block.add_strong();
            }
        }
        Ptr {
            tagged: self.tagged,
            _marker: PhantomData,
        }
    }

    /// Object identity: the block's object pointer, regardless of mode.
    /// Weak handles to a destroyed object resolve to null.
    fn identity(&self) -> *const () {
        match self.block() {
            Some(block) => block.object() as *const (),
            None => core::ptr::null(),
        }
    }
}

impl<T> Clone for Ptr<T> {
    /// Copy the handle, incrementing the matching count on the same block.
    fn clone(&self) -> Self {
        if let Some(block) = self.block() {
            if self.is_weak() {
                block.add_weak();
            } else {
                block.add_strong();
            }
        }
        Ptr {
            tagged: self.tagged,
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for Ptr<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block_ptr() {
            // SAFETY: we own exactly one reference of the tagged kind and
            // never touch the block again.
            unsafe {
                if self.is_weak() {
                    Block::release_weak(block);
                } else {
                    Block::release_strong(block);
                }
            }
        }
    }
}

impl<T> Default for Ptr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Deref for Ptr<T> {
    type Target = T;

    /// Dereferencing a null or auto-weak handle is a precondition failure
    /// and panics; promote auto-weak handles first.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced a null or auto-weak handle"),
        }
    }
}

impl<T> PartialEq for Ptr<T> {
    /// Handles are equal iff they resolve to the same object identity (or
    /// both to none). Auto-weak handles compare via identity, not liveness.
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T> Eq for Ptr<T> {}

impl<T: fmt::Debug> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("Ptr");
        if let Some(strong) = self.promote() {
            if let Some(value) = strong.get() {
                tuple.field(value);
            }
        }
        tuple.finish()
    }
}
