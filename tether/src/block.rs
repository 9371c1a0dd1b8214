//! Control block: shared lifetime metadata for one managed object.
//!
//! Implements the strong/weak release protocol:
//! - `try_add_strong`: CAS loop, the only path that may raise the strong
//!   count from a possibly-zero value; never succeeds after it reaches 0
//! - `release_strong`: release decrement; the 1 → 0 transition destroys the
//!   object behind a CAS latch, then drops the collective weak reference
//! - `release_weak`: release decrement; the 1 → 0 transition frees the block
//!
//! The strong population collectively holds one weak reference, taken at
//! allocation and dropped by the last strong release. This funnels block
//! deallocation through a single zero transition, so the block is freed
//! exactly once even when a last-strong and a last-weak releaser race.
//!
//! The block is untyped: the object slot is `*mut ()` and destruction goes
//! through a type-erased destructor captured at allocation. Handles carry
//! the pointee type; retyping a handle never changes how the object dies.

use core::alloc::Layout;
use core::ptr::NonNull;
use core::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::Backoff;

/// Type-erased destructor for the managed object.
pub(crate) type DropFn = unsafe fn(*mut ());

/// Per-object metadata. Lives on the heap, shared by every handle that
/// references the object, mutated only through atomic operations.
///
/// Aligned to 8 so the low bit of a block pointer is free for the handle's
/// mode tag.
#[repr(align(8))]
pub(crate) struct Block {
    /// Owning references. The 1 → 0 transition destroys the object.
    strong: AtomicUsize,
    /// Non-owning references, plus one held collectively by the strong
    /// population. The 1 → 0 transition frees the block.
    weak: AtomicUsize,
    /// Exclusive ownership slot for the managed object; nulled on destroy.
    object: AtomicPtr<()>,
    /// Set exactly once; the CAS winner runs the destructor.
    destroyed: AtomicBool,
    destructor: DropFn,
}

impl Block {
    /// Allocate a block for `object` with strong = 1.
    ///
    /// Returns `None` if the allocation fails, leaving `object` untouched
    /// so the caller can destroy it before reporting the failure.
    pub(crate) fn alloc(object: NonNull<()>, destructor: DropFn) -> Option<NonNull<Block>> {
        let layout = Layout::new::<Block>();
        // SAFETY: Block has a non-zero size.
        let raw = unsafe { alloc::alloc::alloc(layout) } as *mut Block;
        let block = NonNull::new(raw)?;
        // SAFETY: freshly allocated with the layout of Block, not shared yet.
        unsafe {
            block.as_ptr().write(Block {
                strong: AtomicUsize::new(1),
                // One collective weak reference held by the strong population.
                weak: AtomicUsize::new(1),
                object: AtomicPtr::new(object.as_ptr()),
                destroyed: AtomicBool::new(false),
                destructor,
            });
        }
        Some(block)
    }

    /// Unconditional strong increment. Callers already hold a strong
    /// reference, so the count is nonzero and no data is published.
    #[inline]
    pub(crate) fn add_strong(&self) {
        self.strong.fetch_add(1, Ordering::Relaxed);
    }

    /// Unconditional weak increment.
    #[inline]
    pub(crate) fn add_weak(&self) {
        self.weak.fetch_add(1, Ordering::Relaxed);
    }

    /// Attempt to raise the strong count from a possibly-zero value.
    ///
    /// Succeeds only while the count is observed nonzero; once it has
    /// reached 0 the object is (being) destroyed and must not be revived.
    /// Acquire on both CAS paths so a promoted reference never observes a
    /// pre-destruction state as live.
    pub(crate) fn try_add_strong(&self) -> bool {
        let backoff = Backoff::new();
        let mut count = self.strong.load(Ordering::Acquire);
        while count > 0 {
            match self.strong.compare_exchange_weak(
                count,
                count + 1,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => {
                    count = observed;
                    backoff.spin();
                }
            }
        }
        false
    }

    /// Drop one strong reference.
    ///
    /// # Safety
    ///
    /// The caller must own a strong reference it will not use again. The
    /// block may be freed before this returns.
    pub(crate) unsafe fn release_strong(block: NonNull<Block>) {
        // SAFETY: the caller's reference keeps the block alive across the
        // decrement.
        let this = unsafe { block.as_ref() };
        if this.strong.fetch_sub(1, Ordering::Release) == 1 {
            // Pair with every prior holder's release decrement: all their
            // writes must be visible before the destructor runs.
            fence(Ordering::Acquire);
            this.destroy_object();
            // The strong population's collective weak reference dies with
            // its last member. This is the only release path that can free
            // the block while weak handles never existed.
            unsafe { Block::release_weak(block) };
        }
    }

    /// Drop one weak reference.
    ///
    /// # Safety
    ///
    /// The caller must own a weak reference it will not use again. The
    /// block may be freed before this returns.
    pub(crate) unsafe fn release_weak(block: NonNull<Block>) {
        // SAFETY: as in release_strong.
        let this = unsafe { block.as_ref() };
        if this.weak.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            // SAFETY: both counts have reached zero; no reference remains.
            unsafe { Block::dealloc(block) };
        }
    }

    /// Destroy the managed object exactly once.
    ///
    /// Concurrent last-releasers race on the latch; the single CAS winner
    /// takes the object pointer and runs the destructor.
    fn destroy_object(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let object = self.object.swap(core::ptr::null_mut(), Ordering::AcqRel);
            if !object.is_null() {
                // SAFETY: the slot owned the object exclusively and the
                // latch guarantees a single winner; the destructor matches
                // the type the block was allocated with.
                unsafe { (self.destructor)(object) };
            }
        }
    }

    /// # Safety
    ///
    /// Both counts must have reached zero; nothing may touch the block after.
    unsafe fn dealloc(block: NonNull<Block>) {
        // Block holds no droppable fields; releasing the allocation is enough.
        unsafe { alloc::alloc::dealloc(block.as_ptr().cast(), Layout::new::<Block>()) };
    }

    /// Raw pointer to the managed object; null once destroyed.
    #[inline]
    pub(crate) fn object(&self) -> *mut () {
        self.object.load(Ordering::Acquire)
    }

    /// Whether any strong reference remains.
    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        self.strong.load(Ordering::Acquire) > 0
    }

    #[inline]
    pub(crate) fn strong_count(&self) -> usize {
        self.strong.load(Ordering::Acquire)
    }

    /// Outstanding weak references, excluding the strong population's
    /// collective one while the object is alive.
    pub(crate) fn weak_count(&self) -> usize {
        let weak = self.weak.load(Ordering::Acquire);
        if self.strong.load(Ordering::Acquire) > 0 {
            weak - 1
        } else {
            weak
        }
    }

    /// True when the caller's strong reference is the only reference of
    /// either kind (raw weak == 1 is just the collective reference).
    pub(crate) fn is_unique(&self) -> bool {
        self.strong.load(Ordering::Acquire) == 1 && self.weak.load(Ordering::Acquire) == 1
    }
}
