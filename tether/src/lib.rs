//! Tether: lock-free reference counting with strong and auto-weak handles.
//!
//! A [`Ptr<T>`] is an owning ("strong") or non-owning-but-promotable
//! ("auto-weak") reference to one heap object. Any handle can be demoted in
//! place with [`Ptr::observe`], which is how reference cycles are broken:
//! demote the back-edge of a cycle and the strong reference graph becomes
//! acyclic, so ordinary counting reclaims it. There is no cycle detector —
//! breaking cycles is explicit, by convention.
//!
//! # Key Properties
//!
//! - **Lock-free**: every operation is an atomic instruction or a bounded
//!   CAS retry loop; no mutex guards the shared state
//! - **No resurrection**: promotion refuses to move the strong count off
//!   zero, so a destroyed object can never come back as a live reference
//! - **Exactly-once teardown**: the object dies on the last strong release
//!   behind a CAS latch; the control block outlives it while auto-weak
//!   references remain and is freed exactly once
//!
//! # Example
//!
//! ```rust
//! use tether::Ptr;
//!
//! let a = Ptr::new(String::from("shared"));
//! let b = a.clone();
//! assert_eq!(a.strong_count(), 2);
//!
//! // Demote b: it now observes the object without keeping it alive.
//! let mut b = b;
//! b.observe(&a);
//! assert_eq!(a.strong_count(), 1);
//!
//! // Promotion succeeds while a strong handle remains...
//! assert_eq!(*b.promote().unwrap(), "shared");
//!
//! // ...and reports failure once the object is gone.
//! drop(a);
//! assert!(b.promote().is_none());
//! ```

#![warn(missing_docs)]

extern crate alloc;

mod block;
mod error;
mod ptr;

pub use error::AllocError;
pub use ptr::Ptr;
