//! Vigil: hazard-pointer based safe memory reclamation for lock-free data
//! structures.
//!
//! Readers publish the pointer they are about to dereference in a per-thread
//! protection slot; writers that unlink an object hand it to the engine with
//! [`retire`], and the object is deallocated only once no slot holds its
//! address. No reader-side locks, no global quiescence: a sequentially
//! consistent fence on each side of the protocol is the only synchronization
//! between readers and reclaimers.
//!
//! # Key pieces
//!
//! - [`Holder`]: scoped ownership of one protection slot, with the
//!   load-protect-validate primitive [`Holder::protect`].
//! - [`RetiredObject`]: intrusive header embedded in every reclaimable
//!   object.
//! - [`Domain`]: the shared engine state. The process-wide default domain
//!   backs [`Holder::new`], [`retire`] and [`cleanup`]; dedicated domains
//!   isolate state for tests.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicPtr, Ordering};
//! use vigil::{cleanup, retire, Holder, RetiredObject};
//!
//! #[repr(C)]
//! struct Node {
//!     retired: RetiredObject,
//!     value: u64,
//! }
//!
//! unsafe fn reclaim_node(obj: *mut RetiredObject) {
//!     unsafe { drop(Box::from_raw(obj as *mut Node)) };
//! }
//!
//! let shared = AtomicPtr::new(Box::into_raw(Box::new(Node {
//!     retired: RetiredObject::new(),
//!     value: 42,
//! })));
//!
//! // Reader: protect before dereferencing.
//! let holder = Holder::new();
//! let node = holder.protect(&shared);
//! assert_eq!(unsafe { (*node).value }, 42);
//! holder.clear();
//!
//! // Writer: unlink, then retire.
//! let old = shared.swap(std::ptr::null_mut(), Ordering::AcqRel);
//! unsafe { retire(old as *mut RetiredObject, reclaim_node) };
//! cleanup();
//! ```

#![warn(missing_docs)]

mod domain;
mod holder;
mod record;
mod retired;
mod tlc;
mod tuning;

pub use domain::{cleanup, retire, Domain};
pub use holder::Holder;
pub use retired::{ReclaimFn, RetiredObject};
