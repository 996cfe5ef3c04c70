//! Retired-object descriptor for deferred reclamation.
//!
//! Every object that is reclaimed through the hazard-pointer engine embeds a
//! [`RetiredObject`] as its first field (`#[repr(C)]`), so the descriptor
//! address and the object address coincide. The engine only ever touches this
//! header; the payload behind it is opaque.

use core::ptr;

/// Type-erased reclaim callback, invoked exactly once per retired object when
/// no protection slot holds its address anymore.
///
/// # Safety
///
/// The callback receives the descriptor pointer the object was retired with
/// and must deallocate the containing object. It must not be called twice.
pub type ReclaimFn = unsafe fn(*mut RetiredObject);

/// Intrusive header carried by every reclaimable object.
///
/// Users embed this at the start of their node type:
///
/// ```
/// use vigil::RetiredObject;
///
/// #[repr(C)]
/// struct Node {
///     retired: RetiredObject,
///     value: u64,
/// }
/// ```
#[repr(C)]
pub struct RetiredObject {
    /// Next object on a retired list. Only meaningful while the object sits on
    /// a shard or on the reclaimer's survivor list, and only touched by the
    /// single thread that currently owns that list segment.
    pub(crate) next_retired: *mut RetiredObject,

    /// Reclaim callback, written by `retire` before the object is published on
    /// a shard.
    pub(crate) reclaim: Option<ReclaimFn>,
}

impl RetiredObject {
    /// Creates a detached descriptor.
    #[inline]
    pub const fn new() -> Self {
        Self { next_retired: ptr::null_mut(), reclaim: None }
    }
}

impl Default for RetiredObject {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the raw link is only mutated by the thread that currently owns the
// list segment the object sits on; handoff between threads goes through
// release/acquire operations on the shard heads.
unsafe impl Send for RetiredObject {}
// SAFETY: see above; cross-thread access is mediated by the shard stacks.
unsafe impl Sync for RetiredObject {}
