//! Hazard-pointer records.
//!
//! A record is a single protection slot visible to every thread. Records are
//! allocated on demand, published on the domain's append-only list and then
//! recycled through the free stack or a thread-local cache forever; they are
//! never deallocated. This sidesteps the need for a reclamation scheme for
//! the reclamation machinery itself.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::CachePadded;

use crate::domain::Domain;

/// One protection slot plus its linkage in the owning domain.
///
/// A record is in exactly one of two states: owned by a [`Holder`] or
/// available (on the domain free stack or in a thread-local cache).
///
/// [`Holder`]: crate::Holder
pub(crate) struct HpRecord {
    /// The protected pointer. Null means the owner is not protecting
    /// anything. Written with release by the owner, read with acquire by the
    /// reclaimer's scan.
    pub(crate) ptr: CachePadded<AtomicPtr<()>>,

    /// Link in the domain's append-only list of all records. Written once
    /// before publication, immutable afterwards.
    pub(crate) all_next: AtomicPtr<HpRecord>,

    /// Link on the domain free stack or inside a flushed cache batch.
    /// Relaxed traffic only; the stack head CASes carry the ordering.
    pub(crate) avail_next: AtomicPtr<HpRecord>,

    /// The domain this record was allocated in and must be returned to.
    pub(crate) domain: &'static Domain,
}

impl HpRecord {
    pub(crate) fn new(domain: &'static Domain) -> Self {
        Self {
            ptr: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            all_next: AtomicPtr::new(ptr::null_mut()),
            avail_next: AtomicPtr::new(ptr::null_mut()),
            domain,
        }
    }

    /// Current slot value, as seen by the reclaimer.
    #[inline]
    pub(crate) fn protected(&self, order: Ordering) -> *mut () {
        self.ptr.load(order)
    }
}

// SAFETY: all shared state in a record is atomic; the domain reference is
// immutable and 'static.
unsafe impl Send for HpRecord {}
// SAFETY: see above.
unsafe impl Sync for HpRecord {}
