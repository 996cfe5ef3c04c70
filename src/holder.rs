//! Scoped ownership of one hazard-pointer record.

use core::ptr;
use core::sync::atomic::{fence, AtomicPtr, Ordering};
use std::ptr::NonNull;

use crate::domain::Domain;
use crate::record::HpRecord;
use crate::tlc;

/// Owns a single protection slot for the duration of a protected region.
///
/// Construction acquires a record (thread-local cache first, then the
/// domain); dropping the holder clears the slot and returns the record. In
/// between, [`protect`](Holder::protect) and [`reset`](Holder::reset)
/// announce which pointer the owning thread may be about to dereference.
///
/// A holder must only be driven from one thread at a time.
pub struct Holder {
    rec: NonNull<HpRecord>,
}

impl Holder {
    /// Acquires a record from the default domain.
    #[inline]
    pub fn new() -> Self {
        let rec = tlc::try_acquire().unwrap_or_else(|| Domain::global().acquire_record());
        let holder = Self { rec };
        holder.clear();
        holder
    }

    /// Acquires a record from `domain`, bypassing the thread-local cache.
    #[inline]
    pub fn in_domain(domain: &'static Domain) -> Self {
        let holder = Self { rec: domain.acquire_record() };
        holder.clear();
        holder
    }

    #[inline]
    fn record(&self) -> &HpRecord {
        unsafe { self.rec.as_ref() }
    }

    /// Publishes `ptr` in the protection slot: no reclaimer will free the
    /// object at `ptr` until the slot is overwritten or cleared.
    ///
    /// This alone does not validate that `ptr` is still reachable; use
    /// [`protect`](Holder::protect) when loading from a shared location.
    #[inline]
    pub fn reset<T>(&self, ptr: *const T) {
        self.record().ptr.store(ptr as *mut (), Ordering::Release);
    }

    /// Clears the protection slot.
    #[inline]
    pub fn clear(&self) {
        self.reset::<()>(ptr::null());
    }

    /// Loads a pointer from `src` and protects it, retrying until the
    /// protected value is validated against the source.
    ///
    /// The publish-fence-revalidate sequence pairs with the reclaimer's scan
    /// fence: either this slot is visible to the scan and the object is kept,
    /// or the revalidating reload observes the source already changed and the
    /// loop adopts the new value.
    pub fn protect<T>(&self, src: &AtomicPtr<T>) -> *mut T {
        let mut p = src.load(Ordering::Relaxed);
        loop {
            self.reset(p);
            fence(Ordering::SeqCst);
            let v = src.load(Ordering::Acquire);
            if p == v {
                return p;
            }
            p = v;
        }
    }
}

impl Default for Holder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Holder {
    fn drop(&mut self) {
        // The slot must be clear before the record becomes acquirable again.
        self.clear();
        let domain = self.record().domain;
        if ptr::eq(domain, Domain::global()) && tlc::try_release(self.rec) {
            return;
        }
        domain.release_record(self.rec);
    }
}
