//! Hazard-pointer domains: record management, sharded retired lists and the
//! reclamation pass.
//!
//! A domain owns every piece of shared state the engine needs: the
//! append-only list of all records (scanned read-only during reclamation),
//! a Treiber stack of available records, sharded stacks of retired objects,
//! a signed centralized retired counter and a test-and-set gate serializing
//! reclaimers. The process-wide default domain is created on first use;
//! additional domains can be constructed for isolation in tests.

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{
    fence, AtomicBool, AtomicI64, AtomicPtr, AtomicUsize, Ordering,
};
use std::collections::HashSet;
use std::ptr::NonNull;

use crossbeam_utils::CachePadded;
use once_cell::race::OnceBox;

use crate::record::HpRecord;
use crate::retired::{ReclaimFn, RetiredObject};
use crate::tuning::{BASE_THRESHOLD, COUNT_MULTIPLIER, NUM_SHARDS};

type ScanSet = HashSet<usize, foldhash::fast::RandomState>;

/// Shard of the retired list. Each shard is an independent Treiber stack so
/// concurrent retirers spread their CAS traffic across cache lines.
struct Shard {
    head: CachePadded<AtomicPtr<RetiredObject>>,
}

impl Shard {
    const fn new() -> Self {
        Self { head: CachePadded::new(AtomicPtr::new(ptr::null_mut())) }
    }
}

/// Shard index for an object address. The low alignment bits carry no
/// entropy, so they are shifted out before masking.
#[inline]
fn shard_index(obj: *mut RetiredObject) -> usize {
    (obj as usize >> 4) & (NUM_SHARDS - 1)
}

/// A self-contained instance of the hazard-pointer engine.
///
/// Most users go through the process-wide default domain via [`Holder::new`],
/// [`retire`] and [`cleanup`]; a dedicated domain isolates record and
/// retired-object state, which tests rely on.
///
/// [`Holder::new`]: crate::Holder::new
pub struct Domain {
    /// Append-only list of every record ever allocated in this domain.
    all_records: AtomicPtr<HpRecord>,
    /// Treiber stack of records not currently owned by any holder.
    avail_records: AtomicPtr<HpRecord>,
    /// Monotone count of allocated records; feeds the dynamic threshold.
    record_count: AtomicUsize,
    /// Scratch set of protected addresses, reused across reclamation passes.
    /// Mutated only while `reclaiming` is held.
    scan_set: UnsafeCell<Option<ScanSet>>,

    /// Centralized retired count. Signed: a reclaimer that frees more
    /// objects than it claimed folds the surplus back as a negative delta.
    retired_count: CachePadded<AtomicI64>,
    /// Test-and-set gate: at most one reclamation pass runs at a time.
    reclaiming: CachePadded<AtomicBool>,

    shards: [Shard; NUM_SHARDS],
}

// SAFETY: every field except `scan_set` is atomic; `scan_set` is only
// accessed by the thread holding the `reclaiming` gate.
unsafe impl Send for Domain {}
// SAFETY: see above.
unsafe impl Sync for Domain {}

static GLOBAL: OnceBox<Domain> = OnceBox::new();

impl Domain {
    /// Creates an empty domain.
    pub const fn new() -> Self {
        Self {
            all_records: AtomicPtr::new(ptr::null_mut()),
            avail_records: AtomicPtr::new(ptr::null_mut()),
            record_count: AtomicUsize::new(0),
            scan_set: UnsafeCell::new(None),
            retired_count: CachePadded::new(AtomicI64::new(0)),
            reclaiming: CachePadded::new(AtomicBool::new(false)),
            shards: [const { Shard::new() }; NUM_SHARDS],
        }
    }

    /// The process-wide default domain.
    #[inline]
    pub fn global() -> &'static Domain {
        GLOBAL.get_or_init(|| Box::new(Domain::new()))
    }

    /// Acquires a record: pops the free stack, or allocates and publishes a
    /// fresh one. Fresh records live for the rest of the process.
    pub(crate) fn acquire_record(&'static self) -> NonNull<HpRecord> {
        let mut rec = self.avail_records.load(Ordering::Acquire);
        while !rec.is_null() {
            let next = unsafe { (*rec).avail_next.load(Ordering::Relaxed) };
            match self.avail_records.compare_exchange_weak(
                rec,
                next,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    unsafe { (*rec).avail_next.store(ptr::null_mut(), Ordering::Relaxed) };
                    return unsafe { NonNull::new_unchecked(rec) };
                }
                Err(cur) => rec = cur,
            }
        }

        let rec = Box::into_raw(Box::new(HpRecord::new(self)));
        let mut head = self.all_records.load(Ordering::Relaxed);
        loop {
            unsafe { (*rec).all_next.store(head, Ordering::Relaxed) };
            match self.all_records.compare_exchange_weak(
                head,
                rec,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(cur) => head = cur,
            }
        }
        self.record_count.fetch_add(1, Ordering::AcqRel);
        unsafe { NonNull::new_unchecked(rec) }
    }

    /// Returns a single record to the free stack.
    pub(crate) fn release_record(&self, rec: NonNull<HpRecord>) {
        unsafe { rec.as_ref().avail_next.store(ptr::null_mut(), Ordering::Relaxed) };
        self.release_record_list(rec, rec);
    }

    /// Splices a linked batch of records onto the free stack with a single
    /// CAS loop. `tail.avail_next` must be null on entry.
    pub(crate) fn release_record_list(&self, head: NonNull<HpRecord>, tail: NonNull<HpRecord>) {
        debug_assert!(unsafe { tail.as_ref().avail_next.load(Ordering::Relaxed).is_null() });
        let mut old = self.avail_records.load(Ordering::Relaxed);
        loop {
            unsafe { tail.as_ref().avail_next.store(old, Ordering::Relaxed) };
            match self.avail_records.compare_exchange_weak(
                old,
                head.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(cur) => old = cur,
            }
        }
    }

    /// Hands an unlinked object over for deferred reclamation.
    ///
    /// The object is pushed onto a shard of this domain's retired list and
    /// `reclaim` will be invoked exactly once, at some point after no
    /// protection slot holds the object's address.
    ///
    /// # Safety
    ///
    /// `obj` must point to the descriptor embedded at offset 0 of an object
    /// that has been unlinked from every shared location (new readers can no
    /// longer acquire it), and that is not retired twice.
    pub unsafe fn retire(&self, obj: *mut RetiredObject, reclaim: ReclaimFn) {
        if obj.is_null() {
            return;
        }
        unsafe { (*obj).reclaim = Some(reclaim) };

        // Retirer-side fence of the asymmetric pair: the caller's unlink
        // store becomes visible before any reclaimer can observe the object
        // on a shard.
        fence(Ordering::SeqCst);

        let shard = &self.shards[shard_index(obj)];
        let mut head = shard.head.load(Ordering::Relaxed);
        loop {
            unsafe { (*obj).next_retired = head };
            match shard.head.compare_exchange_weak(
                head,
                obj,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(cur) => head = cur,
            }
        }

        self.retired_count.fetch_add(1, Ordering::AcqRel);

        let claimed = self.check_threshold();
        if claimed > 0 {
            self.do_reclamation(claimed);
        }
    }

    /// Forces a reclamation pass, claiming whatever count is outstanding.
    ///
    /// Drives the retired population to zero from a quiescent state; with
    /// active protections it spins until they are released. Tolerates a
    /// concurrently running reclaimer.
    pub fn cleanup(&self) {
        let mut claimed = self.retired_count.swap(0, Ordering::AcqRel);
        if claimed < 0 {
            // A concurrent reclaimer just went negative; give the debt back.
            self.retired_count.fetch_add(claimed, Ordering::AcqRel);
            claimed = 0;
        }
        self.do_reclamation(claimed);
    }

    /// Current signed retired count. Approximate under concurrency; exact
    /// once the domain is quiescent.
    #[inline]
    pub fn retired_count(&self) -> i64 {
        self.retired_count.load(Ordering::Acquire)
    }

    /// Number of records ever allocated in this domain. Monotone; records
    /// are recycled, never freed.
    #[inline]
    pub fn record_count(&self) -> usize {
        self.record_count.load(Ordering::Acquire)
    }

    /// Dynamic reclamation threshold: `max(BASE, records * MULTIPLIER)`.
    fn calc_threshold(&self) -> i64 {
        let hcount = self.record_count.load(Ordering::Acquire) as i64;
        let dynamic = hcount * COUNT_MULTIPLIER;
        dynamic.max(BASE_THRESHOLD)
    }

    /// Claims the retired count for reclamation once it meets the threshold,
    /// by CASing it back to zero. Returns the claimed count, or 0 if the
    /// threshold was not met (or another thread claimed first).
    fn check_threshold(&self) -> i64 {
        let mut rcount = self.retired_count.load(Ordering::Acquire);
        let mut thresh = self.calc_threshold();
        while rcount >= thresh {
            match self.retired_count.compare_exchange_weak(
                rcount,
                0,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return rcount,
                Err(cur) => {
                    rcount = cur;
                    thresh = self.calc_threshold();
                }
            }
        }
        0
    }

    /// The reclamation pass. `claimed` is the count the caller took
    /// responsibility for via [`check_threshold`]; a losing caller returns
    /// it to the pool and exits immediately.
    ///
    /// [`check_threshold`]: Domain::check_threshold
    fn do_reclamation(&self, claimed: i64) {
        if self.reclaiming.swap(true, Ordering::Acquire) {
            // Another thread holds the gate; it will pick the items up. The
            // claimed count must flow back so it can.
            if claimed != 0 {
                self.retired_count.fetch_add(claimed, Ordering::AcqRel);
            }
            return;
        }

        // Sole reclaimer from here until the gate clears.
        let scan_set = unsafe { &mut *self.scan_set.get() };
        let scan_set = scan_set
            .get_or_insert_with(|| HashSet::with_hasher(foldhash::fast::RandomState::default()));

        let mut rcount = claimed;

        loop {
            let mut extracted: [*mut RetiredObject; NUM_SHARDS] = [ptr::null_mut(); NUM_SHARDS];
            let mut extracted_any = false;
            for (batch, shard) in extracted.iter_mut().zip(&self.shards) {
                *batch = shard.head.swap(ptr::null_mut(), Ordering::Acquire);
                extracted_any |= !batch.is_null();
            }

            if extracted_any {
                // Heavy side of the asymmetric fence pair: every protection
                // slot published before this point is visible to the scan
                // below.
                fence(Ordering::SeqCst);

                scan_set.clear();
                let mut rec = self.all_records.load(Ordering::Acquire);
                while !rec.is_null() {
                    let slot = unsafe { (*rec).protected(Ordering::Acquire) };
                    if !slot.is_null() {
                        scan_set.insert(slot as usize);
                    }
                    rec = unsafe { (*rec).all_next.load(Ordering::Relaxed) };
                }

                let mut survivors_head: *mut RetiredObject = ptr::null_mut();
                let mut survivors_tail: *mut RetiredObject = ptr::null_mut();

                for batch in extracted {
                    let mut cur = batch;
                    while !cur.is_null() {
                        let next = unsafe { (*cur).next_retired };
                        if scan_set.contains(&(cur as usize)) {
                            // Still protected: keep it for a later pass.
                            unsafe { (*cur).next_retired = ptr::null_mut() };
                            if survivors_head.is_null() {
                                survivors_head = cur;
                            } else {
                                unsafe { (*survivors_tail).next_retired = cur };
                            }
                            survivors_tail = cur;
                        } else {
                            if let Some(reclaim) = unsafe { (*cur).reclaim } {
                                unsafe { reclaim(cur) };
                            }
                            // May drop below zero: we can free objects other
                            // threads claimed.
                            rcount -= 1;
                        }
                        cur = next;
                    }
                }

                if !survivors_head.is_null() {
                    let shard0 = &self.shards[0];
                    let mut head = shard0.head.load(Ordering::Relaxed);
                    loop {
                        unsafe { (*survivors_tail).next_retired = head };
                        match shard0.head.compare_exchange_weak(
                            head,
                            survivors_head,
                            Ordering::Release,
                            Ordering::Relaxed,
                        ) {
                            Ok(_) => break,
                            Err(cur) => head = cur,
                        }
                    }
                }
            }

            // Fold back whatever was claimed but not freed (or freed in
            // excess, as a negative delta).
            if rcount != 0 {
                self.retired_count.fetch_add(rcount, Ordering::AcqRel);
            }

            rcount = self.check_threshold();
            if rcount == 0 {
                let drained = self
                    .shards
                    .iter()
                    .all(|shard| shard.head.load(Ordering::Acquire).is_null());
                if drained {
                    break;
                }
                // Shards refilled (or survivors remain) below threshold:
                // keep going until the backlog is gone.
            }
        }

        self.reclaiming.store(false, Ordering::Release);
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

/// Retires an object through the default domain. See [`Domain::retire`].
///
/// # Safety
///
/// Same contract as [`Domain::retire`].
pub unsafe fn retire(obj: *mut RetiredObject, reclaim: ReclaimFn) {
    unsafe { Domain::global().retire(obj, reclaim) }
}

/// Forces a reclamation pass on the default domain. See [`Domain::cleanup`].
pub fn cleanup() {
    Domain::global().cleanup()
}
