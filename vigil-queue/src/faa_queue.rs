use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::Backoff;
use vigil::{Holder, RetiredObject};

/// Slots per node. Index values at or past this mark a node as full (for
/// producers) or drained (for consumers).
pub const BUFFER_SIZE: usize = 1024;

/// Puts a hot field on its own cache line so the head, the tail and the
/// per-node indices do not false-share. 64 bytes except on aarch64 (128,
/// Apple M-series / Neoverse) and s390x (256).
#[cfg_attr(target_arch = "aarch64", repr(align(128)))]
#[cfg_attr(target_arch = "s390x", repr(align(256)))]
#[cfg_attr(not(any(target_arch = "aarch64", target_arch = "s390x")), repr(align(64)))]
struct CacheLine<T>(T);

impl<T> std::ops::Deref for CacheLine<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Node allocation and reclamation counters for one queue.
///
/// The handle is cloneable and outlives its queue, so teardown accounting
/// can be checked after the queue is dropped. Counts are approximate while
/// threads are still operating on the queue; they balance once the queue is
/// gone and the reclamation engine has swept its retired nodes.
#[derive(Clone)]
pub struct NodeStats {
    created: Arc<AtomicU64>,
    reclaimed: Arc<AtomicU64>,
}

impl NodeStats {
    fn new() -> Self {
        Self {
            created: Arc::new(AtomicU64::new(0)),
            reclaimed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Nodes allocated by the queue, the initial sentinel node included.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }

    /// Nodes freed, whether through the reclamation engine or directly.
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Acquire)
    }
}

#[repr(C)]
struct Node<T> {
    // Reclamation header; must stay the first field so node and descriptor
    // addresses coincide.
    retired: RetiredObject,
    deqidx: CacheLine<AtomicUsize>,
    enqidx: CacheLine<AtomicUsize>,
    next: CacheLine<AtomicPtr<Node<T>>>,
    stats: NodeStats,
    items: [AtomicPtr<T>; BUFFER_SIZE],
}

impl<T> Node<T> {
    /// Heap-allocates a node. With an initial item, slot 0 is pre-filled and
    /// published through `enqidx = 1`.
    fn boxed(initial: Option<NonNull<T>>, stats: NodeStats) -> *mut Node<T> {
        stats.created.fetch_add(1, Ordering::AcqRel);
        let enq_start = if initial.is_some() { 1 } else { 0 };
        let node = Box::new(Node {
            retired: RetiredObject::new(),
            deqidx: CacheLine(AtomicUsize::new(0)),
            enqidx: CacheLine(AtomicUsize::new(enq_start)),
            next: CacheLine(AtomicPtr::new(ptr::null_mut())),
            stats,
            items: core::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
        });
        if let Some(item) = initial {
            node.items[0].store(item.as_ptr(), Ordering::Relaxed);
        }
        Box::into_raw(node)
    }
}

unsafe fn reclaim_node<T>(obj: *mut RetiredObject) {
    // The descriptor is the node's first field, so the addresses coincide.
    let node = obj as *mut Node<T>;
    let stats = unsafe { (*node).stats.clone() };
    unsafe { drop(Box::from_raw(node)) };
    stats.reclaimed.fetch_add(1, Ordering::AcqRel);
}

/// Unbounded MPMC FIFO queue of raw pointers.
///
/// The fast path of both operations is a single fetch-and-add on an array
/// index inside the current node, followed by one CAS (enqueue) or exchange
/// (dequeue) on the claimed slot. Drained nodes are handed to the hazard
/// pointer engine, which frees them once no thread can still dereference
/// them.
///
/// The queue stores pointers, not values: callers own the payloads and keep
/// ownership across the queue. Each thread passes its own id in
/// `[0, max_threads)`; using the same id from two threads at once is not
/// supported.
pub struct FaaArrayQueue<T> {
    head: CacheLine<AtomicPtr<Node<T>>>,
    tail: CacheLine<AtomicPtr<Node<T>>>,
    /// Marker a consumer exchanges into a claimed slot. Any unique non-null
    /// address works; a dedicated one-byte allocation can never collide with
    /// a live payload pointer.
    taken: *mut T,
    max_threads: usize,
    holders: Box<[Holder]>,
    stats: NodeStats,
}

// SAFETY: shared state is atomic; per-slot handoff is serialized by the FAA
// index claims, and node lifetime by the hazard pointer engine.
unsafe impl<T: Send> Send for FaaArrayQueue<T> {}
// SAFETY: see above.
unsafe impl<T: Send> Sync for FaaArrayQueue<T> {}

impl<T> FaaArrayQueue<T> {
    /// Creates a queue for up to `max_threads` concurrently operating
    /// threads, each identified by a thread id in `[0, max_threads)`.
    ///
    /// Returns `None` when `max_threads` is zero. Allocation failure aborts,
    /// as everywhere else in the engine.
    pub fn new(max_threads: usize) -> Option<Self> {
        if max_threads == 0 {
            return None;
        }

        let stats = NodeStats::new();
        let sentinel = Node::<T>::boxed(None, stats.clone());
        let taken = Box::into_raw(Box::new(0u8)) as *mut T;
        let holders = (0..max_threads).map(|_| Holder::new()).collect();

        Some(Self {
            head: CacheLine(AtomicPtr::new(sentinel)),
            tail: CacheLine(AtomicPtr::new(sentinel)),
            taken,
            max_threads,
            holders,
            stats,
        })
    }

    /// Maximum number of threads this queue was created for.
    #[inline]
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// A handle on this queue's node allocation/reclamation counters.
    #[inline]
    pub fn node_stats(&self) -> NodeStats {
        self.stats.clone()
    }

    /// Enqueues `item`. `tid` is the calling thread's id.
    ///
    /// Linearizes at the successful slot publish, or at the `next` link CAS
    /// when a new node is attached.
    ///
    /// # Panics
    ///
    /// Panics if `tid` is out of range or `item` aliases the internal taken
    /// marker.
    pub fn enqueue(&self, item: NonNull<T>, tid: usize) {
        assert!(tid < self.max_threads, "vigil-queue: thread id {tid} out of range");
        assert!(
            item.as_ptr() != self.taken,
            "vigil-queue: item collides with the internal taken marker"
        );

        let holder = &self.holders[tid];

        loop {
            let ltail = holder.protect(&self.tail.0);
            let node = unsafe { &*ltail };
            let idx = node.enqidx.fetch_add(1, Ordering::Relaxed);

            if idx >= BUFFER_SIZE {
                // Node is full: help advance the tail or attach a new node.
                if ltail != self.tail.load(Ordering::Acquire) {
                    holder.clear();
                    continue;
                }

                let lnext = node.next.load(Ordering::Acquire);
                if lnext.is_null() {
                    let new_node = Node::boxed(Some(item), self.stats.clone());
                    if node
                        .next
                        .compare_exchange_weak(
                            ptr::null_mut(),
                            new_node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        // Attached; swing the tail. Failure means another
                        // thread already helped.
                        let _ = self.tail.compare_exchange_weak(
                            ltail,
                            new_node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        );
                        holder.clear();
                        return;
                    }
                    // Lost the attach race. The node was never published, so
                    // it can be freed directly.
                    unsafe { drop(Box::from_raw(new_node)) };
                    self.stats.reclaimed.fetch_add(1, Ordering::AcqRel);
                } else {
                    let _ = self.tail.compare_exchange_weak(
                        ltail,
                        lnext,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                }
                holder.clear();
                continue;
            }

            // Claimed a fresh index: publish the item into its slot. The CAS
            // only fails if a consumer's exchange already planted the taken
            // marker at this index.
            if node.items[idx]
                .compare_exchange(
                    ptr::null_mut(),
                    item.as_ptr(),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                holder.clear();
                return;
            }

            holder.clear();
        }
    }

    /// Dequeues the oldest item, or returns `None` if the queue was empty at
    /// the linearization point (the slot exchange).
    ///
    /// # Panics
    ///
    /// Panics if `tid` is out of range.
    pub fn dequeue(&self, tid: usize) -> Option<NonNull<T>> {
        assert!(tid < self.max_threads, "vigil-queue: thread id {tid} out of range");

        let holder = &self.holders[tid];
        let backoff = Backoff::new();

        loop {
            let lhead = holder.protect(&self.head.0);
            let node = unsafe { &*lhead };

            let deq = node.deqidx.load(Ordering::Acquire);
            let enq = node.enqidx.load(Ordering::Acquire);
            let lnext = node.next.load(Ordering::Acquire);

            // Drained last node: the queue is empty.
            if deq >= enq && lnext.is_null() {
                break;
            }

            let idx = node.deqidx.fetch_add(1, Ordering::Relaxed);

            if idx >= BUFFER_SIZE {
                // Node exhausted: advance the head; the winning thread
                // retires the old node.
                let lnext = node.next.load(Ordering::Acquire);
                if lnext.is_null() {
                    break;
                }

                if self
                    .head
                    .compare_exchange(lhead, lnext, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    // Clear the hazard before retiring what it protects, or
                    // the node would survive the next scan on our account.
                    holder.clear();
                    unsafe { vigil::retire(lhead as *mut RetiredObject, reclaim_node::<T>) };
                } else {
                    holder.clear();
                }
                continue;
            }

            let item = node.items[idx].swap(self.taken, Ordering::Acquire);
            if item.is_null() {
                // The producer that claimed this index has not published yet;
                // the marker we just planted makes it retry elsewhere.
                holder.clear();
                backoff.snooze();
                continue;
            }

            holder.clear();
            return NonNull::new(item);
        }

        holder.clear();
        None
    }
}

impl<T> Drop for FaaArrayQueue<T> {
    fn drop(&mut self) {
        // Quiescent teardown. Remaining items are raw pointers owned by the
        // caller; draining discards them without freeing the payloads.
        while self.dequeue(0).is_some() {}

        // The final node is only reachable through `head` now.
        let lhead = self.head.load(Ordering::Relaxed);
        if !lhead.is_null() {
            unsafe { drop(Box::from_raw(lhead)) };
            self.stats.reclaimed.fetch_add(1, Ordering::AcqRel);
        }

        unsafe { drop(Box::from_raw(self.taken as *mut u8)) };

        // Return the per-thread records to the domain, then sweep: nodes
        // retired while draining carry no protection anymore.
        drop(std::mem::take(&mut self.holders));
        vigil::cleanup();
    }
}
