//! Queue primitives built on vigil hazard-pointer reclamation.
//!
//! ## Features
//!
//! - `FaaArrayQueue`: unbounded MPMC FIFO whose fast path is a single
//!   fetch-and-add on an array index per operation.
//!
//! ## Usage
//!
//! ```
//! use std::ptr::NonNull;
//! use vigil_queue::faa_queue::FaaArrayQueue;
//!
//! let queue: FaaArrayQueue<u64> = FaaArrayQueue::new(1).unwrap();
//!
//! let item = Box::into_raw(Box::new(7u64));
//! queue.enqueue(NonNull::new(item).unwrap(), 0);
//!
//! let out = queue.dequeue(0).unwrap();
//! assert_eq!(unsafe { *out.as_ref() }, 7);
//! unsafe { drop(Box::from_raw(out.as_ptr())) };
//!
//! assert!(queue.dequeue(0).is_none());
//! ```

pub mod faa_queue;
