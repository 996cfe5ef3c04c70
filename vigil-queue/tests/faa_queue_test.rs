use std::ptr::NonNull;

use vigil_queue::faa_queue::{FaaArrayQueue, NodeStats, BUFFER_SIZE};

/// Tags an integer as a payload pointer. The queue never dereferences items,
/// so small non-zero addresses are fine for single-threaded tests.
fn tag(value: usize) -> NonNull<u8> {
    NonNull::new(value as *mut u8).unwrap()
}

/// Checks that every node the queue allocated was freed again. A concurrent
/// reclaimer elsewhere in this test binary may still hold the reclamation
/// gate when the queue drops, so sweep until the books balance.
fn assert_nodes_balanced(stats: &NodeStats) {
    for _ in 0..1000 {
        if stats.created() == stats.reclaimed() {
            return;
        }
        vigil::cleanup();
        std::thread::yield_now();
    }
    assert_eq!(stats.created(), stats.reclaimed(), "queue nodes leaked");
}

#[test]
fn empty_dequeue_returns_none() {
    let queue: FaaArrayQueue<u8> = FaaArrayQueue::new(1).unwrap();
    assert_eq!(queue.dequeue(0), None);
    assert_eq!(queue.dequeue(0), None);
}

#[test]
fn fifo_order() {
    let queue: FaaArrayQueue<u8> = FaaArrayQueue::new(1).unwrap();
    queue.enqueue(tag(0xAAA), 0);
    queue.enqueue(tag(0xBBB), 0);

    assert_eq!(queue.dequeue(0), Some(tag(0xAAA)));
    assert_eq!(queue.dequeue(0), Some(tag(0xBBB)));
    assert_eq!(queue.dequeue(0), None);
}

#[test]
fn buffer_boundary_crossing() {
    // Fills two full nodes and change, forcing node allocation, head
    // advancement and retirement through the hazard pointer engine.
    let queue: FaaArrayQueue<u8> = FaaArrayQueue::new(1).unwrap();
    let stats = queue.node_stats();
    let count = BUFFER_SIZE * 2 + 50;

    for i in 1..=count {
        queue.enqueue(tag(i), 0);
    }
    for i in 1..=count {
        assert_eq!(queue.dequeue(0), Some(tag(i)), "out of order at {i}");
    }
    assert_eq!(queue.dequeue(0), None);

    // Three nodes were in play: the sentinel and both full ones were drained
    // and handed to the engine, the last one dies with the queue.
    assert!(stats.created() >= 3, "expected node turnover, created {}", stats.created());
    drop(queue);
    assert_nodes_balanced(&stats);
    assert!(
        stats.reclaimed() >= 2,
        "expected at least two node reclamations, saw {}",
        stats.reclaimed()
    );
}

#[test]
fn interleaved_rounds() {
    let queue: FaaArrayQueue<u8> = FaaArrayQueue::new(1).unwrap();
    for round in 0..100 {
        for i in 1..=10 {
            queue.enqueue(tag(round * 10 + i), 0);
        }
        for i in 1..=10 {
            assert_eq!(queue.dequeue(0), Some(tag(round * 10 + i)));
        }
    }
    assert_eq!(queue.dequeue(0), None);
}

#[test]
fn empty_again_after_drain() {
    let queue: FaaArrayQueue<u8> = FaaArrayQueue::new(2).unwrap();
    for i in 1..=64 {
        queue.enqueue(tag(i), 0);
    }
    for i in 1..=64 {
        assert_eq!(queue.dequeue(1), Some(tag(i)));
    }
    for _ in 0..16 {
        assert_eq!(queue.dequeue(0), None);
        assert_eq!(queue.dequeue(1), None);
    }
}

#[test]
fn drop_with_remaining_items() {
    let queue: FaaArrayQueue<u8> = FaaArrayQueue::new(1).unwrap();
    let stats = queue.node_stats();
    for i in 1..=(BUFFER_SIZE + 100) {
        queue.enqueue(tag(i), 0);
    }
    // Teardown drains the backlog and reclaims every node.
    drop(queue);
    assert_nodes_balanced(&stats);
}

#[test]
fn real_payloads_round_trip() {
    let queue: FaaArrayQueue<String> = FaaArrayQueue::new(1).unwrap();
    for i in 0..100 {
        let payload = Box::into_raw(Box::new(format!("item-{i}")));
        queue.enqueue(NonNull::new(payload).unwrap(), 0);
    }
    for i in 0..100 {
        let out = queue.dequeue(0).expect("missing payload");
        let payload = unsafe { Box::from_raw(out.as_ptr()) };
        assert_eq!(*payload, format!("item-{i}"));
    }
    assert_eq!(queue.dequeue(0), None);
}

#[test]
fn zero_threads_rejected() {
    assert!(FaaArrayQueue::<u8>::new(0).is_none());
}

#[test]
#[should_panic(expected = "out of range")]
fn out_of_range_tid_rejected() {
    let queue: FaaArrayQueue<u8> = FaaArrayQueue::new(2).unwrap();
    let _ = queue.dequeue(2);
}
