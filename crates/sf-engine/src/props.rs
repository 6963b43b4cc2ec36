//! Lock-free property handoff
//!
//! Each mutable object owns a [`PropsQueue`]: API threads publish immutable
//! snapshots by swapping a freshly filled node into the `pending` slot; the
//! mix thread takes the node, copies its payload, and recycles the node
//! onto the free stack. The mixer never allocates or frees: nodes circulate
//! between the free stack and the pending slot, growing only when an API
//! thread finds the free stack empty.
//!
//! The free stack is a Treiber stack. Pops happen only on API threads and
//! only under the owning object's API-side lock, so the pop side is
//! single-threaded and the ABA problem does not arise. Pushes (API threads
//! replacing an unconsumed snapshot, and the mixer recycling a consumed
//! one) are plain CAS loops.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node<T> {
    next: *mut Node<T>,
    data: Option<T>,
}

/// Single-slot snapshot queue with a node free list.
pub struct PropsQueue<T> {
    pending: AtomicPtr<Node<T>>,
    free: AtomicPtr<Node<T>>,
}

// SAFETY: nodes are handed between threads only through the two atomic
// heads; a node is owned by exactly one side at a time.
unsafe impl<T: Send> Send for PropsQueue<T> {}
unsafe impl<T: Send> Sync for PropsQueue<T> {}

impl<T> PropsQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: AtomicPtr::new(ptr::null_mut()),
            free: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Publish a snapshot (API thread, under the object's API-side lock).
    /// Replaces any unconsumed previous snapshot, whose node is recycled.
    pub fn publish(&self, value: T) {
        let node = match self.pop_free() {
            Some(node) => {
                // SAFETY: popped nodes are exclusively ours.
                unsafe {
                    (*node).data = Some(value);
                }
                node
            }
            None => Box::into_raw(Box::new(Node {
                next: ptr::null_mut(),
                data: Some(value),
            })),
        };

        let old = self.pending.swap(node, Ordering::AcqRel);
        if !old.is_null() {
            // The mixer never saw this one; reclaim it.
            self.push_free(old);
        }
    }

    /// Take the pending snapshot, if any (mix thread). The node returns to
    /// the free stack; only the payload moves.
    pub fn consume(&self) -> Option<T> {
        let node = self.pending.swap(ptr::null_mut(), Ordering::AcqRel);
        if node.is_null() {
            return None;
        }
        // SAFETY: the swap transferred exclusive ownership to us.
        let value = unsafe { (*node).data.take() };
        self.push_free(node);
        value
    }

    /// Whether a snapshot is waiting.
    pub fn has_pending(&self) -> bool {
        !self.pending.load(Ordering::Acquire).is_null()
    }

    fn push_free(&self, node: *mut Node<T>) {
        loop {
            let head = self.free.load(Ordering::Acquire);
            // SAFETY: we own `node` until the CAS succeeds.
            unsafe {
                (*node).next = head;
            }
            if self
                .free
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    fn pop_free(&self) -> Option<*mut Node<T>> {
        loop {
            let head = self.free.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            // SAFETY: single popper (API-side lock); `head` stays valid
            // because nodes are never freed while the queue lives.
            let next = unsafe { (*head).next };
            if self
                .free
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(head);
            }
        }
    }
}

impl<T> Default for PropsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for PropsQueue<T> {
    fn drop(&mut self) {
        let mut free_node = |mut ptr: *mut Node<T>| {
            while !ptr.is_null() {
                // SAFETY: on drop, all nodes are exclusively ours.
                let node = unsafe { Box::from_raw(ptr) };
                ptr = node.next;
            }
        };
        free_node(self.pending.swap(ptr::null_mut(), Ordering::Relaxed));
        free_node(self.free.swap(ptr::null_mut(), Ordering::Relaxed));
    }
}
