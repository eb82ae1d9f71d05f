//! Intrusive doubly-linked list.
//!
//! The list owns two sentinel nodes; element nodes are fields embedded in
//! their containing structure (a task control block carries one node for
//! the ready/wait queues and one for the all-tasks queue). Whoever pops a
//! node converts it back to its container through the field offset.
//!
//! Queues built from this list are shared between threads and interrupt
//! handlers, so every mutation disables interrupts for its duration and
//! restores the prior flag state. There is no finer-grained locking; this
//! kernel is strictly uniprocessor.
//!
//! A `List` must not be moved after `init` — the sentinels point at each
//! other by address. Lists live in statics or inside page-pinned
//! allocations, which is what makes the embedded-sentinel design sound.

use core::{cell::Cell, ptr};

use crate::arch::x86::interrupts::InterruptGuard;

/// A link embedded in a list element's owner.
#[repr(C)]
pub struct ListNode {
    prev: Cell<*mut ListNode>,
    next: Cell<*mut ListNode>,
}

impl ListNode {
    pub const fn new() -> Self {
        Self {
            prev: Cell::new(ptr::null_mut()),
            next: Cell::new(ptr::null_mut()),
        }
    }
}

impl Default for ListNode {
    fn default() -> Self {
        Self::new()
    }
}

/// A sentinel-headed intrusive list.
pub struct List {
    head: ListNode,
    tail: ListNode,
}

// SAFETY: All link mutation happens with interrupts disabled on a single
// CPU, which is this kernel's only execution model; the Cells are never
// raced.
unsafe impl Sync for List {}

impl List {
    /// A dormant list; [`List::init`] must run before first use.
    pub const fn new() -> Self {
        Self {
            head: ListNode::new(),
            tail: ListNode::new(),
        }
    }

    /// Links the sentinels into an empty list. Must run exactly once,
    /// after the list has reached its final address.
    pub fn init(&self) {
        self.head.prev.set(ptr::null_mut());
        self.head.next.set(self.tail_ptr());
        self.tail.prev.set(self.head_ptr());
        self.tail.next.set(ptr::null_mut());
    }

    fn head_ptr(&self) -> *mut ListNode {
        &self.head as *const ListNode as *mut ListNode
    }

    fn tail_ptr(&self) -> *mut ListNode {
        &self.tail as *const ListNode as *mut ListNode
    }

    /// Inserts `elem` directly before `before`.
    ///
    /// # Safety
    ///
    /// Both pointers must reference live nodes; `before` must be linked
    /// into a list and `elem` must not be linked into any list.
    pub unsafe fn insert_before(before: *mut ListNode, elem: *mut ListNode) {
        let _guard = InterruptGuard::new();
        // SAFETY: Caller guarantees both nodes are live; with interrupts
        // off nothing else can be mid-mutation.
        unsafe {
            let prev = (*before).prev.get();
            (*elem).prev.set(prev);
            (*elem).next.set(before);
            (*prev).next.set(elem);
            (*before).prev.set(elem);
        }
    }

    /// Appends `elem` at the back of the list.
    ///
    /// # Safety
    ///
    /// As [`List::insert_before`]; the list must be initialized.
    pub unsafe fn append(&self, elem: *mut ListNode) {
        // SAFETY: The tail sentinel is always linked.
        unsafe { Self::insert_before(self.tail_ptr(), elem) }
    }

    /// Pushes `elem` at the front of the list.
    ///
    /// # Safety
    ///
    /// As [`List::insert_before`]; the list must be initialized.
    pub unsafe fn push_front(&self, elem: *mut ListNode) {
        let _guard = InterruptGuard::new();
        // SAFETY: head.next is always a linked node (possibly the tail
        // sentinel), and the guard keeps the read and the insert atomic.
        unsafe { Self::insert_before(self.head.next.get(), elem) }
    }

    /// Unlinks `elem` from whatever list it is on.
    ///
    /// # Safety
    ///
    /// `elem` must be a live node currently linked into a list.
    pub unsafe fn remove(elem: *mut ListNode) {
        let _guard = InterruptGuard::new();
        // SAFETY: A linked node has live neighbours.
        unsafe {
            let prev = (*elem).prev.get();
            let next = (*elem).next.get();
            (*prev).next.set(next);
            (*next).prev.set(prev);
        }
    }

    /// Pops the front element. The list must be non-empty.
    ///
    /// # Safety
    ///
    /// The list must be initialized; the returned pointer references a
    /// node owned by somebody else's container.
    pub unsafe fn pop_front(&self) -> *mut ListNode {
        let _guard = InterruptGuard::new();
        let elem = self.head.next.get();
        kassert!(elem != self.tail_ptr());
        // SAFETY: elem is linked (it is not the tail sentinel).
        unsafe { Self::remove(elem) };
        elem
    }

    /// Whether `elem` is currently linked into this list.
    ///
    /// # Safety
    ///
    /// The list must be initialized.
    pub unsafe fn contains(&self, elem: *const ListNode) -> bool {
        let _guard = InterruptGuard::new();
        let mut cursor = self.head.next.get();
        while cursor != self.tail_ptr() {
            if cursor as *const ListNode == elem {
                return true;
            }
            // SAFETY: cursor is a linked node until it reaches the tail.
            cursor = unsafe { (*cursor).next.get() };
        }
        false
    }

    /// Walks the list until `pred` says stop, returning the matching
    /// node.
    ///
    /// # Safety
    ///
    /// The list must be initialized; `pred` must not mutate the list.
    pub unsafe fn find(&self, mut pred: impl FnMut(*mut ListNode) -> bool) -> Option<*mut ListNode> {
        let _guard = InterruptGuard::new();
        let mut cursor = self.head.next.get();
        while cursor != self.tail_ptr() {
            if pred(cursor) {
                return Some(cursor);
            }
            // SAFETY: cursor stays within the linked chain.
            cursor = unsafe { (*cursor).next.get() };
        }
        None
    }

    /// Number of elements currently linked.
    pub fn len(&self) -> usize {
        let _guard = InterruptGuard::new();
        let mut count = 0;
        let mut cursor = self.head.next.get();
        while cursor != self.tail_ptr() {
            count += 1;
            // SAFETY: cursor stays within the linked chain.
            cursor = unsafe { (*cursor).next.get() };
        }
        count
    }

    /// Whether the list has no elements.
    pub fn is_empty(&self) -> bool {
        let _guard = InterruptGuard::new();
        self.head.next.get() == self.tail_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owner {
        id: u32,
        link: ListNode,
    }

    impl Owner {
        fn new(id: u32) -> Self {
            Self {
                id,
                link: ListNode::new(),
            }
        }

        unsafe fn from_link(node: *mut ListNode) -> *mut Owner {
            let offset = core::mem::offset_of!(Owner, link);
            unsafe { (node as *mut u8).sub(offset) as *mut Owner }
        }
    }

    #[test]
    fn fresh_list_is_empty() {
        let list = List::new();
        list.init();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn append_preserves_fifo_order() {
        let list = List::new();
        list.init();
        let mut a = Owner::new(1);
        let mut b = Owner::new(2);
        let mut c = Owner::new(3);

        unsafe {
            list.append(&mut a.link);
            list.append(&mut b.link);
            list.append(&mut c.link);
            assert_eq!(list.len(), 3);

            for expected in [1, 2, 3] {
                let node = list.pop_front();
                assert_eq!((*Owner::from_link(node)).id, expected);
            }
        }
        assert!(list.is_empty());
    }

    #[test]
    fn push_front_wins_over_earlier_appends() {
        let list = List::new();
        list.init();
        let mut parked = Owner::new(7);
        let mut woken = Owner::new(9);

        unsafe {
            list.append(&mut parked.link);
            list.push_front(&mut woken.link);

            let first = list.pop_front();
            assert_eq!((*Owner::from_link(first)).id, 9);
            let second = list.pop_front();
            assert_eq!((*Owner::from_link(second)).id, 7);
        }
    }

    #[test]
    fn remove_unlinks_a_middle_element() {
        let list = List::new();
        list.init();
        let mut a = Owner::new(1);
        let mut b = Owner::new(2);
        let mut c = Owner::new(3);

        unsafe {
            list.append(&mut a.link);
            list.append(&mut b.link);
            list.append(&mut c.link);

            List::remove(&mut b.link);
            assert_eq!(list.len(), 2);
            assert!(!list.contains(&b.link));
            assert!(list.contains(&a.link));
            assert!(list.contains(&c.link));
        }
    }

    #[test]
    fn find_walks_in_order() {
        let list = List::new();
        list.init();
        let mut a = Owner::new(4);
        let mut b = Owner::new(8);

        unsafe {
            list.append(&mut a.link);
            list.append(&mut b.link);

            let hit = list.find(|node| (*Owner::from_link(node)).id == 8);
            assert_eq!(hit, Some(&mut b.link as *mut ListNode));
            let miss = list.find(|node| (*Owner::from_link(node)).id == 5);
            assert_eq!(miss, None);
        }
    }

    #[test]
    #[should_panic]
    fn popping_an_empty_list_is_fatal() {
        let list = List::new();
        list.init();
        unsafe {
            let _ = list.pop_front();
        }
    }
}
