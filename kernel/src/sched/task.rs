//! Task control blocks.
//!
//! A task owns exactly one page: the control block sits at the low end,
//! the kernel stack grows down from the high end, and a canary sits
//! between them as the last header field. Because the page is aligned,
//! the running task is recovered from the stack pointer by masking off
//! the low twelve bits — identifying the current task costs one `and`.

use core::{mem, ptr};

use crate::{
    arch::x86::context::{ThreadEntry, ThreadFrame},
    config::{PAGE_SIZE, STACK_CANARY},
    list::ListNode,
    mm::VirtualAddress,
};

/// Fixed width of a task name, including its NUL padding.
pub const TASK_NAME_LEN: usize = 16;

/// Scheduling states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// On the CPU right now.
    Running,
    /// Parked in the ready queue.
    Ready,
    /// Waiting for an explicit wake (semaphore, channel).
    Blocked,
    /// Waiting for an event; same scheduling treatment as Blocked.
    Waiting,
    /// Suspended; same scheduling treatment as Blocked.
    Hanging,
    /// Finished; never scheduled again.
    Dead,
}

impl TaskState {
    /// States a task may be parked in by [`crate::sched::block`], and the
    /// only states [`crate::sched::unblock`] accepts.
    pub fn is_blocked(self) -> bool {
        matches!(self, TaskState::Blocked | TaskState::Waiting | TaskState::Hanging)
    }
}

/// Task control block.
///
/// `#[repr(C)]` with `kernel_stack_top` first: the context switch stores
/// the outgoing stack pointer through offset 0 of the control block.
#[repr(C)]
pub struct Task {
    /// Stack pointer at rest. While the task runs this field is stale;
    /// it is rewritten by every switch away from the task.
    pub kernel_stack_top: *mut u32,
    pub state: TaskState,
    pub name: [u8; TASK_NAME_LEN],
    /// Quantum refill value; higher priority runs longer, not sooner.
    pub priority: u8,
    /// Ticks left in the current quantum.
    pub ticks_remaining: u8,
    /// Lifetime tick count.
    pub elapsed_ticks: u32,
    /// Private page directory; `None` marks a kernel thread sharing the
    /// kernel address space.
    pub page_directory: Option<VirtualAddress>,
    /// Link for the ready queue or whichever wait queue holds the task.
    pub general_link: ListNode,
    /// Link for the all-tasks queue.
    pub all_link: ListNode,
    /// Must stay [`STACK_CANARY`]; the stack grows toward it.
    pub stack_canary: u32,
}

impl Task {
    /// The task name as a string, NUL padding stripped.
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TASK_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("<invalid>")
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(TASK_NAME_LEN - 1);
        self.name[..len].copy_from_slice(&bytes[..len]);
        self.name[len..].fill(0);
    }

    /// Recovers the control block owning a ready/wait-queue node.
    ///
    /// # Safety
    ///
    /// `node` must be the `general_link` field of a live `Task`.
    pub unsafe fn from_general_link(node: *mut ListNode) -> *mut Task {
        let offset = mem::offset_of!(Task, general_link);
        // SAFETY: Caller guarantees the node is embedded in a Task.
        unsafe { (node as *mut u8).sub(offset) as *mut Task }
    }

    /// Recovers the control block owning an all-tasks-queue node.
    ///
    /// # Safety
    ///
    /// `node` must be the `all_link` field of a live `Task`.
    pub unsafe fn from_all_link(node: *mut ListNode) -> *mut Task {
        let offset = mem::offset_of!(Task, all_link);
        // SAFETY: Caller guarantees the node is embedded in a Task.
        unsafe { (node as *mut u8).sub(offset) as *mut Task }
    }
}

/// Fills in a control block.
///
/// The whole block is cleared first — a shorter clear would leave stale
/// queue links behind and corrupt the first list insert.
///
/// # Safety
///
/// `task` must point at the base of a page the caller owns.
#[allow(dead_code)] // host builds only reach this from the unit suites
pub(crate) unsafe fn init_task(task: *mut Task, name: &str, priority: u8, state: TaskState) {
    // SAFETY: The caller owns the page; the block fits well below the
    // in-use stack region at the top of the page.
    unsafe {
        ptr::write_bytes(task as *mut u8, 0, mem::size_of::<Task>());
        (*task).kernel_stack_top = (task as usize + PAGE_SIZE) as *mut u32;
        (*task).state = state;
        (*task).set_name(name);
        (*task).priority = priority;
        (*task).ticks_remaining = priority;
        (*task).elapsed_ticks = 0;
        (*task).page_directory = None;
        (*task).stack_canary = STACK_CANARY;
    }
}

/// Reserves the interrupt-frame region at the stack top and constructs
/// the first-run thread frame below it; `kernel_stack_top` ends up
/// pointing at the thread frame, ready for the context switch to pop.
///
/// # Safety
///
/// `task` must point at the base of an otherwise unused task page.
#[allow(dead_code)] // host builds only reach this from the unit suites
pub(crate) unsafe fn build_first_run_frame(task: *mut Task, entry: ThreadEntry, arg: usize) {
    use crate::arch::x86::entry::InterruptFrame;

    let stack_top = task as usize + PAGE_SIZE;
    let frame_addr = stack_top - mem::size_of::<InterruptFrame>() - mem::size_of::<ThreadFrame>();

    // SAFETY: The frame region is inside the task's own page, above the
    // control block and below the reserved interrupt-frame slot.
    unsafe {
        (frame_addr as *mut ThreadFrame).write(ThreadFrame::new(entry, arg));
        (*task).kernel_stack_top = frame_addr as *mut u32;
    }
}

/// Creates a kernel thread and queues it for execution.
///
/// One kernel page is allocated for control block plus stack; the thread
/// enters `entry(arg)` the first time the scheduler dispatches it.
/// Returns `None` when the kernel pool is exhausted.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn spawn(
    name: &str,
    priority: u8,
    entry: ThreadEntry,
    arg: usize,
) -> Option<core::ptr::NonNull<Task>> {
    use super::scheduler::{ALL_LIST, READY_LIST};
    use crate::mm::vmm;

    kassert!(priority > 0);

    let page = vmm::get_kernel_pages(1)?;
    let task = page.as_mut_ptr::<Task>();

    // SAFETY: The fresh page belongs to this task alone; list inserts run
    // with interrupts disabled inside the list primitives.
    unsafe {
        init_task(task, name, priority, TaskState::Ready);
        build_first_run_frame(task, entry, arg);

        kassert!(!READY_LIST.contains(ptr::addr_of!((*task).general_link)));
        READY_LIST.append(ptr::addr_of_mut!((*task).general_link));

        kassert!(!ALL_LIST.contains(ptr::addr_of!((*task).all_link)));
        ALL_LIST.append(ptr::addr_of_mut!((*task).all_link));
    }

    log::debug!("[SCHED] spawned '{}' priority {}", name, priority);
    core::ptr::NonNull::new(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::boxed::Box;

    /// A page-aligned stand-in for a task page.
    #[repr(C, align(4096))]
    struct TaskPage([u8; PAGE_SIZE]);

    fn fresh_page() -> Box<TaskPage> {
        Box::new(TaskPage([0xAA; PAGE_SIZE]))
    }

    #[test]
    fn stack_top_field_sits_at_offset_zero() {
        // The context-switch assembly stores through offset 0.
        assert_eq!(mem::offset_of!(Task, kernel_stack_top), 0);
    }

    #[test]
    fn control_block_and_frames_fit_in_one_page() {
        use crate::arch::x86::{context::ThreadFrame, entry::InterruptFrame};

        let reserved = mem::size_of::<InterruptFrame>() + mem::size_of::<ThreadFrame>();
        assert!(mem::size_of::<Task>() + reserved < PAGE_SIZE / 4);
    }

    #[test]
    fn init_task_clears_the_whole_block() {
        let mut page = fresh_page();
        let task = page.0.as_mut_ptr() as *mut Task;

        unsafe {
            init_task(task, "reader", 8, TaskState::Ready);

            assert_eq!((*task).name(), "reader");
            assert_eq!((*task).priority, 8);
            assert_eq!((*task).ticks_remaining, 8);
            assert_eq!((*task).elapsed_ticks, 0);
            assert_eq!((*task).state, TaskState::Ready);
            assert_eq!((*task).page_directory, None);
            assert_eq!((*task).stack_canary, STACK_CANARY);
        }
    }

    #[test]
    fn long_names_truncate_with_nul_padding() {
        let mut page = fresh_page();
        let task = page.0.as_mut_ptr() as *mut Task;

        unsafe {
            init_task(task, "a-name-well-beyond-sixteen-bytes", 1, TaskState::Ready);
            assert_eq!((*task).name().len(), TASK_NAME_LEN - 1);
            assert_eq!((*task).name(), "a-name-well-beyo");
        }
    }

    #[test]
    fn first_run_frame_lands_below_the_interrupt_frame() {
        use crate::arch::x86::{context::ThreadFrame, entry::InterruptFrame};

        extern "C" fn probe(_arg: usize) {}

        let mut page = fresh_page();
        let task = page.0.as_mut_ptr() as *mut Task;

        unsafe {
            init_task(task, "probe", 4, TaskState::Ready);
            build_first_run_frame(task, probe, 0xBEEF);

            let expected = task as usize + PAGE_SIZE
                - mem::size_of::<InterruptFrame>()
                - mem::size_of::<ThreadFrame>();
            assert_eq!((*task).kernel_stack_top as usize, expected);

            let frame = &*((*task).kernel_stack_top as *const ThreadFrame);
            assert_eq!(frame.ebp, 0);
            assert_eq!(frame.ebx, 0);
            assert_eq!(frame.edi, 0);
            assert_eq!(frame.esi, 0);
        }
    }

    #[test]
    fn container_recovery_from_both_links() {
        let mut page = fresh_page();
        let task = page.0.as_mut_ptr() as *mut Task;

        unsafe {
            init_task(task, "links", 2, TaskState::Ready);

            let general = ptr::addr_of_mut!((*task).general_link);
            let all = ptr::addr_of_mut!((*task).all_link);
            assert_eq!(Task::from_general_link(general), task);
            assert_eq!(Task::from_all_link(all), task);
        }
    }

    #[test]
    fn blocked_state_classification() {
        assert!(TaskState::Blocked.is_blocked());
        assert!(TaskState::Waiting.is_blocked());
        assert!(TaskState::Hanging.is_blocked());
        assert!(!TaskState::Running.is_blocked());
        assert!(!TaskState::Ready.is_blocked());
        assert!(!TaskState::Dead.is_blocked());
    }
}
