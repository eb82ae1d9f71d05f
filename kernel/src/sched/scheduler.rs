//! Scheduling policy, queues, and blocking.
//!
//! Strict FIFO across one ready queue. Priority buys a longer quantum,
//! never a better queue position — except that freshly unblocked tasks go
//! to the queue head so recently woken work runs soon. `schedule` is only
//! ever entered with interrupts disabled, from the timer tick or from a
//! task blocking itself.

use core::ptr;

use crate::{
    arch::x86::{context, interrupts, pic},
    list::List,
    sched::task::{Task, TaskState},
};

/// The ready queue. Holds `general_link` nodes of `Ready` tasks, head to
/// tail in dispatch order.
pub(crate) static READY_LIST: List = List::new();

/// Every task in the system, whatever its state, by `all_link`.
pub(crate) static ALL_LIST: List = List::new();

/// Recovers the running task from the stack pointer: kernel stacks live
/// in their task's page, so masking the low bits of `esp` lands on the
/// control block.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn current() -> *mut Task {
    let esp: u32;
    // SAFETY: Reading the stack pointer has no side effects.
    unsafe {
        core::arch::asm!("mov {}, esp", out(reg) esp, options(nomem, nostack));
    }
    (esp & !0xFFF) as usize as *mut Task
}

/// The host has no kernel stacks; nothing can be "current".
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn current() -> *mut Task {
    unreachable!("current() requires a page-co-located kernel stack");
}

/// Picks the next task and switches to it. Interrupts must be disabled.
///
/// A still-`Running` current task is rotated to the ready tail with a
/// fresh quantum; a task that blocked itself stays off the queue. The
/// ready queue must not be empty — the kernel keeps the main task
/// runnable, so an empty queue is a bookkeeping bug, not an idle state.
pub fn schedule() {
    kassert!(!interrupts::are_enabled());

    let cur = current();
    // SAFETY: `cur` is the live control block under the active stack;
    // queue mutation happens inside the IRQ-off list primitives.
    unsafe {
        if (*cur).state == TaskState::Running {
            kassert!(!READY_LIST.contains(ptr::addr_of!((*cur).general_link)));
            READY_LIST.append(ptr::addr_of_mut!((*cur).general_link));
            (*cur).ticks_remaining = (*cur).priority;
            (*cur).state = TaskState::Ready;
        }

        kassert!(!READY_LIST.is_empty());
        let node = READY_LIST.pop_front();
        let next = Task::from_general_link(node);
        (*next).state = TaskState::Running;

        if next != cur {
            context::context_switch(cur, next);
        }
    }
    // Execution resumes here when this task is next dispatched.
}

/// Blocks the calling task in `state`, which must be one of the
/// non-runnable states. Returns once the task has been unblocked and
/// rescheduled, with the caller's interrupt-flag state restored.
pub fn block(state: TaskState) {
    kassert!(state.is_blocked());

    let prior = interrupts::disable();
    let cur = current();
    // SAFETY: Only the task itself writes its state here, with
    // interrupts off.
    unsafe {
        (*cur).state = state;
    }
    // Not Running any more, so schedule() will not re-queue us; the CPU
    // moves on until someone unblocks this task.
    schedule();
    interrupts::restore(prior);
}

/// Makes a blocked task runnable again, at the head of the ready queue so
/// it runs ahead of tasks that were merely rotated out.
pub fn unblock(task: *mut Task) {
    let prior = interrupts::disable();
    // SAFETY: The caller hands us a live control block; list mutation is
    // IRQ-off throughout.
    unsafe {
        kassert!((*task).state.is_blocked());
        if (*task).state != TaskState::Ready {
            kassert!(!READY_LIST.contains(ptr::addr_of!((*task).general_link)));
            READY_LIST.push_front(ptr::addr_of_mut!((*task).general_link));
            (*task).state = TaskState::Ready;
        }
    }
    interrupts::restore(prior);
}

/// Retires the calling task. Entered when a thread's entry function
/// returns; the task never runs again and its page is never reclaimed.
pub fn finish_current() -> ! {
    interrupts::disable();
    let cur = current();
    // SAFETY: Only the task itself writes its state here.
    unsafe {
        log::debug!("[SCHED] task '{}' finished", (*cur).name());
        (*cur).state = TaskState::Dead;
    }
    schedule();
    unreachable!("a dead task was rescheduled");
}

/// Sets up the queues and retrofits the boot flow of control as the
/// "main" task: its control block is the low end of the page the loader's
/// stack lives in, it is already running, and it only joins the all-tasks
/// queue.
pub fn init() {
    READY_LIST.init();
    ALL_LIST.init();

    #[cfg(all(target_arch = "x86", target_os = "none"))]
    // SAFETY: The loader placed the boot stack at the top of a dedicated
    // page-aligned page whose low end is reserved for this control block.
    unsafe {
        let main = current();
        crate::sched::task::init_task(
            main,
            "main",
            crate::config::MAIN_TASK_PRIORITY,
            TaskState::Running,
        );

        kassert!(!ALL_LIST.contains(ptr::addr_of!((*main).all_link)));
        ALL_LIST.append(ptr::addr_of_mut!((*main).all_link));
    }

    log::info!("[SCHED] scheduler ready");
}

/// Opens the timer IRQ line; the next tick can preempt. Call only once
/// every subsystem is ready to lose the CPU.
pub fn start() {
    pic::enable_irq(0);
    log::info!("[SCHED] preemption enabled");
}

/// Tasks currently parked in the ready queue.
pub fn ready_task_count() -> usize {
    READY_LIST.len()
}

/// Tasks known to the kernel in any state.
pub fn total_task_count() -> usize {
    ALL_LIST.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::boxed::Box;

    use crate::config::PAGE_SIZE;

    #[repr(C, align(4096))]
    struct TaskPage([u8; PAGE_SIZE]);

    /// Builds a detached task on a leaked page for queue tests.
    fn leaked_task(name: &str, priority: u8, state: TaskState) -> *mut Task {
        let page = Box::leak(Box::new(TaskPage([0; PAGE_SIZE])));
        let task = page.0.as_mut_ptr() as *mut Task;
        unsafe {
            crate::sched::task::init_task(task, name, priority, state);
        }
        task
    }

    #[test]
    fn unblock_pushes_to_the_queue_head() {
        let ready = List::new();
        ready.init();

        let rotated = leaked_task("rotated", 5, TaskState::Ready);
        let woken = leaked_task("woken", 5, TaskState::Blocked);

        unsafe {
            ready.append(ptr::addr_of_mut!((*rotated).general_link));

            // Inline what unblock does to the queue, against a local list.
            kassert!((*woken).state.is_blocked());
            ready.push_front(ptr::addr_of_mut!((*woken).general_link));
            (*woken).state = TaskState::Ready;

            let first = Task::from_general_link(ready.pop_front());
            assert_eq!((*first).name(), "woken");
            let second = Task::from_general_link(ready.pop_front());
            assert_eq!((*second).name(), "rotated");
        }
    }

    #[test]
    fn rotation_refills_the_quantum() {
        let ready = List::new();
        ready.init();

        let cur = leaked_task("spinner", 31, TaskState::Running);
        unsafe {
            (*cur).ticks_remaining = 0;

            // The Running branch of schedule(), sans context switch.
            kassert!(!ready.contains(ptr::addr_of!((*cur).general_link)));
            ready.append(ptr::addr_of_mut!((*cur).general_link));
            (*cur).ticks_remaining = (*cur).priority;
            (*cur).state = TaskState::Ready;

            assert_eq!((*cur).ticks_remaining, 31);
            assert_eq!((*cur).state, TaskState::Ready);
            assert!(ready.contains(ptr::addr_of!((*cur).general_link)));
        }
    }
}
