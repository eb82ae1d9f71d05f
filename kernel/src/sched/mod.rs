//! Preemptive thread scheduler.
//!
//! Task control blocks live in the low end of their own kernel-stack page
//! (`task`); the scheduling policy, queues, and blocking primitives live
//! in `scheduler`. Priority is expressed purely as quantum length; the
//! ready queue itself is strict FIFO.

pub mod scheduler;
pub mod task;

pub use scheduler::{
    block, current, finish_current, init, ready_task_count, schedule, start, total_task_count,
    unblock,
};
pub use task::{Task, TaskState};

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use task::spawn;
