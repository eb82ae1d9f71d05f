//! Kestrel kernel library.
//!
//! A small preemptive multitasking kernel for 32-bit x86 protected mode.
//! The boot loader enables paging, maps the low megabyte into the
//! higher-half window, installs the page-directory self-reference, and
//! jumps to `_start` in `main.rs`; everything after that lives here.
//!
//! The crate doubles as a host library so the pure-logic suites (bitmap,
//! lists, pool accounting, frame layouts, descriptor encodings) run under
//! the ordinary `cargo test` harness. Assembly-backed entry points are
//! gated on the bare-metal target and stubbed on the host.

#![no_std]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]

extern crate alloc;

// On the bare-metal target the byte heap is the linked-list allocator,
// fed by `mm::heap::init` once the page allocator is live. On the host,
// delegate to the system allocator so test code using Box/Vec just works.
#[cfg(all(target_arch = "x86", target_os = "none"))]
use linked_list_allocator::LockedHeap;

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[global_allocator]
pub static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
extern crate std;

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;
#[macro_use]
pub mod panic;

pub mod arch;
pub mod config;
pub mod drivers;
pub mod error;
pub mod ipc;
pub mod list;
pub mod logger;
pub mod mm;
pub mod sched;
pub mod sync;
pub mod test_framework;

// Re-exports for the binary and the integration suites.
pub use error::KernelError;
pub use test_framework::{exit_qemu, run_tests, test_panic_handler, QemuExitCode, Testable};

/// Heap allocation failure is unrecoverable in a kernel; the handler ABI
/// requires divergence.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}
