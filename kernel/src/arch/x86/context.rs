//! Context switch and the first-run thread frame.
//!
//! The switch is cooperative at the machine level: save the outgoing
//! task's callee-saved registers on its own kernel stack, record the stack
//! pointer in its control block, load the incoming task's recorded stack
//! pointer, pop, return. A task that has never run owns a hand-built
//! [`ThreadFrame`] instead of a genuine call frame, so the `ret` lands in
//! [`enter_kernel_thread`] with the entry function and its argument in the
//! canonical parameter slots.

use crate::sched::task::Task;

/// Signature of a kernel-thread entry function.
pub type ThreadEntry = extern "C" fn(usize);

/// The frame a new task's `kernel_stack_top` points at before its first
/// dispatch, low address first. The pop sequence of `context_switch`
/// consumes the four callee-saved slots and `ret`s through `eip`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ThreadFrame {
    pub ebp: u32,
    pub ebx: u32,
    pub edi: u32,
    pub esi: u32,
    /// Resumption address: [`enter_kernel_thread`] on first run; on a task
    /// that has run before, this slot is a genuine return address saved by
    /// whoever called `context_switch`.
    pub eip: u32,
    /// Placeholder where a real caller's return address would sit, so the
    /// trampoline finds its arguments at the usual offsets.
    pub unused_ret: u32,
    /// First trampoline argument: the thread's entry function.
    pub entry: u32,
    /// Second trampoline argument, handed through to the entry function.
    pub arg: u32,
}

impl ThreadFrame {
    /// Builds the first-run frame for `entry(arg)`.
    pub fn new(entry: ThreadEntry, arg: usize) -> Self {
        Self {
            ebp: 0,
            ebx: 0,
            edi: 0,
            esi: 0,
            eip: enter_kernel_thread as usize as u32,
            unused_ret: 0,
            entry: entry as usize as u32,
            arg: arg as u32,
        }
    }
}

// cdecl: [esp + 4] is `current`, [esp + 8] is `next`; after the four
// pushes those move to +20 and +24. `kernel_stack_top` is the first field
// of the control block, so `[eax]` addresses it directly.
#[cfg(all(target_arch = "x86", target_os = "none"))]
core::arch::global_asm!(
    r#"
.global context_switch
context_switch:
    push esi
    push edi
    push ebx
    push ebp
    mov eax, [esp + 20]
    mov [eax], esp
    mov eax, [esp + 24]
    mov esp, [eax]
    pop ebp
    pop ebx
    pop edi
    pop esi
    ret
"#
);

#[cfg(all(target_arch = "x86", target_os = "none"))]
extern "C" {
    /// Switches from `current` to `next`.
    ///
    /// # Safety
    ///
    /// Both pointers must reference live control blocks whose
    /// `kernel_stack_top` fields obey the frame contract above, and
    /// interrupts must be disabled for the duration of the scheduling
    /// decision that led here.
    pub fn context_switch(current: *mut Task, next: *mut Task);
}

/// Host stand-in so the scheduler compiles off-target; never reachable
/// because nothing on the host owns a kernel stack.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub unsafe fn context_switch(_current: *mut Task, _next: *mut Task) {
    unreachable!("context_switch is only meaningful on the bare-metal target");
}

/// First-run trampoline: the only place a never-run task receives
/// interrupts. The timer interrupt that scheduled us in entered with IF
/// clear, so interrupts must be re-enabled here or the new thread would
/// monopolize the CPU forever.
pub extern "C" fn enter_kernel_thread(entry: ThreadEntry, arg: usize) {
    crate::arch::x86::interrupts::enable();
    entry(arg);

    // The entry function returned; there is no caller frame to return
    // into. Retire the task for good.
    crate::sched::finish_current();
}
