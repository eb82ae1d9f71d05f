//! Fatal-error reporting.
//!
//! Contract violations go through [`kassert!`], which reports the file,
//! line, enclosing function, and failed condition, then parks the CPU with
//! interrupts disabled. Panics from any other source funnel into
//! [`report_panic`] from the binary's panic handler and end the same way.
//! There is no unwinding and no recovery.

use core::panic::PanicInfo;

/// Assert a kernel invariant.
///
/// On failure the CPU is parked; see [`crate::panic::assertion_failed`].
#[macro_export]
macro_rules! kassert {
    ($cond:expr) => {
        if !$cond {
            $crate::panic::assertion_failed(
                file!(),
                line!(),
                $crate::function_path!(),
                stringify!($cond),
            );
        }
    };
}

/// Expands to the path of the enclosing function.
///
/// Relies on `type_name` of a local item; the trailing `::f` of the probe
/// function is stripped off.
#[macro_export]
macro_rules! function_path {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            core::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Report a failed assertion and never return.
#[cfg(target_os = "none")]
pub fn assertion_failed(file: &str, line: u32, function: &str, condition: &str) -> ! {
    crate::arch::x86::interrupts::disable();

    println!("\n\n!!! kernel assertion failed !!!");
    println!("file: {}", file);
    println!("line: {}", line);
    println!("function: {}", function);
    println!("condition: {}", condition);

    serial_println!(
        "!!! assertion failed at {}:{} in {}: {}",
        file,
        line,
        function,
        condition
    );

    park();
}

/// Host builds turn a failed kernel assertion into an ordinary panic so
/// unit tests can observe it with `#[should_panic]`.
#[cfg(not(target_os = "none"))]
pub fn assertion_failed(file: &str, line: u32, function: &str, condition: &str) -> ! {
    panic!(
        "kernel assertion failed at {}:{} in {}: {}",
        file, line, function, condition
    );
}

/// Report a kernel panic. Called from the panic handlers in `main.rs` and
/// the bare-metal test targets.
#[cfg(target_os = "none")]
pub fn report_panic(info: &PanicInfo) -> ! {
    crate::arch::x86::interrupts::disable();

    println!("\n\n!!! kernel panic !!!");
    println!("{}", info);
    serial_println!("!!! kernel panic: {}", info);

    park();
}

#[cfg(not(target_os = "none"))]
pub fn report_panic(info: &PanicInfo) -> ! {
    panic!("kernel panic: {}", info);
}

/// Park the CPU forever. Interrupts must already be disabled; `hlt` with
/// IF clear never wakes up.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn park() -> ! {
    loop {
        // SAFETY: Halting with interrupts disabled has no side effects
        // beyond stopping the clock; this is the end of the line.
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack));
        }
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn park() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
