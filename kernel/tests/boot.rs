//! Bare-metal smoke suite.
//!
//! Boots like the real kernel, then walks the subsystems end to end on
//! the live machine: pool accounting against the page tables, the
//! blocking channel against a spawned consumer, preemption against the
//! tick counter. Reports over serial and exits QEMU; run with
//! `-device isa-debug-exit,iobase=0xf4,iosize=0x04 -serial stdio`.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod suite {
    use core::sync::atomic::{AtomicU32, Ordering};

    use kestrel_kernel::{
        arch::x86::{idt, interrupts, timer},
        drivers::console,
        ipc::IoQueue,
        kassert, logger,
        mm::{self, frame_allocator, page_table, vmm, PoolKind, PAGE_SIZE},
        run_tests, sched,
        sync::{Semaphore, SleepLock},
        KernelError,
    };
    use log::LevelFilter;

    #[no_mangle]
    pub extern "C" fn _start() -> ! {
        logger::init(LevelFilter::Warn);
        idt::init();
        mm::init();
        mm::heap::init();
        sched::init();
        timer::init();
        console::init();

        interrupts::enable();
        sched::start();

        run_tests(&[
            &("kernel pages map with present entries", check_kernel_page_mapping),
            &("pool accounting matches the bitmaps", check_pool_accounting),
            &("semaphore down on one never blocks", check_semaphore_fast_path),
            &("recursive lock nests three deep", check_recursive_lock),
            &("ring buffer drains sixty-three bytes", check_ring_capacity),
            &("timer ticks advance", check_ticks_advance),
            &("equal-priority workers both run", check_preemptive_rotation),
            &("blocked consumer wakes on produced byte", check_channel_wakeup),
        ])
    }

    fn check_kernel_page_mapping() -> Result<(), KernelError> {
        let run = vmm::get_kernel_pages(3).ok_or(KernelError::OutOfMemory { requested: 3 })?;

        for page in 0..3u32 {
            let vaddr = run.offset(page * PAGE_SIZE as u32);
            if !page_table::is_mapped(vaddr) {
                return Err(KernelError::CheckFailed {
                    what: "allocated page has no present PTE",
                });
            }
        }

        // The region must be writable and zeroed.
        // SAFETY: The run was just allocated for this test.
        unsafe {
            let ptr = run.as_mut_ptr::<u32>();
            if ptr.read_volatile() != 0 {
                return Err(KernelError::CheckFailed {
                    what: "get_kernel_pages left stale bytes",
                });
            }
            ptr.write_volatile(0xDEAD_BEEF);
            if ptr.read_volatile() != 0xDEAD_BEEF {
                return Err(KernelError::CheckFailed {
                    what: "kernel page not writable",
                });
            }
        }
        Ok(())
    }

    fn check_pool_accounting() -> Result<(), KernelError> {
        let before = frame_allocator::allocated_frames(PoolKind::Kernel);
        let frame = frame_allocator::alloc_frame(PoolKind::Kernel)
            .ok_or(KernelError::OutOfMemory { requested: 1 })?;
        kassert!(frame.is_page_aligned());

        let after = frame_allocator::allocated_frames(PoolKind::Kernel);
        if after != before + 1 {
            return Err(KernelError::CheckFailed {
                what: "set-bit count did not track the allocation",
            });
        }
        Ok(())
    }

    fn check_semaphore_fast_path() -> Result<(), KernelError> {
        static SEMA: Semaphore = Semaphore::new(1);
        SEMA.init();

        SEMA.down();
        if SEMA.value() != 0 {
            return Err(KernelError::CheckFailed {
                what: "down on 1 should leave 0",
            });
        }
        SEMA.up();
        if SEMA.value() != 1 {
            return Err(KernelError::CheckFailed {
                what: "up should restore 1",
            });
        }
        Ok(())
    }

    fn check_recursive_lock() -> Result<(), KernelError> {
        static LOCK: SleepLock = SleepLock::new();
        LOCK.init();

        LOCK.acquire();
        if LOCK.recursion_depth() != 1
            || LOCK.holder() != sched::current()
            || LOCK.semaphore_value() != 0
        {
            return Err(KernelError::CheckFailed {
                what: "first acquire state",
            });
        }

        LOCK.acquire();
        LOCK.acquire();
        if LOCK.recursion_depth() != 3 {
            return Err(KernelError::CheckFailed {
                what: "third acquire should nest to 3",
            });
        }

        LOCK.release();
        LOCK.release();
        if LOCK.recursion_depth() != 1 || LOCK.holder() != sched::current() {
            return Err(KernelError::CheckFailed {
                what: "still owned after two releases",
            });
        }

        LOCK.release();
        if !LOCK.holder().is_null() || LOCK.recursion_depth() != 0 || LOCK.semaphore_value() != 1 {
            return Err(KernelError::CheckFailed {
                what: "final release should free the lock",
            });
        }
        Ok(())
    }

    fn check_ring_capacity() -> Result<(), KernelError> {
        static QUEUE: IoQueue = IoQueue::new();
        QUEUE.init();

        interrupts::without_interrupts(|| {
            for i in 0..63u8 {
                if QUEUE.is_full() {
                    return Err(KernelError::CheckFailed {
                        what: "full before 63 bytes",
                    });
                }
                QUEUE.put_byte(i);
            }
            if !QUEUE.is_full() {
                return Err(KernelError::CheckFailed {
                    what: "not full at 63 bytes",
                });
            }
            for i in 0..63u8 {
                if QUEUE.get_byte() != i {
                    return Err(KernelError::CheckFailed {
                        what: "bytes out of order",
                    });
                }
            }
            if !QUEUE.is_empty() {
                return Err(KernelError::CheckFailed {
                    what: "not empty after drain",
                });
            }
            Ok(())
        })
    }

    fn check_ticks_advance() -> Result<(), KernelError> {
        let before = timer::ticks();
        for _ in 0..5 {
            // SAFETY: hlt with interrupts enabled resumes on the next
            // tick.
            unsafe {
                core::arch::asm!("hlt", options(nomem, nostack));
            }
        }
        if timer::ticks() <= before {
            return Err(KernelError::CheckFailed {
                what: "tick counter did not move",
            });
        }
        Ok(())
    }

    static COUNT_A: AtomicU32 = AtomicU32::new(0);
    static COUNT_B: AtomicU32 = AtomicU32::new(0);

    extern "C" fn counting_worker(arg: usize) {
        let counter = if arg == 0 { &COUNT_A } else { &COUNT_B };
        loop {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn check_preemptive_rotation() -> Result<(), KernelError> {
        sched::spawn("count-a", 2, counting_worker, 0)
            .ok_or(KernelError::OutOfMemory { requested: 1 })?;
        sched::spawn("count-b", 2, counting_worker, 1)
            .ok_or(KernelError::OutOfMemory { requested: 1 })?;

        // Give both workers several quanta.
        let deadline = timer::ticks() + 20;
        while timer::ticks() < deadline {
            // SAFETY: As above.
            unsafe {
                core::arch::asm!("hlt", options(nomem, nostack));
            }
        }

        if COUNT_A.load(Ordering::Relaxed) == 0 || COUNT_B.load(Ordering::Relaxed) == 0 {
            return Err(KernelError::CheckFailed {
                what: "a worker never ran",
            });
        }
        Ok(())
    }

    static CHANNEL: IoQueue = IoQueue::new();
    static OBSERVED: AtomicU32 = AtomicU32::new(0);

    extern "C" fn channel_consumer(_arg: usize) {
        let byte = interrupts::without_interrupts(|| CHANNEL.get_byte());
        OBSERVED.store(byte as u32 | 0x100, Ordering::SeqCst);
        loop {
            // SAFETY: Parks the finished consumer between ticks.
            unsafe {
                core::arch::asm!("hlt", options(nomem, nostack));
            }
        }
    }

    fn check_channel_wakeup() -> Result<(), KernelError> {
        CHANNEL.init();
        sched::spawn("consumer", 4, channel_consumer, 0)
            .ok_or(KernelError::OutOfMemory { requested: 1 })?;

        // Let the consumer run and block on the empty channel.
        let deadline = timer::ticks() + 10;
        while timer::ticks() < deadline {
            // SAFETY: As above.
            unsafe {
                core::arch::asm!("hlt", options(nomem, nostack));
            }
        }

        interrupts::without_interrupts(|| CHANNEL.put_byte(0x41));

        let deadline = timer::ticks() + 10;
        while timer::ticks() < deadline && OBSERVED.load(Ordering::SeqCst) == 0 {
            // SAFETY: As above.
            unsafe {
                core::arch::asm!("hlt", options(nomem, nostack));
            }
        }

        if OBSERVED.load(Ordering::SeqCst) != 0x141 {
            return Err(KernelError::CheckFailed {
                what: "consumer never observed 0x41",
            });
        }
        Ok(())
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        kestrel_kernel::test_panic_handler(info)
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
