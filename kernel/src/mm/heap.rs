//! Kernel byte heap.
//!
//! A fixed number of kernel pages is claimed once at boot and handed to
//! the linked-list allocator behind `#[global_allocator]` (see `lib.rs`),
//! which serves `alloc::boxed::Box` and friends from then on. The page
//! allocator remains the authority for page-granular memory; this heap is
//! for small kernel objects.

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    use alloc::boxed::Box;

    use super::{vmm, PAGE_SIZE};
    use crate::config::KERNEL_HEAP_PAGES;

    let base = vmm::get_kernel_pages(KERNEL_HEAP_PAGES);
    kassert!(base.is_some());
    let base = match base {
        Some(base) => base,
        None => unreachable!(),
    };

    // SAFETY: The region was just allocated, mapped, and zeroed, and is
    // donated to the allocator for the life of the kernel.
    unsafe {
        crate::ALLOCATOR
            .lock()
            .init(base.as_mut_ptr::<u8>(), KERNEL_HEAP_PAGES * PAGE_SIZE);
    }

    // First allocation doubles as a smoke check that the freshly mapped
    // region is actually writable.
    let probe = Box::new(0xA5A5_5A5Au32);
    kassert!(*probe == 0xA5A5_5A5A);

    log::info!(
        "[HEAP] {} KiB at {:#x}",
        KERNEL_HEAP_PAGES * PAGE_SIZE / 1024,
        base.as_u32()
    );
}

/// The host links against the system allocator; there is nothing to set
/// up.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn init() {}
