//! Memory management.
//!
//! Two bitmap-backed physical pools (kernel and user frames), one
//! bitmap-backed virtual window for the kernel heap, and a page-table
//! installer that works exclusively through the page directory's
//! self-reference. Addresses are explicit 32-bit newtypes; the machine is
//! 32-bit protected mode and host-side tests must not inherit the host's
//! pointer width.

pub mod bitmap;
pub mod frame_allocator;
pub mod heap;
pub mod page_table;
pub mod vmm;

pub use crate::config::PAGE_SIZE;

/// Physical memory address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub const fn is_page_aligned(&self) -> bool {
        self.0 % PAGE_SIZE as u32 == 0
    }
}

/// Virtual memory address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Page-directory index, bits 31..22.
    pub const fn pde_index(&self) -> u32 {
        self.0 >> 22
    }

    /// Page-table index, bits 21..12.
    pub const fn pte_index(&self) -> u32 {
        (self.0 >> 12) & 0x3FF
    }

    /// Index of the virtual page containing this address.
    pub const fn page_index(&self) -> u32 {
        self.0 >> 12
    }

    pub const fn offset(&self, bytes: u32) -> Self {
        Self(self.0 + bytes)
    }

    pub fn as_ptr<T>(&self) -> *const T {
        self.0 as usize as *const T
    }

    pub fn as_mut_ptr<T>(&self) -> *mut T {
        self.0 as usize as *mut T
    }
}

/// Which pool an allocation draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Kernel frames / the kernel-heap virtual window.
    Kernel,
    /// User frames; reserved for a future process layer.
    User,
}

/// Initializes physical and virtual page management from the loader's
/// memory probe.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    use crate::config::TOTAL_MEMORY_PROBE;

    // SAFETY: The loader's probe stored the total usable byte count at
    // this physical address before handoff, and the low megabyte is
    // identity-mapped as well as aliased into the kernel window.
    let total_bytes = unsafe { *(TOTAL_MEMORY_PROBE as usize as *const u32) };

    log::info!("[MM] total memory {} KiB", total_bytes / 1024);
    frame_allocator::init(total_bytes);
}
