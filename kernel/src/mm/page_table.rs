//! Page-table access through the directory self-reference.
//!
//! The loader installs the page directory with its last entry pointing at
//! itself, so every paging structure has a fixed virtual alias: directory
//! entry `i` lives at `0xFFFF_F000 + i * 4` and the table entry for
//! virtual page `p` lives at `0xFFC0_0000 + p * 4`. The kernel never
//! touches paging structures through their physical addresses.

use bitflags::bitflags;

use super::VirtualAddress;
#[cfg(all(target_arch = "x86", target_os = "none"))]
use super::{frame_allocator, PhysicalAddress, PoolKind, PAGE_SIZE};

/// The directory slot that names the directory itself.
pub const PDE_SELF_INDEX: u32 = 1023;

/// Virtual alias of the page directory.
pub const PAGE_DIRECTORY_WINDOW: u32 = 0xFFFF_F000;

/// Virtual alias of the 4 MiB page-table region.
pub const PAGE_TABLE_WINDOW: u32 = 0xFFC0_0000;

bitflags! {
    /// Attribute bits shared by directory and table entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
    }
}

/// Virtual address of the directory entry covering `vaddr`.
pub const fn pde_window_addr(vaddr: VirtualAddress) -> u32 {
    PAGE_DIRECTORY_WINDOW + vaddr.pde_index() * 4
}

/// Virtual address of the table entry covering `vaddr`.
pub const fn pte_window_addr(vaddr: VirtualAddress) -> u32 {
    PAGE_TABLE_WINDOW + vaddr.page_index() * 4
}

/// Pointer to the directory entry covering `vaddr`.
///
/// Valid only after paging is live with the self-reference installed.
pub fn pde_ptr(vaddr: VirtualAddress) -> *mut u32 {
    pde_window_addr(vaddr) as usize as *mut u32
}

/// Pointer to the table entry covering `vaddr`.
///
/// Valid only after paging is live with the self-reference installed,
/// and only meaningful while the covering directory entry is present.
pub fn pte_ptr(vaddr: VirtualAddress) -> *mut u32 {
    pte_window_addr(vaddr) as usize as *mut u32
}

/// Maps the virtual page at `vaddr` to the physical frame at `frame`,
/// creating the covering page table on demand.
///
/// The new mapping is `USER | WRITABLE | PRESENT`, as is a freshly created
/// page table. The target entry must not already be present.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn map_page(vaddr: VirtualAddress, frame: PhysicalAddress) -> Option<()> {
    kassert!(frame.is_page_aligned());

    let pde = pde_ptr(vaddr);
    let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER;

    // SAFETY: The self-reference windows alias live paging structures;
    // all stores below go through them.
    unsafe {
        if *pde & EntryFlags::PRESENT.bits() == 0 {
            // Page tables always come from the kernel pool; they are
            // kernel bookkeeping regardless of which pool the mapping
            // serves.
            let table_frame = frame_allocator::alloc_frame(PoolKind::Kernel)?;
            *pde = table_frame.as_u32() | flags.bits();

            // The recycled frame still carries stale bits; a stale entry
            // with the present bit set would corrupt address translation.
            // The table's own window alias is the page-aligned base of
            // its entry range.
            let table_window = (pte_window_addr(vaddr) & !(PAGE_SIZE as u32 - 1)) as usize;
            core::ptr::write_bytes(table_window as *mut u8, 0, PAGE_SIZE);
        }

        let pte = pte_ptr(vaddr);
        kassert!(*pte & EntryFlags::PRESENT.bits() == 0);
        *pte = frame.as_u32() | flags.bits();
    }

    Some(())
}

/// Removes the mapping for `vaddr`, returning the frame it pointed at.
/// Rollback use by `malloc_page` only.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub(crate) fn unmap_page(vaddr: VirtualAddress) -> PhysicalAddress {
    let pte = pte_ptr(vaddr);
    // SAFETY: Caller only unwinds mappings it installed itself, so the
    // covering table is present.
    unsafe {
        kassert!(*pte & EntryFlags::PRESENT.bits() != 0);
        let frame = *pte & !(PAGE_SIZE as u32 - 1);
        *pte = 0;
        core::arch::asm!("invlpg [{}]", in(reg) vaddr.as_u32() as usize, options(nostack));
        PhysicalAddress::new(frame)
    }
}

/// Whether the page containing `vaddr` currently has a present mapping.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn is_mapped(vaddr: VirtualAddress) -> bool {
    // SAFETY: Reads through the self-reference windows; the PTE is only
    // inspected when its covering directory entry is present.
    unsafe {
        if *pde_ptr(vaddr) & EntryFlags::PRESENT.bits() == 0 {
            return false;
        }
        *pte_ptr(vaddr) & EntryFlags::PRESENT.bits() != 0
    }
}
