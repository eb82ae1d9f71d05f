//! Kernel virtual window and the combined page allocator.
//!
//! `alloc_pages` hands out runs of virtual pages from the kernel-heap
//! window; `malloc_page` backs each page of such a run with a physical
//! frame and installs the mapping; `get_kernel_pages` is the zeroing
//! wrapper the rest of the kernel uses. Virtual runs are contiguous even
//! when the backing frames are not.

use spin::Mutex;

use super::{bitmap::Bitmap, PoolKind, VirtualAddress, PAGE_SIZE};
use crate::config::KERNEL_HEAP_BASE;

/// A bitmap-managed virtual window.
pub struct VirtualPool {
    bitmap: Bitmap<'static>,
    base: VirtualAddress,
}

impl VirtualPool {
    pub fn new(bitmap: Bitmap<'static>, base: VirtualAddress) -> Self {
        Self { bitmap, base }
    }

    /// Claims `count` consecutive virtual pages.
    pub fn alloc_pages(&mut self, count: usize) -> Option<VirtualAddress> {
        let start = self.bitmap.scan(count)?;
        for bit in start..start + count {
            self.bitmap.set(bit, true);
        }
        Some(self.base.offset(start as u32 * PAGE_SIZE as u32))
    }

    /// Returns a virtual run to the window. Rollback use only.
    fn release_pages(&mut self, start: VirtualAddress, count: usize) {
        kassert!(start.as_u32() >= self.base.as_u32());
        let first = ((start.as_u32() - self.base.as_u32()) / PAGE_SIZE as u32) as usize;
        for bit in first..first + count {
            kassert!(self.bitmap.test(bit));
            self.bitmap.set(bit, false);
        }
    }

    /// Pages currently handed out.
    pub fn allocated_pages(&self) -> usize {
        self.bitmap.count_set()
    }
}

static KERNEL_VADDR_POOL: Mutex<Option<VirtualPool>> = Mutex::new(None);

/// Installs the kernel virtual window. Called by the frame allocator's
/// init with the bitmap slice that follows the physical-pool bitmaps.
pub(crate) fn init(bitmap: Bitmap<'static>) {
    *KERNEL_VADDR_POOL.lock() = Some(VirtualPool::new(
        bitmap,
        VirtualAddress::new(KERNEL_HEAP_BASE),
    ));
}

/// Claims `count` consecutive virtual pages from the given window.
///
/// Only the kernel window exists; asking for user virtual pages is a
/// contract violation until a process layer brings its own windows.
pub fn alloc_pages(kind: PoolKind, count: usize) -> Option<VirtualAddress> {
    kassert!(kind == PoolKind::Kernel);
    let mut pool = KERNEL_VADDR_POOL.lock();
    let pool = pool.as_mut()?;
    pool.alloc_pages(count)
}

/// Rollback entry point for `malloc_page`.
#[allow(dead_code)] // only the bare-metal mapping path unwinds runs
pub(crate) fn release_pages(kind: PoolKind, start: VirtualAddress, count: usize) {
    kassert!(kind == PoolKind::Kernel);
    let mut pool = KERNEL_VADDR_POOL.lock();
    if let Some(pool) = pool.as_mut() {
        pool.release_pages(start, count);
    }
}

/// Virtual pages currently handed out from the kernel window.
pub fn allocated_pages() -> usize {
    let pool = KERNEL_VADDR_POOL.lock();
    pool.as_ref().map_or(0, |p| p.allocated_pages())
}

/// Allocates `count` virtual pages and backs every one with a frame from
/// the given pool.
///
/// Frames are claimed and mapped page by page. If the pool runs dry
/// mid-way, the installed prefix is unwound through the page table (the
/// mapping itself is the rollback log), the virtual run is released, and
/// the call returns `None` with nothing leaked.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn malloc_page(kind: PoolKind, count: usize) -> Option<VirtualAddress> {
    use super::{frame_allocator, page_table};

    let start = alloc_pages(kind, count)?;

    for page in 0..count {
        let vaddr = start.offset(page as u32 * PAGE_SIZE as u32);
        let mapped = frame_allocator::alloc_frame(kind)
            .and_then(|frame| page_table::map_page(vaddr, frame));

        if mapped.is_none() {
            for done in 0..page {
                let done_vaddr = start.offset(done as u32 * PAGE_SIZE as u32);
                let frame = page_table::unmap_page(done_vaddr);
                frame_allocator::release_frame(kind, frame);
            }
            release_pages(kind, start, count);
            return None;
        }
    }

    Some(start)
}

/// Allocates and zeroes `count` kernel pages.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn get_kernel_pages(count: usize) -> Option<VirtualAddress> {
    let start = malloc_page(PoolKind::Kernel, count)?;
    // SAFETY: The whole run was just mapped writable and belongs to the
    // caller alone.
    unsafe {
        core::ptr::write_bytes(start.as_mut_ptr::<u8>(), 0, count * PAGE_SIZE);
    }
    Some(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::{boxed::Box, vec};

    fn pool_with_bits(bytes: usize) -> VirtualPool {
        let storage: &'static mut [u8] = Box::leak(vec![0u8; bytes].into_boxed_slice());
        VirtualPool::new(Bitmap::new(storage), VirtualAddress::new(KERNEL_HEAP_BASE))
    }

    #[test]
    fn runs_are_contiguous_and_low_first() {
        let mut pool = pool_with_bits(2);

        let first = pool.alloc_pages(3).unwrap();
        assert_eq!(first.as_u32(), KERNEL_HEAP_BASE);
        let second = pool.alloc_pages(2).unwrap();
        assert_eq!(second.as_u32(), KERNEL_HEAP_BASE + 3 * PAGE_SIZE as u32);
        assert_eq!(pool.allocated_pages(), 5);
    }

    #[test]
    fn release_reopens_the_run() {
        let mut pool = pool_with_bits(1);

        let run = pool.alloc_pages(8).unwrap();
        assert!(pool.alloc_pages(1).is_none());

        pool.release_pages(run, 8);
        assert_eq!(pool.allocated_pages(), 0);
        assert_eq!(pool.alloc_pages(8), Some(run));
    }

    #[test]
    fn oversized_requests_fail_cleanly() {
        let mut pool = pool_with_bits(1);
        assert!(pool.alloc_pages(9).is_none());
        assert_eq!(pool.allocated_pages(), 0);
    }
}
