//! Physical frame pools.
//!
//! Everything past the low megabyte and the loader's 256 page-structure
//! pages is split evenly into a kernel pool and a user pool, each tracked
//! by one bit per frame. The pool bitmaps live contiguously at a fixed
//! address below the main task's stack page, with the kernel-virtual
//! bitmap laid out directly after them.
//!
//! There is no frame free operation; the kernel allocates and keeps. The
//! one exception is [`release_frame`], which exists so a half-finished
//! multi-page mapping can undo its own reservations.

use spin::Mutex;

use super::{bitmap::Bitmap, PhysicalAddress, PoolKind, PAGE_SIZE};
use crate::config::{LOW_MEMORY_BYTES, PAGE_STRUCTURE_PAGES};

/// How the managed memory is carved up for a given probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLayout {
    pub kernel_base: u32,
    pub kernel_pages: u32,
    pub user_base: u32,
    pub user_pages: u32,
}

impl PoolLayout {
    /// Bytes of bitmap needed for the kernel pool.
    pub fn kernel_bitmap_bytes(&self) -> usize {
        self.kernel_pages as usize / 8
    }

    /// Bytes of bitmap needed for the user pool.
    pub fn user_bitmap_bytes(&self) -> usize {
        self.user_pages as usize / 8
    }
}

/// Partitions `total_bytes` of physical memory into the two pools.
///
/// The page-structure pages and the low megabyte are reserved up front;
/// whatever remains is counted in whole pages (a sub-page tail is
/// discarded) and split half-and-half, with the odd page going to the
/// user pool. Bitmap lengths round down to whole bytes, so up to seven
/// trailing pages per pool are never represented — the bitmaps then
/// undercount reality, which is the safe direction.
pub fn compute_layout(total_bytes: u32) -> PoolLayout {
    let reserved = LOW_MEMORY_BYTES + PAGE_STRUCTURE_PAGES * PAGE_SIZE as u32;
    kassert!(total_bytes > reserved);

    let free_pages = (total_bytes - reserved) / PAGE_SIZE as u32;
    let kernel_pages = free_pages / 2;
    let user_pages = free_pages - kernel_pages;

    let kernel_base = reserved;
    let user_base = kernel_base + kernel_pages * PAGE_SIZE as u32;

    PoolLayout {
        kernel_base,
        kernel_pages,
        user_base,
        user_pages,
    }
}

/// A bitmap-managed physical pool.
pub struct PhysicalPool {
    bitmap: Bitmap<'static>,
    base: PhysicalAddress,
    size_bytes: u32,
}

impl PhysicalPool {
    pub fn new(bitmap: Bitmap<'static>, base: PhysicalAddress, size_bytes: u32) -> Self {
        Self {
            bitmap,
            base,
            size_bytes,
        }
    }

    /// Claims one free frame and returns its base address.
    pub fn alloc_frame(&mut self) -> Option<PhysicalAddress> {
        let index = self.bitmap.scan(1)?;
        self.bitmap.set(index, true);
        Some(PhysicalAddress::new(
            self.base.as_u32() + index as u32 * PAGE_SIZE as u32,
        ))
    }

    /// Returns a frame to the pool. Internal rollback use only; the
    /// public surface never frees.
    fn release_frame(&mut self, frame: PhysicalAddress) {
        kassert!(frame.as_u32() >= self.base.as_u32());
        let index = (frame.as_u32() - self.base.as_u32()) / PAGE_SIZE as u32;
        kassert!(self.bitmap.test(index as usize));
        self.bitmap.set(index as usize, false);
    }

    /// Frames currently handed out.
    pub fn allocated_frames(&self) -> usize {
        self.bitmap.count_set()
    }

    pub fn base(&self) -> PhysicalAddress {
        self.base
    }

    pub fn size_bytes(&self) -> u32 {
        self.size_bytes
    }
}

static KERNEL_POOL: Mutex<Option<PhysicalPool>> = Mutex::new(None);
static USER_POOL: Mutex<Option<PhysicalPool>> = Mutex::new(None);

fn pool_of(kind: PoolKind) -> &'static Mutex<Option<PhysicalPool>> {
    match kind {
        PoolKind::Kernel => &KERNEL_POOL,
        PoolKind::User => &USER_POOL,
    }
}

/// Claims one frame from the given pool.
pub fn alloc_frame(kind: PoolKind) -> Option<PhysicalAddress> {
    let mut pool = pool_of(kind).lock();
    let pool = pool.as_mut()?;
    pool.alloc_frame()
}

/// Rollback entry point for `malloc_page`; see the module docs.
#[allow(dead_code)] // only the bare-metal mapping path unwinds frames
pub(crate) fn release_frame(kind: PoolKind, frame: PhysicalAddress) {
    let mut pool = pool_of(kind).lock();
    if let Some(pool) = pool.as_mut() {
        pool.release_frame(frame);
    }
}

/// Frames currently handed out by the given pool.
pub fn allocated_frames(kind: PoolKind) -> usize {
    let pool = pool_of(kind).lock();
    pool.as_ref().map_or(0, |p| p.allocated_frames())
}

/// Installs both physical pools and the kernel virtual window over the
/// fixed bitmap region.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init(total_bytes: u32) {
    use super::vmm;
    use crate::config::MEM_BITMAP_BASE;

    let layout = compute_layout(total_bytes);
    let kernel_bitmap_bytes = layout.kernel_bitmap_bytes();
    let user_bitmap_bytes = layout.user_bitmap_bytes();

    // SAFETY: The bitmap region below the main task's stack page is
    // reserved for exactly this purpose by the fixed memory layout; the
    // three slices are disjoint by construction.
    let (kernel_bits, user_bits, vaddr_bits) = unsafe {
        let base = MEM_BITMAP_BASE as usize as *mut u8;
        (
            core::slice::from_raw_parts_mut(base, kernel_bitmap_bytes),
            core::slice::from_raw_parts_mut(base.add(kernel_bitmap_bytes), user_bitmap_bytes),
            core::slice::from_raw_parts_mut(
                base.add(kernel_bitmap_bytes + user_bitmap_bytes),
                kernel_bitmap_bytes,
            ),
        )
    };

    let mut kernel_bitmap = Bitmap::new(kernel_bits);
    kernel_bitmap.reset();
    let mut user_bitmap = Bitmap::new(user_bits);
    user_bitmap.reset();

    *KERNEL_POOL.lock() = Some(PhysicalPool::new(
        kernel_bitmap,
        PhysicalAddress::new(layout.kernel_base),
        layout.kernel_pages * PAGE_SIZE as u32,
    ));
    *USER_POOL.lock() = Some(PhysicalPool::new(
        user_bitmap,
        PhysicalAddress::new(layout.user_base),
        layout.user_pages * PAGE_SIZE as u32,
    ));

    // The kernel-heap window mirrors the kernel pool's capacity: one
    // virtual page per allocatable kernel frame.
    let mut vaddr_bitmap = Bitmap::new(vaddr_bits);
    vaddr_bitmap.reset();
    vmm::init(vaddr_bitmap);

    log::info!(
        "[MM] kernel pool {:#x}..{:#x}, user pool {:#x}..{:#x}",
        layout.kernel_base,
        layout.kernel_base + layout.kernel_pages * PAGE_SIZE as u32,
        layout.user_base,
        layout.user_base + layout.user_pages * PAGE_SIZE as u32,
    );
}

/// Host builds back the pools with leaked buffers so allocation logic is
/// testable without the fixed physical layout.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn init(total_bytes: u32) {
    extern crate std;
    use std::vec;

    use super::vmm;

    let layout = compute_layout(total_bytes);

    let kernel_bits: &'static mut [u8] =
        std::boxed::Box::leak(vec![0u8; layout.kernel_bitmap_bytes()].into_boxed_slice());
    let user_bits: &'static mut [u8] =
        std::boxed::Box::leak(vec![0u8; layout.user_bitmap_bytes()].into_boxed_slice());
    let vaddr_bits: &'static mut [u8] =
        std::boxed::Box::leak(vec![0u8; layout.kernel_bitmap_bytes()].into_boxed_slice());

    *KERNEL_POOL.lock() = Some(PhysicalPool::new(
        Bitmap::new(kernel_bits),
        PhysicalAddress::new(layout.kernel_base),
        layout.kernel_pages * PAGE_SIZE as u32,
    ));
    *USER_POOL.lock() = Some(PhysicalPool::new(
        Bitmap::new(user_bits),
        PhysicalAddress::new(layout.user_base),
        layout.user_pages * PAGE_SIZE as u32,
    ));
    vmm::init(Bitmap::new(vaddr_bits));
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::{boxed::Box, vec};

    #[test]
    fn layout_reserves_the_low_region() {
        // 32 MiB machine.
        let layout = compute_layout(32 * 1024 * 1024);
        assert_eq!(layout.kernel_base, 0x20_0000);

        let free_pages = (32 * 1024 * 1024 - 0x20_0000) / PAGE_SIZE as u32;
        assert_eq!(layout.kernel_pages, free_pages / 2);
        assert_eq!(layout.user_pages, free_pages - free_pages / 2);
        assert_eq!(
            layout.user_base,
            layout.kernel_base + layout.kernel_pages * PAGE_SIZE as u32
        );
    }

    #[test]
    fn layout_discards_the_sub_page_tail() {
        let layout = compute_layout(32 * 1024 * 1024 + 1234);
        let exact = compute_layout(32 * 1024 * 1024);
        assert_eq!(layout, exact);
    }

    #[test]
    fn odd_free_page_goes_to_the_user_pool() {
        // Reserved region plus an odd number of pages.
        let total = 0x20_0000 + 5 * PAGE_SIZE as u32;
        let layout = compute_layout(total);
        assert_eq!(layout.kernel_pages, 2);
        assert_eq!(layout.user_pages, 3);
    }

    #[test]
    fn pool_allocation_tracks_the_bitmap() {
        let storage: &'static mut [u8] = Box::leak(vec![0u8; 4].into_boxed_slice());
        let mut pool = PhysicalPool::new(
            Bitmap::new(storage),
            PhysicalAddress::new(0x20_0000),
            32 * PAGE_SIZE as u32,
        );

        let first = pool.alloc_frame().unwrap();
        let second = pool.alloc_frame().unwrap();
        assert_eq!(first.as_u32(), 0x20_0000);
        assert_eq!(second.as_u32(), 0x20_1000);
        assert_eq!(pool.allocated_frames(), 2);

        pool.release_frame(second);
        assert_eq!(pool.allocated_frames(), 1);
        // Lowest index wins again after the rollback.
        assert_eq!(pool.alloc_frame().unwrap(), second);
    }

    #[test]
    fn pool_exhaustion_returns_none() {
        let storage: &'static mut [u8] = Box::leak(vec![0u8; 1].into_boxed_slice());
        let mut pool = PhysicalPool::new(
            Bitmap::new(storage),
            PhysicalAddress::new(0x20_0000),
            8 * PAGE_SIZE as u32,
        );

        for _ in 0..8 {
            assert!(pool.alloc_frame().is_some());
        }
        assert!(pool.alloc_frame().is_none());
    }
}
