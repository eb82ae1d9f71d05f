//! Compile-time kernel configuration.
//!
//! Every layout address and tuning knob the kernel relies on lives here so
//! the numbers can be audited in one place. The memory-layout constants
//! mirror what the boot loader sets up before it jumps to `_start`.

/// Size of one page frame / one virtual page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Base of the higher-half kernel window. The loader maps the low physical
/// megabyte at this virtual address.
pub const KERNEL_VIRT_BASE: u32 = 0xC000_0000;

/// Physical address where the loader's probe stored the total usable
/// memory size in bytes. Readable through the low identity mapping.
pub const TOTAL_MEMORY_PROBE: u32 = 0xB00;

/// Bytes permanently reserved below the managed pools: the low megabyte.
pub const LOW_MEMORY_BYTES: u32 = 0x10_0000;

/// Page-structure pages reserved by the loader: the page directory plus
/// 255 kernel page tables.
pub const PAGE_STRUCTURE_PAGES: u32 = 256;

/// Where the pool bitmaps are laid out, directly below the main task's
/// stack page. One page of bitmap covers 128 MiB, and four pages fit
/// between here and the control-block page at 0xC009_E000.
pub const MEM_BITMAP_BASE: u32 = 0xC009_A000;

/// First virtual page of the kernel heap window; skips the low megabyte so
/// kernel virtual addresses stay logically contiguous.
pub const KERNEL_HEAP_BASE: u32 = 0xC010_0000;

/// Pages handed to the byte-heap allocator at boot (256 KiB).
pub const KERNEL_HEAP_PAGES: usize = 64;

/// Timer tick rate. One tick every 10 ms.
pub const TICK_HZ: u32 = 100;

/// Input frequency of the programmable interval timer.
pub const PIT_INPUT_HZ: u32 = 1_193_180;

/// Sentinel written at the low end of every task page, directly after the
/// control block. Checked on every tick; the kernel stack growing into it
/// is fatal.
pub const STACK_CANARY: u32 = 0x1987_0916;

/// Priority (and therefore quantum) of the retrofitted "main" task.
pub const MAIN_TASK_PRIORITY: u8 = 31;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_region_fits_below_main_stack() {
        // Four bitmap pages must fit between MEM_BITMAP_BASE and the main
        // task's control-block page at 0xC009_E000.
        assert!(MEM_BITMAP_BASE + 4 * PAGE_SIZE as u32 <= 0xC009_E000);
    }

    #[test]
    fn heap_window_clears_the_low_megabyte() {
        assert_eq!(KERNEL_HEAP_BASE, KERNEL_VIRT_BASE + LOW_MEMORY_BYTES);
    }
}
