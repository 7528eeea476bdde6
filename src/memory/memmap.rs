/*
 * Copyright 2025 The Minos developers
 *
 * This file is part of Minos.
 *
 * Minos is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Minos is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Minos. If not, see <https://www.gnu.org/licenses/>.
 */

//! Physical memory layout, carved from the boot information.
//!
//! The physical memory is partitioned into three zones:
//! - DMA: a prefix of the physical memory, at most 16 MiB, usable by legacy
//!   DMA devices
//! - Kernel (low memory): permanently mapped in the kernelspace at a fixed
//!   offset
//! - HighUser (high memory): the remainder, with no permanent kernel mapping

use super::{PhysAddr, PAGE_SIZE};
use crate::multiboot::BootInfo;

/// The end of the DMA zone: 16 MiB.
pub const DMA_MAX: usize = 0x1000000;
/// The end of the low memory zone: 896 MiB, the portion of the kernelspace
/// left after the kernel's own virtual reservations.
pub const LOWMEM_MAX: usize = 0x38000000;
/// Zone boundary alignment: the size of one maximum-order buddy block.
///
/// Keeping zone bases aligned to a whole block preserves the natural
/// alignment of buddy allocations.
pub const ZONE_ALIGN: usize = (1 << super::buddy::MAX_ORDER) * PAGE_SIZE;

/// The physical memory layout.
#[derive(Clone, Copy, Debug)]
pub struct MemoryLayout {
	/// The end of the DMA zone.
	pub dma_end: PhysAddr,
	/// The end of the low memory zone.
	pub lowmem_end: PhysAddr,
	/// The end of the physical memory.
	pub mem_end: PhysAddr,
}

impl MemoryLayout {
	/// Carves a layout from the given boot information.
	pub fn from_boot_info(boot_info: &BootInfo) -> Self {
		Self::with_memory_size(boot_info.memory_size())
	}

	/// Carves a layout for a physical memory of `size` bytes.
	pub fn with_memory_size(size: usize) -> Self {
		let mem_end = PhysAddr(size).down_align_to(PAGE_SIZE);
		let aligned_end = mem_end.down_align_to(ZONE_ALIGN);
		let dma_end = PhysAddr(DMA_MAX.min(aligned_end.0));
		let lowmem_end = PhysAddr(LOWMEM_MAX.min(aligned_end.0).max(dma_end.0));
		Self {
			dma_end,
			lowmem_end,
			mem_end,
		}
	}

	/// Creates a layout with explicit zone boundaries.
	///
	/// Boundaries must be increasing; `dma_end` and `lowmem_end` must be
	/// aligned to [`ZONE_ALIGN`] and `dma_end` must not exceed [`DMA_MAX`].
	pub fn new(dma_end: PhysAddr, lowmem_end: PhysAddr, mem_end: PhysAddr) -> Self {
		debug_assert!(dma_end.is_aligned_to(ZONE_ALIGN));
		debug_assert!(lowmem_end.is_aligned_to(ZONE_ALIGN));
		debug_assert!(mem_end.is_aligned_to(PAGE_SIZE));
		debug_assert!(dma_end.0 <= DMA_MAX);
		debug_assert!(dma_end <= lowmem_end && lowmem_end <= mem_end);
		Self {
			dma_end,
			lowmem_end,
			mem_end,
		}
	}

	/// Returns the total number of pages of physical memory.
	pub fn pages_count(&self) -> usize {
		self.mem_end.0 / PAGE_SIZE
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn layout_small() {
		// 8 MiB machine: everything is DMA
		let layout = MemoryLayout::with_memory_size(0x800000);
		assert_eq!(layout.dma_end, PhysAddr(0x800000));
		assert_eq!(layout.lowmem_end, PhysAddr(0x800000));
		assert_eq!(layout.mem_end, PhysAddr(0x800000));
	}

	#[test]
	fn layout_mid() {
		// 64 MiB machine: DMA + low memory, no high memory
		let layout = MemoryLayout::with_memory_size(0x4000000);
		assert_eq!(layout.dma_end, PhysAddr(DMA_MAX));
		assert_eq!(layout.lowmem_end, PhysAddr(0x4000000));
		assert_eq!(layout.mem_end, PhysAddr(0x4000000));
	}

	#[test]
	fn layout_large() {
		// 1 GiB machine: the tail above 896 MiB is high memory
		let layout = MemoryLayout::with_memory_size(0x40000000);
		assert_eq!(layout.dma_end, PhysAddr(DMA_MAX));
		assert_eq!(layout.lowmem_end, PhysAddr(LOWMEM_MAX));
		assert_eq!(layout.mem_end, PhysAddr(0x40000000));
	}
}
