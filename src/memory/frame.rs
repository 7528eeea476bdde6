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

//! Physical page frames and memory zones.
//!
//! Every page of physical memory is described by a [`Frame`]. A frame is
//! either free, linked into its zone's buddy free lists, or used, carrying a
//! reference count and the owner of the block it belongs to.
//!
//! [`Memory`] owns the three zones and a simulated byte arena standing in for
//! the machine's physical memory, so that page contents can be read and
//! written without a real mapping.

use super::{
	memmap::MemoryLayout,
	slab::SlabRegistry,
	vmem::KernelSpace,
	PhysAddr, VirtAddr, KERNEL_BEGIN, PAGE_SIZE,
};
use crate::{
	errno,
	errno::EResult,
	multiboot::BootInfo,
	sync::mutex::{IntMutex, Mutex},
};
use alloc::{boxed::Box, sync::Arc, vec, vec::Vec};
use bitflags::bitflags;
use core::fmt;

/// The order of a memory frame.
pub type FrameOrder = u8;
/// The identifier of a frame inside its zone.
pub(super) type FrameId = u32;

/// The number of memory zones.
pub const ZONES_COUNT: usize = 3;

bitflags! {
	/// Allocation hint flags, selecting the zone an allocation is served
	/// from.
	#[derive(Clone, Copy, Debug, Eq, PartialEq)]
	pub struct Gfp: u32 {
		/// Allocate from the DMA zone.
		const DMA = 0b001;
		/// Allocate from the kernel (low memory) zone.
		const KERNEL = 0b010;
		/// Allocate from the high memory zone.
		const HIGHUSER = 0b100;
	}
}

/// A handle to a physical page frame, identified by its page frame number.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Page(pub(super) usize);

impl Page {
	/// Returns the page frame number.
	pub fn pfn(self) -> usize {
		self.0
	}
}

/// The owner of a used frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum FrameOwner {
	/// The frame belongs to a plain buddy allocation.
	Anon,
	/// The frame belongs to a slab.
	Slab {
		/// The index of the owning cache in the slab registry.
		cache: usize,
		/// The index of the owning slab in the cache.
		slab: usize,
	},
}

/// The state of a frame.
///
/// A frame is free if and only if it carries no reference; the buddy order is
/// only meaningful on the head frame of a block.
#[derive(Clone, Copy, Debug)]
pub(super) enum FrameState {
	/// The frame heads a free block, linked into its zone's free list.
	///
	/// The links store frame identifiers rather than pointers; a frame
	/// pointing to itself ends the list.
	Free {
		/// The order of the free block.
		order: FrameOrder,
		/// The identifier of the previous frame in the free list.
		prev: FrameId,
		/// The identifier of the next frame in the free list.
		next: FrameId,
	},
	/// The frame belongs to an allocated block.
	Used {
		/// The order of the block. Only meaningful on the head frame.
		order: FrameOrder,
		/// The number of references to the frame. Zero marks a non-head
		/// frame of a multi-page block.
		refs: u32,
		/// The owner of the block.
		owner: FrameOwner,
	},
}

/// The metadata for a frame of physical memory.
#[derive(Clone, Copy, Debug)]
pub(super) struct Frame {
	pub state: FrameState,
}

impl Frame {
	/// Tells whether the frame is used.
	pub fn is_used(&self) -> bool {
		matches!(self.state, FrameState::Used { .. })
	}

	/// Returns the order of the frame.
	pub fn order(&self) -> FrameOrder {
		match self.state {
			FrameState::Free {
				order, ..
			} => order,
			FrameState::Used {
				order, ..
			} => order,
		}
	}

	/// Returns the reference count in the signed convention: `-1` when the
	/// frame is free.
	pub fn refcount(&self) -> i32 {
		match self.state {
			FrameState::Free {
				..
			} => -1,
			FrameState::Used {
				refs, ..
			} => refs as i32,
		}
	}
}

/// The kind of a memory zone.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ZoneKind {
	/// DMA-capable memory.
	Dma,
	/// Low memory, permanently mapped in the kernelspace.
	Kernel,
	/// High memory, without a permanent kernel mapping.
	HighUser,
}

/// The lock-protected part of a zone.
pub(super) struct ZoneInner {
	/// The frame metadata of the zone.
	pub frames: Vec<Frame>,
	/// One free list head per order. Each list links free block heads of
	/// that exact order.
	pub free_list: [Option<FrameId>; (super::buddy::MAX_ORDER + 1) as usize],
	/// The number of allocated pages in the zone.
	pub allocated_pages: usize,
	/// The number of bytes held by slab caches in free object slots backed
	/// by this zone.
	pub cached_bytes: usize,
}

/// An allocatable zone of memory.
pub(super) struct Zone {
	/// The kind of the zone.
	pub kind: ZoneKind,
	/// The physical address of the beginning of the zone.
	pub begin: PhysAddr,
	/// The size of the zone in pages.
	pub pages_count: usize,
	/// The zone's frames and free lists.
	pub inner: IntMutex<ZoneInner>,
}

impl Zone {
	/// Creates a zone covering physical pages `[begin, begin + pages)`.
	fn new(kind: ZoneKind, begin: PhysAddr, pages_count: usize) -> Self {
		let mut inner = ZoneInner {
			frames: vec![
				Frame {
					state: FrameState::Used {
						order: 0,
						refs: 0,
						owner: FrameOwner::Anon,
					},
				};
				pages_count
			],
			free_list: Default::default(),
			allocated_pages: 0,
			cached_bytes: 0,
		};
		inner.fill_free_list(pages_count);
		Self {
			kind,
			begin,
			pages_count,
			inner: IntMutex::new(inner),
		}
	}

	/// Returns the page frame number of the first page of the zone.
	pub fn base_pfn(&self) -> usize {
		self.begin.0 / PAGE_SIZE
	}

	/// Returns the virtual address of the beginning of the zone's direct
	/// mapping, if it has one.
	pub fn virt_begin(&self) -> Option<VirtAddr> {
		match self.kind {
			ZoneKind::HighUser => None,
			_ => Some(self.begin.kernel_to_virtual()),
		}
	}
}

/// Memory statistics, in KiB.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemInfo {
	/// The total amount of usable physical memory.
	pub mem_total: usize,
	/// The amount of free physical memory.
	pub mem_free: usize,
}

/// The system's physical memory: three zone descriptors over a contiguous
/// range of page frames, and the byte arena standing in for the actual
/// memory.
pub struct Memory {
	/// The physical memory layout.
	layout: MemoryLayout,
	/// The zones, ordered DMA, Kernel, HighUser.
	pub(super) zones: [Zone; ZONES_COUNT],
	/// The simulated physical memory contents.
	bytes: Mutex<Box<[u8]>>,
	/// Memory statistics.
	pub(super) stats: IntMutex<MemInfo>,
	/// The slab caches served by this memory.
	pub(super) slab: IntMutex<SlabRegistry>,
	/// The kernel half of the page directory, shared by every address space.
	kernel_space: Arc<KernelSpace>,
}

impl Memory {
	/// Initializes the memory from the given boot information.
	pub fn new(boot_info: &BootInfo) -> Self {
		Self::with_layout(MemoryLayout::from_boot_info(boot_info))
	}

	/// Initializes the memory with the given layout.
	pub fn with_layout(layout: MemoryLayout) -> Self {
		let dma_pages = layout.dma_end.0 / PAGE_SIZE;
		let lowmem_pages = (layout.lowmem_end.0 - layout.dma_end.0) / PAGE_SIZE;
		let high_pages = (layout.mem_end.0 - layout.lowmem_end.0) / PAGE_SIZE;
		let zones = [
			Zone::new(ZoneKind::Dma, PhysAddr(0), dma_pages),
			Zone::new(ZoneKind::Kernel, layout.dma_end, lowmem_pages),
			Zone::new(ZoneKind::HighUser, layout.lowmem_end, high_pages),
		];
		let total_pages = layout.pages_count();
		let mem = Self {
			layout,
			zones,
			bytes: Mutex::new(vec![0u8; layout.mem_end.0].into_boxed_slice()),
			stats: IntMutex::new(MemInfo {
				mem_total: total_pages * (PAGE_SIZE / 1024),
				mem_free: total_pages * (PAGE_SIZE / 1024),
			}),
			slab: IntMutex::new(SlabRegistry::new()),
			kernel_space: KernelSpace::new(&layout),
		};
		log::info!(
			"memory: {} pages (dma: {}, lowmem: {}, highmem: {})",
			total_pages,
			dma_pages,
			lowmem_pages,
			high_pages
		);
		mem
	}

	/// Returns the memory layout.
	pub fn layout(&self) -> &MemoryLayout {
		&self.layout
	}

	/// Returns current memory statistics.
	pub fn stats(&self) -> MemInfo {
		*self.stats.lock()
	}

	/// Returns the kernel half of the page directory.
	pub fn kernel_space(&self) -> &Arc<KernelSpace> {
		&self.kernel_space
	}

	/// Returns the allocation hint selecting the zone the given page belongs
	/// to.
	pub fn zone_hint_of_page(&self, page: Page) -> Gfp {
		if self.is_dma_page(page) {
			Gfp::DMA
		} else if self.is_highmem_page(page) {
			Gfp::HIGHUSER
		} else {
			Gfp::KERNEL
		}
	}

	/// Returns the zone serving allocations with the given hint.
	pub(super) fn zone_by_hint(&self, gfp: Gfp) -> &Zone {
		if gfp.contains(Gfp::HIGHUSER) {
			&self.zones[2]
		} else if gfp.contains(Gfp::DMA) {
			&self.zones[0]
		} else {
			&self.zones[1]
		}
	}

	/// Returns the zone owning the given page frame number, along with the
	/// frame's zone-local identifier.
	pub(super) fn zone_of_pfn(&self, pfn: usize) -> Option<(&Zone, FrameId)> {
		self.zones
			.iter()
			.find(|z| pfn >= z.base_pfn() && pfn < z.base_pfn() + z.pages_count)
			.map(|z| (z, (pfn - z.base_pfn()) as FrameId))
	}

	/// Returns the hint to use for userspace allocations: high memory when
	/// the machine has some, low memory otherwise.
	pub fn user_zone_hint(&self) -> Gfp {
		if self.zones[2].pages_count > 0 {
			Gfp::HIGHUSER
		} else {
			Gfp::KERNEL
		}
	}

	/// Returns the page at the given physical address.
	///
	/// The address must be page-aligned and within the physical memory.
	pub fn page_from_phys(&self, phys: PhysAddr) -> Option<Page> {
		if !phys.is_aligned_to(PAGE_SIZE) || phys >= self.layout.mem_end {
			return None;
		}
		Some(Page(phys.0 / PAGE_SIZE))
	}

	/// Returns the physical address of the given page.
	pub fn phys_from_page(&self, page: Page) -> PhysAddr {
		PhysAddr(page.0 * PAGE_SIZE)
	}

	/// Returns the kernel virtual address of the given page.
	///
	/// High memory frames have no permanent kernel mapping; for them the
	/// function returns `None`.
	pub fn virt_from_page(&self, page: Page) -> Option<VirtAddr> {
		if self.is_highmem_page(page) {
			return None;
		}
		Some(self.phys_from_page(page).kernel_to_virtual())
	}

	/// Returns the page mapped at the given kernel virtual address.
	///
	/// The function is only defined over the direct mapping of the DMA and
	/// low memory zones.
	pub fn page_from_virt(&self, virt: VirtAddr) -> Option<Page> {
		let phys = virt.kernel_to_physical()?;
		if phys >= self.layout.lowmem_end {
			return None;
		}
		self.page_from_phys(phys)
	}

	/// Tells whether the given page belongs to the DMA zone.
	pub fn is_dma_page(&self, page: Page) -> bool {
		self.phys_from_page(page) < self.layout.dma_end
	}

	/// Tells whether the given page belongs to the low memory zone.
	pub fn is_lowmem_page(&self, page: Page) -> bool {
		let phys = self.phys_from_page(page);
		phys >= self.layout.dma_end && phys < self.layout.lowmem_end
	}

	/// Tells whether the given page belongs to the high memory zone.
	pub fn is_highmem_page(&self, page: Page) -> bool {
		let phys = self.phys_from_page(page);
		phys >= self.layout.lowmem_end && phys < self.layout.mem_end
	}

	/// Tells whether the given virtual address falls inside the kernel's
	/// direct mapping.
	pub fn is_valid_virtual_address(&self, virt: VirtAddr) -> bool {
		virt.0 >= KERNEL_BEGIN.0 && virt.0 - KERNEL_BEGIN.0 < self.layout.lowmem_end.0
	}

	/// Returns the reference count of the given page in the signed
	/// convention: `-1` when the frame is free.
	pub fn page_refcount(&self, page: Page) -> Option<i32> {
		let (zone, id) = self.zone_of_pfn(page.0)?;
		let inner = zone.inner.lock();
		Some(inner.frames[id as usize].refcount())
	}

	/// Reads `buf.len()` bytes of physical memory starting at `phys`.
	pub fn read_phys(&self, phys: PhysAddr, buf: &mut [u8]) -> EResult<()> {
		let bytes = self.bytes.lock();
		let end = phys.0.checked_add(buf.len()).ok_or(errno!(EFAULT))?;
		if end > bytes.len() {
			return Err(errno!(EFAULT));
		}
		buf.copy_from_slice(&bytes[phys.0..end]);
		Ok(())
	}

	/// Writes `data` to physical memory starting at `phys`.
	pub fn write_phys(&self, phys: PhysAddr, data: &[u8]) -> EResult<()> {
		let mut bytes = self.bytes.lock();
		let end = phys.0.checked_add(data.len()).ok_or(errno!(EFAULT))?;
		if end > bytes.len() {
			return Err(errno!(EFAULT));
		}
		bytes[phys.0..end].copy_from_slice(data);
		Ok(())
	}

	/// Fills `len` bytes of physical memory starting at `phys` with `byte`.
	pub fn fill_phys(&self, phys: PhysAddr, len: usize, byte: u8) -> EResult<()> {
		let mut bytes = self.bytes.lock();
		let end = phys.0.checked_add(len).ok_or(errno!(EFAULT))?;
		if end > bytes.len() {
			return Err(errno!(EFAULT));
		}
		bytes[phys.0..end].fill(byte);
		Ok(())
	}

	/// Copies the contents of page `src` to page `dst`.
	pub fn copy_page(&self, src: Page, dst: Page) -> EResult<()> {
		let mut bytes = self.bytes.lock();
		let src_off = src.0 * PAGE_SIZE;
		let dst_off = dst.0 * PAGE_SIZE;
		if src_off + PAGE_SIZE > bytes.len() || dst_off + PAGE_SIZE > bytes.len() {
			return Err(errno!(EFAULT));
		}
		bytes.copy_within(src_off..src_off + PAGE_SIZE, dst_off);
		Ok(())
	}

	/// Reads from the kernel direct mapping at `virt`.
	pub fn read_virt(&self, virt: VirtAddr, buf: &mut [u8]) -> EResult<()> {
		let phys = virt.kernel_to_physical().ok_or(errno!(EFAULT))?;
		self.read_phys(phys, buf)
	}

	/// Writes to the kernel direct mapping at `virt`.
	pub fn write_virt(&self, virt: VirtAddr, data: &[u8]) -> EResult<()> {
		let phys = virt.kernel_to_physical().ok_or(errno!(EFAULT))?;
		self.write_phys(phys, data)
	}
}

impl fmt::Debug for Memory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Memory")
			.field("layout", &self.layout)
			.field("stats", &self.stats())
			.finish()
	}
}

#[cfg(test)]
pub(crate) mod test {
	use super::*;

	/// A small layout with all three zones populated: 4 MiB DMA, 4 MiB low
	/// memory, 2 MiB high memory.
	pub(crate) fn test_memory() -> Memory {
		Memory::with_layout(MemoryLayout::new(
			PhysAddr(0x400000),
			PhysAddr(0x800000),
			PhysAddr(0xa00000),
		))
	}

	#[test]
	fn page_round_trips() {
		let mem = test_memory();
		let page = mem.page_from_phys(PhysAddr(0x5000)).unwrap();
		assert_eq!(mem.phys_from_page(page), PhysAddr(0x5000));
		assert_eq!(mem.page_from_phys(mem.phys_from_page(page)), Some(page));
		let virt = mem.virt_from_page(page).unwrap();
		assert_eq!(mem.page_from_virt(virt), Some(page));
	}

	#[test]
	fn page_zone_membership() {
		let mem = test_memory();
		let dma = mem.page_from_phys(PhysAddr(0)).unwrap();
		let low = mem.page_from_phys(PhysAddr(0x400000)).unwrap();
		let high = mem.page_from_phys(PhysAddr(0x800000)).unwrap();
		assert!(mem.is_dma_page(dma) && !mem.is_lowmem_page(dma));
		assert!(mem.is_lowmem_page(low) && !mem.is_highmem_page(low));
		assert!(mem.is_highmem_page(high) && !mem.is_dma_page(high));
	}

	#[test]
	fn highmem_has_no_virt() {
		let mem = test_memory();
		let high = mem.page_from_phys(PhysAddr(0x900000)).unwrap();
		assert_eq!(mem.virt_from_page(high), None);
		// The direct mapping stops at the end of low memory
		assert_eq!(mem.page_from_virt(VirtAddr(0xc0000000 + 0x900000)), None);
	}

	#[test]
	fn valid_virtual_addresses() {
		let mem = test_memory();
		assert!(mem.is_valid_virtual_address(VirtAddr(0xc0000000)));
		assert!(mem.is_valid_virtual_address(VirtAddr(0xc0000000 + 0x7fffff)));
		assert!(!mem.is_valid_virtual_address(VirtAddr(0xc0000000 + 0x800000)));
		assert!(!mem.is_valid_virtual_address(VirtAddr(0x1000)));
	}

	#[test]
	fn arena_read_write() {
		let mem = test_memory();
		mem.write_phys(PhysAddr(0x1000), b"hello").unwrap();
		let mut buf = [0u8; 5];
		mem.read_phys(PhysAddr(0x1000), &mut buf).unwrap();
		assert_eq!(&buf, b"hello");
		assert!(mem.read_phys(PhysAddr(0xa00000), &mut buf).is_err());
	}
}
