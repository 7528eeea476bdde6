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

//! Virtual memory context handler.
//!
//! A [`VMem`] models the x86 two-level page directory of one address space.
//! The user half holds per-space 4 KiB page tables; the kernel half is a
//! single shared template mapping the DMA and low memory zones with 4 MiB
//! large pages, so it is identical in every address space by construction.

use super::{
	frame::{Memory, Page},
	memmap::MemoryLayout,
	PhysAddr, VirtAddr, PAGE_SIZE, PROCESS_END,
};
use crate::{errno, errno::EResult};
use alloc::{boxed::Box, sync::Arc, vec, vec::Vec};
use bitflags::bitflags;
use core::sync::atomic::{AtomicUsize, Ordering};

/// The number of entries in a page table.
const TABLE_ENTRIES: usize = 1024;
/// The size of the range covered by one directory entry: 4 MiB.
const LARGE_PAGE_SIZE: usize = TABLE_ENTRIES * PAGE_SIZE;
/// The number of directory entries covering the userspace.
const USER_DIR_ENTRIES: usize = PROCESS_END.0 / LARGE_PAGE_SIZE;
/// The number of directory entries covering the kernelspace.
const KERNEL_DIR_ENTRIES: usize = 1024 - USER_DIR_ENTRIES;

bitflags! {
	/// Mapping attribute flags, shared by page table entries and virtual
	/// memory areas.
	#[derive(Clone, Copy, Debug, Eq, PartialEq)]
	pub struct VmFlags: u32 {
		/// The mapping is backed by a physical page.
		const PRESENT = 0b00001;
		/// The mapping is writable.
		const RW = 0b00010;
		/// The mapping is accessible from ring 3.
		const USER = 0b00100;
		/// The mapping is global, not flushed on context switch.
		const GLOBAL = 0b01000;
		/// The mapping is copy-on-write.
		const COW = 0b10000;
	}
}

/// A page table entry.
#[derive(Clone, Copy, Debug)]
pub struct Pte {
	/// The mapped physical page.
	pub page: Page,
	/// The mapping's attributes.
	pub flags: VmFlags,
}

/// A 4 KiB page table.
struct PageTable {
	entries: Box<[Option<Pte>; TABLE_ENTRIES]>,
}

impl PageTable {
	fn new() -> Self {
		Self {
			entries: Box::new([None; TABLE_ENTRIES]),
		}
	}
}

/// An entry of the user half of a page directory.
enum DirEntry {
	/// No table.
	Absent,
	/// A 4 KiB page table.
	Table(PageTable),
}

/// An entry of the kernel half of a page directory: either nothing or a
/// 4 MiB large page.
#[derive(Clone, Copy, Debug)]
enum KernelEntry {
	Absent,
	Large {
		phys: PhysAddr,
		flags: VmFlags,
	},
}

/// The kernel half of the page directory, shared by every address space.
pub struct KernelSpace {
	entries: Vec<KernelEntry>,
}

impl KernelSpace {
	/// Builds the kernel half: the DMA and low memory zones are direct-mapped
	/// with 4 MiB large pages.
	pub fn new(layout: &MemoryLayout) -> Arc<Self> {
		let mut entries = vec![KernelEntry::Absent; KERNEL_DIR_ENTRIES];
		let mapped = layout.lowmem_end.0 / LARGE_PAGE_SIZE;
		for (i, entry) in entries.iter_mut().take(mapped).enumerate() {
			*entry = KernelEntry::Large {
				phys: PhysAddr(i * LARGE_PAGE_SIZE),
				flags: VmFlags::PRESENT | VmFlags::RW | VmFlags::GLOBAL,
			};
		}
		Arc::new(Self {
			entries,
		})
	}

	/// Translates the given kernelspace address.
	fn translate(&self, virt: VirtAddr) -> Option<(PhysAddr, VmFlags)> {
		let off = virt.0 - PROCESS_END.0;
		match self.entries.get(off / LARGE_PAGE_SIZE)? {
			KernelEntry::Large {
				phys,
				flags,
			} => Some((*phys + off % LARGE_PAGE_SIZE, *flags)),
			KernelEntry::Absent => None,
		}
	}
}

/// Identifier generator for [`VMem`] instances.
static VMEM_ID: AtomicUsize = AtomicUsize::new(1);

// The bound context stands in for CR3, per-CPU state. The test harness
// models one CPU per thread.
#[cfg(test)]
std::thread_local! {
	/// The identifier of the currently bound virtual memory context.
	static BOUND_VMEM: core::cell::Cell<usize> = const { core::cell::Cell::new(0) };
}
/// The identifier of the currently bound virtual memory context.
#[cfg(not(test))]
static BOUND_VMEM: AtomicUsize = AtomicUsize::new(0);

/// A virtual memory context: the page directory of one address space.
pub struct VMem {
	/// A unique identifier, standing in for the directory's physical address.
	id: usize,
	/// The user half of the directory.
	user: Vec<DirEntry>,
	/// The kernel half, shared with every other address space.
	kernel: Arc<KernelSpace>,
}

impl VMem {
	/// Creates a context with an empty user half, sharing the kernel half of
	/// the given memory.
	pub fn new(mem: &Memory) -> Self {
		let mut user = Vec::with_capacity(USER_DIR_ENTRIES);
		user.resize_with(USER_DIR_ENTRIES, || DirEntry::Absent);
		Self {
			id: VMEM_ID.fetch_add(1, Ordering::Relaxed),
			user,
			kernel: mem.kernel_space().clone(),
		}
	}

	/// Tells whether this context shares its kernel half with `other`.
	pub fn shares_kernel_half(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.kernel, &other.kernel)
	}

	/// Maps the page `page` at the userspace address `virt`.
	///
	/// The previous mapping at this address, if any, is replaced.
	pub fn map_page(&mut self, virt: VirtAddr, page: Page, flags: VmFlags) -> EResult<()> {
		if !virt.is_aligned_to(PAGE_SIZE) || virt >= PROCESS_END {
			return Err(errno!(EINVAL));
		}
		let dir = virt.0 / LARGE_PAGE_SIZE;
		let table = virt.0 % LARGE_PAGE_SIZE / PAGE_SIZE;
		if matches!(self.user[dir], DirEntry::Absent) {
			self.user[dir] = DirEntry::Table(PageTable::new());
		}
		let DirEntry::Table(t) = &mut self.user[dir] else {
			unreachable!();
		};
		t.entries[table] = Some(Pte {
			page,
			flags,
		});
		Ok(())
	}

	/// Removes the mapping at the userspace address `virt`, returning it.
	pub fn unmap_page(&mut self, virt: VirtAddr) -> Option<Pte> {
		if !virt.is_aligned_to(PAGE_SIZE) || virt >= PROCESS_END {
			return None;
		}
		let dir = virt.0 / LARGE_PAGE_SIZE;
		let table = virt.0 % LARGE_PAGE_SIZE / PAGE_SIZE;
		match &mut self.user[dir] {
			DirEntry::Table(t) => t.entries[table].take(),
			DirEntry::Absent => None,
		}
	}

	/// Returns the page table entry for the userspace address `virt`.
	pub fn entry(&self, virt: VirtAddr) -> Option<Pte> {
		if virt >= PROCESS_END {
			return None;
		}
		let dir = virt.0 / LARGE_PAGE_SIZE;
		let table = virt.0 % LARGE_PAGE_SIZE / PAGE_SIZE;
		match &self.user[dir] {
			DirEntry::Table(t) => t.entries[table],
			DirEntry::Absent => None,
		}
	}

	/// Translates the given virtual address to a physical address and the
	/// mapping's attributes.
	pub fn translate(&self, virt: VirtAddr) -> Option<(PhysAddr, VmFlags)> {
		if virt >= PROCESS_END {
			return self.kernel.translate(virt);
		}
		let pte = self.entry(virt.down_align_to(PAGE_SIZE))?;
		if !pte.flags.contains(VmFlags::PRESENT) {
			return None;
		}
		Some((PhysAddr(pte.page.pfn() * PAGE_SIZE + virt.0 % PAGE_SIZE), pte.flags))
	}

	/// Binds the context, making it the one the CPU translates through.
	///
	/// This is the hook the scheduler uses when switching tasks.
	pub fn bind(&self) {
		#[cfg(test)]
		BOUND_VMEM.with(|b| b.set(self.id));
		#[cfg(not(test))]
		BOUND_VMEM.store(self.id, Ordering::Release);
	}

	/// Tells whether this context is the bound one.
	pub fn is_bound(&self) -> bool {
		#[cfg(test)]
		return BOUND_VMEM.with(|b| b.get()) == self.id;
		#[cfg(not(test))]
		{
			BOUND_VMEM.load(Ordering::Acquire) == self.id
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::memory::frame::{test::test_memory, Gfp};

	#[test]
	fn kernel_half_shared() {
		let mem = test_memory();
		let a = VMem::new(&mem);
		let b = VMem::new(&mem);
		assert!(a.shares_kernel_half(&b));
	}

	#[test]
	fn kernel_half_translates_lowmem() {
		let mem = test_memory();
		let vmem = VMem::new(&mem);
		let (phys, flags) = vmem.translate(VirtAddr(0xc0000000 + 0x123456)).unwrap();
		assert_eq!(phys, PhysAddr(0x123456));
		assert!(flags.contains(VmFlags::GLOBAL));
		// Past the end of low memory there is no permanent mapping
		assert!(vmem.translate(VirtAddr(0xc0000000 + 0x900000)).is_none());
	}

	#[test]
	fn user_map_unmap() {
		let mem = test_memory();
		let mut vmem = VMem::new(&mem);
		let page = mem.alloc_pages(Gfp::KERNEL, 0).unwrap();
		let virt = VirtAddr(0x40000000);
		vmem.map_page(virt, page, VmFlags::PRESENT | VmFlags::RW | VmFlags::USER)
			.unwrap();
		let (phys, _) = vmem.translate(virt + 0x10).unwrap();
		assert_eq!(phys, mem.phys_from_page(page) + 0x10);
		let pte = vmem.unmap_page(virt).unwrap();
		assert_eq!(pte.page, page);
		assert!(vmem.translate(virt).is_none());
		mem.free_pages(page).unwrap();
	}

	#[test]
	fn map_rejects_kernelspace() {
		let mem = test_memory();
		let mut vmem = VMem::new(&mem);
		let page = mem.alloc_pages(Gfp::KERNEL, 0).unwrap();
		assert!(vmem
			.map_page(VirtAddr(0xc0000000), page, VmFlags::PRESENT)
			.is_err());
		mem.free_pages(page).unwrap();
	}

	#[test]
	fn bind_tracks_current() {
		let mem = test_memory();
		let a = VMem::new(&mem);
		let b = VMem::new(&mem);
		a.bind();
		assert!(a.is_bound() && !b.is_bound());
		b.bind();
		assert!(b.is_bound() && !a.is_bound());
	}
}
