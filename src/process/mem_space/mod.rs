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

//! A memory space is the virtual memory handler of a process. It owns the
//! process's page directory and the set of its virtual memory areas.
//!
//! A memory space is created blank with a stack area at the top of the
//! userspace, cloned whole by `fork` (every present mapping is backed by a
//! freshly allocated page holding a copy of the original's contents), and
//! destroyed by releasing every area, then the directory.

pub mod mapping;

use crate::{
	errno,
	errno::EResult,
	memory::{
		frame::{Gfp, Memory},
		vmem::{VMem, VmFlags},
		VirtAddr, PAGE_SIZE, PROCESS_END,
	},
	sync::mutex::IntMutex,
};
use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::fmt;
use mapping::Vma;

/// The lowest userspace address available to mappings.
const USER_BEGIN: VirtAddr = VirtAddr(PAGE_SIZE);

/// The result of checking a range of virtual memory against the areas of a
/// memory space.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangeCheck {
	/// The range is inside the userspace and free.
	Valid,
	/// The range intersects an existing area.
	Occupied,
	/// The range is outside the userspace.
	OutOfRange,
}

/// Bounds of the standard regions of a process image.
#[derive(Clone, Copy, Debug, Default)]
pub struct Segments {
	/// The beginning of the program code.
	pub start_code: VirtAddr,
	/// The end of the program code.
	pub end_code: VirtAddr,
	/// The beginning of the program data.
	pub start_data: VirtAddr,
	/// The end of the program data.
	pub end_data: VirtAddr,
	/// The initial program break.
	pub start_brk: VirtAddr,
	/// The current program break.
	pub brk: VirtAddr,
	/// The beginning of the stack.
	pub start_stack: VirtAddr,
	/// The beginning of the program arguments.
	pub arg_start: VirtAddr,
	/// The end of the program arguments.
	pub arg_end: VirtAddr,
	/// The beginning of the program environment.
	pub env_start: VirtAddr,
	/// The end of the program environment.
	pub env_end: VirtAddr,
}

/// Inner state of the memory space.
struct MemSpaceState {
	/// The areas of the space, keyed by start address.
	vmas: BTreeMap<VirtAddr, Vma>,
	/// The start address of the most recently hit area.
	mru: Option<VirtAddr>,
	/// The number of areas in the space.
	map_count: usize,
	/// The space's page directory.
	vmem: VMem,
	/// Bounds of the standard regions.
	segments: Segments,
}

impl MemSpaceState {
	/// Returns the area containing the given address, if any, favoring the
	/// MRU cache.
	fn find(&mut self, addr: VirtAddr) -> Option<Vma> {
		// The MRU pointer is shared state, read under the space's lock
		if let Some(key) = self.mru {
			if let Some(vma) = self.vmas.get(&key) {
				if vma.contains(addr) {
					return Some(*vma);
				}
			}
		}
		let (key, vma) = self.vmas.range(..=addr).next_back()?;
		if !vma.contains(addr) {
			return None;
		}
		self.mru = Some(*key);
		Some(*vma)
	}

	/// Checks the range `[begin, end)` against the existing areas.
	fn check_range(&self, begin: VirtAddr, end: VirtAddr) -> RangeCheck {
		if begin < USER_BEGIN || end > PROCESS_END || begin >= end {
			return RangeCheck::OutOfRange;
		}
		let occupied = self
			.vmas
			.range(..end)
			.next_back()
			.is_some_and(|(_, vma)| vma.overlaps(begin, end));
		if occupied {
			RangeCheck::Occupied
		} else {
			RangeCheck::Valid
		}
	}
}

/// A virtual memory space.
pub struct MemSpace {
	/// The physical memory backing the space.
	mem: Arc<Memory>,
	/// The space's state.
	state: IntMutex<MemSpaceState>,
}

impl MemSpace {
	/// Creates a new, blank memory space with a stack area of `stack_size`
	/// bytes at the top of the userspace.
	///
	/// `stack_size` must be a non-zero multiple of the page size.
	pub fn new(mem: Arc<Memory>, stack_size: usize) -> EResult<Self> {
		if stack_size == 0 || stack_size % PAGE_SIZE != 0 {
			return Err(errno!(EINVAL));
		}
		let vmem = VMem::new(&mem);
		let s = Self {
			mem,
			state: IntMutex::new(MemSpaceState {
				vmas: BTreeMap::new(),
				mru: None,
				map_count: 0,
				vmem,
				segments: Segments::default(),
			}),
		};
		let stack_begin = PROCESS_END - stack_size;
		let gfp = s.mem.user_zone_hint();
		s.map(
			stack_begin,
			stack_size,
			VmFlags::PRESENT | VmFlags::RW | VmFlags::USER,
			gfp,
		)?;
		s.state.lock().segments.start_stack = stack_begin;
		Ok(s)
	}

	/// Returns the physical memory backing the space.
	pub fn memory(&self) -> &Arc<Memory> {
		&self.mem
	}

	/// Returns the number of areas in the space.
	pub fn map_count(&self) -> usize {
		self.state.lock().map_count
	}

	/// Returns the bounds of the standard regions.
	pub fn segments(&self) -> Segments {
		self.state.lock().segments
	}

	/// Creates an area covering `[begin, begin + size)`.
	///
	/// Arguments:
	/// - `begin` is the page-aligned start of the area
	/// - `size` is the size of the area in bytes, rounded up to whole pages
	/// - `flags` are the area's attributes; if `PRESENT`, physical pages are
	///   allocated and mapped immediately
	/// - `gfp` selects the zone backing pages are taken from
	///
	/// The function fails if the range conflicts with an existing area.
	pub fn map(&self, begin: VirtAddr, size: usize, flags: VmFlags, gfp: Gfp) -> EResult<VirtAddr> {
		if !begin.is_aligned_to(PAGE_SIZE) || size == 0 {
			return Err(errno!(EINVAL));
		}
		let pages = size.div_ceil(PAGE_SIZE);
		let end = begin + pages * PAGE_SIZE;
		let mut state = self.state.lock();
		match state.check_range(begin, end) {
			RangeCheck::Valid => {}
			_ => return Err(errno!(EINVAL)),
		}
		// Back the area with physical pages
		if flags.contains(VmFlags::PRESENT) {
			let mut allocated = Vec::new();
			for i in 0..pages {
				match self.mem.alloc_pages(gfp, 0) {
					Ok(page) => {
						allocated.push(page);
						let res = state.vmem.map_page(begin + i * PAGE_SIZE, page, flags);
						debug_assert!(res.is_ok());
					}
					Err(e) => {
						// Roll the partial allocation back
						for (i, page) in allocated.into_iter().enumerate() {
							state.vmem.unmap_page(begin + i * PAGE_SIZE);
							let _ = self.mem.free_pages(page);
						}
						return Err(e);
					}
				}
			}
		}
		state.vmas.insert(begin, Vma::new(begin, pages, flags));
		state.map_count += 1;
		Ok(begin)
	}

	/// Destroys the area starting at `begin`, returning its backing pages to
	/// the buddy allocator.
	pub fn unmap(&self, begin: VirtAddr) -> EResult<()> {
		let mut state = self.state.lock();
		let vma = state.vmas.remove(&begin).ok_or(errno!(EINVAL))?;
		for i in 0..vma.pages() {
			if let Some(pte) = state.vmem.unmap_page(begin + i * PAGE_SIZE) {
				let _ = self.mem.free_pages(pte.page);
			}
		}
		state.map_count -= 1;
		if state.mru == Some(begin) {
			state.mru = None;
		}
		Ok(())
	}

	/// Returns the area containing the given address, if any.
	///
	/// The lookup first checks a one-slot MRU cache, then walks the ordered
	/// area set, updating the cache on hit.
	pub fn find_region(&self, addr: VirtAddr) -> Option<Vma> {
		self.state.lock().find(addr)
	}

	/// Scans the gaps between areas in ascending order and returns the start
	/// of the first one of at least `size` bytes.
	pub fn search_free_area(&self, size: usize) -> EResult<VirtAddr> {
		if size == 0 {
			return Err(errno!(EINVAL));
		}
		let pages = size.div_ceil(PAGE_SIZE);
		let state = self.state.lock();
		let mut gap_begin = USER_BEGIN;
		for vma in state.vmas.values() {
			if vma.begin() > gap_begin
				&& vma.begin().0 - gap_begin.0 >= pages * PAGE_SIZE
			{
				return Ok(gap_begin);
			}
			if vma.end() > gap_begin {
				gap_begin = vma.end();
			}
		}
		if PROCESS_END > gap_begin && PROCESS_END.0 - gap_begin.0 >= pages * PAGE_SIZE {
			return Ok(gap_begin);
		}
		Err(errno!(ENOMEM))
	}

	/// Checks the range `[begin, end)` against the existing areas.
	pub fn is_range_valid(&self, begin: VirtAddr, end: VirtAddr) -> RangeCheck {
		self.state.lock().check_range(begin, end)
	}

	/// Translates a userspace address through the space's directory.
	pub fn translate(&self, addr: VirtAddr) -> Option<crate::memory::PhysAddr> {
		self.state
			.lock()
			.vmem
			.translate(addr)
			.map(|(phys, _)| phys)
	}

	/// Clones the memory space for process forking.
	///
	/// Every area is recreated in the clone; every present mapping is backed
	/// by a fresh physical page from the same zone, holding a copy of the
	/// original page's contents. Attributes and `map_count` are preserved.
	pub fn fork(&self) -> EResult<MemSpace> {
		let state = self.state.lock();
		let mut new_vmem = VMem::new(&self.mem);
		let mut new_vmas = BTreeMap::new();
		// Pages already copied, to roll back on failure
		let mut copied = Vec::new();
		for (begin, vma) in &state.vmas {
			for i in 0..vma.pages() {
				let virt = *begin + i * PAGE_SIZE;
				let Some(pte) = state.vmem.entry(virt) else {
					continue;
				};
				if !pte.flags.contains(VmFlags::PRESENT) {
					continue;
				}
				let gfp = self.mem.zone_hint_of_page(pte.page);
				let page = match self.mem.alloc_pages(gfp, 0) {
					Ok(page) => page,
					Err(e) => {
						for page in copied {
							let _ = self.mem.free_pages(page);
						}
						return Err(e);
					}
				};
				self.mem.copy_page(pte.page, page)?;
				copied.push(page);
				let res = new_vmem.map_page(virt, page, pte.flags);
				debug_assert!(res.is_ok());
			}
			new_vmas.insert(*begin, *vma);
		}
		Ok(Self {
			mem: self.mem.clone(),
			state: IntMutex::new(MemSpaceState {
				vmas: new_vmas,
				mru: None,
				map_count: state.map_count,
				vmem: new_vmem,
				segments: state.segments,
			}),
		})
	}

	/// Sets the initial program break.
	///
	/// `addr` must be page-aligned.
	pub fn set_brk_init(&self, addr: VirtAddr) {
		debug_assert!(addr.is_aligned_to(PAGE_SIZE));
		let mut state = self.state.lock();
		state.segments.start_brk = addr;
		state.segments.brk = addr;
	}

	/// Moves the program break to `addr`, growing or shrinking the heap
	/// area.
	///
	/// On failure, the function does nothing and returns the current break.
	pub fn brk(&self, addr: VirtAddr) -> VirtAddr {
		let (old, init) = {
			let state = self.state.lock();
			(state.segments.brk, state.segments.start_brk)
		};
		if addr >= old {
			if addr > PROCESS_END {
				return old;
			}
			// Allocate the new range
			let begin = old.align_to(PAGE_SIZE);
			let end = addr.align_to(PAGE_SIZE);
			if end > begin {
				let res = self.map(
					begin,
					end.0 - begin.0,
					VmFlags::PRESENT | VmFlags::RW | VmFlags::USER,
					self.mem.user_zone_hint(),
				);
				if res.is_err() {
					return old;
				}
			}
		} else {
			if addr < init {
				return old;
			}
			// Free the dropped range. The break may fall inside an area, in
			// which case only its upper part is released and the area is
			// trimmed to the pages below the break.
			let begin = addr.align_to(PAGE_SIZE);
			let end = old.align_to(PAGE_SIZE);
			let mut state = self.state.lock();
			let mut cur = begin;
			while cur < end {
				let Some(vma) = state.find(cur) else {
					cur = cur + PAGE_SIZE;
					continue;
				};
				let vma_begin = vma.begin();
				let vma_end = vma.end();
				// Release only the pages above the new break
				let mut page_addr = cur;
				while page_addr < vma_end {
					if let Some(pte) = state.vmem.unmap_page(page_addr) {
						let _ = self.mem.free_pages(pte.page);
					}
					page_addr = page_addr + PAGE_SIZE;
				}
				state.vmas.remove(&vma_begin);
				if state.mru == Some(vma_begin) {
					state.mru = None;
				}
				if vma_begin < cur {
					// The part below the break stays mapped
					let pages = (cur.0 - vma_begin.0) / PAGE_SIZE;
					state
						.vmas
						.insert(vma_begin, Vma::new(vma_begin, pages, vma.flags()));
				} else {
					state.map_count -= 1;
				}
				cur = vma_end;
			}
		}
		self.state.lock().segments.brk = addr;
		addr
	}

	/// Binds the space's page directory, making it the current translation
	/// context.
	///
	/// This is the hook the scheduler uses when installing the next task's
	/// address space.
	pub fn bind(&self) {
		self.state.lock().vmem.bind();
	}

	/// Copies `buf.len()` bytes from the space's memory at `addr` into
	/// `buf`.
	///
	/// Unmapped addresses yield `EFAULT`.
	pub fn copy_from_user(&self, addr: VirtAddr, buf: &mut [u8]) -> EResult<()> {
		let mut done = 0;
		while done < buf.len() {
			let cur = addr + done;
			let chunk = (PAGE_SIZE - cur.0 % PAGE_SIZE).min(buf.len() - done);
			let phys = self.translate(cur).ok_or(errno!(EFAULT))?;
			self.mem.read_phys(phys, &mut buf[done..done + chunk])?;
			done += chunk;
		}
		Ok(())
	}

	/// Copies `buf` into the space's memory at `addr`.
	///
	/// Unmapped addresses yield `EFAULT`.
	pub fn copy_to_user(&self, addr: VirtAddr, buf: &[u8]) -> EResult<()> {
		let mut done = 0;
		while done < buf.len() {
			let cur = addr + done;
			let chunk = (PAGE_SIZE - cur.0 % PAGE_SIZE).min(buf.len() - done);
			let phys = self.translate(cur).ok_or(errno!(EFAULT))?;
			self.mem.write_phys(phys, &buf[done..done + chunk])?;
			done += chunk;
		}
		Ok(())
	}

	/// Reads a NUL-terminated string from the space's memory at `addr`.
	///
	/// Strings longer than `PATH_MAX` yield `ENAMETOOLONG`.
	pub fn copy_string_from_user(&self, addr: VirtAddr) -> EResult<alloc::string::String> {
		let mut out = Vec::new();
		let mut cur = addr;
		loop {
			let chunk_len = PAGE_SIZE - cur.0 % PAGE_SIZE;
			let phys = self.translate(cur).ok_or(errno!(EFAULT))?;
			let mut buf = alloc::vec![0u8; chunk_len];
			self.mem.read_phys(phys, &mut buf)?;
			match buf.iter().position(|b| *b == 0) {
				Some(end) => {
					out.extend_from_slice(&buf[..end]);
					break;
				}
				None => out.extend_from_slice(&buf),
			}
			if out.len() > crate::limits::PATH_MAX {
				return Err(errno!(ENAMETOOLONG));
			}
			cur = cur + chunk_len;
		}
		alloc::string::String::from_utf8(out).map_err(|_| errno!(EINVAL))
	}
}

impl fmt::Debug for MemSpace {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("MemSpace")
			.field("map_count", &state.map_count)
			.field("vmas", &state.vmas)
			.finish()
	}
}

impl Drop for MemSpace {
	fn drop(&mut self) {
		let mut state = self.state.lock();
		let vmas = core::mem::take(&mut state.vmas);
		for (begin, vma) in vmas {
			for i in 0..vma.pages() {
				if let Some(pte) = state.vmem.unmap_page(begin + i * PAGE_SIZE) {
					let _ = self.mem.free_pages(pte.page);
				}
			}
		}
		state.map_count = 0;
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::memory::frame::test::test_memory;

	fn test_mem() -> Arc<Memory> {
		Arc::new(test_memory())
	}

	#[test]
	fn blank_space_has_stack() {
		let mem = test_mem();
		let space = MemSpace::new(mem.clone(), 2 * PAGE_SIZE).unwrap();
		assert_eq!(space.map_count(), 1);
		let vma = space.find_region(PROCESS_END - 1).unwrap();
		assert_eq!(vma.begin(), PROCESS_END - 2 * PAGE_SIZE);
		assert_eq!(vma.end(), PROCESS_END);
		assert!(vma.flags().contains(VmFlags::USER | VmFlags::RW));
		assert_eq!(space.segments().start_stack, PROCESS_END - 2 * PAGE_SIZE);
	}

	#[test]
	fn destroy_restores_free_space() {
		let mem = test_mem();
		let low_free = mem.zone_free_space(Gfp::KERNEL);
		let high_free = mem.zone_free_space(Gfp::HIGHUSER);
		let space = MemSpace::new(mem.clone(), 2 * PAGE_SIZE).unwrap();
		space
			.map(
				VirtAddr(0x40000000),
				4 * PAGE_SIZE,
				VmFlags::PRESENT | VmFlags::RW | VmFlags::USER,
				Gfp::KERNEL,
			)
			.unwrap();
		drop(space);
		assert_eq!(mem.zone_free_space(Gfp::KERNEL), low_free);
		assert_eq!(mem.zone_free_space(Gfp::HIGHUSER), high_free);
	}

	#[test]
	fn map_rejects_overlap() {
		let mem = test_mem();
		let space = MemSpace::new(mem, 2 * PAGE_SIZE).unwrap();
		let begin = VirtAddr(0x40000000);
		space
			.map(begin, 2 * PAGE_SIZE, VmFlags::USER, Gfp::KERNEL)
			.unwrap();
		// Conflicts are refused, including partial ones
		assert!(space
			.map(begin, PAGE_SIZE, VmFlags::USER, Gfp::KERNEL)
			.is_err());
		assert!(space
			.map(begin + PAGE_SIZE, 2 * PAGE_SIZE, VmFlags::USER, Gfp::KERNEL)
			.is_err());
		assert_eq!(space.map_count(), 2);
	}

	#[test]
	fn vmas_sorted_and_disjoint() {
		let mem = test_mem();
		let space = MemSpace::new(mem, 2 * PAGE_SIZE).unwrap();
		for i in [3usize, 1, 5, 7] {
			space
				.map(
					VirtAddr(0x40000000 + i * 0x10000),
					PAGE_SIZE,
					VmFlags::USER,
					Gfp::KERNEL,
				)
				.unwrap();
		}
		let state = space.state.lock();
		let mut prev_end = VirtAddr(0);
		for vma in state.vmas.values() {
			assert!(vma.begin() >= prev_end);
			prev_end = vma.end();
		}
	}

	#[test]
	fn find_region_uses_mru() {
		let mem = test_mem();
		let space = MemSpace::new(mem, 2 * PAGE_SIZE).unwrap();
		let begin = VirtAddr(0x40000000);
		space
			.map(begin, 2 * PAGE_SIZE, VmFlags::USER, Gfp::KERNEL)
			.unwrap();
		assert!(space.find_region(begin + 0x100).is_some());
		assert_eq!(space.state.lock().mru, Some(begin));
		// A hit through the cache keeps it
		assert!(space.find_region(begin + PAGE_SIZE).is_some());
		assert_eq!(space.state.lock().mru, Some(begin));
		assert!(space.find_region(VirtAddr(0x50000000)).is_none());
	}

	#[test]
	fn search_free_area_first_fit() {
		let mem = test_mem();
		let space = MemSpace::new(mem, 2 * PAGE_SIZE).unwrap();
		// The lowest gap starts right after the null page
		assert_eq!(space.search_free_area(PAGE_SIZE).unwrap(), USER_BEGIN);
		space
			.map(USER_BEGIN, 2 * PAGE_SIZE, VmFlags::USER, Gfp::KERNEL)
			.unwrap();
		assert_eq!(
			space.search_free_area(PAGE_SIZE).unwrap(),
			USER_BEGIN + 2 * PAGE_SIZE
		);
		// An exhausted request fails
		assert!(space.search_free_area(usize::MAX / 2).is_err());
	}

	#[test]
	fn range_checks() {
		let mem = test_mem();
		let space = MemSpace::new(mem, 2 * PAGE_SIZE).unwrap();
		let begin = VirtAddr(0x40000000);
		space
			.map(begin, PAGE_SIZE, VmFlags::USER, Gfp::KERNEL)
			.unwrap();
		assert_eq!(
			space.is_range_valid(begin + PAGE_SIZE, begin + 2 * PAGE_SIZE),
			RangeCheck::Valid
		);
		assert_eq!(
			space.is_range_valid(begin, begin + PAGE_SIZE),
			RangeCheck::Occupied
		);
		assert_eq!(
			space.is_range_valid(VirtAddr(0), VirtAddr(PAGE_SIZE)),
			RangeCheck::OutOfRange
		);
		assert_eq!(
			space.is_range_valid(PROCESS_END, PROCESS_END + PAGE_SIZE),
			RangeCheck::OutOfRange
		);
	}

	#[test]
	fn fork_copies_contents_to_distinct_pages() {
		let mem = test_mem();
		let space = MemSpace::new(mem.clone(), 2 * PAGE_SIZE).unwrap();
		let stack_page = PROCESS_END - 2 * PAGE_SIZE;
		// Stamp the parent's stack through the physical arena
		let phys = space.translate(stack_page).unwrap();
		mem.write_phys(phys, &[0x5a; 64]).unwrap();
		let clone = space.fork().unwrap();
		assert_eq!(clone.map_count(), space.map_count());
		let clone_phys = clone.translate(stack_page).unwrap();
		assert_ne!(clone_phys, phys);
		let mut buf = [0u8; 64];
		mem.read_phys(clone_phys, &mut buf).unwrap();
		assert_eq!(buf, [0x5a; 64]);
		// The clone's areas carry the same attributes
		let vma = clone.find_region(stack_page).unwrap();
		assert!(vma.flags().contains(VmFlags::USER | VmFlags::RW));
	}

	#[test]
	fn fork_shares_kernel_half() {
		let mem = test_mem();
		let space = MemSpace::new(mem, 2 * PAGE_SIZE).unwrap();
		let clone = space.fork().unwrap();
		let a = space.state.lock();
		let b = clone.state.lock();
		assert!(a.vmem.shares_kernel_half(&b.vmem));
	}

	#[test]
	fn brk_grows_and_shrinks() {
		let mem = test_mem();
		let space = MemSpace::new(mem.clone(), 2 * PAGE_SIZE).unwrap();
		let free = mem.zone_free_space(Gfp::HIGHUSER);
		let init = VirtAddr(0x50000000);
		space.set_brk_init(init);
		let new = space.brk(init + 3 * PAGE_SIZE);
		assert_eq!(new, init + 3 * PAGE_SIZE);
		assert!(space.find_region(init).is_some());
		let back = space.brk(init);
		assert_eq!(back, init);
		assert!(space.find_region(init).is_none());
		assert_eq!(mem.zone_free_space(Gfp::HIGHUSER), free);
		// Shrinking below the initial break is refused
		assert_eq!(space.brk(init - PAGE_SIZE), init);
	}

	#[test]
	fn brk_shrink_inside_area_keeps_lower_heap() {
		let mem = test_mem();
		let space = MemSpace::new(mem.clone(), 2 * PAGE_SIZE).unwrap();
		let free = mem.zone_free_space(Gfp::HIGHUSER);
		let init = VirtAddr(0x50000000);
		space.set_brk_init(init);
		space.brk(init + 3 * PAGE_SIZE);
		let map_count = space.map_count();
		// Stamp the bottom heap page
		let phys = space.translate(init).unwrap();
		mem.write_phys(phys, &[0x7e; 32]).unwrap();
		// Shrink to a point strictly inside the single heap area
		assert_eq!(space.brk(init + PAGE_SIZE), init + PAGE_SIZE);
		// The area is trimmed, not destroyed: the part below the break stays
		// mapped with its contents
		let vma = space.find_region(init).unwrap();
		assert_eq!(vma.begin(), init);
		assert_eq!(vma.end(), init + PAGE_SIZE);
		assert!(space.find_region(init + PAGE_SIZE).is_none());
		assert_eq!(space.map_count(), map_count);
		let mut buf = [0u8; 32];
		mem.read_phys(space.translate(init).unwrap(), &mut buf)
			.unwrap();
		assert_eq!(buf, [0x7e; 32]);
		// Only the pages above the break were returned
		assert_eq!(
			mem.zone_free_space(Gfp::HIGHUSER),
			free - PAGE_SIZE
		);
		// Dropping the rest restores the zone
		assert_eq!(space.brk(init), init);
		assert_eq!(mem.zone_free_space(Gfp::HIGHUSER), free);
	}
}
