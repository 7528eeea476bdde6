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

//! The buddy allocator allows to allocate blocks of `2^^n` pages of memory.
//!
//! This allocator works by dividing blocks of memory in two recursively until
//! a block of the required size is available.
//!
//! The order of a block is the `n` in the expression `pow(2, n)` that
//! represents the size of the block in pages.
//!
//! Each zone runs its own instance of the allocator over its frame array.
//! Free lists are LIFO and coalescing is eager: freeing a block merges it
//! with its buddy as many times as possible before linking the result back.

use super::{
	frame::{FrameId, FrameOrder, FrameOwner, FrameState, Gfp, Memory, Page, ZoneInner},
	VirtAddr, PAGE_SIZE,
};
use crate::{errno, errno::EResult};
use alloc::string::String;
use core::{cmp::min, fmt::Write};

/// The maximum order of a buddy allocated block.
pub const MAX_ORDER: FrameOrder = 10;

/// The size in bytes of a block with the given order `order`.
#[inline]
pub fn frame_size(order: FrameOrder) -> usize {
	PAGE_SIZE << order
}

/// Returns the buddy order required to fit the given number of pages.
#[inline]
pub fn order_for_pages(pages: usize) -> FrameOrder {
	if pages <= 1 {
		0
	} else {
		(usize::BITS - (pages - 1).leading_zeros()) as FrameOrder
	}
}

/// Returns the smallest order such that a block of that order, starting at an
/// address congruent to `base` modulo the block size, can cover `bytes`
/// bytes.
pub fn nearest_order(base: VirtAddr, bytes: usize) -> FrameOrder {
	let pages = (base.0 % PAGE_SIZE + bytes).div_ceil(PAGE_SIZE);
	order_for_pages(pages)
}

impl ZoneInner {
	/// Fills the free list during initialization according to the number of
	/// available pages.
	pub(super) fn fill_free_list(&mut self, pages_count: usize) {
		let mut frame: usize = 0;
		let mut order = MAX_ORDER;
		while frame < pages_count {
			let p = 1usize << order;
			// Check the order fits in remaining pages
			if frame + p > pages_count {
				order -= 1;
				continue;
			}
			// Init frame
			let id = frame as FrameId;
			self.frames[frame].state = FrameState::Free {
				order,
				prev: id,
				next: id,
			};
			self.link(id);
			// Jump to next offset
			frame += p;
		}
	}

	/// Returns the links of the free frame `id`.
	fn free_links(&self, id: FrameId) -> (FrameId, FrameId) {
		match self.frames[id as usize].state {
			FrameState::Free {
				prev,
				next,
				..
			} => (prev, next),
			_ => unreachable!("frame is not free"),
		}
	}

	/// Sets the links of the free frame `id`.
	fn set_free_links(&mut self, id: FrameId, new_prev: FrameId, new_next: FrameId) {
		match &mut self.frames[id as usize].state {
			FrameState::Free {
				prev,
				next,
				..
			} => {
				*prev = new_prev;
				*next = new_next;
			}
			_ => unreachable!("frame is not free"),
		}
	}

	/// Sets the order of the free frame `id`.
	fn set_free_order(&mut self, id: FrameId, new_order: FrameOrder) {
		match &mut self.frames[id as usize].state {
			FrameState::Free {
				order, ..
			} => *order = new_order,
			_ => unreachable!("frame is not free"),
		}
	}

	/// Returns an available frame with an order of at least `order`, if any.
	fn get_available_frame(&self, order: FrameOrder) -> Option<FrameId> {
		self.free_list[(order as usize)..]
			.iter()
			.find_map(|head| *head)
	}

	/// Links the free frame `id` into the free list matching its order.
	fn link(&mut self, id: FrameId) {
		let frame = &self.frames[id as usize];
		debug_assert!(!frame.is_used());
		let order = frame.order();
		let next = match self.free_list[order as usize] {
			Some(head) => {
				let (_, head_next) = self.free_links(head);
				self.set_free_links(head, id, head_next);
				head
			}
			None => id,
		};
		self.set_free_links(id, id, next);
		self.free_list[order as usize] = Some(id);
	}

	/// Unlinks the free frame `id` from its free list.
	fn unlink(&mut self, id: FrameId) {
		debug_assert!(!self.frames[id as usize].is_used());
		let order = self.frames[id as usize].order();
		let (prev, next) = self.free_links(id);
		let has_prev = prev != id;
		let has_next = next != id;
		if self.free_list[order as usize] == Some(id) {
			self.free_list[order as usize] = has_next.then_some(next);
		}
		if has_prev {
			let (pp, _) = self.free_links(prev);
			self.set_free_links(prev, pp, if has_next { next } else { prev });
		}
		if has_next {
			let (_, nn) = self.free_links(next);
			self.set_free_links(next, if has_prev { prev } else { next }, nn);
		}
	}

	/// Unlinks the frame `id`, then splits it until it reaches the required
	/// order `order`, linking the upper halves back into the free lists.
	///
	/// At the end of the function, the frame is **not** linked to the free
	/// list.
	fn split(&mut self, id: FrameId, order: FrameOrder) {
		debug_assert!(!self.frames[id as usize].is_used());
		debug_assert!(order <= MAX_ORDER);
		debug_assert!(self.frames[id as usize].order() >= order);
		self.unlink(id);
		let pages_count = self.frames.len() as FrameId;
		while self.frames[id as usize].order() > order {
			let new_order = self.frames[id as usize].order() - 1;
			self.set_free_order(id, new_order);
			// The upper half becomes the head of a new free block
			let buddy = id ^ (1 << new_order);
			if buddy >= pages_count {
				break;
			}
			self.frames[buddy as usize].state = FrameState::Free {
				order: new_order,
				prev: buddy,
				next: buddy,
			};
			self.link(buddy);
		}
	}

	/// Coalesces the free frame `id` with its buddy recursively until no
	/// buddy is available anymore, then links the result into the free list.
	fn coalesce(&mut self, mut id: FrameId) {
		debug_assert!(!self.frames[id as usize].is_used());
		let pages_count = self.frames.len() as FrameId;
		loop {
			let order = self.frames[id as usize].order();
			if order >= MAX_ORDER {
				break;
			}
			let buddy = id ^ (1 << order);
			if buddy >= pages_count {
				break;
			}
			// The merged block must fit in the zone
			let merged_pages = 1u32 << (order + 1);
			if min(id, buddy) + merged_pages > pages_count {
				break;
			}
			// Check whether coalescing is possible
			let mergeable = matches!(
				self.frames[buddy as usize].state,
				FrameState::Free {
					order: buddy_order,
					..
				} if buddy_order == order
			);
			if !mergeable {
				break;
			}
			self.unlink(buddy);
			// The lower half heads the merged block; the other frame keeps
			// stale metadata that is never consulted again
			let head = min(id, buddy);
			self.set_free_order(head, order + 1);
			id = head;
		}
		self.link(id);
	}

	/// Counts free blocks of the given order.
	fn count_free_blocks(&self, order: FrameOrder) -> usize {
		let mut count = 0;
		let Some(head) = self.free_list[order as usize] else {
			return 0;
		};
		let mut id = head;
		loop {
			count += 1;
			let (_, next) = self.free_links(id);
			if next == id {
				break;
			}
			id = next;
		}
		count
	}
}

impl Memory {
	/// Allocates a block of memory using the buddy allocator.
	///
	/// Arguments:
	/// - `gfp` selects the zone to allocate from
	/// - `order` is the order of the block to be allocated
	///
	/// On success, the function returns the head [`Page`] of the block of
	/// `2^order` contiguous frames.
	pub fn alloc_pages(&self, gfp: Gfp, order: FrameOrder) -> EResult<Page> {
		if order > MAX_ORDER {
			return Err(errno!(EINVAL));
		}
		let zone = self.zone_by_hint(gfp);
		let mut inner = zone.inner.lock();
		let id = inner.get_available_frame(order).ok_or(errno!(ENOMEM))?;
		inner.split(id, order);
		inner.frames[id as usize].state = FrameState::Used {
			order,
			refs: 1,
			owner: FrameOwner::Anon,
		};
		let pages_count = 1usize << order;
		inner.allocated_pages += pages_count;
		drop(inner);
		self.stats.lock().mem_free -= pages_count * (PAGE_SIZE / 1024);
		let page = Page(zone.base_pfn() + id as usize);
		debug_assert!(self.phys_from_page(page).is_aligned_to(PAGE_SIZE));
		Ok(page)
	}

	/// Frees a block that was allocated using the buddy allocator.
	///
	/// `page` must be the head page returned by a prior call to
	/// [`alloc_pages`](Self::alloc_pages); the block's order is recovered
	/// from the frame's metadata.
	///
	/// If the frame holds several references, the function only drops one.
	///
	/// Freeing a free frame, or a frame that is not the head of a block,
	/// returns an error and leaves the free lists untouched.
	pub fn free_pages(&self, page: Page) -> EResult<()> {
		let (zone, id) = self.zone_of_pfn(page.0).ok_or(errno!(EINVAL))?;
		let mut inner = zone.inner.lock();
		match inner.frames[id as usize].state {
			FrameState::Used {
				order,
				refs,
				owner,
			} => {
				// `refs == 0` marks a non-head frame of a block
				if refs == 0 {
					return Err(errno!(EINVAL));
				}
				if refs > 1 {
					inner.frames[id as usize].state = FrameState::Used {
						order,
						refs: refs - 1,
						owner,
					};
					return Ok(());
				}
				let pages_count = 1usize << order;
				inner.frames[id as usize].state = FrameState::Free {
					order,
					prev: id,
					next: id,
				};
				inner.coalesce(id);
				inner.allocated_pages -= pages_count;
				drop(inner);
				self.stats.lock().mem_free += pages_count * (PAGE_SIZE / 1024);
				Ok(())
			}
			FrameState::Free {
				..
			} => Err(errno!(EINVAL)),
		}
	}

	/// Calls [`alloc_pages`](Self::alloc_pages) and returns the virtual
	/// address of the block in the kernel direct mapping.
	///
	/// High memory hints are rejected since their frames have no direct
	/// mapping.
	pub fn alloc_pages_lowmem(&self, gfp: Gfp, order: FrameOrder) -> EResult<VirtAddr> {
		if gfp.contains(Gfp::HIGHUSER) {
			return Err(errno!(EINVAL));
		}
		let page = self.alloc_pages(gfp, order)?;
		self.virt_from_page(page).ok_or(errno!(EINVAL))
	}

	/// Frees a block by the virtual address returned by
	/// [`alloc_pages_lowmem`](Self::alloc_pages_lowmem).
	pub fn free_pages_lowmem(&self, virt: VirtAddr) -> EResult<()> {
		let page = self.page_from_virt(virt).ok_or(errno!(EINVAL))?;
		self.free_pages(page)
	}

	/// Returns the total size in bytes of the zone selected by `gfp`.
	pub fn zone_total_space(&self, gfp: Gfp) -> usize {
		self.zone_by_hint(gfp).pages_count * PAGE_SIZE
	}

	/// Returns the free space in bytes of the zone selected by `gfp`.
	pub fn zone_free_space(&self, gfp: Gfp) -> usize {
		let zone = self.zone_by_hint(gfp);
		let inner = zone.inner.lock();
		(zone.pages_count - inner.allocated_pages) * PAGE_SIZE
	}

	/// Returns the number of bytes held by slab caches in free object slots
	/// backed by the zone selected by `gfp`.
	pub fn zone_cached_space(&self, gfp: Gfp) -> usize {
		self.zone_by_hint(gfp).inner.lock().cached_bytes
	}

	/// Returns a human-readable histogram of the free blocks of the zone
	/// selected by `gfp`, one line per order.
	pub fn zone_buddy_status(&self, gfp: Gfp) -> String {
		let zone = self.zone_by_hint(gfp);
		let inner = zone.inner.lock();
		let mut out = String::new();
		let _ = writeln!(
			out,
			"zone {:?} [{:?}; {:?}]",
			zone.kind,
			zone.begin,
			zone.begin + zone.pages_count * PAGE_SIZE
		);
		match zone.virt_begin() {
			Some(virt) => {
				let _ = writeln!(out, "  mapped at {virt:?}");
			}
			None => {
				let _ = writeln!(out, "  not kernel-mapped");
			}
		}
		for order in 0..=MAX_ORDER {
			let _ = writeln!(
				out,
				"  order {order:2}: {} free blocks",
				inner.count_free_blocks(order)
			);
		}
		out
	}

	/// Returns the total number of pages allocated by the buddy allocator.
	pub fn allocated_pages_count(&self) -> usize {
		self.zones
			.iter()
			.map(|z| z.inner.lock().allocated_pages)
			.sum()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::memory::frame::test::test_memory;

	#[test]
	fn buddy0() {
		let mem = test_memory();
		let free = mem.zone_free_space(Gfp::KERNEL);
		let page = mem.alloc_pages(Gfp::KERNEL, 0).unwrap();
		assert_eq!(mem.page_refcount(page), Some(1));
		assert_eq!(mem.zone_free_space(Gfp::KERNEL), free - PAGE_SIZE);
		mem.free_pages(page).unwrap();
		assert_eq!(mem.page_refcount(page), Some(-1));
		assert_eq!(mem.zone_free_space(Gfp::KERNEL), free);
	}

	#[test]
	fn buddy_orders_reverse() {
		let mem = test_memory();
		let free = mem.zone_free_space(Gfp::KERNEL);
		let pages: alloc::vec::Vec<_> = (0..4)
			.map(|order| mem.alloc_pages(Gfp::KERNEL, order).unwrap())
			.collect();
		for page in pages.into_iter().rev() {
			mem.free_pages(page).unwrap();
		}
		assert_eq!(mem.zone_free_space(Gfp::KERNEL), free);
	}

	#[test]
	fn buddy_even_odd_free_pattern() {
		let mem = test_memory();
		let free = mem.zone_free_space(Gfp::KERNEL);
		let pages: alloc::vec::Vec<_> = (0..8)
			.map(|_| mem.alloc_pages(Gfp::KERNEL, 0).unwrap())
			.collect();
		for i in [0, 2, 4, 6, 1, 3, 5, 7] {
			mem.free_pages(pages[i]).unwrap();
		}
		assert_eq!(mem.zone_free_space(Gfp::KERNEL), free);
		// Complete coalescing: a maximum-order block is available again
		assert!(mem.alloc_pages(Gfp::KERNEL, MAX_ORDER).is_ok());
	}

	#[test]
	fn buddy_lifo_reuse() {
		let mem = test_memory();
		let first = mem.alloc_pages(Gfp::KERNEL, 0).unwrap();
		mem.free_pages(first).unwrap();
		for _ in 0..100 {
			let page = mem.alloc_pages(Gfp::KERNEL, 0).unwrap();
			assert_eq!(page, first);
			mem.free_pages(page).unwrap();
		}
	}

	#[test]
	fn buddy_zone_selection() {
		let mem = test_memory();
		let dma = mem.alloc_pages(Gfp::DMA, 0).unwrap();
		let low = mem.alloc_pages(Gfp::KERNEL, 0).unwrap();
		let high = mem.alloc_pages(Gfp::HIGHUSER, 0).unwrap();
		assert!(mem.is_dma_page(dma));
		assert!(mem.is_lowmem_page(low));
		assert!(mem.is_highmem_page(high));
		mem.free_pages(dma).unwrap();
		mem.free_pages(low).unwrap();
		mem.free_pages(high).unwrap();
	}

	#[test]
	fn buddy_invalid_order() {
		let mem = test_memory();
		assert!(mem.alloc_pages(Gfp::KERNEL, MAX_ORDER + 1).is_err());
	}

	#[test]
	fn buddy_oom() {
		let mem = test_memory();
		let mut pages = alloc::vec::Vec::new();
		while let Ok(page) = mem.alloc_pages(Gfp::HIGHUSER, 0) {
			pages.push(page);
		}
		// 2 MiB of high memory
		assert_eq!(pages.len(), 512);
		assert_eq!(mem.zone_free_space(Gfp::HIGHUSER), 0);
		for page in pages {
			mem.free_pages(page).unwrap();
		}
		assert_eq!(mem.zone_free_space(Gfp::HIGHUSER), 0x200000);
	}

	#[test]
	fn buddy_double_free() {
		let mem = test_memory();
		let page = mem.alloc_pages(Gfp::KERNEL, 0).unwrap();
		mem.free_pages(page).unwrap();
		assert!(mem.free_pages(page).is_err());
	}

	#[test]
	fn buddy_non_head_free() {
		let mem = test_memory();
		let head = mem.alloc_pages(Gfp::KERNEL, 2).unwrap();
		let interior = Page(head.pfn() + 1);
		assert!(mem.free_pages(interior).is_err());
		mem.free_pages(head).unwrap();
	}

	#[test]
	fn buddy_lowmem_helpers() {
		let mem = test_memory();
		let free = mem.zone_free_space(Gfp::KERNEL);
		let virt = mem.alloc_pages_lowmem(Gfp::KERNEL, 1).unwrap();
		assert!(virt.is_kernelspace());
		mem.write_virt(virt, &[0xab; 16]).unwrap();
		mem.free_pages_lowmem(virt).unwrap();
		assert_eq!(mem.zone_free_space(Gfp::KERNEL), free);
		assert!(mem.alloc_pages_lowmem(Gfp::HIGHUSER, 0).is_err());
	}

	#[test]
	fn buddy_status_histogram() {
		let mem = test_memory();
		let status = mem.zone_buddy_status(Gfp::KERNEL);
		assert!(status.contains("order  0"));
		assert!(status.contains("order 10: 1 free blocks"));
		assert!(status.contains("mapped at"));
		assert!(mem
			.zone_buddy_status(Gfp::HIGHUSER)
			.contains("not kernel-mapped"));
	}

	#[test]
	fn nearest_order_covers() {
		assert_eq!(nearest_order(VirtAddr(0), 1), 0);
		assert_eq!(nearest_order(VirtAddr(0), PAGE_SIZE), 0);
		assert_eq!(nearest_order(VirtAddr(0), PAGE_SIZE + 1), 1);
		// A misaligned base needs an extra page
		assert_eq!(nearest_order(VirtAddr(0x800), PAGE_SIZE * 2), 2);
		assert_eq!(nearest_order(VirtAddr(0), PAGE_SIZE * 5), 3);
	}
}
