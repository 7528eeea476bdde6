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

//! The slab allocator provides typed object caches and the general-purpose
//! small-allocation interface (`kmalloc`/`kfree`) over the buddy allocator.
//!
//! A cache carves blocks of `2^slab_order` pages obtained from the buddy into
//! equally sized slots. Slabs are kept on three lists (free, partial, full)
//! depending on how many of their slots are handed out. An object's address
//! resolves back to its owning slab through the frame metadata of the page
//! containing it.
//!
//! `kmalloc` dispatches to a set of internal caches: powers of two plus a few
//! odd sizes to reduce waste. Requests exceeding the largest internal cache
//! fall through to direct buddy allocation.

use super::{
	buddy::{frame_size, nearest_order, MAX_ORDER},
	frame::{FrameOrder, FrameOwner, FrameState, Gfp, Memory, Page},
	VirtAddr, PAGE_SIZE,
};
use crate::{
	errno,
	errno::EResult,
	sync::mutex::IntMutex,
};
use alloc::{string::String, sync::Arc, vec::Vec};

/// An object constructor or destructor, invoked on the object's bytes on
/// lifecycle edges.
///
/// Implementations must not allocate from the cache the object belongs to.
pub type ObjectCallback = fn(&mut [u8]);

/// The sizes of the internal caches backing `kmalloc`, in ascending order.
///
/// Power-of-two sizes are aligned to their own size; the odd intermediates
/// keep the default alignment.
const KMALLOC_SIZES: &[usize] = &[
	8, 16, 24, 32, 40, 48, 64, 72, 96, 128, 192, 256, 384, 512, 768, 1024, 2048, 4096, 8192,
	16384, 32768, 65536, 131072,
];

/// The default object alignment.
const DEFAULT_ALIGN: usize = 8;
/// The maximum order of a slab's backing block.
const SLAB_MAX_ORDER: FrameOrder = 5;
/// The number of objects a slab tries to hold at least.
const SLAB_MIN_OBJECTS: usize = 8;

/// A handle to a slab cache.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheId(usize);

/// One block of pages carved into object slots.
struct Slab {
	/// The head page of the backing block.
	page: Page,
	/// The virtual address of the beginning of the block.
	virt: VirtAddr,
	/// LIFO stack of free slot indices.
	free_slots: Vec<u16>,
	/// Which slots are currently handed out.
	allocated: Vec<bool>,
	/// The number of slots handed out.
	inuse: usize,
}

/// Membership of a slab in its cache's lists.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SlabList {
	Free,
	Partial,
	Full,
}

/// A typed object cache.
pub struct Cache {
	/// The name of the cache.
	name: String,
	/// The size of one object in bytes.
	object_size: usize,
	/// The size of one slot, objects rounded up to the alignment.
	slot_size: usize,
	/// The allocation hint used when growing the cache.
	gfp: Gfp,
	/// The order of a slab's backing block.
	slab_order: FrameOrder,
	/// The number of slots per slab.
	slots_per_slab: usize,
	/// Constructor, invoked on each transition to the constructed state.
	ctor: Option<ObjectCallback>,
	/// Destructor, invoked on each transition out of the constructed state.
	dtor: Option<ObjectCallback>,

	/// The slabs of the cache. Released entries are tombstoned.
	slabs: Vec<Option<Slab>>,
	/// Slabs with no slot handed out.
	free: Vec<usize>,
	/// Slabs with some slots handed out.
	partial: Vec<usize>,
	/// Slabs with every slot handed out.
	full: Vec<usize>,

	/// The total number of slots in the cache.
	total_num: usize,
	/// The number of free slots in the cache.
	free_num: usize,
}

impl Cache {
	/// Removes slab `id` from the list `list`.
	fn list_remove(&mut self, list: SlabList, id: usize) {
		let list = match list {
			SlabList::Free => &mut self.free,
			SlabList::Partial => &mut self.partial,
			SlabList::Full => &mut self.full,
		};
		if let Some(pos) = list.iter().position(|i| *i == id) {
			list.swap_remove(pos);
		}
	}

	/// Inserts slab `id` into the list `list`.
	fn list_insert(&mut self, list: SlabList, id: usize) {
		match list {
			SlabList::Free => self.free.push(id),
			SlabList::Partial => self.partial.push(id),
			SlabList::Full => self.full.push(id),
		}
	}

	/// Returns the list a slab with `inuse` slots handed out belongs to.
	fn list_for(&self, inuse: usize) -> SlabList {
		if inuse == 0 {
			SlabList::Free
		} else if inuse == self.slots_per_slab {
			SlabList::Full
		} else {
			SlabList::Partial
		}
	}
}

/// The registry of every cache served by a [`Memory`].
pub(super) struct SlabRegistry {
	/// The caches. Destroyed entries are tombstoned.
	caches: Vec<Option<Arc<IntMutex<Cache>>>>,
	/// The `kmalloc` buckets: `(size, cache)` in ascending size order.
	kmalloc_buckets: Vec<(usize, CacheId)>,
}

impl SlabRegistry {
	/// Creates the registry along with the `kmalloc` internal caches.
	pub(super) fn new() -> Self {
		let mut registry = Self {
			caches: Vec::new(),
			kmalloc_buckets: Vec::new(),
		};
		for size in KMALLOC_SIZES {
			let align = if size.is_power_of_two() {
				*size
			} else {
				DEFAULT_ALIGN
			};
			let mut name = String::from("kmalloc-");
			let _ = core::fmt::write(&mut name, format_args!("{size}"));
			let id = registry.insert(Cache::new(name, *size, align, Gfp::KERNEL, None, None));
			registry.kmalloc_buckets.push((*size, id));
		}
		registry
	}

	/// Inserts a cache and returns its handle.
	fn insert(&mut self, cache: Cache) -> CacheId {
		let id = self.caches.len();
		self.caches.push(Some(Arc::new(IntMutex::new(cache))));
		CacheId(id)
	}

	/// Returns the cache with the given handle.
	fn get(&self, id: CacheId) -> Option<Arc<IntMutex<Cache>>> {
		self.caches.get(id.0).and_then(Clone::clone)
	}

	/// Returns the smallest `kmalloc` bucket fitting `size`.
	fn bucket_for(&self, size: usize) -> Option<CacheId> {
		self.kmalloc_buckets
			.iter()
			.find(|(s, _)| *s >= size)
			.map(|(_, id)| *id)
	}
}

impl Cache {
	/// Creates a cache descriptor.
	fn new(
		name: String,
		object_size: usize,
		align: usize,
		gfp: Gfp,
		ctor: Option<ObjectCallback>,
		dtor: Option<ObjectCallback>,
	) -> Self {
		let align = align.max(DEFAULT_ALIGN).next_power_of_two();
		let slot_size = object_size.next_multiple_of(align);
		// Size slabs to hold several objects, within bounds
		let mut slab_order = 0;
		while slab_order < SLAB_MAX_ORDER
			&& frame_size(slab_order) / slot_size < SLAB_MIN_OBJECTS
		{
			slab_order += 1;
		}
		// Very large objects get one slot per slab
		while frame_size(slab_order) < slot_size && slab_order < MAX_ORDER {
			slab_order += 1;
		}
		let slots_per_slab = frame_size(slab_order) / slot_size;
		Self {
			name,
			object_size,
			slot_size,
			gfp,
			slab_order,
			slots_per_slab,
			ctor,
			dtor,

			slabs: Vec::new(),
			free: Vec::new(),
			partial: Vec::new(),
			full: Vec::new(),

			total_num: 0,
			free_num: 0,
		}
	}
}

impl Memory {
	/// Tags every frame of the block headed by `page` as owned by the given
	/// slab, so object addresses can be resolved back to their cache.
	fn tag_slab_block(&self, page: Page, order: FrameOrder, cache: usize, slab: usize) {
		let Some((zone, id)) = self.zone_of_pfn(page.pfn()) else {
			return;
		};
		let mut inner = zone.inner.lock();
		let owner = FrameOwner::Slab {
			cache,
			slab,
		};
		for i in 0..(1usize << order) {
			let frame = &mut inner.frames[id as usize + i];
			frame.state = match frame.state {
				// The head keeps its order and reference
				FrameState::Used {
					order,
					refs: refs @ 1..,
					..
				} => FrameState::Used {
					order,
					refs,
					owner,
				},
				_ => FrameState::Used {
					order: 0,
					refs: 0,
					owner,
				},
			};
		}
	}

	/// Adjusts the cached-bytes accounting of the zone owning `page`.
	fn adjust_cached(&self, page: Page, delta: isize) {
		if let Some((zone, _)) = self.zone_of_pfn(page.pfn()) {
			let mut inner = zone.inner.lock();
			inner.cached_bytes = inner.cached_bytes.saturating_add_signed(delta);
		}
	}

	/// Creates a cache of objects of `size` bytes aligned to `align`.
	///
	/// Arguments:
	/// - `name` is the name of the cache
	/// - `size` is the size of one object in bytes
	/// - `align` is the required alignment; it is rounded up to a power of
	///   two and to the default minimum
	/// - `gfp` is the hint used when growing the cache
	/// - `ctor`/`dtor` are invoked on each object's construction and
	///   destruction edges
	///
	/// Caches are backed by directly mapped memory; high memory hints are
	/// rejected.
	pub fn create_cache(
		&self,
		name: &str,
		size: usize,
		align: usize,
		gfp: Gfp,
		ctor: Option<ObjectCallback>,
		dtor: Option<ObjectCallback>,
	) -> EResult<CacheId> {
		if size == 0 || gfp.contains(Gfp::HIGHUSER) {
			return Err(errno!(EINVAL));
		}
		log::debug!("slab: create cache `{name}` (object size: {size}, align: {align})");
		let cache = Cache::new(String::from(name), size, align, gfp, ctor, dtor);
		Ok(self.slab.lock().insert(cache))
	}

	/// Allocates an object from the cache `id`.
	///
	/// `gfp` overrides the cache's hint when the cache has to grow; high
	/// memory hints are rejected.
	///
	/// On success, the function returns the virtual address of the object in
	/// the kernel direct mapping.
	pub fn cache_alloc(&self, id: CacheId, gfp: Option<Gfp>) -> EResult<VirtAddr> {
		let cache_arc = self.slab.lock().get(id).ok_or(errno!(EINVAL))?;
		let mut cache = cache_arc.lock();
		let gfp = gfp.unwrap_or(cache.gfp);
		if gfp.contains(Gfp::HIGHUSER) {
			return Err(errno!(EINVAL));
		}
		// Find a slab with a free slot, growing the cache if needed
		let slab_id = cache
			.partial
			.last()
			.or(cache.free.last())
			.copied();
		let slab_id = match slab_id {
			Some(slab_id) => slab_id,
			None => self.cache_grow(id.0, &mut cache, gfp)?,
		};
		let slot_size = cache.slot_size;
		let slab = cache.slabs[slab_id]
			.as_mut()
			.ok_or(errno!(EINVAL))?;
		let slot = slab.free_slots.pop().ok_or(errno!(ENOMEM))?;
		slab.allocated[slot as usize] = true;
		slab.inuse += 1;
		let addr = slab.virt + slot as usize * slot_size;
		let page = slab.page;
		let inuse = slab.inuse;
		// Update list membership
		let old_list = cache.list_for(inuse - 1);
		let new_list = cache.list_for(inuse);
		if old_list != new_list {
			cache.list_remove(old_list, slab_id);
			cache.list_insert(new_list, slab_id);
		}
		cache.free_num -= 1;
		let ctor = cache.ctor;
		let object_size = cache.object_size;
		let slot_size = cache.slot_size;
		drop(cache);
		self.adjust_cached(page, -(slot_size as isize));
		// Construct the object
		if let Some(ctor) = ctor {
			let mut buf = alloc::vec![0u8; object_size];
			self.read_virt(addr, &mut buf)?;
			ctor(&mut buf);
			self.write_virt(addr, &buf)?;
		}
		Ok(addr)
	}

	/// Grows the cache with a fresh slab and returns its index.
	///
	/// The cache's lock must be held.
	fn cache_grow(&self, cache_id: usize, cache: &mut Cache, gfp: Gfp) -> EResult<usize> {
		let page = self.alloc_pages(gfp, cache.slab_order)?;
		// Caches are backed by directly mapped zones
		let virt = match self.virt_from_page(page) {
			Some(virt) => virt,
			None => {
				let _ = self.free_pages(page);
				return Err(errno!(EINVAL));
			}
		};
		let slab_id = cache
			.slabs
			.iter()
			.position(Option::is_none)
			.unwrap_or(cache.slabs.len());
		let slab = Slab {
			page,
			virt,
			free_slots: (0..cache.slots_per_slab as u16).rev().collect(),
			allocated: alloc::vec![false; cache.slots_per_slab],
			inuse: 0,
		};
		if slab_id == cache.slabs.len() {
			cache.slabs.push(Some(slab));
		} else {
			cache.slabs[slab_id] = Some(slab);
		}
		cache.free.push(slab_id);
		cache.total_num += cache.slots_per_slab;
		cache.free_num += cache.slots_per_slab;
		self.tag_slab_block(page, cache.slab_order, cache_id, slab_id);
		self.adjust_cached(page, (cache.slots_per_slab * cache.slot_size) as isize);
		Ok(slab_id)
	}

	/// Returns the object at `addr` to the cache `id`.
	///
	/// The owning slab is recovered through the frame metadata of the page
	/// containing `addr`; an object that does not belong to the cache is
	/// refused.
	pub fn cache_free(&self, id: CacheId, addr: VirtAddr) -> EResult<()> {
		let page = self
			.page_from_virt(addr.down_align_to(PAGE_SIZE))
			.ok_or(errno!(EFAULT))?;
		let (zone, frame_id) = self.zone_of_pfn(page.pfn()).ok_or(errno!(EFAULT))?;
		let state = zone.inner.lock().frames[frame_id as usize].state;
		match state {
			FrameState::Used {
				owner: FrameOwner::Slab {
					cache,
					slab,
				},
				..
			} if cache == id.0 => self.slab_free(cache, slab, addr),
			_ => Err(errno!(EINVAL)),
		}
	}

	/// Returns a human-readable list of every live cache: name, object and
	/// slot sizes, free and total slot counts.
	pub fn slab_caches_info(&self) -> String {
		let caches: Vec<_> = {
			let registry = self.slab.lock();
			registry.caches.iter().flatten().cloned().collect()
		};
		let mut out = String::new();
		for cache_arc in caches {
			let cache = cache_arc.lock();
			let _ = core::fmt::write(
				&mut out,
				format_args!(
					"{} {} {} {} {}\n",
					cache.name, cache.object_size, cache.slot_size, cache.free_num,
					cache.total_num
				),
			);
		}
		out
	}

	/// Returns `(free_num, total_num)` for the cache `id`.
	pub fn cache_stats(&self, id: CacheId) -> EResult<(usize, usize)> {
		let cache_arc = self.slab.lock().get(id).ok_or(errno!(EINVAL))?;
		let cache = cache_arc.lock();
		Ok((cache.free_num, cache.total_num))
	}

	/// Releases every slab of the cache with no object handed out.
	pub fn cache_shrink(&self, id: CacheId) -> EResult<()> {
		let cache_arc = self.slab.lock().get(id).ok_or(errno!(EINVAL))?;
		let mut cache = cache_arc.lock();
		let free = core::mem::take(&mut cache.free);
		for slab_id in free {
			let Some(slab) = cache.slabs[slab_id].take() else {
				continue;
			};
			cache.total_num -= cache.slots_per_slab;
			cache.free_num -= cache.slots_per_slab;
			self.adjust_cached(slab.page, -((cache.slots_per_slab * cache.slot_size) as isize));
			self.free_pages(slab.page)?;
		}
		Ok(())
	}

	/// Destroys the cache `id`, returning its slabs to the buddy allocator.
	///
	/// The function fails with `EBUSY` if any object is still allocated.
	pub fn destroy_cache(&self, id: CacheId) -> EResult<()> {
		let cache_arc = self.slab.lock().get(id).ok_or(errno!(EINVAL))?;
		{
			let cache = cache_arc.lock();
			if cache.free_num != cache.total_num {
				return Err(errno!(EBUSY));
			}
		}
		self.cache_shrink(id)?;
		self.slab.lock().caches[id.0] = None;
		Ok(())
	}

	/// Allocates `size` bytes of kernel memory.
	///
	/// Small requests are served by the internal caches; requests exceeding
	/// the largest internal cache fall through to direct buddy allocation.
	///
	/// The returned address is aligned to at least the natural alignment of
	/// `size`.
	pub fn kmalloc(&self, size: usize) -> EResult<VirtAddr> {
		if size == 0 {
			return Err(errno!(EINVAL));
		}
		let bucket = self.slab.lock().bucket_for(size);
		match bucket {
			Some(id) => self.cache_alloc(id, None),
			// Too large for the caches: allocate straight from the buddy
			None => self.alloc_pages_lowmem(Gfp::KERNEL, nearest_order(VirtAddr(0), size)),
		}
	}

	/// Frees the object or block at `addr`.
	///
	/// The owning slab is recovered through the frame metadata of the page
	/// containing `addr`; direct buddy allocations are returned to the buddy.
	///
	/// A null address is tolerated and ignored.
	pub fn kfree(&self, addr: VirtAddr) -> EResult<()> {
		if addr.is_null() {
			return Ok(());
		}
		let page = self
			.page_from_virt(addr.down_align_to(PAGE_SIZE))
			.ok_or(errno!(EFAULT))?;
		let (zone, id) = self.zone_of_pfn(page.pfn()).ok_or(errno!(EFAULT))?;
		let state = zone.inner.lock().frames[id as usize].state;
		match state {
			FrameState::Used {
				owner: FrameOwner::Slab {
					cache,
					slab,
				},
				..
			} => self.slab_free(cache, slab, addr),
			FrameState::Used {
				refs: 1..,
				owner: FrameOwner::Anon,
				..
			} if addr.is_aligned_to(PAGE_SIZE) => self.free_pages(page),
			_ => Err(errno!(EINVAL)),
		}
	}

	/// Returns the object at `addr` to slot `slab` of cache `cache`.
	fn slab_free(&self, cache_id: usize, slab_id: usize, addr: VirtAddr) -> EResult<()> {
		let cache_arc = self
			.slab
			.lock()
			.get(CacheId(cache_id))
			.ok_or(errno!(EINVAL))?;
		let mut cache = cache_arc.lock();
		let slot_size = cache.slot_size;
		let object_size = cache.object_size;
		let dtor = cache.dtor;
		let slab = cache
			.slabs
			.get_mut(slab_id)
			.and_then(Option::as_mut)
			.ok_or(errno!(EINVAL))?;
		// Validate the address against the slot grid
		let off = addr.0.wrapping_sub(slab.virt.0);
		let slot = off / slot_size;
		if off % slot_size != 0 || slot >= slab.allocated.len() {
			return Err(errno!(EINVAL));
		}
		if !slab.allocated[slot] {
			return Err(errno!(EINVAL));
		}
		let page = slab.page;
		// Destroy the object before releasing the slot
		if let Some(dtor) = dtor {
			let mut buf = alloc::vec![0u8; object_size];
			self.read_virt(addr, &mut buf)?;
			dtor(&mut buf);
			self.write_virt(addr, &buf)?;
		}
		let slab = cache.slabs[slab_id].as_mut().unwrap();
		slab.allocated[slot] = false;
		slab.free_slots.push(slot as u16);
		slab.inuse -= 1;
		let inuse = slab.inuse;
		let old_list = cache.list_for(inuse + 1);
		let new_list = cache.list_for(inuse);
		if old_list != new_list {
			cache.list_remove(old_list, slab_id);
			cache.list_insert(new_list, slab_id);
		}
		cache.free_num += 1;
		drop(cache);
		self.adjust_cached(page, slot_size as isize);
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::memory::frame::test::test_memory;
	use core::sync::atomic::{AtomicUsize, Ordering};

	static CTOR_COUNT: AtomicUsize = AtomicUsize::new(0);
	static DTOR_COUNT: AtomicUsize = AtomicUsize::new(0);

	fn test_ctor(obj: &mut [u8]) {
		obj[0] = 0xcd;
		CTOR_COUNT.fetch_add(1, Ordering::Relaxed);
	}

	fn test_dtor(_obj: &mut [u8]) {
		DTOR_COUNT.fetch_add(1, Ordering::Relaxed);
	}

	#[test]
	fn cache_ctor_dtor_lifecycle() {
		let mem = test_memory();
		let free_before = mem.zone_free_space(Gfp::KERNEL);
		CTOR_COUNT.store(0, Ordering::Relaxed);
		DTOR_COUNT.store(0, Ordering::Relaxed);
		let cache = mem
			.create_cache(
				"test-object",
				64,
				8,
				Gfp::KERNEL,
				Some(test_ctor),
				Some(test_dtor),
			)
			.unwrap();
		let objs: Vec<_> = (0..3).map(|_| mem.cache_alloc(cache, None).unwrap()).collect();
		assert_eq!(CTOR_COUNT.load(Ordering::Relaxed), 3);
		// The constructor stamped every object
		for obj in &objs {
			let mut b = [0u8; 1];
			mem.read_virt(*obj, &mut b).unwrap();
			assert_eq!(b[0], 0xcd);
		}
		for obj in objs {
			mem.cache_free(cache, obj).unwrap();
		}
		assert_eq!(CTOR_COUNT.load(Ordering::Relaxed), 3);
		assert_eq!(DTOR_COUNT.load(Ordering::Relaxed), 3);
		let (free_num, total_num) = mem.cache_stats(cache).unwrap();
		assert_eq!(free_num, total_num);
		mem.destroy_cache(cache).unwrap();
		assert_eq!(mem.zone_free_space(Gfp::KERNEL), free_before);
	}

	#[test]
	fn cache_counters_reconverge() {
		let mem = test_memory();
		let cache = mem
			.create_cache("counter", 48, 8, Gfp::KERNEL, None, None)
			.unwrap();
		let mut objs = Vec::new();
		for _ in 0..100 {
			objs.push(mem.cache_alloc(cache, None).unwrap());
		}
		let (free_num, total_num) = mem.cache_stats(cache).unwrap();
		assert_eq!(total_num - free_num, 100);
		for obj in objs {
			mem.kfree(obj).unwrap();
		}
		let (free_num, total_num) = mem.cache_stats(cache).unwrap();
		assert_eq!(free_num, total_num);
		let info = mem.slab_caches_info();
		assert!(info.contains("counter"));
		assert!(info.contains("kmalloc-64"));
		mem.destroy_cache(cache).unwrap();
	}

	#[test]
	fn cache_destroy_busy() {
		let mem = test_memory();
		let cache = mem
			.create_cache("busy", 32, 8, Gfp::KERNEL, None, None)
			.unwrap();
		let obj = mem.cache_alloc(cache, None).unwrap();
		assert_eq!(mem.destroy_cache(cache).unwrap_err(), crate::errno!(EBUSY));
		mem.cache_free(cache, obj).unwrap();
		mem.destroy_cache(cache).unwrap();
	}

	#[test]
	fn cache_free_checks_owner() {
		let mem = test_memory();
		let a = mem
			.create_cache("owner-a", 32, 8, Gfp::KERNEL, None, None)
			.unwrap();
		let b = mem
			.create_cache("owner-b", 32, 8, Gfp::KERNEL, None, None)
			.unwrap();
		let obj = mem.cache_alloc(a, None).unwrap();
		// An object cannot be returned to a cache it does not belong to
		assert_eq!(
			mem.cache_free(b, obj).unwrap_err(),
			crate::errno!(EINVAL)
		);
		mem.cache_free(a, obj).unwrap();
		// The general release path resolves the owner on its own
		let obj = mem.cache_alloc(a, None).unwrap();
		mem.kfree(obj).unwrap();
		mem.destroy_cache(a).unwrap();
		mem.destroy_cache(b).unwrap();
	}

	#[test]
	fn cache_objects_distinct() {
		let mem = test_memory();
		let cache = mem
			.create_cache("distinct", 24, 8, Gfp::KERNEL, None, None)
			.unwrap();
		let mut objs = Vec::new();
		for _ in 0..64 {
			let obj = mem.cache_alloc(cache, None).unwrap();
			assert!(!objs.contains(&obj));
			objs.push(obj);
		}
		for obj in objs {
			mem.kfree(obj).unwrap();
		}
		mem.destroy_cache(cache).unwrap();
	}

	#[test]
	fn kmalloc_alignment() {
		let mem = test_memory();
		for size in [8usize, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096] {
			let addr = mem.kmalloc(size).unwrap();
			assert!(addr.is_aligned_to(size), "size {size}");
			mem.kfree(addr).unwrap();
		}
		// Odd sizes keep the default alignment
		let addr = mem.kmalloc(40).unwrap();
		assert!(addr.is_aligned_to(8));
		mem.kfree(addr).unwrap();
	}

	#[test]
	fn kmalloc_large_goes_to_buddy() {
		let mem = test_memory();
		let free_before = mem.zone_free_space(Gfp::KERNEL);
		let addr = mem.kmalloc(200000).unwrap();
		assert!(addr.is_aligned_to(PAGE_SIZE));
		mem.kfree(addr).unwrap();
		assert_eq!(mem.zone_free_space(Gfp::KERNEL), free_before);
	}

	#[test]
	fn kmalloc_writable_storage() {
		let mem = test_memory();
		let a = mem.kmalloc(96).unwrap();
		let b = mem.kmalloc(96).unwrap();
		mem.write_virt(a, &[0x11; 96]).unwrap();
		mem.write_virt(b, &[0x22; 96]).unwrap();
		let mut buf = [0u8; 96];
		mem.read_virt(a, &mut buf).unwrap();
		assert_eq!(buf, [0x11; 96]);
		mem.kfree(a).unwrap();
		mem.kfree(b).unwrap();
	}

	#[test]
	fn kfree_tolerates_null() {
		let mem = test_memory();
		mem.kfree(VirtAddr(0)).unwrap();
	}

	#[test]
	fn kfree_double_free_rejected() {
		let mem = test_memory();
		let addr = mem.kmalloc(64).unwrap();
		mem.kfree(addr).unwrap();
		assert!(mem.kfree(addr).is_err());
	}

	#[test]
	fn cached_space_accounting() {
		let mem = test_memory();
		assert_eq!(mem.zone_cached_space(Gfp::KERNEL), 0);
		let cache = mem
			.create_cache("cached", 64, 8, Gfp::KERNEL, None, None)
			.unwrap();
		let obj = mem.cache_alloc(cache, None).unwrap();
		let cached = mem.zone_cached_space(Gfp::KERNEL);
		// The rest of the slab's slots are free and counted as cached
		assert!(cached > 0);
		mem.kfree(obj).unwrap();
		assert_eq!(mem.zone_cached_space(Gfp::KERNEL), cached + 64);
		mem.destroy_cache(cache).unwrap();
		assert_eq!(mem.zone_cached_space(Gfp::KERNEL), 0);
	}
}
