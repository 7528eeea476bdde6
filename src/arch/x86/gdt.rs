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

//! Under the x86 architecture, the GDT (Global Descriptor Table) is a table
//! of structures that describes the segments of memory.
//!
//! It is a deprecated structure that still must be used in order to switch to
//! protected mode, handle protection rings and load the Task State Segment
//! (TSS).
//!
//! The kernel uses the flat model: every code/data segment spans the whole
//! 4 GiB address space; entries differ only by privilege and
//! executable/writable bits.

use core::fmt;
use static_assertions::assert_eq_size;

/// The offset of the kernel code segment.
pub const KERNEL_CS: usize = 8;
/// The offset of the kernel data segment.
pub const KERNEL_DS: usize = 16;
/// The offset of the user code segment.
pub const USER_CS: usize = 24;
/// The offset of the user data segment.
pub const USER_DS: usize = 32;
/// The offset of the Task State Segment (TSS).
pub const TSS_OFFSET: usize = 40;

/// The number of entries in the GDT.
pub const ENTRIES_COUNT: usize = 6;

/// Access byte of a kernel code segment.
const ACCESS_KERNEL_CODE: u8 = 0b10011010;
/// Access byte of a kernel data segment.
const ACCESS_KERNEL_DATA: u8 = 0b10010010;
/// Access byte of a user code segment.
const ACCESS_USER_CODE: u8 = 0b11111010;
/// Access byte of a user data segment.
const ACCESS_USER_DATA: u8 = 0b11110010;
/// Access byte of the TSS segment.
const ACCESS_TSS: u8 = 0b10001001;

/// Flags of a flat 32-bit segment: 4 KiB granularity, 32-bit protected mode.
const FLAGS_FLAT: u8 = 0b1100;

/// Structure representing a GDT entry.
#[repr(transparent)]
#[derive(Clone, Copy, Default)]
pub struct Entry(pub u64);

impl Entry {
	/// Returns the entry's base address.
	#[inline(always)]
	pub fn get_base(&self) -> u32 {
		(((self.0 >> 16) & 0xffffff) | ((self.0 >> 32) & 0xff000000)) as _
	}

	/// Sets the entry's base address.
	#[inline(always)]
	pub fn set_base(&mut self, base: u32) {
		self.0 &= !(0xffffff << 16);
		self.0 &= !(0xff << 56);

		self.0 |= (base as u64 & 0xffffff) << 16;
		self.0 |= ((base as u64 >> 24) & 0xff) << 56;
	}

	/// Returns the entry's limit.
	#[inline(always)]
	pub fn get_limit(&self) -> u32 {
		((self.0 & 0xffff) | (((self.0 >> 48) & 0xf) << 16)) as _
	}

	/// Sets the entry's limit.
	///
	/// If the given limit is more than `pow(2, 20) - 1`, the value is
	/// truncated.
	#[inline(always)]
	pub fn set_limit(&mut self, limit: u32) {
		self.0 &= !0xffff;
		self.0 &= !(0xf << 48);

		self.0 |= limit as u64 & 0xffff;
		self.0 |= ((limit as u64 >> 16) & 0xf) << 48;
	}

	/// Returns the value of the access byte.
	#[inline(always)]
	pub fn get_access_byte(&self) -> u8 {
		((self.0 >> 40) & 0xff) as _
	}

	/// Sets the value of the access byte.
	#[inline(always)]
	pub fn set_access_byte(&mut self, byte: u8) {
		self.0 &= !(0xff << 40);
		self.0 |= (byte as u64) << 40;
	}

	/// Returns the flags.
	#[inline(always)]
	pub fn get_flags(&self) -> u8 {
		((self.0 >> 52) & 0x0f) as _
	}

	/// Sets the flags.
	#[inline(always)]
	pub fn set_flags(&mut self, flags: u8) {
		self.0 &= !(0x0f << 52);
		self.0 |= ((flags as u64) & 0x0f) << 52;
	}

	/// Tells whether the entry is present.
	#[inline(always)]
	pub fn is_present(&self) -> bool {
		(self.0 >> 47 & 1) != 0
	}

	/// Sets the entry present or not.
	#[inline(always)]
	pub fn set_present(&mut self, present: bool) {
		if present {
			self.0 |= 1 << 47;
		} else {
			self.0 &= !(1 << 47);
		}
	}

	/// Builds a segment entry from its raw parts.
	fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
		let mut entry = Self(0);
		entry.set_base(base);
		entry.set_limit(limit);
		entry.set_access_byte(access);
		entry.set_flags(flags);
		entry
	}
}

impl fmt::Debug for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("base", &self.get_base())
			.field("limit", &self.get_limit())
			.field("access_byte", &self.get_access_byte())
			.field("flags", &self.get_flags())
			.field("present", &self.is_present())
			.finish()
	}
}

assert_eq_size!(Entry, u64);

/// Creates a segment selector for the given segment offset and ring.
#[inline(always)]
pub fn make_segment_selector(offset: usize, ring: u8) -> u16 {
	debug_assert!(ring <= 3);
	(offset | ring as usize) as _
}

/// The pointer structure the `lgdt` instruction loads.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct GdtPointer {
	/// The size of the GDT in bytes, minus 1.
	pub limit: u16,
	/// The linear address of the GDT.
	pub base: u32,
}

/// The Global Descriptor Table.
pub struct Gdt {
	entries: [Entry; ENTRIES_COUNT],
}

impl Gdt {
	/// Builds the GDT: the null entry, flat kernel and user code/data
	/// segments, and the TSS segment.
	///
	/// Arguments:
	/// - `tss_base` is the linear address of the TSS
	/// - `tss_limit` is the size of the TSS in bytes, minus 1
	pub fn new(tss_base: u32, tss_limit: u32) -> Self {
		let entries = [
			Entry(0),
			Entry::new(0, 0xfffff, ACCESS_KERNEL_CODE, FLAGS_FLAT),
			Entry::new(0, 0xfffff, ACCESS_KERNEL_DATA, FLAGS_FLAT),
			Entry::new(0, 0xfffff, ACCESS_USER_CODE, FLAGS_FLAT),
			Entry::new(0, 0xfffff, ACCESS_USER_DATA, FLAGS_FLAT),
			Entry::new(tss_base, tss_limit, ACCESS_TSS, 0),
		];
		Self {
			entries,
		}
	}

	/// Returns the entry at the given byte offset.
	pub fn entry(&self, offset: usize) -> Option<Entry> {
		if offset % 8 != 0 {
			return None;
		}
		self.entries.get(offset / 8).copied()
	}

	/// Returns the pointer structure for the table, given its linear
	/// address.
	pub fn pointer(&self, base: u32) -> GdtPointer {
		GdtPointer {
			limit: (core::mem::size_of::<Entry>() * ENTRIES_COUNT - 1) as u16,
			base,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn selector_bytes() {
		assert_eq!(make_segment_selector(KERNEL_CS, 0), 0x08);
		assert_eq!(make_segment_selector(KERNEL_DS, 0), 0x10);
		assert_eq!(make_segment_selector(USER_CS, 3), 0x1b);
		assert_eq!(make_segment_selector(USER_DS, 3), 0x23);
		assert_eq!(make_segment_selector(TSS_OFFSET, 3), 0x2b);
	}

	#[test]
	fn flat_segments() {
		let gdt = Gdt::new(0x1000, 103);
		assert_eq!(gdt.entry(0).unwrap().0, 0);
		for offset in [KERNEL_CS, KERNEL_DS, USER_CS, USER_DS] {
			let entry = gdt.entry(offset).unwrap();
			assert_eq!(entry.get_base(), 0);
			assert_eq!(entry.get_limit(), 0xfffff);
			assert_eq!(entry.get_flags(), FLAGS_FLAT);
			assert!(entry.is_present());
		}
		// Only privilege and executable/writable bits differ
		assert_eq!(gdt.entry(KERNEL_CS).unwrap().get_access_byte(), 0x9a);
		assert_eq!(gdt.entry(KERNEL_DS).unwrap().get_access_byte(), 0x92);
		assert_eq!(gdt.entry(USER_CS).unwrap().get_access_byte(), 0xfa);
		assert_eq!(gdt.entry(USER_DS).unwrap().get_access_byte(), 0xf2);
	}

	#[test]
	fn tss_entry() {
		let gdt = Gdt::new(0xdead0000, 103);
		let tss = gdt.entry(TSS_OFFSET).unwrap();
		assert_eq!(tss.get_base(), 0xdead0000);
		assert_eq!(tss.get_limit(), 103);
		assert_eq!(tss.get_access_byte(), 0x89);
		assert!(tss.is_present());
	}

	#[test]
	fn pointer_limit() {
		let gdt = Gdt::new(0, 0);
		let ptr = gdt.pointer(0x800);
		assert_eq!({ ptr.limit }, 47);
		assert_eq!({ ptr.base }, 0x800);
	}
}
