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

//! Under the x86 architecture, the TSS (Task State Segment) is a structure
//! that is mostly deprecated but that must still be used in order to perform
//! software context switching.
//!
//! It stores the stack pointer and stack segment to switch to whenever an
//! interruption requires entering ring 0 from ring 3. The scheduler updates
//! the `esp0` field on each task switch; the hardware is the only reader.

use super::gdt;
use core::mem::size_of;
use static_assertions::const_assert_eq;

/// Task State Segment.
#[repr(C)]
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Tss {
	pub prev_tss: u32,
	pub esp0: u32,
	pub ss0: u32,
	pub esp1: u32,
	pub ss1: u32,
	pub esp2: u32,
	pub ss2: u32,
	pub cr3: u32,
	pub eip: u32,
	pub eflags: u32,
	pub eax: u32,
	pub ecx: u32,
	pub edx: u32,
	pub ebx: u32,
	pub esp: u32,
	pub ebp: u32,
	pub esi: u32,
	pub edi: u32,
	pub es: u32,
	pub cs: u32,
	pub ss: u32,
	pub ds: u32,
	pub fs: u32,
	pub gs: u32,
	pub ldt: u32,
	pub trap: u16,
	pub iomap_base: u16,
}

const_assert_eq!(size_of::<Tss>(), 104);

impl Tss {
	/// Creates a zeroed TSS with the I/O map sentinel set past the end of
	/// the structure.
	pub fn new() -> Self {
		Self {
			iomap_base: size_of::<Tss>() as u16,
			..Default::default()
		}
	}

	/// Sets the kernel stack pointer, to be used on the next privilege
	/// switch.
	pub fn set_kernel_stack(&mut self, kernel_stack: u32) {
		self.esp0 = kernel_stack;
		self.ss0 = gdt::KERNEL_DS as u32;
		self.ss = gdt::make_segment_selector(gdt::USER_DS, 3) as u32;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn tss_iomap_sentinel() {
		let tss = Tss::new();
		assert_eq!(tss.iomap_base, 104);
		assert_eq!(tss.esp0, 0);
	}

	#[test]
	fn tss_kernel_stack_update() {
		let mut tss = Tss::new();
		tss.set_kernel_stack(0xc0ffee00);
		assert_eq!(tss.esp0, 0xc0ffee00);
		assert_eq!(tss.ss0, gdt::KERNEL_DS as u32);
		assert_eq!(tss.ss, 0x23);
	}
}
