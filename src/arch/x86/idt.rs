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

//! The IDT (Interrupt Descriptor Table) is a table under the x86 architecture
//! storing the list of interrupt handlers, allowing to catch and handle
//! interruptions.
//!
//! Each populated gate points at an assembly trampoline that pushes the trap
//! frame and enters the central dispatcher. The trampolines are laid out as a
//! table of fixed-size stubs in the kernel image; the gate's offset is the
//! stub's address.

use super::gdt;
use core::mem::size_of;
use static_assertions::assert_eq_size;

/// The number of entries in the IDT.
pub const ENTRIES_COUNT: usize = 256;
/// The number of CPU exception vectors.
pub const EXCEPTIONS_COUNT: usize = 32;
/// The number of PIC IRQ lines.
pub const IRQS_COUNT: usize = 16;
/// The IDT vector index for system calls.
pub const SYSCALL_ENTRY: usize = 0x80;

/// Gate options byte: present, DPL 0, 32-bit interrupt gate.
const FLAGS_KERNEL_GATE: u8 = 0x8e;
/// Gate options byte: present, DPL 3, 32-bit interrupt gate.
const FLAGS_SYSCALL_GATE: u8 = 0xee;
/// The gate type nibble of a 32-bit interrupt gate.
pub const GATE_TYPE_INTERRUPT_32: u8 = 0b1110;

/// The linear address of the interrupt stub table in the kernel image.
const STUBS_BASE: u32 = 0xc0102000;
/// The size of one interrupt stub.
const STUB_SIZE: u32 = 16;

/// Returns the address of the trampoline stub at the given index.
///
/// Stubs are laid out contiguously: the 32 exception stubs, the 16 IRQ
/// stubs, then the system call stub.
fn stub_addr(index: u32) -> u32 {
	STUBS_BASE + index * STUB_SIZE
}

/// An IDT entry.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct InterruptDescriptor {
	/// Bits 0..15 of the address to the handler for the interrupt.
	offset: u16,
	/// The code segment selector to execute the interrupt.
	selector: u16,
	/// Must be set to zero.
	zero: u8,
	/// Interrupt handler flags.
	flags: u8,
	/// Bits 16..31 of the address to the handler for the interrupt.
	offset_2: u16,
}

assert_eq_size!(InterruptDescriptor, u64);

impl InterruptDescriptor {
	/// Returns a zeroed, non-present entry.
	const fn placeholder() -> Self {
		Self {
			offset: 0,
			selector: 0,
			zero: 0,
			flags: 0,
			offset_2: 0,
		}
	}

	/// Creates an IDT entry.
	///
	/// Arguments:
	/// - `address` is the address of the handler stub
	/// - `selector` is the segment selector to be used to handle the
	///   interrupt
	/// - `flags` is the set of flags for the entry (see Intel documentation)
	fn new(address: u32, selector: u16, flags: u8) -> Self {
		Self {
			offset: (address & 0xffff) as u16,
			selector,
			zero: 0,
			flags,
			offset_2: ((address >> 16) & 0xffff) as u16,
		}
	}

	/// Returns the full handler offset.
	pub fn offset(&self) -> u32 {
		self.offset as u32 | ((self.offset_2 as u32) << 16)
	}

	/// Returns the segment selector.
	pub fn selector(&self) -> u16 {
		self.selector
	}

	/// Returns the reserved byte.
	pub fn reserved(&self) -> u8 {
		self.zero
	}

	/// Tells whether the gate is present.
	pub fn is_present(&self) -> bool {
		self.flags >> 7 != 0
	}

	/// Returns the gate's privilege level.
	pub fn dpl(&self) -> u8 {
		(self.flags >> 5) & 0b11
	}

	/// Returns the gate's type nibble.
	pub fn gate_type(&self) -> u8 {
		self.flags & 0xf
	}

	/// Tells whether the entry is entirely zero.
	pub fn is_zero(&self) -> bool {
		self.offset == 0
			&& self.selector == 0
			&& self.zero == 0
			&& self.flags == 0
			&& self.offset_2 == 0
	}
}

/// The pointer structure the `lidt` instruction loads.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct IdtPointer {
	/// The size of the IDT in bytes, minus 1.
	pub size: u16,
	/// The linear address of the IDT.
	pub offset: u32,
}

/// The Interrupt Descriptor Table.
pub struct Idt {
	entries: [InterruptDescriptor; ENTRIES_COUNT],
}

impl Default for Idt {
	fn default() -> Self {
		Self::new()
	}
}

impl Idt {
	/// Builds the IDT.
	///
	/// Entries 0..32 are the CPU exceptions and 32..48 the PIC IRQ lines,
	/// all DPL 0; entry `0x80` is the system call gate, DPL 3. Every other
	/// entry stays zero.
	pub fn new() -> Self {
		let kernel_cs = gdt::make_segment_selector(gdt::KERNEL_CS, 0);
		let mut entries = [InterruptDescriptor::placeholder(); ENTRIES_COUNT];
		// Exceptions
		for (i, entry) in entries.iter_mut().take(EXCEPTIONS_COUNT).enumerate() {
			*entry = InterruptDescriptor::new(stub_addr(i as u32), kernel_cs, FLAGS_KERNEL_GATE);
		}
		// PIC interruptions
		for i in 0..IRQS_COUNT {
			entries[EXCEPTIONS_COUNT + i] = InterruptDescriptor::new(
				stub_addr((EXCEPTIONS_COUNT + i) as u32),
				kernel_cs,
				FLAGS_KERNEL_GATE,
			);
		}
		// System calls
		entries[SYSCALL_ENTRY] = InterruptDescriptor::new(
			stub_addr((EXCEPTIONS_COUNT + IRQS_COUNT) as u32),
			kernel_cs,
			FLAGS_SYSCALL_GATE,
		);
		Self {
			entries,
		}
	}

	/// Returns the entry at the given vector.
	pub fn entry(&self, vector: usize) -> Option<InterruptDescriptor> {
		self.entries.get(vector).copied()
	}

	/// Returns the pointer structure for the table, given its linear
	/// address.
	pub fn pointer(&self, offset: u32) -> IdtPointer {
		IdtPointer {
			size: (size_of::<InterruptDescriptor>() * ENTRIES_COUNT - 1) as u16,
			offset,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn idt_populated_gates() {
		let idt = Idt::new();
		for vector in (0..EXCEPTIONS_COUNT + IRQS_COUNT).chain([SYSCALL_ENTRY]) {
			let entry = idt.entry(vector).unwrap();
			assert_ne!(entry.offset(), 0, "vector {vector}");
			assert!(entry.is_present());
			assert_eq!(entry.reserved(), 0);
			assert_eq!(entry.gate_type(), GATE_TYPE_INTERRUPT_32);
			assert_eq!(entry.selector(), 0x08);
		}
	}

	#[test]
	fn idt_privilege_levels() {
		let idt = Idt::new();
		for vector in 0..EXCEPTIONS_COUNT + IRQS_COUNT {
			assert_eq!(idt.entry(vector).unwrap().dpl(), 0);
		}
		assert_eq!(idt.entry(SYSCALL_ENTRY).unwrap().dpl(), 3);
	}

	#[test]
	fn idt_unused_entries_zero() {
		let idt = Idt::new();
		for vector in 0..ENTRIES_COUNT {
			let populated =
				vector < EXCEPTIONS_COUNT + IRQS_COUNT || vector == SYSCALL_ENTRY;
			let entry = idt.entry(vector).unwrap();
			assert_eq!(entry.reserved(), 0);
			if !populated {
				assert!(entry.is_zero(), "vector {vector}");
			}
		}
	}

	#[test]
	fn idt_distinct_offsets() {
		let idt = Idt::new();
		let mut offsets = alloc::vec::Vec::new();
		for vector in (0..EXCEPTIONS_COUNT + IRQS_COUNT).chain([SYSCALL_ENTRY]) {
			offsets.push(idt.entry(vector).unwrap().offset());
		}
		offsets.sort_unstable();
		offsets.dedup();
		assert_eq!(offsets.len(), EXCEPTIONS_COUNT + IRQS_COUNT + 1);
	}

	#[test]
	fn idt_pointer() {
		let idt = Idt::new();
		let ptr = idt.pointer(0xc0100000);
		assert_eq!({ ptr.size }, 8 * 256 - 1);
	}
}
