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

//! x86 (32-bit protected mode) architecture model.
//!
//! The substrate does not execute privileged instructions. The pieces of CPU
//! state the kernel core depends on (the maskable interrupt flag, privilege
//! rings, descriptor tables) are modeled as data and can be inspected
//! directly.

pub mod gdt;
pub mod idt;
pub mod pic;
pub mod tss;

/// Kernel ring.
pub const RING_KERNEL: u8 = 0;
/// Userspace ring.
pub const RING_USER: u8 = 3;

// The interrupt flag is per-CPU state. The test harness models one CPU per
// thread, so the flag is thread-local there.
#[cfg(test)]
std::thread_local! {
	/// The maskable interrupt flag (`IF` in `eflags`).
	static INTERRUPT_FLAG: core::cell::Cell<bool> = const { core::cell::Cell::new(false) };
}
/// The maskable interrupt flag (`IF` in `eflags`).
#[cfg(not(test))]
static INTERRUPT_FLAG: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

/// Clears the maskable interrupt flag.
#[inline]
pub fn cli() {
	#[cfg(test)]
	INTERRUPT_FLAG.with(|f| f.set(false));
	#[cfg(not(test))]
	INTERRUPT_FLAG.store(false, core::sync::atomic::Ordering::Release);
}

/// Sets the maskable interrupt flag.
#[inline]
pub fn sti() {
	#[cfg(test)]
	INTERRUPT_FLAG.with(|f| f.set(true));
	#[cfg(not(test))]
	INTERRUPT_FLAG.store(true, core::sync::atomic::Ordering::Release);
}

/// Tells whether maskable interrupts are enabled.
#[inline]
pub fn is_interrupt_enabled() -> bool {
	#[cfg(test)]
	return INTERRUPT_FLAG.with(|f| f.get());
	#[cfg(not(test))]
	INTERRUPT_FLAG.load(core::sync::atomic::Ordering::Acquire)
}

/// Executes the given function `f` with maskable interruptions disabled.
///
/// This function saves the state of the interrupt flag and restores it before
/// returning.
pub fn wrap_disable_interrupts<T, F: FnOnce() -> T>(f: F) -> T {
	let int = is_interrupt_enabled();
	cli();
	let result = f();
	if int {
		sti();
	} else {
		cli();
	}
	result
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn interrupt_flag_restore() {
		sti();
		let res = wrap_disable_interrupts(|| {
			assert!(!is_interrupt_enabled());
			42
		});
		assert_eq!(res, 42);
		assert!(is_interrupt_enabled());
	}
}
