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

//! Mutual exclusion primitives.
//!
//! `INT` tells whether locking masks maskable interrupts for the duration of
//! the critical section. Allocators and interrupt-table mutations use the
//! masking variant since they may be reached from interrupt context.

use crate::arch::x86;
use core::{
	fmt,
	fmt::Formatter,
	mem::ManuallyDrop,
	ops::{Deref, DerefMut},
};

/// Unlocks the associated [`Mutex`] when dropped.
pub struct MutexGuard<'m, T: ?Sized, const INT: bool> {
	inner: ManuallyDrop<spin::mutex::MutexGuard<'m, T>>,
	/// The state of the interrupt flag before locking.
	int_state: bool,
}

impl<T: ?Sized, const INT: bool> Deref for MutexGuard<'_, T, INT> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		&self.inner
	}
}

impl<T: ?Sized, const INT: bool> DerefMut for MutexGuard<'_, T, INT> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.inner
	}
}

impl<T: ?Sized + fmt::Debug, const INT: bool> fmt::Debug for MutexGuard<'_, T, INT> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

impl<T: ?Sized, const INT: bool> Drop for MutexGuard<'_, T, INT> {
	fn drop(&mut self) {
		// Release the lock before restoring the interrupt flag
		unsafe {
			ManuallyDrop::drop(&mut self.inner);
		}
		if INT && self.int_state {
			x86::sti();
		}
	}
}

/// Spinning mutual exclusion primitive.
///
/// If `INT` is `true`, the lock masks maskable interrupts while held.
pub struct Mutex<T: ?Sized, const INT: bool = false> {
	inner: spin::Mutex<T>,
}

/// A [`Mutex`] that masks interrupts while locked.
pub type IntMutex<T> = Mutex<T, true>;

impl<T, const INT: bool> Mutex<T, INT> {
	/// Creates a new instance wrapping the given `data`.
	pub const fn new(data: T) -> Self {
		Self {
			inner: spin::Mutex::new(data),
		}
	}

	/// Consumes the mutex and returns the inner value.
	pub fn into_inner(self) -> T {
		self.inner.into_inner()
	}
}

impl<T: ?Sized, const INT: bool> Mutex<T, INT> {
	/// Acquires the mutex.
	///
	/// The function returns a [`MutexGuard`] associated with `self`. When
	/// dropped, the mutex is unlocked and, if `INT`, the interrupt flag is
	/// restored.
	pub fn lock(&self) -> MutexGuard<'_, T, INT> {
		let int_state = if INT {
			let state = x86::is_interrupt_enabled();
			x86::cli();
			state
		} else {
			false
		};
		MutexGuard {
			inner: ManuallyDrop::new(self.inner.lock()),
			int_state,
		}
	}
}

impl<T: Default, const INT: bool> Default for Mutex<T, INT> {
	fn default() -> Self {
		Self::new(Default::default())
	}
}

impl<T: ?Sized + fmt::Debug, const INT: bool> fmt::Debug for Mutex<T, INT> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.lock(), f)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn mutex_basic() {
		let m = Mutex::<_, false>::new(1);
		*m.lock() += 1;
		assert_eq!(*m.lock(), 2);
	}

	#[test]
	fn int_mutex_masks() {
		x86::sti();
		let m = IntMutex::new(());
		{
			let _guard = m.lock();
			assert!(!x86::is_interrupt_enabled());
		}
		assert!(x86::is_interrupt_enabled());
	}
}
