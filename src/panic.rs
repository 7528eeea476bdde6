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

//! Kernel panic.
//!
//! A fault taken in kernel mode cannot be recovered from: the kernel dumps
//! the trap frame and halts.

use crate::int::{fmt_trap, IntFrame};

/// Halts the kernel with a dump of the given trap frame.
pub fn kernel_panic(frame: &IntFrame) -> ! {
	let dump = fmt_trap(frame);
	log::error!("kernel panic\n{dump}");
	panic!("kernel panic: {dump}");
}
