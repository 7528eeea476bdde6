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

//! The `setsid` system call creates a new session, with the calling process as its leader.

use crate::{
	errno::EResult,
	int::IntFrame,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

pub fn setsid(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	_frame: &IntFrame,
) -> EResult<usize> {
	let mut proc = proc.lock();
	let pid = proc.pid();
	proc.sid = pid;
	proc.pgid = pid;
	Ok(pid as usize)
}
