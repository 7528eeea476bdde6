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

//! The `getpgid` system call returns the process group ID of a process.

use crate::{
	errno,
	errno::EResult,
	int::IntFrame,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

pub fn getpgid(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let pid = frame.syscall_arg(0) as u32;
	let proc = proc.lock();
	if pid != 0 && pid != proc.pid() {
		return Err(errno!(ESRCH));
	}
	Ok(proc.pgid as usize)
}
