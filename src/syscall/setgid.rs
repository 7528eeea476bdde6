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

//! The `setgid` system call sets the group ID of the calling process.

use crate::{
	errno,
	errno::EResult,
	int::IntFrame,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

pub fn setgid(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let gid = frame.syscall_arg(0) as u16;
	let mut proc = proc.lock();
	if proc.ap.is_privileged() {
		proc.ap.gid = gid;
		proc.ap.egid = gid;
		Ok(0)
	} else if gid == proc.ap.gid {
		proc.ap.egid = gid;
		Ok(0)
	} else {
		Err(errno!(EPERM))
	}
}
