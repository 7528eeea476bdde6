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

//! The `fcntl` system call manipulates an open file descriptor.

use crate::{
	errno,
	errno::EResult,
	file::fd::NewFDConstraint,
	int::IntFrame,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

/// Duplicate the descriptor onto the lowest free one at least `arg`.
pub const F_DUPFD: u32 = 0;
/// Get the descriptor's flags.
pub const F_GETFD: u32 = 1;
/// Set the descriptor's flags.
pub const F_SETFD: u32 = 2;
/// Get the open file's flags.
pub const F_GETFL: u32 = 3;

pub fn fcntl(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let fd = frame.syscall_arg(0) as u32;
	let cmd = frame.syscall_arg(1) as u32;
	let arg = frame.syscall_arg(2);
	let mut proc = proc.lock();
	match cmd {
		F_DUPFD => {
			let new = proc
				.fds
				.duplicate_fd(fd, NewFDConstraint::Min(arg as u32), false)?;
			Ok(new as usize)
		}
		F_GETFD => Ok(proc.fds.get_fd(fd)?.flags as usize),
		F_SETFD => {
			proc.fds.get_fd_mut(fd)?.flags = arg as i32;
			Ok(0)
		}
		F_GETFL => Ok(proc.fds.get_fd(fd)?.get_file().flags as usize),
		_ => Err(errno!(EINVAL)),
	}
}
