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

//! The `pipe` system call creates a pipe, writing the two new file
//! descriptors to user memory.

use super::mem_space;
use crate::{
	errno::EResult,
	file::pipe::new_pipe,
	int::IntFrame,
	memory::VirtAddr,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

pub fn pipe(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let pipefd = VirtAddr(frame.syscall_arg(0));
	let space = mem_space(proc)?;
	let (read, write) = new_pipe();
	let (fd0, fd1) = {
		let mut proc = proc.lock();
		let fd0 = proc.fds.create_fd(0, read)?;
		let fd1 = match proc.fds.create_fd(0, write) {
			Ok(fd1) => fd1,
			Err(e) => {
				// Do not leak the first descriptor
				let _ = proc.fds.close_fd(fd0);
				return Err(e);
			}
		};
		(fd0, fd1)
	};
	let mut buf = [0u8; 8];
	buf[..4].copy_from_slice(&(fd0 as i32).to_le_bytes());
	buf[4..].copy_from_slice(&(fd1 as i32).to_le_bytes());
	space.copy_to_user(pipefd, &buf)?;
	Ok(0)
}
