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

//! The `getcwd` system call copies the current working directory into a user
//! buffer.

use super::mem_space;
use crate::{
	errno,
	errno::EResult,
	int::IntFrame,
	memory::VirtAddr,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

pub fn getcwd(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let buf = VirtAddr(frame.syscall_arg(0));
	let size = frame.syscall_arg(1);
	let space = mem_space(proc)?;
	let cwd = proc.lock().cwd.clone();
	let bytes = cwd.as_str().as_bytes();
	if bytes.len() + 1 > size {
		return Err(errno!(ERANGE));
	}
	space.copy_to_user(buf, bytes)?;
	space.copy_to_user(buf + bytes.len(), &[0])?;
	Ok(bytes.len() + 1)
}
