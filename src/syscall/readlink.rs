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

//! The `readlink` system call reads the target of a symbolic link.

use super::mem_space;
use crate::{
	errno::EResult,
	file::path::Path,
	int::IntFrame,
	memory::VirtAddr,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

pub fn readlink(
	kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let pathname = VirtAddr(frame.syscall_arg(0));
	let buf = VirtAddr(frame.syscall_arg(1));
	let bufsiz = frame.syscall_arg(2);
	let space = mem_space(proc)?;
	let path = space.copy_string_from_user(pathname)?;
	let rs = proc.lock().resolution_settings(false);
	let target = kernel.vfs.readlink(Path::new(&path)?, &rs)?;
	// Truncated to the buffer's size, no trailing NUL
	let len = target.len().min(bufsiz);
	space.copy_to_user(buf, &target.as_bytes()[..len])?;
	Ok(len)
}
