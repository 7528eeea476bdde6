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

//! The `write` system call writes user memory to a file descriptor.

use super::mem_space;
use crate::{
	errno::EResult,
	int::IntFrame,
	memory::VirtAddr,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

pub fn write(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let fd = frame.syscall_arg(0) as u32;
	let buf = VirtAddr(frame.syscall_arg(1));
	let count = frame.syscall_arg(2);
	let space = mem_space(proc)?;
	let file = proc.lock().fds.get_fd(fd)?.get_file().clone();
	let mut kbuf = alloc::vec![0u8; count];
	space.copy_from_user(buf, &mut kbuf)?;
	file.write(&kbuf)
}
