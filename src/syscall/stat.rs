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

//! The `stat` system call returns the status of a file.

use super::{mem_space, write_stat};
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

pub fn stat(
	kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let pathname = VirtAddr(frame.syscall_arg(0));
	let statbuf = VirtAddr(frame.syscall_arg(1));
	let space = mem_space(proc)?;
	let path = space.copy_string_from_user(pathname)?;
	let rs = proc.lock().resolution_settings(true);
	let stat = kernel.vfs.stat(Path::new(&path)?, &rs)?;
	write_stat(&space, &stat, statbuf)?;
	Ok(0)
}
