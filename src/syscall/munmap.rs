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

//! The `munmap` system call unmaps a region of the calling process's address
//! space.

use super::mem_space;
use crate::{
	errno,
	errno::EResult,
	int::IntFrame,
	memory::{VirtAddr, PAGE_SIZE},
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

pub fn munmap(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let addr = VirtAddr(frame.syscall_arg(0));
	let length = frame.syscall_arg(1);
	if !addr.is_aligned_to(PAGE_SIZE) || length == 0 {
		return Err(errno!(EINVAL));
	}
	let space = mem_space(proc)?;
	// Only whole areas can be unmapped
	let area = space.find_region(addr).ok_or(errno!(EINVAL))?;
	if area.begin() != addr {
		return Err(errno!(EINVAL));
	}
	space.unmap(addr)?;
	Ok(0)
}
