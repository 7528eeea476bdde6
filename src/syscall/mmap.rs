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

//! The `mmap` system call maps a chunk of anonymous memory into the calling
//! process's address space.

use super::mem_space;
use crate::{
	errno,
	errno::EResult,
	memory::{vmem::VmFlags, VirtAddr, PAGE_SIZE},
	int::IntFrame,
	process::{mem_space::RangeCheck, Process},
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::sync::Arc;

/// Page can be read.
pub const PROT_READ: usize = 0x1;
/// Page can be written.
pub const PROT_WRITE: usize = 0x2;
/// Page can be executed.
pub const PROT_EXEC: usize = 0x4;

/// Changes are not carried to the underlying file.
pub const MAP_PRIVATE: usize = 0x2;
/// Interpret the address exactly.
pub const MAP_FIXED: usize = 0x10;
/// The mapping is not backed by any file.
pub const MAP_ANONYMOUS: usize = 0x20;

pub fn mmap(
	kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let addr = VirtAddr(frame.syscall_arg(0));
	let length = frame.syscall_arg(1);
	let prot = frame.syscall_arg(2);
	let flags = frame.syscall_arg(3);
	if length == 0 {
		return Err(errno!(EINVAL));
	}
	// Only anonymous mappings are supported by the core
	if flags & MAP_ANONYMOUS == 0 {
		return Err(errno!(ENOSYS));
	}
	let space = mem_space(proc)?;
	let length = length.next_multiple_of(PAGE_SIZE);
	let mut vm_flags = VmFlags::PRESENT | VmFlags::USER;
	if prot & PROT_WRITE != 0 {
		vm_flags |= VmFlags::RW;
	}
	// Use the address as a hint if it is free, unless the mapping is fixed
	let begin = match space.is_range_valid(addr, addr + length) {
		RangeCheck::Valid => addr,
		_ if flags & MAP_FIXED != 0 => return Err(errno!(EINVAL)),
		_ => space.search_free_area(length)?,
	};
	let begin = space.map(begin, length, vm_flags, kernel.mem.user_zone_hint())?;
	Ok(begin.0)
}
