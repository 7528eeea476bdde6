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

//! The `uname` system call returns system information.

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

/// The length of each `utsname` field.
const UTSNAME_LENGTH: usize = 65;

/// The fields of the `utsname` structure, in order: system name, node name,
/// release, version and machine.
const UTSNAME: &[&str] = &["Minos", "minos", "0.1.0", "Minos 0.1.0", "i686"];

pub fn uname(
	_kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let buf = VirtAddr(frame.syscall_arg(0));
	let space = mem_space(proc)?;
	let mut out = alloc::vec![0u8; UTSNAME_LENGTH * UTSNAME.len()];
	for (i, field) in UTSNAME.iter().enumerate() {
		let begin = i * UTSNAME_LENGTH;
		out[begin..begin + field.len()].copy_from_slice(field.as_bytes());
	}
	space.copy_to_user(buf, &out)?;
	Ok(0)
}
