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

//! The `getdents` system call reads directory entries into a user buffer.
//!
//! Each record is the inode number, the record length, the entry type and
//! the NUL-terminated name. The file offset counts entries already consumed,
//! so successive calls walk the directory.

use super::mem_space;
use crate::{
	errno,
	errno::EResult,
	file::{FileType, SEEK_SET},
	int::IntFrame,
	memory::VirtAddr,
	process::Process,
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::{sync::Arc, vec::Vec};

/// Returns the `d_type` value for a directory entry type.
fn dirent_type(entry_type: FileType) -> u8 {
	match entry_type {
		FileType::Fifo => 1,
		FileType::CharDevice => 2,
		FileType::Directory => 4,
		FileType::BlockDevice => 6,
		FileType::Regular => 8,
		FileType::Link => 10,
		FileType::Socket => 12,
	}
}

pub fn getdents(
	kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
) -> EResult<usize> {
	let fd = frame.syscall_arg(0) as u32;
	let dirp = VirtAddr(frame.syscall_arg(1));
	let count = frame.syscall_arg(2);
	let space = mem_space(proc)?;
	let file = proc.lock().fds.get_fd(fd)?.get_file().clone();
	let entries = kernel.vfs.getdents(&file)?;
	let mut consumed = file.pos() as usize;
	let mut out: Vec<u8> = Vec::new();
	while consumed < entries.len() {
		let entry = &entries[consumed];
		let reclen = 4 + 2 + 1 + entry.name.len() + 1;
		if out.len() + reclen > count {
			break;
		}
		out.extend_from_slice(&(entry.ino as u32).to_le_bytes());
		out.extend_from_slice(&(reclen as u16).to_le_bytes());
		out.push(dirent_type(entry.entry_type));
		out.extend_from_slice(entry.name.as_bytes());
		out.push(0);
		consumed += 1;
	}
	if out.is_empty() && consumed < entries.len() {
		// The buffer cannot hold even one record
		return Err(errno!(EINVAL));
	}
	space.copy_to_user(dirp, &out)?;
	file.seek(consumed as i64, SEEK_SET)?;
	Ok(out.len())
}
