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

//! System calls.
//!
//! The system call gate enters [`syscall_handler`] with the trap frame. The
//! call is dispatched on `eax`; arguments are taken from `ebx`, `ecx`,
//! `edx`, `esi`, `edi` and `ebp`, and the result is written back to `eax`
//! before returning to user mode. A negative value in `eax` carries the
//! errno.

mod brk;
mod chdir;
mod close;
mod creat;
mod dup;
mod exit;
mod fchdir;
mod fcntl;
mod fork;
mod fstat;
mod getcwd;
mod getdents;
mod getegid;
mod geteuid;
mod getgid;
mod getpgid;
mod getpid;
mod getppid;
mod getsid;
mod getuid;
mod ioctl;
mod lseek;
mod mkdir;
mod mmap;
mod munmap;
mod open;
mod pipe;
mod read;
mod readlink;
mod rmdir;
mod setgid;
mod setpgid;
mod setsid;
mod setuid;
mod stat;
mod symlink;
mod uname;
mod unlink;
mod write;

use crate::{
	errno,
	errno::EResult,
	int::{IntFrame, TrapOutcome},
	memory::VirtAddr,
	process::{mem_space::MemSpace, Process, Signal},
	sync::mutex::IntMutex,
	Kernel,
};
use alloc::{sync::Arc, vec::Vec};

use brk::brk;
use chdir::chdir;
use close::close;
use creat::creat;
use dup::dup;
use exit::_exit;
use fchdir::fchdir;
use fcntl::fcntl;
use fork::fork;
use fstat::fstat;
use getcwd::getcwd;
use getdents::getdents;
use getegid::getegid;
use geteuid::geteuid;
use getgid::getgid;
use getpgid::getpgid;
use getpid::getpid;
use getppid::getppid;
use getsid::getsid;
use getuid::getuid;
use ioctl::ioctl;
use lseek::lseek;
use mkdir::mkdir;
use mmap::mmap;
use munmap::munmap;
use open::open;
use pipe::pipe;
use read::read;
use readlink::readlink;
use rmdir::rmdir;
use setgid::setgid;
use setpgid::setpgid;
use setsid::setsid;
use setuid::setuid;
use stat::stat;
use symlink::symlink;
use uname::uname;
use unlink::unlink;
use write::write;

/// Returns the memory space of the given process.
///
/// A process without a memory space cannot take arguments from user memory.
pub(super) fn mem_space(proc: &Arc<IntMutex<Process>>) -> EResult<Arc<MemSpace>> {
	proc.lock().mem_space.clone().ok_or(errno!(EFAULT))
}

/// Serializes `stat` into the user memory of `space` at `addr`.
///
/// The layout matches the 32-bit `stat` structure: device, inode, mode, link
/// count, owner, group, size and timestamps.
pub(super) fn write_stat(
	space: &MemSpace,
	stat: &crate::file::Stat,
	addr: VirtAddr,
) -> EResult<()> {
	let mut buf: Vec<u8> = Vec::with_capacity(32);
	buf.extend_from_slice(&0u32.to_le_bytes());
	buf.extend_from_slice(&(stat.ino as u32).to_le_bytes());
	buf.extend_from_slice(&stat.mode.to_le_bytes());
	buf.extend_from_slice(&stat.nlink.to_le_bytes());
	buf.extend_from_slice(&stat.uid.to_le_bytes());
	buf.extend_from_slice(&stat.gid.to_le_bytes());
	buf.extend_from_slice(&0u16.to_le_bytes());
	buf.extend_from_slice(&(stat.size as u32).to_le_bytes());
	buf.extend_from_slice(&(stat.atime as u32).to_le_bytes());
	buf.extend_from_slice(&(stat.mtime as u32).to_le_bytes());
	buf.extend_from_slice(&(stat.ctime as u32).to_le_bytes());
	space.copy_to_user(addr, &buf)
}

/// Executes the system call associated with the given `id` and returns its
/// result.
///
/// If the system call does not exist, the function returns `None`.
fn do_syscall(
	kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &IntFrame,
	id: usize,
) -> Option<EResult<usize>> {
	match id {
		0x001 => Some(_exit(kernel, proc, frame)),
		0x002 => Some(fork(kernel, proc, frame)),
		0x003 => Some(read(kernel, proc, frame)),
		0x004 => Some(write(kernel, proc, frame)),
		0x005 => Some(open(kernel, proc, frame)),
		0x006 => Some(close(kernel, proc, frame)),
		0x008 => Some(creat(kernel, proc, frame)),
		0x00a => Some(unlink(kernel, proc, frame)),
		0x00c => Some(chdir(kernel, proc, frame)),
		0x013 => Some(lseek(kernel, proc, frame)),
		0x014 => Some(getpid(kernel, proc, frame)),
		0x017 => Some(setuid(kernel, proc, frame)),
		0x018 => Some(getuid(kernel, proc, frame)),
		0x027 => Some(mkdir(kernel, proc, frame)),
		0x028 => Some(rmdir(kernel, proc, frame)),
		0x029 => Some(dup(kernel, proc, frame)),
		0x02a => Some(pipe(kernel, proc, frame)),
		0x02d => Some(brk(kernel, proc, frame)),
		0x02e => Some(setgid(kernel, proc, frame)),
		0x02f => Some(getgid(kernel, proc, frame)),
		0x031 => Some(geteuid(kernel, proc, frame)),
		0x032 => Some(getegid(kernel, proc, frame)),
		0x036 => Some(ioctl(kernel, proc, frame)),
		0x037 => Some(fcntl(kernel, proc, frame)),
		0x039 => Some(setpgid(kernel, proc, frame)),
		0x040 => Some(getppid(kernel, proc, frame)),
		0x042 => Some(setsid(kernel, proc, frame)),
		0x053 => Some(symlink(kernel, proc, frame)),
		0x055 => Some(readlink(kernel, proc, frame)),
		0x05a => Some(mmap(kernel, proc, frame)),
		0x05b => Some(munmap(kernel, proc, frame)),
		0x06a => Some(stat(kernel, proc, frame)),
		0x06c => Some(fstat(kernel, proc, frame)),
		0x07a => Some(uname(kernel, proc, frame)),
		0x084 => Some(getpgid(kernel, proc, frame)),
		0x085 => Some(fchdir(kernel, proc, frame)),
		0x08d => Some(getdents(kernel, proc, frame)),
		0x093 => Some(getsid(kernel, proc, frame)),
		0x0b7 => Some(getcwd(kernel, proc, frame)),
		_ => None,
	}
}

/// Called whenever a system call is triggered.
///
/// The return value is written into the frame's `eax`; kernel errors are
/// normalized to their negative errno. An unknown system call number kills
/// the process with `SIGSYS`.
pub fn syscall_handler(
	kernel: &Kernel,
	proc: &Arc<IntMutex<Process>>,
	frame: &mut IntFrame,
) -> TrapOutcome {
	let id = frame.syscall_id();
	let Some(result) = do_syscall(kernel, proc, frame, id) else {
		let mut proc = proc.lock();
		log::warn!(
			"process {pid}: invalid syscall (ID: {id:#x})",
			pid = proc.pid()
		);
		// SIGSYS cannot be caught, thus the process will be terminated
		proc.kill(Signal::SIGSYS);
		return TrapOutcome::Signal(Signal::SIGSYS);
	};
	let value = match result {
		Ok(value) => value,
		Err(errno) => errno.to_ret(),
	};
	frame.set_syscall_return(value);
	TrapOutcome::Handled
}
