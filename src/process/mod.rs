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

//! Processes.
//!
//! The substrate models the parts of a process the memory and file layers
//! depend on: identifiers, credentials, the working directory, the open file
//! table, the memory space and pending signals. Scheduling policy lives
//! outside; the scheduler drives context switches through
//! [`MemSpace::bind`](mem_space::MemSpace::bind) and the TSS.

pub mod mem_space;

use crate::{
	errno::EResult,
	file::{
		fd::FileDescriptorTable,
		path::PathBuf,
		perm::AccessProfile,
		vfs::ResolutionSettings,
		Mode,
	},
	memory::frame::Memory,
	sync::mutex::IntMutex,
};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};
use mem_space::MemSpace;

/// Type representing a process ID.
pub type Pid = u32;

/// The default size of a process's stack, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 8 * crate::memory::PAGE_SIZE;

/// The signals the core itself raises.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal {
	/// Kill, cannot be caught.
	SIGKILL,
	/// Invalid memory reference.
	SIGSEGV,
	/// Bad system call.
	SIGSYS,
}

impl Signal {
	/// Returns the signal's number.
	pub fn number(self) -> u32 {
		match self {
			Self::SIGKILL => 9,
			Self::SIGSEGV => 11,
			Self::SIGSYS => 31,
		}
	}
}

/// The next process ID to hand out.
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

fn alloc_pid() -> Pid {
	NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

/// A process.
pub struct Process {
	/// The process's ID.
	pid: Pid,
	/// The parent process's ID.
	ppid: Pid,
	/// The process group ID.
	pub pgid: Pid,
	/// The session ID.
	pub sid: Pid,

	/// The process's credentials.
	pub ap: AccessProfile,
	/// The process's file creation mask.
	pub umask: Mode,
	/// The current working directory.
	pub cwd: PathBuf,
	/// The open file table.
	pub fds: FileDescriptorTable,
	/// The process's memory space.
	pub mem_space: Option<Arc<MemSpace>>,

	/// Signals queued for delivery on the next return to user mode.
	pending_signals: alloc::vec::Vec<Signal>,
	/// Tells whether the process has exited.
	exited: bool,
}

impl Process {
	/// Creates a new process with a blank memory space.
	///
	/// Arguments:
	/// - `mem` is the physical memory backing the process's memory space
	/// - `stack_size` is the size of the stack area, in bytes
	pub fn new(mem: Arc<Memory>, stack_size: usize) -> EResult<Arc<IntMutex<Self>>> {
		let mem_space = MemSpace::new(mem, stack_size)?;
		let pid = alloc_pid();
		Ok(Arc::new(IntMutex::new(Self {
			pid,
			ppid: 0,
			pgid: pid,
			sid: pid,

			ap: AccessProfile::KERNEL,
			umask: 0o022,
			cwd: PathBuf::root(),
			fds: FileDescriptorTable::default(),
			mem_space: Some(Arc::new(mem_space)),

			pending_signals: alloc::vec::Vec::new(),
			exited: false,
		})))
	}

	/// Returns the process's ID.
	pub fn pid(&self) -> Pid {
		self.pid
	}

	/// Returns the parent process's ID.
	pub fn ppid(&self) -> Pid {
		self.ppid
	}

	/// Returns the resolution settings matching the process's credentials
	/// and working directory.
	pub fn resolution_settings(&self, follow_link: bool) -> ResolutionSettings {
		ResolutionSettings {
			ap: self.ap,
			cwd: self.cwd.clone(),
			follow_link,
		}
	}

	/// Forks the process.
	///
	/// The child gets a copy of the file descriptor table (every open file
	/// gains one reference) and a deep copy of the memory space.
	pub fn fork(&self) -> EResult<Arc<IntMutex<Self>>> {
		let mem_space = match &self.mem_space {
			Some(space) => Some(Arc::new(space.fork()?)),
			None => None,
		};
		Ok(Arc::new(IntMutex::new(Self {
			pid: alloc_pid(),
			ppid: self.pid,
			pgid: self.pgid,
			sid: self.sid,

			ap: self.ap,
			umask: self.umask,
			cwd: self.cwd.clone(),
			fds: self.fds.duplicate(false),
			mem_space,

			pending_signals: alloc::vec::Vec::new(),
			exited: false,
		})))
	}

	/// Queues a signal for delivery on the next return to user mode.
	pub fn kill(&mut self, signal: Signal) {
		if !self.pending_signals.contains(&signal) {
			self.pending_signals.push(signal);
		}
	}

	/// Tells whether the process has a pending signal.
	pub fn has_pending_signal(&self) -> bool {
		!self.pending_signals.is_empty()
	}

	/// Takes the next pending signal.
	pub fn take_pending_signal(&mut self) -> Option<Signal> {
		if self.pending_signals.is_empty() {
			None
		} else {
			Some(self.pending_signals.remove(0))
		}
	}

	/// Exits the process: every open file descriptor is closed and the
	/// memory space is released.
	pub fn exit(&mut self) {
		self.fds.close_all();
		self.mem_space = None;
		self.exited = true;
	}

	/// Tells whether the process has exited.
	pub fn has_exited(&self) -> bool {
		self.exited
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::memory::{frame::test::test_memory, PAGE_SIZE};

	#[test]
	fn process_ids() {
		let mem = Arc::new(test_memory());
		let proc = Process::new(mem, 2 * PAGE_SIZE).unwrap();
		let proc = proc.lock();
		assert_eq!(proc.pgid, proc.pid());
		assert_eq!(proc.sid, proc.pid());
	}

	#[test]
	fn fork_distinct_pid_and_spaces() {
		let mem = Arc::new(test_memory());
		let parent = Process::new(mem, 2 * PAGE_SIZE).unwrap();
		let parent = parent.lock();
		let child = parent.fork().unwrap();
		let child = child.lock();
		assert_ne!(parent.pid(), child.pid());
		assert_eq!(child.ppid(), parent.pid());
		let parent_space = parent.mem_space.as_ref().unwrap();
		let child_space = child.mem_space.as_ref().unwrap();
		assert!(!Arc::ptr_eq(parent_space, child_space));
		assert_eq!(parent_space.map_count(), child_space.map_count());
	}

	#[test]
	fn signals_queue_once() {
		let mem = Arc::new(test_memory());
		let proc = Process::new(mem, 2 * PAGE_SIZE).unwrap();
		let mut proc = proc.lock();
		proc.kill(Signal::SIGSEGV);
		proc.kill(Signal::SIGSEGV);
		assert!(proc.has_pending_signal());
		assert_eq!(proc.take_pending_signal(), Some(Signal::SIGSEGV));
		assert_eq!(proc.take_pending_signal(), None);
	}
}
