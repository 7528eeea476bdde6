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

//! File descriptors implementation.
//!
//! A file descriptor is an ID held by a process pointing to an entry in its
//! open file table. The table starts with [`limits::MAX_OPEN_FD`] slots and
//! grows by doubling (plus one) up to an absolute limit.

use crate::{
	errno,
	errno::EResult,
	file::File,
	limits,
};
use alloc::{sync::Arc, vec, vec::Vec};
use core::fmt;

/// File descriptor flag: if set, the file descriptor is closed on successful
/// call to `execve`.
pub const FD_CLOEXEC: i32 = 1;

/// Constraint on a new file descriptor ID.
#[derive(Debug)]
pub enum NewFDConstraint {
	/// No constraint.
	None,
	/// The new file descriptor must have the given fixed value.
	Fixed(u32),
	/// The new file descriptor must have at least the given value.
	Min(u32),
}

/// A file descriptor, pointing to a [`File`].
#[derive(Clone)]
pub struct FileDescriptor {
	/// The file descriptor's flags.
	pub flags: i32,
	/// The open file the descriptor points to.
	file: Arc<File>,
}

impl FileDescriptor {
	/// Creates a new file descriptor pointing to `file`.
	pub fn new(flags: i32, file: Arc<File>) -> Self {
		Self {
			flags,
			file,
		}
	}

	/// Returns the open file associated with the descriptor.
	pub fn get_file(&self) -> &Arc<File> {
		&self.file
	}

	/// Closes the file descriptor.
	///
	/// If the descriptor is the last reference to the underlying open file,
	/// the file's `close` operation is invoked.
	pub fn close(self) {
		File::close(self.file);
	}
}

impl fmt::Debug for FileDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FileDescriptor")
			.field("flags", &self.flags)
			.field("file", &self.file.path)
			.finish()
	}
}

/// A table of file descriptors.
pub struct FileDescriptorTable(Vec<Option<FileDescriptor>>);

impl Default for FileDescriptorTable {
	fn default() -> Self {
		Self(vec![None; limits::MAX_OPEN_FD])
	}
}

impl FileDescriptorTable {
	/// The maximum number of slots the table may grow to.
	const SLOTS_MAX: usize = limits::MAX_OPEN_FD * limits::FD_GROWTH_LIMIT;

	/// Returns the available file descriptor with the lowest ID of at least
	/// `min`, growing the table if necessary.
	///
	/// If no ID is available, the function returns `EMFILE`.
	fn get_available_fd(&mut self, min: u32) -> EResult<u32> {
		let min = min as usize;
		loop {
			if min < self.0.len() {
				let hole = self.0[min..]
					.iter()
					.enumerate()
					.find(|(_, fd)| fd.is_none())
					.map(|(i, _)| (min + i) as u32);
				if let Some(fd) = hole {
					return Ok(fd);
				}
			}
			// No hole: double the table, within the absolute limit
			let new_len = (self.0.len() * 2 + 1).min(Self::SLOTS_MAX).max(min + 1);
			if new_len <= self.0.len() || new_len > Self::SLOTS_MAX {
				return Err(errno!(EMFILE));
			}
			self.0.resize(new_len, None);
		}
	}

	/// Creates a file descriptor pointing to `file`.
	///
	/// The function returns the ID of the new file descriptor, the lowest
	/// unused one.
	pub fn create_fd(&mut self, flags: i32, file: Arc<File>) -> EResult<u32> {
		let id = self.get_available_fd(0)?;
		self.0[id as usize] = Some(FileDescriptor::new(flags, file));
		Ok(id)
	}

	/// Returns the file descriptor with ID `id`.
	///
	/// If the file descriptor does not exist, the function returns `EBADF`.
	pub fn get_fd(&self, id: u32) -> EResult<&FileDescriptor> {
		self.0
			.get(id as usize)
			.and_then(Option::as_ref)
			.ok_or(errno!(EBADF))
	}

	/// Returns a mutable reference to the file descriptor with ID `id`.
	pub fn get_fd_mut(&mut self, id: u32) -> EResult<&mut FileDescriptor> {
		self.0
			.get_mut(id as usize)
			.and_then(Option::as_mut)
			.ok_or(errno!(EBADF))
	}

	/// Duplicates the file descriptor with ID `id`.
	///
	/// Arguments:
	/// - `constraint` is the constraint the new file descriptor ID follows
	/// - `cloexec` tells whether the new descriptor has the `FD_CLOEXEC`
	///   flag set
	///
	/// The underlying file gains one reference.
	pub fn duplicate_fd(
		&mut self,
		id: u32,
		constraint: NewFDConstraint,
		cloexec: bool,
	) -> EResult<u32> {
		let new_id = match constraint {
			NewFDConstraint::None => self.get_available_fd(0)?,
			NewFDConstraint::Fixed(id) => {
				if id as usize >= Self::SLOTS_MAX {
					return Err(errno!(EMFILE));
				}
				if id as usize >= self.0.len() {
					self.0.resize(id as usize + 1, None);
				}
				id
			}
			NewFDConstraint::Min(min) => self.get_available_fd(min)?,
		};
		let mut new_fd = self.get_fd(id)?.clone();
		new_fd.flags = if cloexec { FD_CLOEXEC } else { 0 };
		// Replacing a descriptor at a fixed ID closes the previous one
		if let Some(old) = self.0[new_id as usize].take() {
			old.close();
		}
		self.0[new_id as usize] = Some(new_fd);
		Ok(new_id)
	}

	/// Duplicates the whole table, as `fork` does: every slot is copied and
	/// every open file gains one reference.
	///
	/// `cloexec` tells whether descriptors with the `FD_CLOEXEC` flag are
	/// dropped, which is the case when executing a program.
	pub fn duplicate(&self, cloexec: bool) -> Self {
		let fds = self
			.0
			.iter()
			.map(|fd| {
				fd.clone()
					.filter(|fd| !cloexec || fd.flags & FD_CLOEXEC == 0)
			})
			.collect();
		Self(fds)
	}

	/// Closes the file descriptor with the ID `id`.
	///
	/// If the file descriptor does not exist, the function returns `EBADF`.
	pub fn close_fd(&mut self, id: u32) -> EResult<()> {
		let fd = self
			.0
			.get_mut(id as usize)
			.and_then(Option::take)
			.ok_or(errno!(EBADF))?;
		fd.close();
		Ok(())
	}

	/// Closes every open file descriptor, as `exit` does.
	pub fn close_all(&mut self) {
		for fd in self.0.iter_mut() {
			if let Some(fd) = fd.take() {
				fd.close();
			}
		}
	}

	/// Returns the number of open file descriptors.
	pub fn open_count(&self) -> usize {
		self.0.iter().filter(|fd| fd.is_some()).count()
	}
}

impl fmt::Debug for FileDescriptorTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let open: Vec<_> = self
			.0
			.iter()
			.enumerate()
			.filter_map(|(i, fd)| fd.as_ref().map(|fd| (i, fd)))
			.collect();
		f.debug_map().entries(open).finish()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::file::{path::PathBuf, FileOps, Stat};
	use alloc::string::String;

	/// Dummy file operations for testing purpose.
	struct DummyOps;

	impl FileOps for DummyOps {
		fn stat(&self) -> EResult<Stat> {
			Ok(Stat::default())
		}
	}

	/// Creates a dummy open file for testing purpose.
	fn dummy_file() -> Arc<File> {
		File::new(
			String::from("dummy"),
			PathBuf::root(),
			0,
			Arc::new(DummyOps),
		)
	}

	#[test]
	fn fd_create_lowest() {
		let mut fds = FileDescriptorTable::default();
		assert_eq!(fds.create_fd(0, dummy_file()).unwrap(), 0);
		assert_eq!(fds.create_fd(0, dummy_file()).unwrap(), 1);
		fds.close_fd(0).unwrap();
		assert_eq!(fds.create_fd(0, dummy_file()).unwrap(), 0);
	}

	#[test]
	fn fd_dup() {
		let mut fds = FileDescriptorTable::default();
		let id = fds.create_fd(0, dummy_file()).unwrap();
		let id0 = fds.duplicate_fd(id, NewFDConstraint::None, false).unwrap();
		assert_ne!(id0, id);
		let id1 = fds
			.duplicate_fd(id, NewFDConstraint::Fixed(16), false)
			.unwrap();
		assert_eq!(id1, 16);
		let id2 = fds.duplicate_fd(id, NewFDConstraint::Min(8), true).unwrap();
		assert!(id2 >= 8);
		assert_eq!(fds.get_fd(id2).unwrap().flags, FD_CLOEXEC);
		// Every duplicate shares the same open file
		let file = fds.get_fd(id).unwrap().get_file().clone();
		assert_eq!(File::ref_count(&file), 5);
	}

	#[test]
	fn fd_table_growth_and_limit() {
		let mut fds = FileDescriptorTable::default();
		for _ in 0..FileDescriptorTable::SLOTS_MAX {
			fds.create_fd(0, dummy_file()).unwrap();
		}
		assert_eq!(
			fds.create_fd(0, dummy_file()).unwrap_err(),
			errno!(EMFILE)
		);
		assert_eq!(fds.open_count(), FileDescriptorTable::SLOTS_MAX);
	}

	#[test]
	fn fd_fork_ref_counts() {
		let mut fds = FileDescriptorTable::default();
		let file = dummy_file();
		let id = fds.create_fd(0, file.clone()).unwrap();
		assert_eq!(File::ref_count(&file), 2);
		let mut child = fds.duplicate(false);
		assert_eq!(File::ref_count(&file), 3);
		child.close_all();
		assert_eq!(File::ref_count(&file), 2);
		fds.close_fd(id).unwrap();
		assert_eq!(File::ref_count(&file), 1);
	}

	#[test]
	fn fd_cloexec_dropped_on_exec() {
		let mut fds = FileDescriptorTable::default();
		let keep = fds.create_fd(0, dummy_file()).unwrap();
		let drop_ = fds.create_fd(FD_CLOEXEC, dummy_file()).unwrap();
		let exec = fds.duplicate(true);
		assert!(exec.get_fd(keep).is_ok());
		assert!(exec.get_fd(drop_).is_err());
	}
}
