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

//! Filesystems handling.
//!
//! A [`FilesystemType`] is the named driver registered with the VFS; mounting
//! it yields a [`Filesystem`] instance serving namespace operations relative
//! to its root. Operations a filesystem does not implement return `ENOSYS`.

pub mod ramfs;

use super::{path::Path, FileOps, Mode, Stat};
use crate::{errno, errno::EResult};
use alloc::{string::String, sync::Arc};

/// A filesystem type, from which filesystem instances are mounted.
pub trait FilesystemType: Send + Sync {
	/// Returns the name of the filesystem type.
	fn name(&self) -> &'static str;

	/// Mounts an instance of the filesystem.
	///
	/// Arguments:
	/// - `source` is the source of the mount (a device path, or an arbitrary
	///   name for virtual filesystems)
	/// - `target` is the path the instance is to be mounted at
	fn mount(&self, source: &str, target: &Path) -> EResult<Arc<dyn Filesystem>>;
}

/// A mounted filesystem instance.
///
/// Paths given to the operations are relative to the filesystem's root.
pub trait Filesystem: Send + Sync {
	/// Returns the status of the file at `path`.
	fn stat(&self, path: &Path) -> EResult<Stat>;

	/// Opens the file at `path`, returning its per-file operations.
	fn open(&self, _path: &Path) -> EResult<Arc<dyn FileOps>> {
		Err(errno!(ENOSYS))
	}

	/// Creates a regular file at `path` with the given mode.
	fn creat(&self, _path: &Path, _mode: Mode) -> EResult<()> {
		Err(errno!(ENOSYS))
	}

	/// Creates a directory at `path` with the given mode.
	fn mkdir(&self, _path: &Path, _mode: Mode) -> EResult<()> {
		Err(errno!(ENOSYS))
	}

	/// Removes the empty directory at `path`.
	fn rmdir(&self, _path: &Path) -> EResult<()> {
		Err(errno!(ENOSYS))
	}

	/// Removes the file at `path`.
	fn unlink(&self, _path: &Path) -> EResult<()> {
		Err(errno!(ENOSYS))
	}

	/// Creates a symbolic link at `path` pointing to `target`.
	fn symlink(&self, _path: &Path, _target: &str) -> EResult<()> {
		Err(errno!(ENOSYS))
	}

	/// Returns the target of the symbolic link at `path`.
	fn readlink(&self, _path: &Path) -> EResult<String> {
		Err(errno!(ENOSYS))
	}
}
