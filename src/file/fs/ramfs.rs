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

//! An in-memory filesystem.
//!
//! This is the minimal filesystem the kernel mounts at boot to host the
//! standard hierarchy; it also serves as the reference implementation of the
//! filesystem interface.

use super::{Filesystem, FilesystemType};
use crate::{
	errno,
	errno::EResult,
	file::{path::Path, DirEntry, FileOps, FileType, Mode, Stat, S_IFMT},
	sync::mutex::Mutex,
};
use alloc::{
	collections::BTreeMap,
	string::{String, ToString},
	sync::Arc,
	vec::Vec,
};
use core::sync::atomic::{AtomicU64, Ordering};

/// The content of a node.
enum NodeContent {
	Regular(Vec<u8>),
	Directory(BTreeMap<String, Arc<Node>>),
	Link(String),
}

/// A node of the filesystem tree.
struct Node {
	/// The node's inode number.
	ino: u64,
	/// The node's status, content size excluded.
	stat: Mutex<Stat>,
	/// The node's content.
	content: Mutex<NodeContent>,
}

impl Node {
	fn new(ino: u64, mode: Mode, content: NodeContent) -> Arc<Self> {
		Arc::new(Self {
			ino,
			stat: Mutex::new(Stat {
				mode,
				ino,
				nlink: 1,
				..Default::default()
			}),
			content: Mutex::new(content),
		})
	}

	/// Returns the node's status, with the size filled in.
	fn stat(&self) -> Stat {
		let mut stat = *self.stat.lock();
		stat.size = match &*self.content.lock() {
			NodeContent::Regular(data) => data.len() as u64,
			NodeContent::Directory(entries) => entries.len() as u64,
			NodeContent::Link(target) => target.len() as u64,
		};
		stat
	}

	fn file_type(&self) -> FileType {
		match &*self.content.lock() {
			NodeContent::Regular(_) => FileType::Regular,
			NodeContent::Directory(_) => FileType::Directory,
			NodeContent::Link(_) => FileType::Link,
		}
	}
}

/// An in-memory filesystem instance.
pub struct RamFs {
	/// The root node.
	root: Arc<Node>,
	/// The next inode number to hand out.
	next_ino: AtomicU64,
}

impl RamFs {
	/// Creates an instance with an empty root directory.
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			root: Node::new(
				1,
				FileType::Directory.to_mode() | 0o755,
				NodeContent::Directory(BTreeMap::new()),
			),
			next_ino: AtomicU64::new(2),
		})
	}

	fn alloc_ino(&self) -> u64 {
		self.next_ino.fetch_add(1, Ordering::Relaxed)
	}

	/// Resolves `path` to a node.
	fn get_node(&self, path: &Path) -> EResult<Arc<Node>> {
		let mut cur = self.root.clone();
		for comp in path.components() {
			let next = match &*cur.content.lock() {
				NodeContent::Directory(entries) => {
					entries.get(comp).cloned().ok_or(errno!(ENOENT))?
				}
				_ => return Err(errno!(ENOTDIR)),
			};
			cur = next;
		}
		Ok(cur)
	}

	/// Resolves the parent directory of `path` and returns it along with the
	/// final component's name.
	fn get_parent<'p>(&self, path: &'p Path) -> EResult<(Arc<Node>, &'p str)> {
		let name = path.file_name().ok_or(errno!(EINVAL))?;
		let parent = self.get_node(path.parent())?;
		Ok((parent, name))
	}

	/// Inserts a new node under the parent of `path`.
	fn insert(&self, path: &Path, mode: Mode, content: NodeContent) -> EResult<()> {
		let (parent, name) = self.get_parent(path)?;
		let mut parent_content = parent.content.lock();
		let NodeContent::Directory(entries) = &mut *parent_content else {
			return Err(errno!(ENOTDIR));
		};
		if entries.contains_key(name) {
			return Err(errno!(EEXIST));
		}
		let node = Node::new(self.alloc_ino(), mode, content);
		entries.insert(name.to_string(), node);
		Ok(())
	}
}

impl Filesystem for RamFs {
	fn stat(&self, path: &Path) -> EResult<Stat> {
		Ok(self.get_node(path)?.stat())
	}

	fn open(&self, path: &Path) -> EResult<Arc<dyn FileOps>> {
		let node = self.get_node(path)?;
		Ok(Arc::new(RamFileOps {
			node,
		}))
	}

	fn creat(&self, path: &Path, mode: Mode) -> EResult<()> {
		self.insert(
			path,
			FileType::Regular.to_mode() | (mode & !S_IFMT),
			NodeContent::Regular(Vec::new()),
		)
	}

	fn mkdir(&self, path: &Path, mode: Mode) -> EResult<()> {
		self.insert(
			path,
			FileType::Directory.to_mode() | (mode & !S_IFMT),
			NodeContent::Directory(BTreeMap::new()),
		)
	}

	fn rmdir(&self, path: &Path) -> EResult<()> {
		let (parent, name) = self.get_parent(path)?;
		let mut parent_content = parent.content.lock();
		let NodeContent::Directory(entries) = &mut *parent_content else {
			return Err(errno!(ENOTDIR));
		};
		let node = entries.get(name).ok_or(errno!(ENOENT))?;
		match &*node.content.lock() {
			NodeContent::Directory(children) => {
				if !children.is_empty() {
					return Err(errno!(ENOTEMPTY));
				}
			}
			_ => return Err(errno!(ENOTDIR)),
		}
		entries.remove(name);
		Ok(())
	}

	fn unlink(&self, path: &Path) -> EResult<()> {
		let (parent, name) = self.get_parent(path)?;
		let mut parent_content = parent.content.lock();
		let NodeContent::Directory(entries) = &mut *parent_content else {
			return Err(errno!(ENOTDIR));
		};
		let node = entries.get(name).ok_or(errno!(ENOENT))?;
		if node.file_type() == FileType::Directory {
			return Err(errno!(EISDIR));
		}
		entries.remove(name);
		Ok(())
	}

	fn symlink(&self, path: &Path, target: &str) -> EResult<()> {
		self.insert(
			path,
			FileType::Link.to_mode() | 0o777,
			NodeContent::Link(target.to_string()),
		)
	}

	fn readlink(&self, path: &Path) -> EResult<String> {
		let node = self.get_node(path)?;
		let result = match &*node.content.lock() {
			NodeContent::Link(target) => Ok(target.clone()),
			_ => Err(errno!(EINVAL)),
		};
		result
	}
}

/// Per-file operations over a node.
struct RamFileOps {
	node: Arc<Node>,
}

impl FileOps for RamFileOps {
	fn stat(&self) -> EResult<Stat> {
		Ok(self.node.stat())
	}

	fn read(&self, off: u64, buf: &mut [u8]) -> EResult<usize> {
		match &*self.node.content.lock() {
			NodeContent::Regular(data) => {
				let off = off as usize;
				if off >= data.len() {
					return Ok(0);
				}
				let len = buf.len().min(data.len() - off);
				buf[..len].copy_from_slice(&data[off..off + len]);
				Ok(len)
			}
			NodeContent::Directory(_) => Err(errno!(EISDIR)),
			NodeContent::Link(_) => Err(errno!(EINVAL)),
		}
	}

	fn write(&self, off: u64, buf: &[u8]) -> EResult<usize> {
		match &mut *self.node.content.lock() {
			NodeContent::Regular(data) => {
				let off = off as usize;
				if data.len() < off + buf.len() {
					data.resize(off + buf.len(), 0);
				}
				data[off..off + buf.len()].copy_from_slice(buf);
				Ok(buf.len())
			}
			NodeContent::Directory(_) => Err(errno!(EISDIR)),
			NodeContent::Link(_) => Err(errno!(EINVAL)),
		}
	}

	fn getdents(&self) -> EResult<Vec<DirEntry>> {
		match &*self.node.content.lock() {
			NodeContent::Directory(entries) => Ok(entries
				.iter()
				.map(|(name, node)| DirEntry {
					ino: node.ino,
					entry_type: node.file_type(),
					name: name.clone(),
				})
				.collect()),
			_ => Err(errno!(ENOTDIR)),
		}
	}

	fn truncate(&self, size: u64) -> EResult<()> {
		match &mut *self.node.content.lock() {
			NodeContent::Regular(data) => {
				data.resize(size as usize, 0);
				Ok(())
			}
			_ => Err(errno!(EINVAL)),
		}
	}
}

/// The `ramfs` filesystem type.
pub struct RamFsType;

impl FilesystemType for RamFsType {
	fn name(&self) -> &'static str {
		"ramfs"
	}

	fn mount(&self, _source: &str, _target: &Path) -> EResult<Arc<dyn Filesystem>> {
		Ok(RamFs::new())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn ramfs_create_read_write() {
		let fs = RamFs::new();
		fs.creat(Path::new("/hello").unwrap(), 0o644).unwrap();
		let ops = fs.open(Path::new("/hello").unwrap()).unwrap();
		assert_eq!(ops.write(0, b"abc").unwrap(), 3);
		assert_eq!(ops.write(3, b"def").unwrap(), 3);
		let mut buf = [0u8; 16];
		let len = ops.read(0, &mut buf).unwrap();
		assert_eq!(&buf[..len], b"abcdef");
		assert_eq!(ops.stat().unwrap().size, 6);
	}

	#[test]
	fn ramfs_dirs() {
		let fs = RamFs::new();
		fs.mkdir(Path::new("/dir").unwrap(), 0o755).unwrap();
		fs.creat(Path::new("/dir/file").unwrap(), 0o644).unwrap();
		assert_eq!(
			fs.mkdir(Path::new("/dir").unwrap(), 0o755).unwrap_err(),
			errno!(EEXIST)
		);
		assert_eq!(
			fs.rmdir(Path::new("/dir").unwrap()).unwrap_err(),
			errno!(ENOTEMPTY)
		);
		fs.unlink(Path::new("/dir/file").unwrap()).unwrap();
		fs.rmdir(Path::new("/dir").unwrap()).unwrap();
		assert_eq!(
			fs.stat(Path::new("/dir").unwrap()).unwrap_err(),
			errno!(ENOENT)
		);
	}

	#[test]
	fn ramfs_symlink() {
		let fs = RamFs::new();
		fs.creat(Path::new("/target").unwrap(), 0o644).unwrap();
		fs.symlink(Path::new("/link").unwrap(), "/target").unwrap();
		assert_eq!(fs.readlink(Path::new("/link").unwrap()).unwrap(), "/target");
		assert_eq!(
			fs.stat(Path::new("/link").unwrap())
				.unwrap()
				.get_type(),
			Some(FileType::Link)
		);
	}
}
