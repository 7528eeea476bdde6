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

//! The virtual filesystem multiplexes namespace operations over the mounted
//! filesystems.
//!
//! Every operation first resolves its pathname against the caller's current
//! directory to a normalized absolute path, then selects the superblock whose
//! mount path is the longest prefix of it and forwards the operation to that
//! filesystem, with the path rewritten relative to the mount.
//!
//! Locks over the superblock list are released around filesystem calls so the
//! list is never held across potentially long operations.

use super::{
	fs::{Filesystem, FilesystemType},
	path::{normalize, Path, PathBuf},
	perm::AccessProfile,
	DirEntry, File, FileType, Mode, Stat, O_ACCMODE, O_CREAT, O_DIRECTORY, O_EXCL, O_RDONLY,
	O_RDWR, O_TRUNC, O_WRONLY,
};
use crate::{
	errno,
	errno::EResult,
	limits,
	sync::mutex::Mutex,
};
use alloc::{
	string::{String, ToString},
	sync::Arc,
	vec::Vec,
};
use hashbrown::HashMap;

/// Settings for a path resolution operation.
#[derive(Clone, Debug)]
pub struct ResolutionSettings {
	/// The credentials of the agent resolving the path.
	pub ap: AccessProfile,
	/// The current working directory the resolution starts from.
	pub cwd: PathBuf,
	/// Tells whether a symbolic link as final component is followed.
	pub follow_link: bool,
}

impl ResolutionSettings {
	/// Kernel credentials, following links, starting from the root.
	pub fn kernel_follow() -> Self {
		Self {
			ap: AccessProfile::KERNEL,
			cwd: PathBuf::root(),
			follow_link: true,
		}
	}

	/// Same as [`kernel_follow`](Self::kernel_follow), but not following the
	/// final link.
	pub fn kernel_nofollow() -> Self {
		Self {
			follow_link: false,
			..Self::kernel_follow()
		}
	}
}

/// A mounted filesystem instance, registered in the VFS.
pub struct Superblock {
	/// The name of the mount's source.
	pub name: String,
	/// The path the filesystem is mounted at.
	pub mount_path: PathBuf,
	/// The name of the filesystem type.
	pub fs_type: &'static str,
	/// The filesystem serving the mount.
	fs: Arc<dyn Filesystem>,
}

impl Superblock {
	/// Returns the filesystem serving the mount.
	pub fn fs(&self) -> &Arc<dyn Filesystem> {
		&self.fs
	}

	/// Rewrites the absolute path `abs` relative to the mount, if the mount
	/// path is a prefix of it.
	pub fn relative<'p>(&self, abs: &'p Path) -> Option<&'p Path> {
		let mount = self.mount_path.as_str();
		let abs = abs.as_str();
		if mount == "/" {
			return Some(Path::new_unchecked(abs));
		}
		let rest = abs.strip_prefix(mount)?;
		if rest.is_empty() {
			Some(Path::root())
		} else if rest.starts_with('/') {
			Some(Path::new_unchecked(rest))
		} else {
			// Not a prefix at a component boundary
			None
		}
	}
}

/// The virtual filesystem: the filesystem type registry and the list of
/// mounted superblocks.
pub struct Vfs {
	/// The registered filesystem types, by name.
	fs_types: Mutex<HashMap<&'static str, Arc<dyn FilesystemType>>>,
	/// The mounted filesystems.
	superblocks: Mutex<Vec<Arc<Superblock>>>,
}

impl Default for Vfs {
	fn default() -> Self {
		Self::new()
	}
}

impl Vfs {
	/// Creates an empty VFS.
	pub fn new() -> Self {
		Self {
			fs_types: Mutex::new(HashMap::new()),
			superblocks: Mutex::new(Vec::new()),
		}
	}

	/// Registers a filesystem type.
	pub fn register_filesystem(&self, fs_type: Arc<dyn FilesystemType>) {
		log::info!("vfs: register filesystem type `{}`", fs_type.name());
		self.fs_types.lock().insert(fs_type.name(), fs_type);
	}

	/// Mounts the filesystem type `fs_name` at `target`.
	///
	/// Arguments:
	/// - `source` is the source of the mount, a device path or an arbitrary
	///   name
	/// - `fs_name` is the name of a registered filesystem type
	/// - `target` is the absolute path to mount at; unless the mount is the
	///   root, it must be an existing directory
	pub fn mount(&self, source: &str, fs_name: &str, target: &Path) -> EResult<()> {
		let fs_type = self
			.fs_types
			.lock()
			.get(fs_name)
			.cloned()
			.ok_or(errno!(ENODEV))?;
		let target = normalize(Path::root(), target)?;
		if target.as_str() != "/" {
			// The mount point must be an existing directory
			let stat = self.stat(&target, &ResolutionSettings::kernel_follow())?;
			if stat.get_type() != Some(FileType::Directory) {
				return Err(errno!(ENOTDIR));
			}
		}
		// Load the filesystem without holding the superblock list
		if self
			.superblocks
			.lock()
			.iter()
			.any(|sb| sb.mount_path == target)
		{
			return Err(errno!(EBUSY));
		}
		let fs = fs_type.mount(source, &target)?;
		log::info!("vfs: mount `{source}` ({fs_name}) at `{target}`");
		let mut superblocks = self.superblocks.lock();
		if superblocks.iter().any(|sb| sb.mount_path == target) {
			return Err(errno!(EBUSY));
		}
		superblocks.push(Arc::new(Superblock {
			name: source.to_string(),
			mount_path: target,
			fs_type: fs_type.name(),
			fs,
		}));
		Ok(())
	}

	/// Returns the superblock whose mount path is the longest prefix of the
	/// absolute path `path`.
	///
	/// If no superblock matches, the function returns `ENODEV`.
	pub fn get_superblock(&self, path: &Path) -> EResult<Arc<Superblock>> {
		self.superblocks
			.lock()
			.iter()
			.filter(|sb| sb.relative(path).is_some())
			.max_by_key(|sb| sb.mount_path.as_str().len())
			.cloned()
			.ok_or(errno!(ENODEV))
	}

	/// Resolves `path` against `rs` to a normalized absolute path, expanding
	/// symbolic links with a bounded depth.
	pub fn resolve_path(&self, path: &Path, rs: &ResolutionSettings) -> EResult<PathBuf> {
		let mut abs = normalize(rs.cwd.as_ref(), path)?;
		let mut depth = 0;
		loop {
			match self.expand_one_link(&abs, rs.follow_link)? {
				Some(expanded) => {
					depth += 1;
					if depth > limits::SYMLOOP_MAX {
						return Err(errno!(ELOOP));
					}
					abs = expanded;
				}
				None => return Ok(abs),
			}
		}
	}

	/// Walks `abs` and expands its first symbolic link component, returning
	/// the rewritten path.
	///
	/// If the path contains no resolvable link, the function returns `None`.
	fn expand_one_link(&self, abs: &Path, follow_final: bool) -> EResult<Option<PathBuf>> {
		let components: Vec<&str> = abs.components().collect();
		let mut cur = String::new();
		for (i, comp) in components.iter().enumerate() {
			let is_final = i == components.len() - 1;
			cur.push('/');
			cur.push_str(comp);
			if is_final && !follow_final {
				break;
			}
			let cur_path = Path::new_unchecked(&cur);
			// A path with nothing mounted yet has no links to expand
			let Ok(sb) = self.get_superblock(cur_path) else {
				break;
			};
			let Some(rel) = sb.relative(cur_path) else {
				break;
			};
			let Ok(stat) = sb.fs.stat(rel) else {
				// Missing components surface at the final operation
				break;
			};
			if stat.get_type() != Some(FileType::Link) {
				continue;
			}
			let target = sb.fs.readlink(rel)?;
			// Splice the target in place of the link component
			let parent = Path::new_unchecked(&cur).parent();
			let mut rewritten = normalize(parent, Path::new(&target)?)?;
			for rest in &components[i + 1..] {
				rewritten = rewritten.join(Path::new_unchecked(rest));
			}
			let rewritten = normalize(Path::root(), rewritten.as_ref())?;
			return Ok(Some(rewritten));
		}
		Ok(None)
	}

	/// Resolves `path` and returns the superblock serving it along with the
	/// rewritten absolute path.
	fn route(&self, path: &Path, rs: &ResolutionSettings) -> EResult<(Arc<Superblock>, PathBuf)> {
		let abs = self.resolve_path(path, rs)?;
		let sb = self.get_superblock(&abs)?;
		Ok((sb, abs))
	}

	/// Opens the file at `path`.
	///
	/// Arguments:
	/// - `path` is the path to the file
	/// - `rs` is the resolution settings, carrying the opener's credentials
	/// - `flags` are the open flags
	/// - `mode` is the permission set for a file created by `O_CREAT`
	///
	/// The open is validated against the opener's credentials and the file's
	/// owner/group/other permission bits, per access mode.
	pub fn open(
		&self,
		path: &Path,
		rs: &ResolutionSettings,
		flags: i32,
		mode: Mode,
	) -> EResult<Arc<File>> {
		let (sb, abs) = self.route(path, rs)?;
		let rel = sb.relative(&abs).ok_or(errno!(ENOENT))?;
		let stat = match sb.fs.stat(rel) {
			Ok(stat) => {
				if flags & O_CREAT != 0 && flags & O_EXCL != 0 {
					return Err(errno!(EEXIST));
				}
				stat
			}
			Err(e) if e == errno!(ENOENT) && flags & O_CREAT != 0 => {
				// Creating requires write access to the parent directory
				let parent_stat = sb.fs.stat(rel.parent())?;
				if !rs.ap.can_write(&parent_stat) {
					return Err(errno!(EACCES));
				}
				sb.fs.creat(rel, mode)?;
				sb.fs.stat(rel)?
			}
			Err(e) => return Err(e),
		};
		// Validate the access mode against the file's permissions
		let (read, write) = match flags & O_ACCMODE {
			O_RDONLY => (true, false),
			O_WRONLY => (false, true),
			O_RDWR => (true, true),
			_ => return Err(errno!(EINVAL)),
		};
		if (read && !rs.ap.can_read(&stat)) || (write && !rs.ap.can_write(&stat)) {
			return Err(errno!(EACCES));
		}
		let is_dir = stat.get_type() == Some(FileType::Directory);
		if flags & O_DIRECTORY != 0 && !is_dir {
			return Err(errno!(ENOTDIR));
		}
		if is_dir && write {
			return Err(errno!(EISDIR));
		}
		let ops = sb.fs.open(rel)?;
		if flags & O_TRUNC != 0 && write && stat.get_type() == Some(FileType::Regular) {
			ops.truncate(0)?;
		}
		let name = abs
			.file_name()
			.map(ToString::to_string)
			.unwrap_or_else(|| "/".to_string());
		Ok(File::new(name, abs, flags, ops))
	}

	/// Creates a regular file at `path` and opens it for writing.
	pub fn creat(&self, path: &Path, rs: &ResolutionSettings, mode: Mode) -> EResult<Arc<File>> {
		self.open(path, rs, O_CREAT | O_WRONLY | O_TRUNC, mode)
	}

	/// Returns the status of the file at `path`.
	pub fn stat(&self, path: &Path, rs: &ResolutionSettings) -> EResult<Stat> {
		let (sb, abs) = self.route(path, rs)?;
		let rel = sb.relative(&abs).ok_or(errno!(ENOENT))?;
		sb.fs.stat(rel)
	}

	/// Creates a directory at `path`.
	pub fn mkdir(&self, path: &Path, rs: &ResolutionSettings, mode: Mode) -> EResult<()> {
		let (sb, abs) = self.route(path, rs)?;
		let rel = sb.relative(&abs).ok_or(errno!(ENOENT))?;
		sb.fs.mkdir(rel, mode)
	}

	/// Removes the empty directory at `path`.
	///
	/// Removing a mount point is refused.
	pub fn rmdir(&self, path: &Path, rs: &ResolutionSettings) -> EResult<()> {
		let (sb, abs) = self.route(path, rs)?;
		if self
			.superblocks
			.lock()
			.iter()
			.any(|sb| sb.mount_path == abs)
		{
			return Err(errno!(EBUSY));
		}
		let rel = sb.relative(&abs).ok_or(errno!(ENOENT))?;
		sb.fs.rmdir(rel)
	}

	/// Removes the file at `path`.
	pub fn unlink(&self, path: &Path, rs: &ResolutionSettings) -> EResult<()> {
		let rs = ResolutionSettings {
			follow_link: false,
			..rs.clone()
		};
		let (sb, abs) = self.route(path, &rs)?;
		let rel = sb.relative(&abs).ok_or(errno!(ENOENT))?;
		sb.fs.unlink(rel)
	}

	/// Creates a symbolic link at `linkpath` pointing to `target`.
	pub fn symlink(&self, target: &str, linkpath: &Path, rs: &ResolutionSettings) -> EResult<()> {
		let rs = ResolutionSettings {
			follow_link: false,
			..rs.clone()
		};
		let (sb, abs) = self.route(linkpath, &rs)?;
		let rel = sb.relative(&abs).ok_or(errno!(ENOENT))?;
		sb.fs.symlink(rel, target)
	}

	/// Returns the target of the symbolic link at `path`.
	pub fn readlink(&self, path: &Path, rs: &ResolutionSettings) -> EResult<String> {
		let rs = ResolutionSettings {
			follow_link: false,
			..rs.clone()
		};
		let (sb, abs) = self.route(path, &rs)?;
		let rel = sb.relative(&abs).ok_or(errno!(ENOENT))?;
		sb.fs.readlink(rel)
	}

	/// Returns the entries of the open directory `file`, overlaying mount
	/// points.
	///
	/// After the underlying filesystem's entries, every mount point whose
	/// parent is this directory contributes an entry named after its
	/// basename, unless one is already present.
	pub fn getdents(&self, file: &File) -> EResult<Vec<DirEntry>> {
		let mut entries = file.getdents()?;
		let dir_path: &Path = &file.path;
		let superblocks: Vec<_> = self.superblocks.lock().clone();
		for sb in superblocks {
			let mount: &Path = &sb.mount_path;
			if mount.as_str() == "/" || mount.parent().as_str() != dir_path.as_str() {
				continue;
			}
			let Some(name) = mount.file_name() else {
				continue;
			};
			if entries.iter().any(|e| e.name == name) {
				continue;
			}
			let ino = sb.fs.stat(Path::root()).map(|st| st.ino).unwrap_or(0);
			entries.push(DirEntry {
				ino,
				entry_type: FileType::Directory,
				name: name.to_string(),
			});
		}
		Ok(entries)
	}

	/// Ensures the standard FHS directory layout exists, with FHS 3.0 mode
	/// bits.
	pub fn init_default_hierarchy(&self) -> EResult<()> {
		const HIERARCHY: &[(&str, Mode)] = &[
			("/tmp", 0o1777),
			("/home", 0o755),
			("/root", 0o700),
			("/var", 0o755),
			("/var/log", 0o755),
			("/var/tmp", 0o1777),
			("/usr", 0o755),
			("/usr/bin", 0o755),
			("/usr/lib", 0o755),
			("/usr/share", 0o755),
			("/bin", 0o755),
			("/lib", 0o755),
			("/sbin", 0o755),
			("/etc", 0o755),
			("/dev", 0o755),
			("/proc", 0o555),
			("/mnt", 0o755),
			("/media", 0o755),
		];
		let rs = ResolutionSettings::kernel_follow();
		for (path, mode) in HIERARCHY {
			let path = Path::new_unchecked(path);
			match self.stat(path, &rs) {
				Ok(_) => continue,
				Err(e) if e == errno!(ENOENT) => self.mkdir(path, &rs, *mode)?,
				Err(e) => return Err(e),
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::file::fs::ramfs::RamFsType;

	/// A VFS with a ramfs root.
	pub(crate) fn test_vfs() -> Vfs {
		let vfs = Vfs::new();
		vfs.register_filesystem(Arc::new(RamFsType));
		vfs.mount("root", "ramfs", Path::root()).unwrap();
		vfs
	}

	#[test]
	fn mount_requires_registered_type() {
		let vfs = Vfs::new();
		assert_eq!(
			vfs.mount("root", "ext9", Path::root()).unwrap_err(),
			errno!(ENODEV)
		);
	}

	#[test]
	fn superblock_longest_prefix() {
		let vfs = test_vfs();
		let rs = ResolutionSettings::kernel_follow();
		vfs.mkdir(Path::new("/proc").unwrap(), &rs, 0o555).unwrap();
		vfs.mkdir(Path::new("/mnt").unwrap(), &rs, 0o755).unwrap();
		vfs.mount("proc", "ramfs", Path::new("/proc").unwrap())
			.unwrap();
		let sb = vfs.get_superblock(Path::new("/proc/1/stat").unwrap()).unwrap();
		assert_eq!(sb.mount_path.as_str(), "/proc");
		let sb = vfs.get_superblock(Path::new("/mnt/x").unwrap()).unwrap();
		assert_eq!(sb.mount_path.as_str(), "/");
		// Prefix match is per component: `/procfoo` is served by the root
		let sb = vfs.get_superblock(Path::new("/procfoo").unwrap()).unwrap();
		assert_eq!(sb.mount_path.as_str(), "/");
	}

	#[test]
	fn mount_point_visible_in_parent_exactly_once() {
		let vfs = test_vfs();
		let rs = ResolutionSettings::kernel_follow();
		vfs.mkdir(Path::new("/proc").unwrap(), &rs, 0o555).unwrap();
		vfs.mount("proc", "ramfs", Path::new("/proc").unwrap())
			.unwrap();
		let root = vfs
			.open(Path::root(), &rs, O_RDONLY | O_DIRECTORY, 0)
			.unwrap();
		let entries = vfs.getdents(&root).unwrap();
		let count = entries.iter().filter(|e| e.name == "proc").count();
		assert_eq!(count, 1);
		// The entry is synthesized even when the underlying filesystem no
		// longer lists it
		let under = vfs.get_superblock(Path::root()).unwrap();
		under.fs().rmdir(Path::new("/proc").unwrap()).unwrap();
		let entries = vfs.getdents(&root).unwrap();
		let count = entries.iter().filter(|e| e.name == "proc").count();
		assert_eq!(count, 1);
	}

	#[test]
	fn open_create_read_back() {
		let vfs = test_vfs();
		let rs = ResolutionSettings::kernel_follow();
		let file = vfs
			.open(
				Path::new("/hello.txt").unwrap(),
				&rs,
				O_CREAT | O_RDWR,
				0o644,
			)
			.unwrap();
		assert_eq!(file.write(b"hello").unwrap(), 5);
		file.seek(0, super::super::SEEK_SET).unwrap();
		let mut buf = [0u8; 8];
		let len = file.read(&mut buf).unwrap();
		assert_eq!(&buf[..len], b"hello");
		// O_EXCL on an existing file fails
		assert_eq!(
			vfs.open(
				Path::new("/hello.txt").unwrap(),
				&rs,
				O_CREAT | O_EXCL | O_RDONLY,
				0o644,
			)
			.unwrap_err(),
			errno!(EEXIST)
		);
	}

	#[test]
	fn open_checks_permissions() {
		let vfs = test_vfs();
		let root_rs = ResolutionSettings::kernel_follow();
		vfs.creat(Path::new("/secret").unwrap(), &root_rs, 0o600)
			.unwrap();
		let user_rs = ResolutionSettings {
			ap: AccessProfile::new(1000, 1000),
			..ResolutionSettings::kernel_follow()
		};
		assert_eq!(
			vfs.open(Path::new("/secret").unwrap(), &user_rs, O_RDONLY, 0)
				.unwrap_err(),
			errno!(EACCES)
		);
		// Root is unconditionally allowed
		assert!(vfs
			.open(Path::new("/secret").unwrap(), &root_rs, O_RDONLY, 0)
			.is_ok());
	}

	#[test]
	fn symlink_resolution_bounded() {
		let vfs = test_vfs();
		let rs = ResolutionSettings::kernel_follow();
		vfs.mkdir(Path::new("/data").unwrap(), &rs, 0o755).unwrap();
		vfs.creat(Path::new("/data/file").unwrap(), &rs, 0o644)
			.unwrap();
		vfs.symlink("/data", Path::new("/d").unwrap(), &rs).unwrap();
		// The link is followed transparently
		let stat = vfs.stat(Path::new("/d/file").unwrap(), &rs).unwrap();
		assert_eq!(stat.get_type(), Some(FileType::Regular));
		// A link loop is detected
		vfs.symlink("/b", Path::new("/a").unwrap(), &rs).unwrap();
		vfs.symlink("/a", Path::new("/b").unwrap(), &rs).unwrap();
		assert_eq!(
			vfs.stat(Path::new("/a/x").unwrap(), &rs).unwrap_err(),
			errno!(ELOOP)
		);
	}

	#[test]
	fn resolve_relative_to_cwd() {
		let vfs = test_vfs();
		let rs = ResolutionSettings::kernel_follow();
		vfs.mkdir(Path::new("/home").unwrap(), &rs, 0o755).unwrap();
		vfs.mkdir(Path::new("/home/user").unwrap(), &rs, 0o755)
			.unwrap();
		vfs.creat(Path::new("/home/user/f").unwrap(), &rs, 0o644)
			.unwrap();
		let user_rs = ResolutionSettings {
			cwd: PathBuf::try_from("/home/user").unwrap(),
			..ResolutionSettings::kernel_follow()
		};
		assert!(vfs.stat(Path::new("f").unwrap(), &user_rs).is_ok());
		assert!(vfs.stat(Path::new("../user/./f").unwrap(), &user_rs).is_ok());
	}

	#[test]
	fn default_hierarchy() {
		let vfs = test_vfs();
		vfs.init_default_hierarchy().unwrap();
		let rs = ResolutionSettings::kernel_follow();
		let tmp = vfs.stat(Path::new("/tmp").unwrap(), &rs).unwrap();
		assert_eq!(tmp.mode & 0o7777, 0o1777);
		let proc = vfs.stat(Path::new("/proc").unwrap(), &rs).unwrap();
		assert_eq!(proc.mode & 0o7777, 0o555);
		// Idempotent
		vfs.init_default_hierarchy().unwrap();
	}

	#[test]
	fn rmdir_mount_point_refused() {
		let vfs = test_vfs();
		let rs = ResolutionSettings::kernel_follow();
		vfs.mkdir(Path::new("/proc").unwrap(), &rs, 0o555).unwrap();
		vfs.mount("proc", "ramfs", Path::new("/proc").unwrap())
			.unwrap();
		assert_eq!(
			vfs.rmdir(Path::new("/proc").unwrap(), &rs).unwrap_err(),
			errno!(EBUSY)
		);
	}
}
