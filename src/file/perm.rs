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

//! UNIX permissions are detailed in the POSIX specification.
//!
//! This module implements management of such permissions.

use super::{Mode, Stat};

/// Type representing a user ID.
pub type Uid = u16;
/// Type representing a group ID.
pub type Gid = u16;

/// The root user ID.
pub const ROOT_UID: Uid = 0;
/// The root group ID.
pub const ROOT_GID: Gid = 0;

/// User: Read, Write and Execute.
pub const S_IRWXU: Mode = 0o0700;
/// User: Read.
pub const S_IRUSR: Mode = 0o0400;
/// User: Write.
pub const S_IWUSR: Mode = 0o0200;
/// User: Execute.
pub const S_IXUSR: Mode = 0o0100;
/// Group: Read, Write and Execute.
pub const S_IRWXG: Mode = 0o0070;
/// Group: Read.
pub const S_IRGRP: Mode = 0o0040;
/// Group: Write.
pub const S_IWGRP: Mode = 0o0020;
/// Group: Execute.
pub const S_IXGRP: Mode = 0o0010;
/// Other: Read, Write and Execute.
pub const S_IRWXO: Mode = 0o0007;
/// Other: Read.
pub const S_IROTH: Mode = 0o0004;
/// Other: Write.
pub const S_IWOTH: Mode = 0o0002;
/// Other: Execute.
pub const S_IXOTH: Mode = 0o0001;
/// Setuid.
pub const S_ISUID: Mode = 0o4000;
/// Setgid.
pub const S_ISGID: Mode = 0o2000;
/// Sticky bit.
pub const S_ISVTX: Mode = 0o1000;

/// A set of credentials determining whether an agent (example: a process) can
/// access a resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AccessProfile {
	/// Real ID of user.
	pub uid: Uid,
	/// Real ID of group.
	pub gid: Gid,
	/// The effective ID of user.
	pub euid: Uid,
	/// The effective ID of group.
	pub egid: Gid,
}

impl AccessProfile {
	/// Credentials of the kernel itself (or the root user).
	pub const KERNEL: Self = Self {
		uid: 0,
		gid: 0,
		euid: 0,
		egid: 0,
	};

	/// Creates a profile from the given IDs.
	pub fn new(uid: Uid, gid: Gid) -> Self {
		Self {
			uid,
			gid,
			euid: uid,
			egid: gid,
		}
	}

	/// Tells whether the agent is privileged.
	pub fn is_privileged(&self) -> bool {
		self.euid == ROOT_UID
	}

	/// Checks `stat`'s permission bits against the profile, matching the
	/// owner, group or other class.
	fn check(&self, stat: &Stat, user_bit: Mode, group_bit: Mode, other_bit: Mode) -> bool {
		if self.is_privileged() {
			return true;
		}
		if self.euid == stat.uid {
			stat.mode & user_bit != 0
		} else if self.egid == stat.gid {
			stat.mode & group_bit != 0
		} else {
			stat.mode & other_bit != 0
		}
	}

	/// Tells whether the agent can read the file described by `stat`.
	pub fn can_read(&self, stat: &Stat) -> bool {
		self.check(stat, S_IRUSR, S_IRGRP, S_IROTH)
	}

	/// Tells whether the agent can write the file described by `stat`.
	pub fn can_write(&self, stat: &Stat) -> bool {
		self.check(stat, S_IWUSR, S_IWGRP, S_IWOTH)
	}

	/// Tells whether the agent can execute the file described by `stat`.
	pub fn can_execute(&self, stat: &Stat) -> bool {
		self.check(stat, S_IXUSR, S_IXGRP, S_IXOTH)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::file::FileType;

	fn stat(mode: Mode, uid: Uid, gid: Gid) -> Stat {
		Stat {
			mode: FileType::Regular.to_mode() | mode,
			uid,
			gid,
			..Default::default()
		}
	}

	#[test]
	fn owner_bits() {
		let ap = AccessProfile::new(1000, 1000);
		let st = stat(0o640, 1000, 1000);
		assert!(ap.can_read(&st));
		assert!(ap.can_write(&st));
		assert!(!ap.can_execute(&st));
	}

	#[test]
	fn group_and_other_bits() {
		let st = stat(0o641, 1000, 2000);
		let group = AccessProfile::new(1001, 2000);
		assert!(group.can_read(&st));
		assert!(!group.can_write(&st));
		let other = AccessProfile::new(1002, 3000);
		assert!(!other.can_read(&st));
		assert!(other.can_execute(&st));
	}

	#[test]
	fn root_bypasses() {
		let st = stat(0o000, 1000, 1000);
		assert!(AccessProfile::KERNEL.can_read(&st));
		assert!(AccessProfile::KERNEL.can_write(&st));
		assert!(AccessProfile::KERNEL.can_execute(&st));
	}
}
