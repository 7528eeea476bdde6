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

//! System limits.

/// The size of a page of memory in bytes.
pub const PAGE_SIZE: usize = 4096;

/// The maximum length of a path in bytes.
pub const PATH_MAX: usize = 4096;
/// The maximum length of a filename in bytes.
pub const NAME_MAX: usize = 255;
/// The maximum number of symbolic links resolved in a single path lookup.
pub const SYMLOOP_MAX: usize = 8;

/// The initial number of slots in a file descriptor table.
pub const MAX_OPEN_FD: usize = 16;
/// The growth limit of a file descriptor table, as a multiple of
/// [`MAX_OPEN_FD`].
pub const FD_GROWTH_LIMIT: usize = 8;

/// The maximum length of arguments to the `exec` family of functions.
pub const ARG_MAX: usize = 2097152;
