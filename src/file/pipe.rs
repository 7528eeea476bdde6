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

//! Anonymous pipes.
//!
//! A pipe is a bounded byte buffer shared by a read end and a write end.
//! Reading an empty pipe whose write end is closed returns end of file;
//! writing a pipe whose read end is closed fails with `EPIPE`.

use super::{File, FileOps, FileType, PathBuf, Stat, O_RDONLY, O_WRONLY};
use crate::{errno, errno::EResult, sync::mutex::Mutex};
use alloc::{collections::VecDeque, string::String, sync::Arc};

/// The capacity of a pipe's buffer in bytes.
pub const PIPE_CAPACITY: usize = 65536;

/// The shared state of a pipe.
struct PipeBuffer {
	/// The buffered bytes.
	data: VecDeque<u8>,
	/// The number of open read ends.
	readers: usize,
	/// The number of open write ends.
	writers: usize,
}

/// The read end of a pipe.
struct ReadEnd(Arc<Mutex<PipeBuffer>>);

impl FileOps for ReadEnd {
	fn stat(&self) -> EResult<Stat> {
		Ok(Stat {
			mode: FileType::Fifo.to_mode() | 0o600,
			size: self.0.lock().data.len() as u64,
			..Default::default()
		})
	}

	fn read(&self, _off: u64, buf: &mut [u8]) -> EResult<usize> {
		let mut pipe = self.0.lock();
		if pipe.data.is_empty() {
			return if pipe.writers == 0 {
				// End of file
				Ok(0)
			} else {
				Err(errno!(EAGAIN))
			};
		}
		let len = buf.len().min(pipe.data.len());
		for b in buf.iter_mut().take(len) {
			*b = pipe.data.pop_front().unwrap();
		}
		Ok(len)
	}

	fn close(&self) {
		self.0.lock().readers -= 1;
	}
}

/// The write end of a pipe.
struct WriteEnd(Arc<Mutex<PipeBuffer>>);

impl FileOps for WriteEnd {
	fn stat(&self) -> EResult<Stat> {
		Ok(Stat {
			mode: FileType::Fifo.to_mode() | 0o600,
			size: self.0.lock().data.len() as u64,
			..Default::default()
		})
	}

	fn write(&self, _off: u64, buf: &[u8]) -> EResult<usize> {
		let mut pipe = self.0.lock();
		if pipe.readers == 0 {
			return Err(errno!(EPIPE));
		}
		let len = buf.len().min(PIPE_CAPACITY - pipe.data.len());
		if len == 0 {
			return Err(errno!(EAGAIN));
		}
		pipe.data.extend(&buf[..len]);
		Ok(len)
	}

	fn close(&self) {
		self.0.lock().writers -= 1;
	}
}

/// Creates a pipe, returning its read and write ends.
pub fn new_pipe() -> (Arc<File>, Arc<File>) {
	let buffer = Arc::new(Mutex::new(PipeBuffer {
		data: VecDeque::new(),
		readers: 1,
		writers: 1,
	}));
	let read = File::new(
		String::from("pipe"),
		PathBuf::default(),
		O_RDONLY,
		Arc::new(ReadEnd(buffer.clone())),
	);
	let write = File::new(
		String::from("pipe"),
		PathBuf::default(),
		O_WRONLY,
		Arc::new(WriteEnd(buffer)),
	);
	(read, write)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn pipe_round_trip() {
		let (read, write) = new_pipe();
		assert_eq!(write.write(b"hello").unwrap(), 5);
		let mut buf = [0u8; 8];
		assert_eq!(read.read(&mut buf).unwrap(), 5);
		assert_eq!(&buf[..5], b"hello");
		// Empty with a live writer
		assert_eq!(read.read(&mut buf).unwrap_err(), errno!(EAGAIN));
	}

	#[test]
	fn pipe_eof_and_epipe() {
		let (read, write) = new_pipe();
		assert_eq!(write.write(b"x").unwrap(), 1);
		File::close(write);
		let mut buf = [0u8; 4];
		assert_eq!(read.read(&mut buf).unwrap(), 1);
		// Write end closed: end of file
		assert_eq!(read.read(&mut buf).unwrap(), 0);
		let (read, write) = new_pipe();
		File::close(read);
		assert_eq!(write.write(b"x").unwrap_err(), errno!(EPIPE));
	}
}
