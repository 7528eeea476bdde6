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

//! Kernel logging.
//!
//! The kernel logs through the [`log`] facade. Records are kept in a ring
//! buffer so they can be read back after the fact, the way `dmesg` does. If
//! the logger is set as silent, logs will not reach the console backend, but
//! will be kept in memory anyway.

use crate::sync::mutex::IntMutex;
use alloc::string::String;
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record};

/// The size of the kernel logs buffer in bytes.
const LOGS_SIZE: usize = 65536;

/// The kernel's logger.
pub static LOGGER: IntMutex<Logger> = IntMutex::new(Logger::new());

/// Kernel logger, used to store kernel logs.
///
/// Internally, the logger uses a ring buffer for storage.
pub struct Logger {
	/// Tells whether the logger is silent.
	pub silent: bool,

	/// The buffer storing the kernel logs.
	buf: [u8; LOGS_SIZE],
	/// The buffer's reading head.
	read_head: usize,
	/// The buffer's writing head.
	write_head: usize,
}

impl Logger {
	/// Creates a new instance.
	#[allow(clippy::new_without_default)]
	pub const fn new() -> Self {
		Self {
			silent: false,

			buf: [0; LOGS_SIZE],
			read_head: 0,
			write_head: 0,
		}
	}

	/// Returns the number of available bytes in the buffer.
	fn available_space(&self) -> usize {
		if self.write_head >= self.read_head {
			self.buf.len() - (self.write_head - self.read_head)
		} else {
			self.read_head - self.write_head - 1
		}
	}

	/// Returns the stored logs as a string.
	///
	/// Invalid UTF-8 sequences are replaced.
	pub fn content(&self) -> String {
		let mut out = String::new();
		let mut i = self.read_head;
		while i != self.write_head {
			out.push(self.buf[i] as char);
			i = (i + 1) % self.buf.len();
		}
		out
	}

	/// Pushes the given string onto the kernel logs buffer.
	///
	/// If the buffer is full, the oldest logs are dropped.
	pub fn push(&mut self, s: &[u8]) {
		// A record larger than the whole buffer keeps only its tail
		let s = if s.len() >= self.buf.len() {
			&s[s.len() - (self.buf.len() - 1)..]
		} else {
			s
		};
		// Make room, dropping whole lines from the read end
		while self.available_space() <= s.len() {
			self.pop_line();
		}
		for b in s {
			self.buf[self.write_head] = *b;
			self.write_head = (self.write_head + 1) % self.buf.len();
		}
	}

	/// Pops one line from the read end of the buffer.
	fn pop_line(&mut self) {
		while self.read_head != self.write_head {
			let b = self.buf[self.read_head];
			self.read_head = (self.read_head + 1) % self.buf.len();
			if b == b'\n' {
				break;
			}
		}
	}
}

impl Write for Logger {
	fn write_str(&mut self, s: &str) -> core::fmt::Result {
		self.push(s.as_bytes());
		Ok(())
	}
}

/// Facade forwarding [`log`] records into [`LOGGER`].
struct KernelLog;

impl Log for KernelLog {
	fn enabled(&self, _metadata: &Metadata) -> bool {
		true
	}

	fn log(&self, record: &Record) {
		let mut logger = LOGGER.lock();
		let _ = writeln!(logger, "[{}] {}", record.level(), record.args());
	}

	fn flush(&self) {}
}

static KERNEL_LOG: KernelLog = KernelLog;

/// Initializes the kernel logger.
///
/// Calling this function more than once is a no-op.
pub fn init() {
	let _ = log::set_logger(&KERNEL_LOG);
	log::set_max_level(LevelFilter::Debug);
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn logger_ring() {
		let mut logger = Logger::new();
		logger.push(b"hello\n");
		logger.push(b"world\n");
		assert_eq!(logger.content(), "hello\nworld\n");
	}

	#[test]
	fn logger_overflow_drops_oldest() {
		let mut logger = Logger::new();
		for i in 0..10000 {
			use core::fmt::Write;
			let _ = writeln!(logger, "line {i}");
		}
		let content = logger.content();
		assert!(content.ends_with("line 9999\n"));
		assert!(!content.contains("line 0\n"));
	}
}
