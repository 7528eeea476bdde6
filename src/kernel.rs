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

//! Minos is a pedagogical x86 (32-bit protected mode) monolithic kernel,
//! modeled as a host-testable substrate.
//!
//! The crate implements the kernel's memory and execution core:
//! - a zoned physical page allocator (buddy system) and a slab allocator on
//!   top of it ([`memory`])
//! - per-process address spaces with fork-style cloning ([`process`])
//! - the descriptor tables and the central interrupt/system call dispatcher
//!   ([`arch`], [`int`], [`syscall`])
//! - a thin virtual filesystem multiplexing layer ([`file`])
//!
//! [`Kernel::boot`] assembles the pieces the way the real boot path does:
//! memory first, then the descriptor tables and the interrupt plane, then the
//! root filesystem and the standard hierarchy.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod errno;
pub mod file;
pub mod int;
pub mod limits;
pub mod logger;
pub mod memory;
pub mod multiboot;
pub mod panic;
pub mod process;
pub mod sync;
pub mod syscall;

use crate::{
	arch::x86::{
		gdt::Gdt,
		idt::Idt,
		tss::Tss,
	},
	errno::EResult,
	file::{fs::ramfs::RamFsType, path::Path, vfs::Vfs},
	int::{IntFrame, InterruptPlane, TrapOutcome},
	memory::frame::Memory,
	multiboot::BootInfo,
	process::{Pid, Process, DEFAULT_STACK_SIZE},
	sync::mutex::{IntMutex, Mutex},
};
use alloc::{sync::Arc, vec::Vec};
use core::mem::size_of;

/// The linear address of the TSS in the kernel image.
const TSS_BASE: u32 = 0xc0101000;

/// The kernel's global state, assembled at boot.
pub struct Kernel {
	/// The physical memory and its allocators.
	pub mem: Arc<Memory>,
	/// The virtual filesystem.
	pub vfs: Vfs,
	/// The interrupt routing tables.
	pub int: InterruptPlane,
	/// The Global Descriptor Table.
	pub gdt: Gdt,
	/// The Interrupt Descriptor Table.
	pub idt: Idt,
	/// The Task State Segment. The scheduler is the only writer.
	pub tss: IntMutex<Tss>,
	/// Every live process.
	processes: Mutex<Vec<Arc<IntMutex<Process>>>>,
}

impl Kernel {
	/// Boots the kernel from the given boot information.
	///
	/// Ordering matters: the memory map and allocators come up first, then
	/// the descriptor tables and the interrupt plane, then the root
	/// filesystem and the standard hierarchy.
	pub fn boot(boot_info: &BootInfo) -> EResult<Self> {
		logger::init();
		log::info!("Booting Minos. Command line: `{}`", boot_info.cmdline);
		for entry in &boot_info.memory_maps {
			if entry.is_valid() {
				log::debug!(
					"memmap: {:08x} {:08x} {}",
					entry.addr,
					entry.addr + entry.len,
					entry.type_string()
				);
			}
		}
		let mem = Arc::new(Memory::new(boot_info));
		let gdt = Gdt::new(TSS_BASE, size_of::<Tss>() as u32 - 1);
		let idt = Idt::new();
		let int = InterruptPlane::new();
		let vfs = Vfs::new();
		vfs.register_filesystem(Arc::new(RamFsType));
		vfs.mount("root", "ramfs", Path::root())?;
		vfs.init_default_hierarchy()?;
		log::info!("Boot complete");
		Ok(Self {
			mem,
			vfs,
			int,
			gdt,
			idt,
			tss: IntMutex::new(Tss::new()),
			processes: Mutex::new(Vec::new()),
		})
	}

	/// Spawns a process with a default-sized stack and registers it.
	pub fn spawn_init(&self) -> EResult<Arc<IntMutex<Process>>> {
		let proc = Process::new(self.mem.clone(), DEFAULT_STACK_SIZE)?;
		self.register_process(proc.clone());
		Ok(proc)
	}

	/// Registers a process.
	pub fn register_process(&self, proc: Arc<IntMutex<Process>>) {
		self.processes.lock().push(proc);
	}

	/// Returns the process with the given PID, if any.
	pub fn process_by_pid(&self, pid: Pid) -> Option<Arc<IntMutex<Process>>> {
		self.processes
			.lock()
			.iter()
			.find(|proc| proc.lock().pid() == pid)
			.cloned()
	}

	/// Installs the given process's execution context, as the scheduler does
	/// on a task switch: the address space is bound and the TSS gets the
	/// task's kernel stack pointer.
	pub fn switch_to(&self, proc: &Arc<IntMutex<Process>>, kernel_stack: u32) {
		if let Some(space) = &proc.lock().mem_space {
			space.bind();
		}
		self.tss.lock().set_kernel_stack(kernel_stack);
	}

	/// Handles a trap, panicking on faults the kernel cannot recover from.
	pub fn handle_trap(
		&self,
		frame: &mut IntFrame,
		proc: Option<&Arc<IntMutex<Process>>>,
	) -> TrapOutcome {
		match int::interrupt_handler(self, frame, proc) {
			TrapOutcome::Fatal => panic::kernel_panic(frame),
			outcome => outcome,
		}
	}

	/// Creates a kernel over a small machine, for testing purpose.
	#[cfg(test)]
	pub(crate) fn test_kernel() -> Self {
		// 32 MiB: a DMA zone and a kernel zone, no high memory
		let boot_info = BootInfo::with_memory_size(0x2000000);
		Self::boot(&boot_info).unwrap()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		file::{File, O_RDONLY},
		memory::{vmem::VmFlags, VirtAddr, PAGE_SIZE},
		process::mem_space::MemSpace,
	};

	/// Maps a scratch buffer in the process's memory and copies `data` into
	/// it, returning its address.
	fn push_user_bytes(space: &MemSpace, addr: usize, data: &[u8]) -> VirtAddr {
		let addr = VirtAddr(addr);
		space
			.map(
				addr,
				data.len().max(1).next_multiple_of(PAGE_SIZE),
				VmFlags::PRESENT | VmFlags::RW | VmFlags::USER,
				crate::memory::frame::Gfp::KERNEL,
			)
			.unwrap();
		space.copy_to_user(addr, data).unwrap();
		addr
	}

	/// Fires the system call vector with the given registers.
	fn syscall(
		kernel: &Kernel,
		proc: &Arc<IntMutex<Process>>,
		eax: u32,
		args: [u32; 3],
	) -> u32 {
		let mut frame = IntFrame {
			int_no: 0x80,
			cs: 0x1b,
			eax,
			ebx: args[0],
			ecx: args[1],
			edx: args[2],
			..Default::default()
		};
		let outcome = kernel.handle_trap(&mut frame, Some(proc));
		assert_eq!(outcome, TrapOutcome::Handled);
		frame.eax
	}

	#[test]
	fn boot_mounts_root_hierarchy() {
		let kernel = Kernel::test_kernel();
		let rs = file::vfs::ResolutionSettings::kernel_follow();
		let stat = kernel.vfs.stat(Path::new("/tmp").unwrap(), &rs).unwrap();
		assert_eq!(stat.mode & 0o7777, 0o1777);
		assert!(kernel.vfs.stat(Path::new("/proc").unwrap(), &rs).is_ok());
	}

	#[test]
	fn syscall_open_read_write_via_trap() {
		let kernel = Kernel::test_kernel();
		let proc = kernel.spawn_init().unwrap();
		let space = proc.lock().mem_space.clone().unwrap();
		let path = push_user_bytes(&space, 0x10000, b"/tmp/greeting\0");
		let data = push_user_bytes(&space, 0x20000, b"hello, world");
		// open(path, O_CREAT | O_RDWR, 0644)
		let fd = syscall(&kernel, &proc, 0x005, [path.0 as u32, 0o102, 0o644]);
		assert_eq!(fd, 0);
		// write(fd, data, 12)
		let written = syscall(&kernel, &proc, 0x004, [fd, data.0 as u32, 12]);
		assert_eq!(written, 12);
		// lseek(fd, 0, SEEK_SET)
		assert_eq!(syscall(&kernel, &proc, 0x013, [fd, 0, 0]), 0);
		// read(fd, scratch, 64)
		let scratch = push_user_bytes(&space, 0x30000, &[0; 64]);
		let len = syscall(&kernel, &proc, 0x003, [fd, scratch.0 as u32, 64]);
		assert_eq!(len, 12);
		let mut buf = [0u8; 12];
		space.copy_from_user(scratch, &mut buf).unwrap();
		assert_eq!(&buf, b"hello, world");
		assert_eq!(syscall(&kernel, &proc, 0x006, [fd, 0, 0]), 0);
	}

	#[test]
	fn syscall_errno_convention() {
		let kernel = Kernel::test_kernel();
		let proc = kernel.spawn_init().unwrap();
		let space = proc.lock().mem_space.clone().unwrap();
		let path = push_user_bytes(&space, 0x10000, b"/does/not/exist\0");
		// open without O_CREAT on a missing file
		let ret = syscall(&kernel, &proc, 0x005, [path.0 as u32, 0, 0]);
		assert_eq!(ret as i32, -errno::ENOENT);
	}

	#[test]
	fn invalid_syscall_raises_sigsys() {
		let kernel = Kernel::test_kernel();
		let proc = kernel.spawn_init().unwrap();
		let mut frame = IntFrame {
			int_no: 0x80,
			cs: 0x1b,
			eax: 0xffff,
			..Default::default()
		};
		let outcome = int::interrupt_handler(&kernel, &mut frame, Some(&proc));
		assert_eq!(
			outcome,
			TrapOutcome::Signal(crate::process::Signal::SIGSYS)
		);
		assert!(proc.lock().has_pending_signal());
	}

	#[test]
	fn mount_fork_exit_fd_refcounts() {
		let kernel = Kernel::test_kernel();
		// Mount a second filesystem instance at `/proc`
		kernel
			.vfs
			.mount("procfs", "ramfs", Path::new("/proc").unwrap())
			.unwrap();
		let rs = file::vfs::ResolutionSettings::kernel_follow();
		// The mount's basename shows up in the parent exactly once
		let root = kernel
			.vfs
			.open(Path::root(), &rs, O_RDONLY, 0)
			.unwrap();
		let entries = kernel.vfs.getdents(&root).unwrap();
		assert_eq!(entries.iter().filter(|e| e.name == "proc").count(), 1);
		// Open a file on the mounted filesystem
		kernel
			.vfs
			.creat(Path::new("/proc/1").unwrap(), &rs, 0o444)
			.unwrap();
		let proc = kernel.spawn_init().unwrap();
		let fd = {
			let file = kernel
				.vfs
				.open(Path::new("/proc/1").unwrap(), &rs, O_RDONLY, 0)
				.unwrap();
			proc.lock().fds.create_fd(0, file).unwrap()
		};
		let file = proc.lock().fds.get_fd(fd).unwrap().get_file().clone();
		assert_eq!(File::ref_count(&file), 2);
		// Fork duplicates the table and bumps the reference
		let child = proc.lock().fork().unwrap();
		kernel.register_process(child.clone());
		assert_eq!(File::ref_count(&file), 3);
		// The child's exit closes its copy without reaching the filesystem
		child.lock().exit();
		assert_eq!(File::ref_count(&file), 2);
		proc.lock().fds.close_fd(fd).unwrap();
		assert_eq!(File::ref_count(&file), 1);
	}

	#[test]
	fn fork_syscall_registers_child() {
		let kernel = Kernel::test_kernel();
		let proc = kernel.spawn_init().unwrap();
		let child_pid = syscall(&kernel, &proc, 0x002, [0, 0, 0]);
		let child = kernel.process_by_pid(child_pid).unwrap();
		assert_eq!(child.lock().ppid(), proc.lock().pid());
	}

	#[test]
	fn scheduler_contract() {
		let kernel = Kernel::test_kernel();
		let proc = kernel.spawn_init().unwrap();
		kernel.switch_to(&proc, 0xc07ff000);
		assert_eq!(kernel.tss.lock().esp0, 0xc07ff000);
		let space = proc.lock().mem_space.clone().unwrap();
		drop(space);
	}
}
