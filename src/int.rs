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

//! Interrupt routing.
//!
//! Every trampoline enters [`interrupt_handler`] with the constructed trap
//! frame. The dispatcher routes CPU exceptions and software-installed
//! routines through the ISR table, hardware interrupts through the per-line
//! handler chains (ending with the PIC end of interrupt), and the system call
//! vector into the system call table.
//!
//! Installing and uninstalling handlers takes the interrupt-table lock with
//! interrupts masked.

use crate::{
	arch::x86::{
		idt::{ENTRIES_COUNT, EXCEPTIONS_COUNT, IRQS_COUNT, SYSCALL_ENTRY},
		pic::{Pic, MASTER_OFFSET, SLAVE_OFFSET},
	},
	errno,
	errno::EResult,
	process::{Process, Signal},
	sync::mutex::IntMutex,
	syscall,
	Kernel,
};
use alloc::{sync::Arc, vec::Vec};
use core::ptr;

/// The list of interrupt error messages ordered by index of the
/// corresponding interrupt vector.
pub static ERROR_MESSAGES: &[&str] = &[
	"Divide-by-zero Error",
	"Debug",
	"Non-maskable Interrupt",
	"Breakpoint",
	"Overflow",
	"Bound Range Exceeded",
	"Invalid Opcode",
	"Device Not Available",
	"Double Fault",
	"Coprocessor Segment Overrun",
	"Invalid TSS",
	"Segment Not Present",
	"Stack-Segment Fault",
	"General Protection Fault",
	"Page Fault",
	"Unknown",
	"x87 Floating-Point Exception",
	"Alignment Check",
	"Machine Check",
	"SIMD Floating-Point Exception",
	"Virtualization Exception",
	"Unknown",
	"Unknown",
	"Unknown",
	"Unknown",
	"Unknown",
	"Unknown",
	"Unknown",
	"Unknown",
	"Unknown",
	"Security Exception",
	"Unknown",
];

/// The trap frame pushed by the interrupt trampolines.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[allow(missing_docs)]
pub struct IntFrame {
	// General purpose registers, pushed by the trampoline
	pub edi: u32,
	pub esi: u32,
	pub ebp: u32,
	pub esp: u32,
	pub ebx: u32,
	pub edx: u32,
	pub ecx: u32,
	pub eax: u32,
	// Segment selectors
	pub ds: u32,
	pub es: u32,
	pub fs: u32,
	pub gs: u32,
	// Pushed by the trampoline before the common body
	pub int_no: u32,
	pub err_code: u32,
	// Pushed by the CPU
	pub eip: u32,
	pub cs: u32,
	pub eflags: u32,
	// Only present when the trap comes from ring 3
	pub useresp: u32,
	pub ss: u32,
}

impl IntFrame {
	/// Returns the ring the interrupted code was running at.
	pub fn ring(&self) -> u8 {
		(self.cs & 0b11) as u8
	}

	/// Returns the system call number.
	pub fn syscall_id(&self) -> usize {
		self.eax as usize
	}

	/// Returns the `n`th system call argument, taken from `ebx`, `ecx`,
	/// `edx`, `esi`, `edi` and `ebp` in this order.
	pub fn syscall_arg(&self, n: usize) -> usize {
		let val = match n {
			0 => self.ebx,
			1 => self.ecx,
			2 => self.edx,
			3 => self.esi,
			4 => self.edi,
			5 => self.ebp,
			_ => 0,
		};
		val as usize
	}

	/// Writes the system call return value.
	pub fn set_syscall_return(&mut self, value: usize) {
		self.eax = value as u32;
	}
}

/// The action the kernel takes after the dispatcher returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrapOutcome {
	/// Execution resumes.
	Handled,
	/// A signal was queued on the faulting process, to be delivered on the
	/// next return to user mode.
	Signal(Signal),
	/// The fault happened in kernel mode and is fatal.
	Fatal,
}

/// A routine handling one interrupt vector.
pub type IsrHandler = fn(&mut IntFrame);
/// A handler chained on one IRQ line.
pub type IrqHandler = fn(&mut IntFrame);

/// An installed interrupt service routine.
#[derive(Clone, Copy)]
pub struct IsrEntry {
	/// The routine.
	pub handler: IsrHandler,
	/// A human-readable description of the routine.
	pub description: &'static str,
}

/// A handler chained on an IRQ line.
#[derive(Clone, Copy)]
struct IrqEntry {
	handler: IrqHandler,
	description: &'static str,
}

/// One IRQ line and its handler chain.
#[derive(Default)]
struct IrqLine {
	handlers: Vec<IrqEntry>,
}

/// The interrupt routing tables.
pub struct InterruptPlane {
	/// The ISR table, one optional routine per vector.
	isr: IntMutex<Vec<Option<IsrEntry>>>,
	/// The IRQ lines.
	irq: IntMutex<Vec<IrqLine>>,
	/// The PIC pair.
	pub pic: IntMutex<Pic>,
}

impl Default for InterruptPlane {
	fn default() -> Self {
		Self::new()
	}
}

impl InterruptPlane {
	/// Creates the routing tables, with the PIC remapped above the CPU
	/// exception vectors.
	pub fn new() -> Self {
		let mut pic = Pic::new();
		pic.remap(MASTER_OFFSET, SLAVE_OFFSET);
		let mut isr = Vec::new();
		isr.resize(ENTRIES_COUNT, None);
		let mut irq = Vec::new();
		irq.resize_with(IRQS_COUNT, IrqLine::default);
		Self {
			isr: IntMutex::new(isr),
			irq: IntMutex::new(irq),
			pic: IntMutex::new(pic),
		}
	}

	/// Installs the routine `handler` on the vector `vector`.
	///
	/// The previous routine, if any, is replaced.
	pub fn install_isr(
		&self,
		vector: usize,
		handler: IsrHandler,
		description: &'static str,
	) -> EResult<()> {
		let mut isr = self.isr.lock();
		let slot = isr.get_mut(vector).ok_or(errno!(EINVAL))?;
		*slot = Some(IsrEntry {
			handler,
			description,
		});
		Ok(())
	}

	/// Uninstalls the routine on the vector `vector`, restoring the default
	/// handler.
	pub fn uninstall_isr(&self, vector: usize) -> EResult<()> {
		let mut isr = self.isr.lock();
		let slot = isr.get_mut(vector).ok_or(errno!(EINVAL))?;
		*slot = None;
		Ok(())
	}

	/// Returns the routine installed on the vector `vector`, if any.
	pub fn isr_routine(&self, vector: usize) -> Option<IsrEntry> {
		self.isr.lock().get(vector).copied().flatten()
	}

	/// Chains `handler` on the IRQ line `line`.
	///
	/// Handlers on one line run in installation order.
	pub fn install_irq(
		&self,
		line: usize,
		handler: IrqHandler,
		description: &'static str,
	) -> EResult<()> {
		let mut irq = self.irq.lock();
		let line = irq.get_mut(line).ok_or(errno!(EINVAL))?;
		line.handlers.push(IrqEntry {
			handler,
			description,
		});
		Ok(())
	}

	/// Removes `handler` from the IRQ line `line`.
	pub fn uninstall_irq(&self, line: usize, handler: IrqHandler) -> EResult<()> {
		let mut irq = self.irq.lock();
		let line = irq.get_mut(line).ok_or(errno!(EINVAL))?;
		let i = line
			.handlers
			.iter()
			.position(|e| ptr::fn_addr_eq(e.handler, handler))
			.ok_or(errno!(EINVAL))?;
		line.handlers.remove(i);
		Ok(())
	}

	/// Returns the descriptions of the handlers chained on the IRQ line
	/// `line`.
	pub fn irq_descriptions(&self, line: usize) -> Vec<&'static str> {
		self.irq
			.lock()
			.get(line)
			.map(|l| l.handlers.iter().map(|e| e.description).collect())
			.unwrap_or_default()
	}
}

/// Formats a structured dump of the trap frame.
pub fn fmt_trap(frame: &IntFrame) -> alloc::string::String {
	let name = ERROR_MESSAGES
		.get(frame.int_no as usize)
		.copied()
		.unwrap_or("Unknown");
	alloc::format!(
		"{name} (vector: {int:#x}, code: {code:#x})\n\
		 eip: {eip:08x} cs: {cs:08x} eflags: {eflags:08x} ring: {ring}\n\
		 eax: {eax:08x} ebx: {ebx:08x} ecx: {ecx:08x} edx: {edx:08x}\n\
		 esi: {esi:08x} edi: {edi:08x} ebp: {ebp:08x} esp: {esp:08x}",
		int = frame.int_no,
		code = frame.err_code,
		eip = frame.eip,
		cs = frame.cs,
		eflags = frame.eflags,
		ring = frame.ring(),
		eax = frame.eax,
		ebx = frame.ebx,
		ecx = frame.ecx,
		edx = frame.edx,
		esi = frame.esi,
		edi = frame.edi,
		ebp = frame.ebp,
		esp = frame.esp,
	)
}

/// Handles a trap with no installed routine.
fn default_fault_handler(
	frame: &mut IntFrame,
	proc: Option<&Arc<IntMutex<Process>>>,
) -> TrapOutcome {
	log::error!("{}", fmt_trap(frame));
	if frame.ring() == 3 {
		if let Some(proc) = proc {
			let mut proc = proc.lock();
			proc.kill(Signal::SIGSEGV);
			log::error!("process {} killed by SIGSEGV", proc.pid());
		}
		TrapOutcome::Signal(Signal::SIGSEGV)
	} else {
		TrapOutcome::Fatal
	}
}

/// Dispatches hardware interrupts: every handler chained on the line runs in
/// installation order, then the PIC gets its end of interrupt.
pub fn irq_handler(kernel: &Kernel, frame: &mut IntFrame) {
	let line = (frame.int_no as usize).wrapping_sub(EXCEPTIONS_COUNT);
	if line >= IRQS_COUNT {
		return;
	}
	kernel.int.pic.lock().begin_interrupt(line as u8);
	// Copy the chain out so handlers can mutate the tables
	let handlers: Vec<IrqEntry> = {
		let irq = kernel.int.irq.lock();
		irq[line].handlers.clone()
	};
	for entry in handlers {
		(entry.handler)(frame);
	}
	kernel.int.pic.lock().end_of_interrupt(line as u8);
}

/// The central trap entry: routes the frame by its vector.
///
/// `proc` is the process that was running when the trap fired, if any.
pub fn interrupt_handler(
	kernel: &Kernel,
	frame: &mut IntFrame,
	proc: Option<&Arc<IntMutex<Process>>>,
) -> TrapOutcome {
	let id = frame.int_no as usize;
	match id {
		SYSCALL_ENTRY => match proc {
			Some(proc) => syscall::syscall_handler(kernel, proc, frame),
			None => TrapOutcome::Fatal,
		},
		id if (EXCEPTIONS_COUNT..EXCEPTIONS_COUNT + IRQS_COUNT).contains(&id) => {
			irq_handler(kernel, frame);
			TrapOutcome::Handled
		}
		_ => {
			let routine = kernel.int.isr_routine(id);
			match routine {
				Some(entry) => {
					(entry.handler)(frame);
					TrapOutcome::Handled
				}
				None if id < EXCEPTIONS_COUNT => default_fault_handler(frame, proc),
				None => {
					log::warn!("spurious interrupt on vector {id:#x}");
					TrapOutcome::Handled
				}
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::arch::x86::idt::ENTRIES_COUNT;
	use core::sync::atomic::{AtomicU32, Ordering};

	fn handler_a(_frame: &mut IntFrame) {}

	fn handler_b(frame: &mut IntFrame) {
		frame.ebx = 0xdeadbeef;
	}

	#[test]
	fn isr_install_uninstall() {
		let plane = InterruptPlane::new();
		plane
			.install_isr(52, handler_b, "test handler")
			.unwrap();
		let entry = plane.isr_routine(52).unwrap();
		assert!(ptr::fn_addr_eq(entry.handler, handler_b as IsrHandler));
		assert_eq!(entry.description, "test handler");
		plane.uninstall_isr(52).unwrap();
		assert!(plane.isr_routine(52).is_none());
		// Reinstall works, out of bounds does not
		plane.install_isr(52, handler_a, "again").unwrap();
		assert!(plane.install_isr(ENTRIES_COUNT, handler_a, "oob").is_err());
	}

	static IRQ_ORDER: AtomicU32 = AtomicU32::new(0);

	fn irq_first(_frame: &mut IntFrame) {
		IRQ_ORDER.fetch_add(1, Ordering::Relaxed);
	}

	fn irq_second(frame: &mut IntFrame) {
		frame.ecx = IRQ_ORDER.load(Ordering::Relaxed);
	}

	#[test]
	fn irq_chain_order() {
		let kernel = crate::Kernel::test_kernel();
		IRQ_ORDER.store(0, Ordering::Relaxed);
		kernel.int.install_irq(5, irq_first, "first").unwrap();
		kernel.int.install_irq(5, irq_second, "second").unwrap();
		assert_eq!(kernel.int.irq_descriptions(5), ["first", "second"]);
		let mut frame = IntFrame {
			int_no: (EXCEPTIONS_COUNT + 5) as u32,
			..Default::default()
		};
		let outcome = interrupt_handler(&kernel, &mut frame, None);
		assert_eq!(outcome, TrapOutcome::Handled);
		// The first handler ran before the second
		assert_eq!(frame.ecx, 1);
		// EOI was issued
		assert!(!kernel.int.pic.lock().is_in_service(5));
		kernel.int.uninstall_irq(5, irq_first).unwrap();
		assert_eq!(kernel.int.irq_descriptions(5), ["second"]);
	}

	#[test]
	fn user_fault_queues_sigsegv() {
		let kernel = crate::Kernel::test_kernel();
		let proc = kernel.spawn_init().unwrap();
		let mut frame = IntFrame {
			int_no: 13,
			cs: 0x1b,
			..Default::default()
		};
		let outcome = interrupt_handler(&kernel, &mut frame, Some(&proc));
		assert_eq!(outcome, TrapOutcome::Signal(Signal::SIGSEGV));
		assert!(proc.lock().has_pending_signal());
	}

	#[test]
	fn kernel_fault_is_fatal() {
		let kernel = crate::Kernel::test_kernel();
		let mut frame = IntFrame {
			int_no: 14,
			cs: 0x08,
			..Default::default()
		};
		let outcome = interrupt_handler(&kernel, &mut frame, None);
		assert_eq!(outcome, TrapOutcome::Fatal);
	}

	#[test]
	fn installed_exception_routine_runs() {
		let kernel = crate::Kernel::test_kernel();
		kernel.int.install_isr(3, handler_b, "breakpoint").unwrap();
		let mut frame = IntFrame {
			int_no: 3,
			cs: 0x08,
			..Default::default()
		};
		let outcome = interrupt_handler(&kernel, &mut frame, None);
		assert_eq!(outcome, TrapOutcome::Handled);
		assert_eq!(frame.ebx, 0xdeadbeef);
	}
}
