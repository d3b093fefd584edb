//! Trap Frames and the Calling Convention
//!
//! A trap from user mode saves the user register file into a `TrapFrame`.
//! The kernel reads the syscall number and arguments from it and writes
//! the result back before returning.
//!
//! # Convention (AArch64 `svc #0`)
//! - x8: syscall number
//! - x0-x5: arguments
//! - x0: return value (negative = `-errno`)
//! - every other register is preserved
//!
//! # Exception Types
//! - SVC from EL0: syscall
//! - Instruction/data abort from EL0: fatal fault for the process
//! - Anything else from EL0: fatal for the process

/// Register holding the syscall number.
pub const REG_SYSCALL_NUMBER: usize = 8;
/// Register holding the return value.
pub const REG_RETURN: usize = 0;
/// Number of argument registers.
pub const ARG_REGS: usize = 6;

/// User register state saved at trap entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapFrame {
    /// General purpose registers x0-x30
    pub gpr: [u64; 31],
    /// Stack pointer (SP_EL0)
    pub sp: u64,
    /// Exception Link Register (return address)
    pub elr: u64,
    /// Saved Program Status Register
    pub spsr: u64,
    /// Exception Syndrome Register
    pub esr: u64,
    /// Fault Address Register
    pub far: u64,
}

/// Exception class extracted from ESR_EL1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionClass {
    Unknown = 0x00,
    SvcAarch64 = 0x15,
    InstructionAbortLowerEl = 0x20,
    DataAbortLowerEl = 0x24,
    Other = 0xFF,
}

impl From<u64> for ExceptionClass {
    fn from(esr: u64) -> Self {
        let ec = ((esr >> 26) & 0x3F) as u8;
        match ec {
            0x00 => ExceptionClass::Unknown,
            0x15 => ExceptionClass::SvcAarch64,
            0x20 => ExceptionClass::InstructionAbortLowerEl,
            0x24 => ExceptionClass::DataAbortLowerEl,
            _ => ExceptionClass::Other,
        }
    }
}

impl ExceptionClass {
    /// ESR value carrying this class.
    #[inline]
    pub const fn to_esr(self) -> u64 {
        (self as u64) << 26
    }
}

impl TrapFrame {
    /// Frame for a process about to start at `entry` with stack `sp`.
    pub fn for_entry(entry: usize, sp: usize) -> Self {
        Self {
            elr: entry as u64,
            sp: sp as u64,
            ..Self::default()
        }
    }

    /// Frame as saved by `svc #0` with `number` and `args` loaded.
    pub fn syscall(number: usize, args: [usize; ARG_REGS]) -> Self {
        let mut frame = Self {
            esr: ExceptionClass::SvcAarch64.to_esr(),
            ..Self::default()
        };
        frame.load_syscall(number, args);
        frame
    }

    /// Load a syscall number and arguments, as user code does before `svc`.
    pub fn load_syscall(&mut self, number: usize, args: [usize; ARG_REGS]) {
        self.gpr[REG_SYSCALL_NUMBER] = number as u64;
        for (reg, arg) in self.gpr.iter_mut().zip(args) {
            *reg = arg as u64;
        }
        self.esr = ExceptionClass::SvcAarch64.to_esr();
    }

    #[inline]
    pub fn exception_class(&self) -> ExceptionClass {
        ExceptionClass::from(self.esr)
    }

    #[inline]
    pub fn syscall_number(&self) -> usize {
        self.gpr[REG_SYSCALL_NUMBER] as usize
    }

    /// Argument `n` (0-based) as a machine word.
    #[inline]
    pub fn arg(&self, n: usize) -> usize {
        debug_assert!(n < ARG_REGS);
        self.gpr[n] as usize
    }

    #[inline]
    pub fn set_return(&mut self, value: i64) {
        self.gpr[REG_RETURN] = value as u64;
    }

    #[inline]
    pub fn return_value(&self) -> i64 {
        self.gpr[REG_RETURN] as i64
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.elr as usize
    }

    #[inline]
    pub fn stack_pointer(&self) -> usize {
        self.sp as usize
    }
}
