use thiserror::Error;

/// Errors raised while classifying a 32-bit instruction word.
///
/// Decode failures are not fatal to a running [`crate::cpu::Cpu`]: the
/// stepper logs them and substitutes a NOP, matching the behaviour of
/// the reference implementation this crate supersedes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid or unimplemented opcode 0b{0:07b}")]
    InvalidOpcode(u32),
    #[error("opcode 0b{opcode:07b} has no instruction for funct3=0b{funct3:03b}")]
    InvalidFunct { opcode: u32, funct3: u32 },
}

/// Out-of-range access against a [`crate::memory::Memory`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("address 0x{addr:x} (len {len}) is out of bounds for memory of size {size}")]
pub struct MemoryError {
    pub addr: u32,
    pub len: u32,
    pub size: u32,
}

/// Raised when the program counter is not a multiple of 4 after a step.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("program counter 0x{pc:x} is misaligned")]
pub struct AlignmentError {
    pub pc: u32,
}

/// The union of everything that can stop a [`crate::cpu::Cpu::step`].
///
/// `DecodeError` does not appear here: the stepper handles it internally
/// by substituting a NOP, so it never escapes `step`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionError {
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}
