//! The fetch-decode-execute stepper.
use crate::decode::Instruction;
use crate::error::{AlignmentError, ExecutionError, MemoryError};
use crate::memory::Memory;
use crate::mnemonic::Mnemonic;
use crate::registers::RegisterFile;
use std::fmt;

/// Signalled by `ecall`/`ebreak` to ask the caller to stop the run. Not
/// an error: the instruction executed successfully, it just means "stop".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Ecall,
    Ebreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continued,
    Halted(Halt),
}

#[derive(Debug, Clone)]
pub struct Cpu {
    registers: RegisterFile,
    cycle: u64,
}

impl Cpu {
    pub fn new(start_pc: u32) -> Self {
        let mut registers = RegisterFile::new();
        registers.set_pc(start_pc);
        Cpu {
            registers,
            cycle: 0,
        }
    }

    pub fn pc(&self) -> u32 {
        self.registers.pc()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    fn fetch(&self, memory: &Memory) -> Result<u32, MemoryError> {
        memory.read_u32(self.registers.pc())
    }

    /// Execute exactly one instruction: fetch, decode, execute, advance.
    ///
    /// A decode failure is logged and a NOP is substituted rather than
    /// propagated, matching the reference's "log it and carry on"
    /// behaviour. Everything else (alignment, out-of-bounds memory)
    /// is fatal to the step.
    pub fn step(&mut self, memory: &mut Memory) -> Result<StepOutcome, ExecutionError> {
        let word = self.fetch(memory)?;
        let instruction = match Instruction::decode(word) {
            Ok(instruction) => instruction,
            Err(e) => {
                log::warn!(
                    "decode error at pc=0x{:08x} (word=0x{word:08x}): {e}; substituting nop",
                    self.registers.pc()
                );
                Instruction::nop()
            }
        };

        let pc_before = self.registers.pc();
        let (outcome, pc_set_by_execute) = self.execute(instruction, memory)?;

        // Branches/JAL/JALR set pc to the target address themselves;
        // everything else falls through to the default pc+4 advance.
        // This has to be tracked explicitly rather than inferred by
        // comparing the pc before and after: the canonical halt-loop
        // instruction `jal x0, 0` is a taken jump whose target is the
        // current pc, so a comparison would mistake it for "pc
        // unchanged" and advance past it instead of holding it there.
        // ecall/ebreak are the one case that hits neither path: they
        // halt without touching pc or registers at all.
        let halted = matches!(outcome, StepOutcome::Halted(_));
        if !pc_set_by_execute && !halted {
            self.registers.set_pc(pc_before.wrapping_add(4));
        }
        if self.registers.pc() % 4 != 0 {
            return Err(AlignmentError {
                pc: self.registers.pc(),
            }
            .into());
        }
        self.cycle += 1;
        Ok(outcome)
    }

    /// Step up to `max_cycles` times, stopping early on an `ecall`,
    /// `ebreak`, or a branch-to-self (the halt-loop convention used by
    /// test programs: `jal x0, 0`).
    pub fn run(
        &mut self,
        memory: &mut Memory,
        max_cycles: u64,
    ) -> Result<StepOutcome, ExecutionError> {
        for _ in 0..max_cycles {
            let pc_before = self.registers.pc();
            let outcome = self.step(memory)?;
            if matches!(outcome, StepOutcome::Halted(_)) {
                return Ok(outcome);
            }
            if self.registers.pc() == pc_before {
                return Ok(StepOutcome::Continued);
            }
        }
        Ok(StepOutcome::Continued)
    }

    /// Returns the step outcome and whether this instruction set `pc`
    /// itself (a control transfer). `step` only applies the default
    /// pc+4 advance when this is `false`.
    fn execute(
        &mut self,
        instruction: Instruction,
        memory: &mut Memory,
    ) -> Result<(StepOutcome, bool), ExecutionError> {
        let pc = self.registers.pc();
        let mut pc_set = false;
        match instruction {
            Instruction::Lui { rd, imm } => {
                self.registers.write(rd, imm as u32);
            }
            Instruction::Auipc { rd, imm } => {
                self.registers.write(rd, pc.wrapping_add(imm as u32));
            }
            Instruction::Jal { rd, imm } => {
                self.registers.write(rd, pc.wrapping_add(4));
                self.registers.set_pc(pc.wrapping_add(imm as u32));
                pc_set = true;
            }
            Instruction::Jalr { rd, rs1, imm } => {
                let base = self.registers.read(rs1);
                let target = base.wrapping_add(imm as u32) & !1;
                self.registers.write(rd, pc.wrapping_add(4));
                self.registers.set_pc(target);
                pc_set = true;
            }
            Instruction::Branch {
                mnemonic,
                rs1,
                rs2,
                imm,
            } => {
                // The reference compares the decoded register *indices*
                // here (`inst.rs1 == inst.rs2`), not their contents,
                // which makes every branch whose operands decode to the
                // same index always taken regardless of register state.
                // Compare values.
                let a = self.registers.read(rs1);
                let b = self.registers.read(rs2);
                let taken = match mnemonic {
                    Mnemonic::Beq => a == b,
                    Mnemonic::Bne => a != b,
                    Mnemonic::Blt => (a as i32) < (b as i32),
                    Mnemonic::Bge => (a as i32) >= (b as i32),
                    Mnemonic::Bltu => a < b,
                    Mnemonic::Bgeu => a >= b,
                    _ => unreachable!(),
                };
                if taken {
                    self.registers.set_pc(pc.wrapping_add(imm as u32));
                    pc_set = true;
                }
            }
            Instruction::Load {
                mnemonic,
                rd,
                rs1,
                imm,
            } => {
                let addr = self.registers.read(rs1).wrapping_add(imm as u32);
                let value = match mnemonic {
                    Mnemonic::Lb => memory.read_u8(addr)? as i8 as i32 as u32,
                    Mnemonic::Lh => memory.read_u16(addr)? as i16 as i32 as u32,
                    Mnemonic::Lw => memory.read_u32(addr)?,
                    Mnemonic::Lbu => memory.read_u8(addr)? as u32,
                    Mnemonic::Lhu => memory.read_u16(addr)? as u32,
                    _ => unreachable!(),
                };
                self.registers.write(rd, value);
            }
            Instruction::Store {
                mnemonic,
                rs1,
                rs2,
                imm,
            } => {
                let addr = self.registers.read(rs1).wrapping_add(imm as u32);
                let value = self.registers.read(rs2);
                match mnemonic {
                    Mnemonic::Sb => memory.write_u8(addr, value as u8)?,
                    Mnemonic::Sh => memory.write_u16(addr, value as u16)?,
                    Mnemonic::Sw => memory.write_u32(addr, value)?,
                    _ => unreachable!(),
                }
            }
            Instruction::OpImm {
                mnemonic,
                rd,
                rs1,
                imm,
            } => {
                let a = self.registers.read(rs1);
                let value = match mnemonic {
                    Mnemonic::Addi => a.wrapping_add(imm as u32),
                    Mnemonic::Slti => ((a as i32) < imm) as u32,
                    Mnemonic::Sltiu => (a < imm as u32) as u32,
                    Mnemonic::Xori => a ^ imm as u32,
                    Mnemonic::Ori => a | imm as u32,
                    Mnemonic::Andi => a & imm as u32,
                    Mnemonic::Slli => a << (imm as u32 & 0x1f),
                    Mnemonic::Srli => a >> (imm as u32 & 0x1f),
                    Mnemonic::Srai => ((a as i32) >> (imm as u32 & 0x1f)) as u32,
                    _ => unreachable!(),
                };
                self.registers.write(rd, value);
            }
            Instruction::Op {
                mnemonic,
                rd,
                rs1,
                rs2,
            } => {
                let a = self.registers.read(rs1);
                let b = self.registers.read(rs2);
                let value = match mnemonic {
                    Mnemonic::Add => a.wrapping_add(b),
                    Mnemonic::Sub => a.wrapping_sub(b),
                    Mnemonic::Sll => a << (b & 0x1f),
                    Mnemonic::Slt => ((a as i32) < (b as i32)) as u32,
                    Mnemonic::Sltu => (a < b) as u32,
                    Mnemonic::Xor => a ^ b,
                    Mnemonic::Srl => a >> (b & 0x1f),
                    Mnemonic::Sra => ((a as i32) >> (b & 0x1f)) as u32,
                    Mnemonic::Or => a | b,
                    Mnemonic::And => a & b,
                    _ => unreachable!(),
                };
                self.registers.write(rd, value);
            }
            Instruction::Fence | Instruction::FenceI => {}
            Instruction::Ecall => return Ok((StepOutcome::Halted(Halt::Ecall), pc_set)),
            Instruction::Ebreak => return Ok((StepOutcome::Halted(Halt::Ebreak), pc_set)),
            Instruction::Csr { mnemonic, .. } => {
                log::warn!("{mnemonic} at pc=0x{pc:08x} is not implemented; treating as nop");
            }
        }
        Ok((StepOutcome::Continued, pc_set))
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "cycle: {}", self.cycle)?;
        write!(f, "{}", self.registers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_program(words: &[u32], max_cycles: u64) -> Cpu {
        let mut memory = Memory::new(4096);
        memory.load_program(words, 0).unwrap();
        let mut cpu = Cpu::new(0);
        cpu.run(&mut memory, max_cycles).unwrap();
        cpu
    }

    const HALT: u32 = 0x0000006f; // jal x0, 0

    #[test]
    fn add() {
        let cpu = run_program(
            &[0x00200093, 0x00100113, 0x002081b3, HALT],
            10,
        );
        assert_eq!(cpu.registers().read(3), 3);
    }

    #[test]
    fn sub() {
        let cpu = run_program(
            &[0x00500093, 0x00200113, 0x402081b3, HALT],
            10,
        );
        assert_eq!(cpu.registers().read(3), 3);
    }

    #[test]
    fn or() {
        let cpu = run_program(
            &[0x00100093, 0x00200113, 0x0020e1b3, HALT],
            10,
        );
        assert_eq!(cpu.registers().read(3), 3);
    }

    #[test]
    fn addi() {
        let cpu = run_program(&[0x00100093, 0x00208113, HALT], 10);
        assert_eq!(cpu.registers().read(2), 3);
    }

    #[test]
    fn beq_taken_over_nop() {
        let cpu = run_program(
            &[
                0x00100093, // addi x1, x0, 1
                0x00100113, // addi x2, x0, 1
                0x00208463, // beq x1, x2, +8
                0x00000013, // nop (skipped)
                0x00300193, // addi x3, x0, 3
                HALT,
            ],
            10,
        );
        assert_eq!(cpu.registers().read(3), 3);
    }

    #[test]
    fn loop_sum_1_to_10() {
        // x1 = 0 (sum), x2 = 1 (i), x3 = 11 (limit)
        // loop: x1 += x2; x2 += 1; if x2 != x3 goto loop
        let cpu = run_program(
            &[
                0x00000093, // addi x1, x0, 0
                0x00100113, // addi x2, x0, 1
                0x00b00193, // addi x3, x0, 11
                0x002080b3, // add x1, x1, x2
                0x00110113, // addi x2, x2, 1
                0xfe311ce3, // bne x2, x3, -8
                HALT,
            ],
            100,
        );
        assert_eq!(cpu.registers().read(1), 55);
        assert_eq!(cpu.registers().read(2), 11);
    }

    #[test]
    fn branch_compares_values_not_indices() {
        // x1 = 5, x3 = 5: beq x1, x3 must be taken because values are
        // equal, regardless of the register indices themselves.
        let cpu = run_program(
            &[
                0x00500093, // addi x1, x0, 5
                0x00500193, // addi x3, x0, 5
                0x00308463, // beq x1, x3, +8
                0x00100213, // addi x4, x0, 1 (skipped if taken)
                0x00200213, // addi x4, x0, 2
                HALT,
            ],
            10,
        );
        assert_eq!(cpu.registers().read(4), 2);
    }

    #[test]
    fn decode_failure_substitutes_nop_and_continues() {
        let mut memory = Memory::new(16);
        memory.load_program(&[0b1111111, HALT], 0).unwrap();
        let mut cpu = Cpu::new(0);
        let outcome = cpu.step(&mut memory).unwrap();
        assert_eq!(outcome, StepOutcome::Continued);
        assert_eq!(cpu.pc(), 4);
    }

    #[test]
    fn ecall_halts_without_moving_pc() {
        let mut memory = Memory::new(16);
        memory.load_program(&[0x00000073], 0).unwrap();
        let mut cpu = Cpu::new(0);
        let outcome = cpu.step(&mut memory).unwrap();
        assert_eq!(outcome, StepOutcome::Halted(Halt::Ecall));
        assert_eq!(cpu.pc(), 0);
    }

    #[test]
    fn ebreak_halts_without_moving_pc() {
        let mut memory = Memory::new(16);
        memory.load_program(&[0x00100073], 0).unwrap();
        let mut cpu = Cpu::new(0);
        let outcome = cpu.step(&mut memory).unwrap();
        assert_eq!(outcome, StepOutcome::Halted(Halt::Ebreak));
        assert_eq!(cpu.pc(), 0);
    }

    #[test]
    fn misaligned_jump_target_is_fatal() {
        let mut memory = Memory::new(16);
        // jalr x0, x0, 2 -> target 2, not 4-byte aligned
        memory.load_program(&[0x00200067], 0).unwrap();
        let mut cpu = Cpu::new(0);
        assert!(cpu.step(&mut memory).is_err());
    }

    #[test]
    fn store_byte_packs_low_bits_only() {
        let mut memory = Memory::new(16);
        // addi x1, x0, -1 ; sb x1, 0(x0)
        memory
            .load_program(&[0xfff00093, 0x00100023], 0)
            .unwrap();
        let mut cpu = Cpu::new(0);
        cpu.step(&mut memory).unwrap();
        cpu.step(&mut memory).unwrap();
        assert_eq!(memory.read_u8(0).unwrap(), 0xff);
        assert_eq!(memory.read_u32(0).unwrap(), 0xff);
    }
}
