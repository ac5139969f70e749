//! Instruction decoding: classify a 32-bit word into a closed set of
//! typed variants.
//!
//! The reference decoder dispatches on `type(inst)` at execution time
//! and builds the mnemonic as a `format!`-assembled string at decode
//! time, with several `panic!("Should change this to enum")` placeholders
//! for unreachable-in-practice funct3 values. Here the whole thing is a
//! single closed enum: the executor's match in [`crate::cpu`] is
//! exhaustive, and the compiler rejects a forgotten mnemonic outright.
use crate::error::DecodeError;
use crate::fields::*;
use crate::mnemonic::Mnemonic;
use std::fmt;

const OPCODE_LUI: u32 = 0b0110111;
const OPCODE_AUIPC: u32 = 0b0010111;
const OPCODE_JAL: u32 = 0b1101111;
const OPCODE_JALR: u32 = 0b1100111;
const OPCODE_BRANCH: u32 = 0b1100011;
const OPCODE_LOAD: u32 = 0b0000011;
const OPCODE_STORE: u32 = 0b0100011;
const OPCODE_OP_IMM: u32 = 0b0010011;
const OPCODE_OP: u32 = 0b0110011;
const OPCODE_FENCE: u32 = 0b0001111;
const OPCODE_SYSTEM: u32 = 0b1110011;

/// A decoded RV32I instruction.
///
/// Fields mirror the field names in the instruction set reference:
/// `rd`/`rs1`/`rs2` are 5-bit register indices, `imm` is already
/// sign-extended to 32 bits (or, for [`Instruction::Lui`]/
/// [`Instruction::Auipc`], left shifted into the upper bits per the
/// U-type encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Load `imm` (upper 20 bits, low 12 zero) into `rd`.
    Lui { rd: u8, imm: i32 },
    /// `rd = pc + imm`.
    Auipc { rd: u8, imm: i32 },
    /// `rd = pc + 4; pc = pc + imm`.
    Jal { rd: u8, imm: i32 },
    /// `rd = pc + 4; pc = (rs1 + imm) & !1`.
    Jalr { rd: u8, rs1: u8, imm: i32 },
    /// Conditional branch: if taken, `pc = pc + imm`.
    Branch {
        mnemonic: Mnemonic,
        rs1: u8,
        rs2: u8,
        imm: i32,
    },
    /// `rd = mem[rs1 + imm]`, width and sign/zero extension per mnemonic.
    Load {
        mnemonic: Mnemonic,
        rd: u8,
        rs1: u8,
        imm: i32,
    },
    /// `mem[rs1 + imm] = rs2`, width per mnemonic.
    Store {
        mnemonic: Mnemonic,
        rs1: u8,
        rs2: u8,
        imm: i32,
    },
    /// Register-immediate arithmetic/logical op: `rd = rs1 OP imm`.
    OpImm {
        mnemonic: Mnemonic,
        rd: u8,
        rs1: u8,
        imm: i32,
    },
    /// Register-register arithmetic/logical op: `rd = rs1 OP rs2`.
    Op {
        mnemonic: Mnemonic,
        rd: u8,
        rs1: u8,
        rs2: u8,
    },
    /// No-op with respect to the memory model; no reordering to enforce.
    Fence,
    FenceI,
    /// Signals the harness to halt the run; does not touch PC or registers.
    Ecall,
    Ebreak,
    /// CSR access. Not implemented: treated as a NOP with a logged warning.
    Csr {
        mnemonic: Mnemonic,
        rd: u8,
        rs1: u8,
        csr: u16,
    },
}

impl Instruction {
    /// The canonical NOP (`addi x0, x0, 0`), used as the decode-failure
    /// fallback and as a reusable test fixture.
    pub fn nop() -> Self {
        Instruction::OpImm {
            mnemonic: Mnemonic::Addi,
            rd: 0,
            rs1: 0,
            imm: 0,
        }
    }

    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        let op = opcode(word);
        match op {
            OPCODE_LUI => Ok(Instruction::Lui {
                rd: rd(word),
                imm: imm_utype(word),
            }),
            OPCODE_AUIPC => Ok(Instruction::Auipc {
                rd: rd(word),
                imm: imm_utype(word),
            }),
            OPCODE_JAL => Ok(Instruction::Jal {
                rd: rd(word),
                imm: imm_jtype(word),
            }),
            OPCODE_JALR => {
                if funct3(word) != 0b000 {
                    return Err(DecodeError::InvalidFunct {
                        opcode: op,
                        funct3: funct3(word),
                    });
                }
                Ok(Instruction::Jalr {
                    rd: rd(word),
                    rs1: rs1(word),
                    imm: imm_itype(word),
                })
            }
            OPCODE_BRANCH => {
                let mnemonic = match funct3(word) {
                    0b000 => Mnemonic::Beq,
                    0b001 => Mnemonic::Bne,
                    0b100 => Mnemonic::Blt,
                    0b101 => Mnemonic::Bge,
                    0b110 => Mnemonic::Bltu,
                    0b111 => Mnemonic::Bgeu,
                    f => {
                        return Err(DecodeError::InvalidFunct {
                            opcode: op,
                            funct3: f,
                        })
                    }
                };
                Ok(Instruction::Branch {
                    mnemonic,
                    rs1: rs1(word),
                    rs2: rs2(word),
                    imm: imm_btype(word),
                })
            }
            OPCODE_LOAD => {
                let mnemonic = match funct3(word) {
                    0b000 => Mnemonic::Lb,
                    0b001 => Mnemonic::Lh,
                    0b010 => Mnemonic::Lw,
                    0b100 => Mnemonic::Lbu,
                    0b101 => Mnemonic::Lhu,
                    f => {
                        return Err(DecodeError::InvalidFunct {
                            opcode: op,
                            funct3: f,
                        })
                    }
                };
                Ok(Instruction::Load {
                    mnemonic,
                    rd: rd(word),
                    rs1: rs1(word),
                    imm: imm_itype(word),
                })
            }
            OPCODE_STORE => {
                let mnemonic = match funct3(word) {
                    0b000 => Mnemonic::Sb,
                    0b001 => Mnemonic::Sh,
                    0b010 => Mnemonic::Sw,
                    f => {
                        return Err(DecodeError::InvalidFunct {
                            opcode: op,
                            funct3: f,
                        })
                    }
                };
                Ok(Instruction::Store {
                    mnemonic,
                    rs1: rs1(word),
                    rs2: rs2(word),
                    imm: imm_stype(word),
                })
            }
            OPCODE_OP_IMM => {
                let f3 = funct3(word);
                let mnemonic = match f3 {
                    0b000 => Mnemonic::Addi,
                    0b010 => Mnemonic::Slti,
                    0b011 => Mnemonic::Sltiu,
                    0b100 => Mnemonic::Xori,
                    0b110 => Mnemonic::Ori,
                    0b111 => Mnemonic::Andi,
                    0b001 => Mnemonic::Slli,
                    0b101 => {
                        if is_alt(word) {
                            Mnemonic::Srai
                        } else {
                            Mnemonic::Srli
                        }
                    }
                    f => {
                        return Err(DecodeError::InvalidFunct {
                            opcode: op,
                            funct3: f,
                        })
                    }
                };
                let imm = match mnemonic {
                    Mnemonic::Slli | Mnemonic::Srli | Mnemonic::Srai => shamt(word) as i32,
                    _ => imm_itype(word),
                };
                Ok(Instruction::OpImm {
                    mnemonic,
                    rd: rd(word),
                    rs1: rs1(word),
                    imm,
                })
            }
            OPCODE_OP => {
                let f3 = funct3(word);
                let mnemonic = match f3 {
                    0b000 => {
                        if is_alt(word) {
                            Mnemonic::Sub
                        } else {
                            Mnemonic::Add
                        }
                    }
                    0b001 => Mnemonic::Sll,
                    0b010 => Mnemonic::Slt,
                    0b011 => Mnemonic::Sltu,
                    0b100 => Mnemonic::Xor,
                    0b101 => {
                        if is_alt(word) {
                            Mnemonic::Sra
                        } else {
                            Mnemonic::Srl
                        }
                    }
                    0b110 => Mnemonic::Or,
                    0b111 => Mnemonic::And,
                    f => {
                        return Err(DecodeError::InvalidFunct {
                            opcode: op,
                            funct3: f,
                        })
                    }
                };
                Ok(Instruction::Op {
                    mnemonic,
                    rd: rd(word),
                    rs1: rs1(word),
                    rs2: rs2(word),
                })
            }
            OPCODE_FENCE => match funct3(word) {
                0b000 => Ok(Instruction::Fence),
                0b001 => Ok(Instruction::FenceI),
                f => Err(DecodeError::InvalidFunct {
                    opcode: op,
                    funct3: f,
                }),
            },
            OPCODE_SYSTEM => {
                let f3 = funct3(word);
                if f3 == 0b000 {
                    match rs2(word) {
                        0 => Ok(Instruction::Ecall),
                        1 => Ok(Instruction::Ebreak),
                        _ => Err(DecodeError::InvalidFunct {
                            opcode: op,
                            funct3: f3,
                        }),
                    }
                } else {
                    let mnemonic = match f3 {
                        0b001 => Mnemonic::Csrrw,
                        0b010 => Mnemonic::Csrrs,
                        0b011 => Mnemonic::Csrrc,
                        0b101 => Mnemonic::Csrrwi,
                        0b110 => Mnemonic::Csrrsi,
                        0b111 => Mnemonic::Csrrci,
                        f => {
                            return Err(DecodeError::InvalidFunct {
                                opcode: op,
                                funct3: f,
                            })
                        }
                    };
                    Ok(Instruction::Csr {
                        mnemonic,
                        rd: rd(word),
                        rs1: rs1(word),
                        csr: extract_field(word, 31, 20) as u16,
                    })
                }
            }
            _ => Err(DecodeError::InvalidOpcode(op)),
        }
    }

    /// Inverse of [`Instruction::decode`]. Test-only scaffolding used to
    /// drive `decode(encode(i)) == i` round-trip checks; not part of
    /// the simulation API.
    pub fn encode(&self) -> u32 {
        let r5 = |v: u8| (v as u32) & 0x1f;
        match *self {
            Instruction::Lui { rd, imm } => (imm as u32 & 0xffff_f000) | (r5(rd) << 7) | OPCODE_LUI,
            Instruction::Auipc { rd, imm } => {
                (imm as u32 & 0xffff_f000) | (r5(rd) << 7) | OPCODE_AUIPC
            }
            Instruction::Jal { rd, imm } => {
                let imm = imm as u32;
                let b20 = (imm >> 20) & 1;
                let b19_12 = (imm >> 12) & 0xff;
                let b11 = (imm >> 11) & 1;
                let b10_1 = (imm >> 1) & 0x3ff;
                (b20 << 31) | (b10_1 << 21) | (b11 << 20) | (b19_12 << 12) | (r5(rd) << 7) | OPCODE_JAL
            }
            Instruction::Jalr { rd, rs1, imm } => {
                ((imm as u32 & 0xfff) << 20) | (r5(rs1) << 15) | (r5(rd) << 7) | OPCODE_JALR
            }
            Instruction::Branch {
                mnemonic,
                rs1,
                rs2,
                imm,
            } => {
                let f3 = branch_funct3(mnemonic);
                let imm = imm as u32;
                let b12 = (imm >> 12) & 1;
                let b11 = (imm >> 11) & 1;
                let b10_5 = (imm >> 5) & 0x3f;
                let b4_1 = (imm >> 1) & 0xf;
                (b12 << 31)
                    | (b10_5 << 25)
                    | (r5(rs2) << 20)
                    | (r5(rs1) << 15)
                    | (f3 << 12)
                    | (b4_1 << 8)
                    | (b11 << 7)
                    | OPCODE_BRANCH
            }
            Instruction::Load {
                mnemonic,
                rd,
                rs1,
                imm,
            } => {
                let f3 = load_funct3(mnemonic);
                ((imm as u32 & 0xfff) << 20) | (r5(rs1) << 15) | (f3 << 12) | (r5(rd) << 7) | OPCODE_LOAD
            }
            Instruction::Store {
                mnemonic,
                rs1,
                rs2,
                imm,
            } => {
                let f3 = store_funct3(mnemonic);
                let imm = imm as u32;
                let hi = (imm >> 5) & 0x7f;
                let lo = imm & 0x1f;
                (hi << 25) | (r5(rs2) << 20) | (r5(rs1) << 15) | (f3 << 12) | (lo << 7) | OPCODE_STORE
            }
            Instruction::OpImm {
                mnemonic,
                rd,
                rs1,
                imm,
            } => {
                let (f3, funct7_bits) = op_imm_funct(mnemonic);
                let imm_field = match mnemonic {
                    Mnemonic::Slli | Mnemonic::Srli | Mnemonic::Srai => {
                        ((funct7_bits as u32) << 5) | (imm as u32 & 0x1f)
                    }
                    _ => imm as u32 & 0xfff,
                };
                (imm_field << 20) | (r5(rs1) << 15) | (f3 << 12) | (r5(rd) << 7) | OPCODE_OP_IMM
            }
            Instruction::Op {
                mnemonic,
                rd,
                rs1,
                rs2,
            } => {
                let (f3, f7) = op_funct(mnemonic);
                ((f7 as u32) << 25)
                    | (r5(rs2) << 20)
                    | (r5(rs1) << 15)
                    | (f3 << 12)
                    | (r5(rd) << 7)
                    | OPCODE_OP
            }
            Instruction::Fence => OPCODE_FENCE,
            Instruction::FenceI => (0b001 << 12) | OPCODE_FENCE,
            Instruction::Ecall => OPCODE_SYSTEM,
            Instruction::Ebreak => (1 << 20) | OPCODE_SYSTEM,
            Instruction::Csr {
                mnemonic,
                rd,
                rs1,
                csr,
            } => {
                let f3 = csr_funct3(mnemonic);
                ((csr as u32) << 20) | (r5(rs1) << 15) | (f3 << 12) | (r5(rd) << 7) | OPCODE_SYSTEM
            }
        }
    }
}

fn branch_funct3(m: Mnemonic) -> u32 {
    match m {
        Mnemonic::Beq => 0b000,
        Mnemonic::Bne => 0b001,
        Mnemonic::Blt => 0b100,
        Mnemonic::Bge => 0b101,
        Mnemonic::Bltu => 0b110,
        Mnemonic::Bgeu => 0b111,
        _ => unreachable!(),
    }
}

fn load_funct3(m: Mnemonic) -> u32 {
    match m {
        Mnemonic::Lb => 0b000,
        Mnemonic::Lh => 0b001,
        Mnemonic::Lw => 0b010,
        Mnemonic::Lbu => 0b100,
        Mnemonic::Lhu => 0b101,
        _ => unreachable!(),
    }
}

fn store_funct3(m: Mnemonic) -> u32 {
    match m {
        Mnemonic::Sb => 0b000,
        Mnemonic::Sh => 0b001,
        Mnemonic::Sw => 0b010,
        _ => unreachable!(),
    }
}

fn op_imm_funct(m: Mnemonic) -> (u32, u32) {
    match m {
        Mnemonic::Addi => (0b000, 0),
        Mnemonic::Slti => (0b010, 0),
        Mnemonic::Sltiu => (0b011, 0),
        Mnemonic::Xori => (0b100, 0),
        Mnemonic::Ori => (0b110, 0),
        Mnemonic::Andi => (0b111, 0),
        Mnemonic::Slli => (0b001, 0b0000000),
        Mnemonic::Srli => (0b101, 0b0000000),
        Mnemonic::Srai => (0b101, 0b0100000),
        _ => unreachable!(),
    }
}

fn op_funct(m: Mnemonic) -> (u32, u32) {
    match m {
        Mnemonic::Add => (0b000, 0b0000000),
        Mnemonic::Sub => (0b000, 0b0100000),
        Mnemonic::Sll => (0b001, 0b0000000),
        Mnemonic::Slt => (0b010, 0b0000000),
        Mnemonic::Sltu => (0b011, 0b0000000),
        Mnemonic::Xor => (0b100, 0b0000000),
        Mnemonic::Srl => (0b101, 0b0000000),
        Mnemonic::Sra => (0b101, 0b0100000),
        Mnemonic::Or => (0b110, 0b0000000),
        Mnemonic::And => (0b111, 0b0000000),
        _ => unreachable!(),
    }
}

fn csr_funct3(m: Mnemonic) -> u32 {
    match m {
        Mnemonic::Csrrw => 0b001,
        Mnemonic::Csrrs => 0b010,
        Mnemonic::Csrrc => 0b011,
        Mnemonic::Csrrwi => 0b101,
        Mnemonic::Csrrsi => 0b110,
        Mnemonic::Csrrci => 0b111,
        _ => unreachable!(),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Lui { rd, imm } => write!(f, "lui x{rd}, {imm}"),
            Instruction::Auipc { rd, imm } => write!(f, "auipc x{rd}, {imm}"),
            Instruction::Jal { rd, imm } => write!(f, "jal x{rd}, {imm}"),
            Instruction::Jalr { rd, rs1, imm } => write!(f, "jalr x{rd}, x{rs1}, {imm}"),
            Instruction::Branch {
                mnemonic,
                rs1,
                rs2,
                imm,
            } => write!(f, "{mnemonic} x{rs1}, x{rs2}, {imm}"),
            Instruction::Load {
                mnemonic,
                rd,
                rs1,
                imm,
            } => write!(f, "{mnemonic} x{rd}, {imm}(x{rs1})"),
            Instruction::Store {
                mnemonic,
                rs1,
                rs2,
                imm,
            } => write!(f, "{mnemonic} x{rs2}, {imm}(x{rs1})"),
            Instruction::OpImm {
                mnemonic,
                rd,
                rs1,
                imm,
            } => write!(f, "{mnemonic} x{rd}, x{rs1}, {imm}"),
            Instruction::Op {
                mnemonic,
                rd,
                rs1,
                rs2,
            } => write!(f, "{mnemonic} x{rd}, x{rs1}, x{rs2}"),
            Instruction::Fence => write!(f, "fence"),
            Instruction::FenceI => write!(f, "fence.i"),
            Instruction::Ecall => write!(f, "ecall"),
            Instruction::Ebreak => write!(f, "ebreak"),
            Instruction::Csr {
                mnemonic,
                rd,
                rs1,
                csr,
            } => write!(f, "{mnemonic} x{rd}, x{rs1}, 0x{csr:x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_jal_plus_72() {
        let i = Instruction::decode(0x0480006f).unwrap();
        assert_eq!(i, Instruction::Jal { rd: 0, imm: 72 });
    }

    #[test]
    fn decode_jal_minus_8() {
        let i = Instruction::decode(0xff9ff06f).unwrap();
        assert_eq!(i, Instruction::Jal { rd: 0, imm: -8 });
    }

    #[test]
    fn decode_auipc_minus_8192() {
        let i = Instruction::decode(0xffffe517).unwrap();
        assert_eq!(
            i,
            Instruction::Auipc {
                rd: 10,
                imm: -8192
            }
        );
    }

    #[test]
    fn decode_sw_minus_60() {
        let i = Instruction::decode(0xfc3f2223).unwrap();
        assert_eq!(
            i,
            Instruction::Store {
                mnemonic: Mnemonic::Sw,
                rs1: 30,
                rs2: 3,
                imm: -60
            }
        );
    }

    #[test]
    fn decode_xori_minus_247() {
        let i = Instruction::decode(0xf093c293).unwrap();
        assert_eq!(
            i,
            Instruction::OpImm {
                mnemonic: Mnemonic::Xori,
                rd: 5,
                rs1: 7,
                imm: -247
            }
        );
    }

    #[test]
    fn decode_beq_minus_32() {
        let i = Instruction::decode(0xfe3000e3).unwrap();
        assert_eq!(
            i,
            Instruction::Branch {
                mnemonic: Mnemonic::Beq,
                rs1: 0,
                rs2: 3,
                imm: -32
            }
        );
    }

    #[test]
    fn decode_sub() {
        let i = Instruction::decode(0x40520133).unwrap();
        assert_eq!(
            i,
            Instruction::Op {
                mnemonic: Mnemonic::Sub,
                rd: 2,
                rs1: 4,
                rs2: 5
            }
        );
    }

    #[test]
    fn invalid_opcode_errors() {
        assert!(matches!(
            Instruction::decode(0b1111111),
            Err(DecodeError::InvalidOpcode(_))
        ));
    }

    fn round_trip(i: Instruction) {
        let word = i.encode();
        assert_eq!(Instruction::decode(word).unwrap(), i, "round trip via 0x{word:08x}");
    }

    #[test]
    fn round_trip_each_format() {
        round_trip(Instruction::Lui { rd: 3, imm: 0x12340000u32 as i32 });
        round_trip(Instruction::Auipc { rd: 10, imm: -8192 });
        round_trip(Instruction::Jal { rd: 1, imm: 72 });
        round_trip(Instruction::Jal { rd: 0, imm: -8 });
        round_trip(Instruction::Jalr { rd: 1, rs1: 2, imm: -100 });
        round_trip(Instruction::Branch {
            mnemonic: Mnemonic::Bge,
            rs1: 3,
            rs2: 4,
            imm: -32,
        });
        round_trip(Instruction::Load {
            mnemonic: Mnemonic::Lhu,
            rd: 5,
            rs1: 6,
            imm: 2047,
        });
        round_trip(Instruction::Store {
            mnemonic: Mnemonic::Sw,
            rs1: 30,
            rs2: 3,
            imm: -60,
        });
        round_trip(Instruction::OpImm {
            mnemonic: Mnemonic::Srai,
            rd: 1,
            rs1: 2,
            imm: 7,
        });
        round_trip(Instruction::Op {
            mnemonic: Mnemonic::Sub,
            rd: 2,
            rs1: 4,
            rs2: 5,
        });
        round_trip(Instruction::nop());
    }
}
