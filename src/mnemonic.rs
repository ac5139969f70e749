//! The closed set of RV32I mnemonics this simulator recognizes.
//!
//! The reference decoder represents a mnemonic as a free-form string
//! assembled at decode time (`format!("addi")`, `format!("beq")`, ...).
//! That makes an unhandled mnemonic a silent runtime surprise. Here the
//! mnemonic is a closed enum, so the executor's dispatch is an
//! exhaustive match the compiler checks for us.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Lui,
    Auipc,
    Jal,
    Jalr,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
    Sb,
    Sh,
    Sw,
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    Fence,
    FenceI,
    Ecall,
    Ebreak,
    Csrrw,
    Csrrs,
    Csrrc,
    Csrrwi,
    Csrrsi,
    Csrrci,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mnemonic::Lui => "lui",
            Mnemonic::Auipc => "auipc",
            Mnemonic::Jal => "jal",
            Mnemonic::Jalr => "jalr",
            Mnemonic::Beq => "beq",
            Mnemonic::Bne => "bne",
            Mnemonic::Blt => "blt",
            Mnemonic::Bge => "bge",
            Mnemonic::Bltu => "bltu",
            Mnemonic::Bgeu => "bgeu",
            Mnemonic::Lb => "lb",
            Mnemonic::Lh => "lh",
            Mnemonic::Lw => "lw",
            Mnemonic::Lbu => "lbu",
            Mnemonic::Lhu => "lhu",
            Mnemonic::Sb => "sb",
            Mnemonic::Sh => "sh",
            Mnemonic::Sw => "sw",
            Mnemonic::Addi => "addi",
            Mnemonic::Slti => "slti",
            Mnemonic::Sltiu => "sltiu",
            Mnemonic::Xori => "xori",
            Mnemonic::Ori => "ori",
            Mnemonic::Andi => "andi",
            Mnemonic::Slli => "slli",
            Mnemonic::Srli => "srli",
            Mnemonic::Srai => "srai",
            Mnemonic::Add => "add",
            Mnemonic::Sub => "sub",
            Mnemonic::Sll => "sll",
            Mnemonic::Slt => "slt",
            Mnemonic::Sltu => "sltu",
            Mnemonic::Xor => "xor",
            Mnemonic::Srl => "srl",
            Mnemonic::Sra => "sra",
            Mnemonic::Or => "or",
            Mnemonic::And => "and",
            Mnemonic::Fence => "fence",
            Mnemonic::FenceI => "fence.i",
            Mnemonic::Ecall => "ecall",
            Mnemonic::Ebreak => "ebreak",
            Mnemonic::Csrrw => "csrrw",
            Mnemonic::Csrrs => "csrrs",
            Mnemonic::Csrrc => "csrrc",
            Mnemonic::Csrrwi => "csrrwi",
            Mnemonic::Csrrsi => "csrrsi",
            Mnemonic::Csrrci => "csrrci",
        };
        write!(f, "{s}")
    }
}
