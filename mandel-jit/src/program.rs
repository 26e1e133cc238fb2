use std::fmt;
use std::str::FromStr;

use crate::vm::{REGISTER_COUNT, VmError, VmResult};

/// Bytes per instruction in program text: opcode, source, destination.
pub const INSTRUCTION_WIDTH: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Assign,
    Add,
    Multiply,
}

impl Op {
    pub fn from_symbol(byte: u8) -> Option<Self> {
        match byte {
            b'=' => Some(Op::Assign),
            b'+' => Some(Op::Add),
            b'*' => Some(Op::Multiply),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Op::Assign => '=',
            Op::Add => '+',
            Op::Multiply => '*',
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Assign => "assign",
            Op::Add => "add",
            Op::Multiply => "mul",
        }
    }
}

/// Index of a register file slot; always in `0..REGISTER_COUNT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(u8);

impl Register {
    pub const A: Register = Register(0);
    pub const B: Register = Register(1);
    pub const C: Register = Register(2);
    pub const D: Register = Register(3);

    pub fn new(index: usize) -> Option<Self> {
        if index < REGISTER_COUNT {
            u8::try_from(index).ok().map(Register)
        } else {
            None
        }
    }

    pub fn from_name(byte: u8) -> Option<Self> {
        byte.checked_sub(b'a').and_then(|index| Self::new(usize::from(index)))
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn name(self) -> char {
        char::from(b'a' + self.0)
    }

    pub fn all() -> impl Iterator<Item = Register> {
        (0..REGISTER_COUNT).filter_map(Register::new)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub op: Op,
    pub src: Register,
    pub dst: Register,
}

impl Instruction {
    pub fn new(op: Op, src: Register, dst: Register) -> Self {
        Self { op, src, dst }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.op.symbol(), self.src, self.dst)
    }
}

/// A parsed MandelASM program. Construction validates every opcode and register,
/// so holders of a `Program` never see a malformed instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// Parses flat `OP SRC DST` triples with no separators, e.g. `*bb+ab`.
    pub fn parse(text: &str) -> VmResult<Self> {
        let bytes = text.as_bytes();
        let mut instructions = Vec::with_capacity(bytes.len() / INSTRUCTION_WIDTH);
        for (index, triple) in bytes.chunks(INSTRUCTION_WIDTH).enumerate() {
            instructions.push(decode_triple(index * INSTRUCTION_WIDTH, triple)?);
        }
        Ok(Self { instructions })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl FromStr for Program {
    type Err = VmError;

    fn from_str(text: &str) -> VmResult<Self> {
        Program::parse(text)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            write!(f, "{instruction}")?;
        }
        Ok(())
    }
}

fn decode_triple(start: usize, triple: &[u8]) -> VmResult<Instruction> {
    let invalid = |position: usize, byte: u8| VmError::InvalidInstruction {
        offset: start + position,
        fragment: String::from_utf8_lossy(triple).into_owned(),
        byte,
    };

    let op_byte = triple[0];
    let op = Op::from_symbol(op_byte).ok_or_else(|| invalid(0, op_byte))?;
    // A short final triple runs into the end-of-text terminator.
    let src_byte = triple.get(1).copied().unwrap_or(0);
    let src = Register::from_name(src_byte).ok_or_else(|| invalid(1, src_byte))?;
    let dst_byte = triple.get(2).copied().unwrap_or(0);
    let dst = Register::from_name(dst_byte).ok_or_else(|| invalid(2, dst_byte))?;
    Ok(Instruction::new(op, src, dst))
}
