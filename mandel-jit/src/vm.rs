use std::ops::{Index, IndexMut};

use crate::program::{Instruction, Op, Program, Register};

/// Number of complex slots in a register file (`a` through `d`).
pub const REGISTER_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const ZERO: Complex = Complex { re: 0.0, im: 0.0 };

    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    /// Raw IEEE-754 bit patterns, for exact comparisons that `==` would blur
    /// (`0.0 == -0.0`, `NaN != NaN`).
    pub fn to_bits(self) -> (u64, u64) {
        (self.re.to_bits(), self.im.to_bits())
    }
}

/// Working memory shared by the interpreter and compiled code.
///
/// Native code addresses slots at constant offsets from the base pointer and
/// uses packed-double memory operands, so the layout is fixed: four
/// consecutive 16-byte records on a 16-byte boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C, align(16))]
pub struct RegisterFile {
    slots: [Complex; REGISTER_COUNT],
}

const _: () = assert!(std::mem::size_of::<Complex>() == 16);
const _: () = assert!(std::mem::size_of::<RegisterFile>() == REGISTER_COUNT * 16);
const _: () = assert!(std::mem::align_of::<RegisterFile>() == 16);

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `a` holds `point`, every other slot is zero.
    pub fn with_point(point: Complex) -> Self {
        let mut registers = Self::new();
        registers.slots[0] = point;
        registers
    }

    pub fn from_slots(slots: [Complex; REGISTER_COUNT]) -> Self {
        Self { slots }
    }

    pub fn reset(&mut self, point: Complex) {
        *self = Self::with_point(point);
    }

    pub fn slots(&self) -> &[Complex; REGISTER_COUNT] {
        &self.slots
    }

    pub fn as_mut_ptr(&mut self) -> *mut RegisterFile {
        self as *mut RegisterFile
    }

    pub fn bit_identical(&self, other: &RegisterFile) -> bool {
        self.slots
            .iter()
            .zip(other.slots.iter())
            .all(|(lhs, rhs)| lhs.to_bits() == rhs.to_bits())
    }
}

impl Index<Register> for RegisterFile {
    type Output = Complex;

    fn index(&self, register: Register) -> &Complex {
        &self.slots[register.index()]
    }
}

impl IndexMut<Register> for RegisterFile {
    fn index_mut(&mut self, register: Register) -> &mut Complex {
        &mut self.slots[register.index()]
    }
}

#[derive(Debug)]
pub enum VmError {
    InvalidInstruction {
        offset: usize,
        fragment: String,
        byte: u8,
    },
    ResourceExhaustion(String),
    CodeBufferOverflow {
        capacity: usize,
        required: usize,
    },
    UnsupportedHost,
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmError::InvalidInstruction {
                offset,
                fragment,
                byte,
            } => write!(
                f,
                "undefined instruction {fragment:?} at offset {offset} (ASCII 0x{byte:02x})"
            ),
            VmError::ResourceExhaustion(message) => {
                write!(f, "executable memory unavailable: {message}")
            }
            VmError::CodeBufferOverflow { capacity, required } => write!(
                f,
                "code buffer overflow: {required} bytes required, capacity is {capacity}"
            ),
            VmError::UnsupportedHost => write!(
                f,
                "native code generation requires an x86_64 unix or windows host"
            ),
        }
    }
}

impl std::error::Error for VmError {}

pub type VmResult<T> = Result<T, VmError>;

/// Reference semantics: runs every instruction of `program` once, in order.
pub fn interpret(registers: &mut RegisterFile, program: &Program) {
    for instruction in program.instructions() {
        execute(registers, *instruction);
    }
}

/// Parses `text` and interprets it. A malformed program is rejected before any
/// register is touched.
pub fn interpret_text(registers: &mut RegisterFile, text: &str) -> VmResult<()> {
    let program = Program::parse(text)?;
    interpret(registers, &program);
    Ok(())
}

pub fn execute(registers: &mut RegisterFile, instruction: Instruction) {
    let src = registers[instruction.src];
    let dst = &mut registers[instruction.dst];
    match instruction.op {
        Op::Assign => *dst = src,
        Op::Add => {
            dst.re += src.re;
            dst.im += src.im;
        }
        Op::Multiply => {
            let re = dst.re * src.re - dst.im * src.im;
            let im = dst.re * src.im + dst.im * src.re;
            dst.re = re;
            dst.im = im;
        }
    }
}
