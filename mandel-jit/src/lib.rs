pub mod jit;
pub mod kernel;
pub mod program;
pub mod vm;

pub use jit::{
    CallingConvention, CodeBuffer, CompiledUnit, ListingLine, Mem, Xmm, assemble, assemble_for,
    code_size_bound, compile, compile_text, listing, live_executable_regions,
    native_jit_supported,
};
pub use kernel::{Hardcoded, Interpreted, Kernel};
pub use program::{INSTRUCTION_WIDTH, Instruction, Op, Program, Register};
pub use vm::{
    Complex, REGISTER_COUNT, RegisterFile, VmError, VmResult, execute, interpret, interpret_text,
};
