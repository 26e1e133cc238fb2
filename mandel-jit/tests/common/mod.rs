#![allow(dead_code, unused_imports)]

pub use jit::{
    Complex, CompiledUnit, Instruction, Interpreted, Kernel, Op, Program, Register, RegisterFile,
    compile, compile_text, interpret, native_jit_supported,
};
use rand::Rng;
use rand::rngs::StdRng;

pub const ESCAPE_RADIUS_SQUARED: f64 = 4.0;

pub fn program(text: &str) -> Program {
    Program::parse(text).expect("program should parse")
}

pub fn registers(slots: [(f64, f64); 4]) -> RegisterFile {
    RegisterFile::from_slots(slots.map(|(re, im)| Complex::new(re, im)))
}

pub fn random_registers(rng: &mut StdRng) -> RegisterFile {
    let mut slot = || Complex::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0));
    RegisterFile::from_slots([slot(), slot(), slot(), slot()])
}

pub fn random_program(rng: &mut StdRng, len: usize) -> Program {
    let ops = [Op::Assign, Op::Add, Op::Multiply];
    let instructions = (0..len)
        .map(|_| {
            let op = ops[rng.gen_range(0..ops.len())];
            let src = Register::new(rng.gen_range(0..4)).expect("index in range");
            let dst = Register::new(rng.gen_range(0..4)).expect("index in range");
            Instruction::new(op, src, dst)
        })
        .collect();
    Program::new(instructions)
}

/// Steps `kernel` from `point` until register `b` leaves the radius-2 disc.
pub fn escape_iterations(kernel: &dyn Kernel, point: Complex, max_iterations: u32) -> u32 {
    let mut registers = RegisterFile::with_point(point);
    let mut iterations = 0;
    while iterations < max_iterations
        && registers[Register::B].norm_sqr() < ESCAPE_RADIUS_SQUARED
    {
        kernel.step(&mut registers);
        iterations += 1;
    }
    iterations
}

pub fn assert_bit_identical(lhs: &RegisterFile, rhs: &RegisterFile, context: &str) {
    assert!(
        lhs.bit_identical(rhs),
        "{context}: register files differ\n  lhs: {lhs:?}\n  rhs: {rhs:?}"
    );
}
