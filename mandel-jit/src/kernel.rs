use crate::jit::CompiledUnit;
use crate::program::Program;
use crate::vm::{RegisterFile, interpret};

/// One step of a register-file computation, driven repeatedly by an
/// escape-time loop.
pub trait Kernel {
    fn step(&self, registers: &mut RegisterFile);
}

impl Kernel for CompiledUnit {
    fn step(&self, registers: &mut RegisterFile) {
        self.call(registers);
    }
}

/// Runs a program through the reference interpreter.
#[derive(Clone, Debug)]
pub struct Interpreted {
    program: Program,
}

impl Interpreted {
    pub fn new(program: Program) -> Self {
        Self { program }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

impl Kernel for Interpreted {
    fn step(&self, registers: &mut RegisterFile) {
        interpret(registers, &self.program);
    }
}

/// `b = b * b + a` written directly in Rust, ignoring any program text.
/// Baseline for comparing the interpreter and the JIT.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hardcoded;

impl Kernel for Hardcoded {
    fn step(&self, registers: &mut RegisterFile) {
        use crate::program::Register;

        let a = registers[Register::A];
        let b = &mut registers[Register::B];
        let re = b.re * b.re - b.im * b.im;
        let im = b.re * b.im + b.im * b.re;
        b.re = re + a.re;
        b.im = im + a.im;
    }
}

impl<K: Kernel + ?Sized> Kernel for &K {
    fn step(&self, registers: &mut RegisterFile) {
        (**self).step(registers);
    }
}

impl<K: Kernel + ?Sized> Kernel for Box<K> {
    fn step(&self, registers: &mut RegisterFile) {
        (**self).step(registers);
    }
}
