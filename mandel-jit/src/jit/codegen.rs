use std::mem::{offset_of, size_of};

use super::x86_64::{CodeBuffer, MAX_ENCODED_LEN, Mem, Xmm};
use crate::program::{Instruction, Op, Program, Register};
use crate::vm::{Complex, VmResult};

const COMPLEX_SIZE: i32 = size_of::<Complex>() as i32;
const RE_OFFSET: i32 = offset_of!(Complex, re) as i32;
const IM_OFFSET: i32 = offset_of!(Complex, im) as i32;

/// Worst case for one instruction: `Multiply` emits six memory-operand
/// encodings and eight register-register encodings.
pub const MAX_INSTRUCTION_BYTES: usize = 6 * MAX_ENCODED_LEN + 8 * 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallingConvention {
    /// Register file pointer arrives in `rdi`.
    SystemV,
    /// Pointer arrives in `rcx`; `rdi` is callee-saved and gets a shim.
    Win64,
}

impl CallingConvention {
    pub fn host() -> Self {
        if cfg!(windows) {
            CallingConvention::Win64
        } else {
            CallingConvention::SystemV
        }
    }

    fn shim_len(self) -> usize {
        match self {
            CallingConvention::SystemV => 0,
            CallingConvention::Win64 => 5, // push rdi; mov rdi, rcx; pop rdi
        }
    }
}

pub fn register_offset(register: Register) -> i32 {
    register.index() as i32 * COMPLEX_SIZE
}

pub fn code_size_bound(program: &Program, convention: CallingConvention) -> usize {
    program.len() * MAX_INSTRUCTION_BYTES + convention.shim_len() + 1
}

/// Lowers `program` into `code`, ending with the return to the caller.
pub fn emit_program(
    program: &Program,
    code: &mut CodeBuffer<'_>,
    convention: CallingConvention,
) -> VmResult<()> {
    emit_prologue(code, convention)?;
    for instruction in program.instructions() {
        emit_instruction(code, *instruction)?;
    }
    emit_epilogue(code, convention)
}

fn emit_prologue(code: &mut CodeBuffer<'_>, convention: CallingConvention) -> VmResult<()> {
    match convention {
        CallingConvention::SystemV => Ok(()),
        CallingConvention::Win64 => {
            code.push_rdi()?;
            code.mov_rdi_rcx()
        }
    }
}

fn emit_epilogue(code: &mut CodeBuffer<'_>, convention: CallingConvention) -> VmResult<()> {
    if convention == CallingConvention::Win64 {
        code.pop_rdi()?;
    }
    code.ret()
}

pub fn emit_instruction(code: &mut CodeBuffer<'_>, instruction: Instruction) -> VmResult<()> {
    let src = register_offset(instruction.src);
    let dst = register_offset(instruction.dst);
    match instruction.op {
        Op::Assign => {
            code.movupd_load(Xmm::Xmm0, Mem::base(src))?;
            code.movupd_store(Mem::base(dst), Xmm::Xmm0)?;
        }
        Op::Add => {
            code.movupd_load(Xmm::Xmm0, Mem::base(src))?;
            code.addpd_load(Xmm::Xmm0, Mem::base(dst))?;
            code.movupd_store(Mem::base(dst), Xmm::Xmm0)?;
        }
        Op::Multiply => {
            // All four inputs are loaded before either store, so `*bb` squares
            // the original value.
            code.movsd_load(Xmm::Xmm0, Mem::base(src + RE_OFFSET))?;
            code.movsd_load(Xmm::Xmm1, Mem::base(src + IM_OFFSET))?;
            code.movsd_load(Xmm::Xmm2, Mem::base(dst + RE_OFFSET))?;
            code.movsd_load(Xmm::Xmm3, Mem::base(dst + IM_OFFSET))?;

            // re = src.re * dst.re - src.im * dst.im
            code.movsd_reg(Xmm::Xmm4, Xmm::Xmm0)?;
            code.mulsd(Xmm::Xmm4, Xmm::Xmm2)?;
            code.movsd_reg(Xmm::Xmm5, Xmm::Xmm1)?;
            code.mulsd(Xmm::Xmm5, Xmm::Xmm3)?;
            code.subsd(Xmm::Xmm4, Xmm::Xmm5)?;
            code.movsd_store(Mem::base(dst + RE_OFFSET), Xmm::Xmm4)?;

            // im = dst.re * src.im + dst.im * src.re
            code.mulsd(Xmm::Xmm3, Xmm::Xmm0)?;
            code.mulsd(Xmm::Xmm2, Xmm::Xmm1)?;
            code.addsd(Xmm::Xmm2, Xmm::Xmm3)?;
            code.movsd_store(Mem::base(dst + IM_OFFSET), Xmm::Xmm2)?;
        }
    }
    Ok(())
}

/// Machine code for `program` under the host calling convention.
pub fn assemble(program: &Program) -> VmResult<Vec<u8>> {
    assemble_for(program, CallingConvention::host())
}

pub fn assemble_for(program: &Program, convention: CallingConvention) -> VmResult<Vec<u8>> {
    let mut bytes = vec![0u8; code_size_bound(program, convention)];
    let mut code = CodeBuffer::new(&mut bytes);
    emit_program(program, &mut code, convention)?;
    let len = code.len();
    bytes.truncate(len);
    Ok(bytes)
}

/// One source-level unit of generated code, for dumps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingLine {
    pub label: String,
    pub offset: usize,
    pub bytes: Vec<u8>,
}

pub fn listing(program: &Program, convention: CallingConvention) -> VmResult<Vec<ListingLine>> {
    let mut bytes = vec![0u8; code_size_bound(program, convention)];
    let mut code = CodeBuffer::new(&mut bytes);
    let mut marks = Vec::with_capacity(program.len() + 2);

    emit_prologue(&mut code, convention)?;
    marks.push(("entry".to_string(), code.len()));
    for instruction in program.instructions() {
        emit_instruction(&mut code, *instruction)?;
        marks.push((instruction.to_string(), code.len()));
    }
    emit_epilogue(&mut code, convention)?;
    marks.push(("exit".to_string(), code.len()));

    let code = code.as_slice();
    let mut start = 0usize;
    let mut lines = Vec::with_capacity(marks.len());
    for (label, end) in marks {
        if end > start {
            lines.push(ListingLine {
                label,
                offset: start,
                bytes: code[start..end].to_vec(),
            });
        }
        start = end;
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VmError;

    const MUL_BB: [u8; 62] = [
        0xF2, 0x0F, 0x10, 0x47, 0x10, // movsd xmm0, [rdi+16]
        0xF2, 0x0F, 0x10, 0x4F, 0x18, // movsd xmm1, [rdi+24]
        0xF2, 0x0F, 0x10, 0x57, 0x10, // movsd xmm2, [rdi+16]
        0xF2, 0x0F, 0x10, 0x5F, 0x18, // movsd xmm3, [rdi+24]
        0xF2, 0x0F, 0x11, 0xC4, // movsd xmm4, xmm0
        0xF2, 0x0F, 0x59, 0xE2, // mulsd xmm4, xmm2
        0xF2, 0x0F, 0x11, 0xCD, // movsd xmm5, xmm1
        0xF2, 0x0F, 0x59, 0xEB, // mulsd xmm5, xmm3
        0xF2, 0x0F, 0x5C, 0xE5, // subsd xmm4, xmm5
        0xF2, 0x0F, 0x11, 0x67, 0x10, // movsd [rdi+16], xmm4
        0xF2, 0x0F, 0x59, 0xD8, // mulsd xmm3, xmm0
        0xF2, 0x0F, 0x59, 0xD1, // mulsd xmm2, xmm1
        0xF2, 0x0F, 0x58, 0xD3, // addsd xmm2, xmm3
        0xF2, 0x0F, 0x11, 0x57, 0x18, // movsd [rdi+24], xmm2
    ];

    const ADD_AB: [u8; 15] = [
        0x66, 0x0F, 0x10, 0x47, 0x00, // movupd xmm0, [rdi+0]
        0x66, 0x0F, 0x58, 0x47, 0x10, // addpd xmm0, [rdi+16]
        0x66, 0x0F, 0x11, 0x47, 0x10, // movupd [rdi+16], xmm0
    ];

    fn program(text: &str) -> Program {
        Program::parse(text).expect("program should parse")
    }

    #[test]
    fn mandelbrot_step_bytes_system_v() {
        let code = assemble_for(&program("*bb+ab"), CallingConvention::SystemV)
            .expect("assemble should succeed");
        let mut expected = MUL_BB.to_vec();
        expected.extend_from_slice(&ADD_AB);
        expected.push(0xC3);
        assert_eq!(code, expected);
    }

    #[test]
    fn mandelbrot_step_bytes_win64_wraps_body_in_rdi_shim() {
        let code = assemble_for(&program("*bb+ab"), CallingConvention::Win64)
            .expect("assemble should succeed");
        let mut expected = vec![0x57, 0x48, 0x89, 0xCF];
        expected.extend_from_slice(&MUL_BB);
        expected.extend_from_slice(&ADD_AB);
        expected.extend_from_slice(&[0x5F, 0xC3]);
        assert_eq!(code, expected);
    }

    #[test]
    fn assign_between_boundary_registers() {
        let code = assemble_for(&program("=ad"), CallingConvention::SystemV)
            .expect("assemble should succeed");
        assert_eq!(
            code,
            [
                0x66, 0x0F, 0x10, 0x47, 0x00, // movupd xmm0, [rdi+0]
                0x66, 0x0F, 0x11, 0x47, 0x30, // movupd [rdi+48], xmm0
                0xC3,
            ]
        );
    }

    #[test]
    fn last_register_imaginary_offset() {
        let code = assemble_for(&program("*dd"), CallingConvention::SystemV)
            .expect("assemble should succeed");
        // movsd xmm1, [rdi+56]
        assert_eq!(&code[5..10], &[0xF2, 0x0F, 0x10, 0x4F, 0x38]);
        // movsd [rdi+56], xmm2
        assert_eq!(&code[code.len() - 6..], &[0xF2, 0x0F, 0x11, 0x57, 0x38, 0xC3]);
    }

    #[test]
    fn empty_program_is_a_bare_return() {
        let code = assemble_for(&Program::default(), CallingConvention::SystemV)
            .expect("assemble should succeed");
        assert_eq!(code, [0xC3]);
    }

    #[test]
    fn every_program_ends_with_ret() {
        for text in ["=aa", "+cd", "*ab*ba", "=ab+bc*cd=da"] {
            let code = assemble(&program(text)).expect("assemble should succeed");
            assert_eq!(code.last(), Some(&0xC3), "program {text}");
        }
    }

    #[test]
    fn size_bound_covers_worst_case_instruction() {
        let program = program("*dd");
        let code = assemble_for(&program, CallingConvention::SystemV)
            .expect("assemble should succeed");
        assert!(code.len() <= code_size_bound(&program, CallingConvention::SystemV));
        assert_eq!(code.len(), MUL_BB.len() + 1);
    }

    #[test]
    fn under_provisioned_buffer_overflows() {
        let mut bytes = [0u8; 16];
        let mut code = CodeBuffer::new(&mut bytes);
        let err = emit_program(&program("*bb"), &mut code, CallingConvention::SystemV)
            .expect_err("16 bytes cannot hold a multiply");
        assert!(matches!(err, VmError::CodeBufferOverflow { capacity: 16, .. }));
    }

    #[test]
    fn listing_groups_bytes_per_instruction() {
        let lines = listing(&program("*bb+ab"), CallingConvention::SystemV)
            .expect("listing should succeed");
        let labels: Vec<&str> = lines.iter().map(|line| line.label.as_str()).collect();
        assert_eq!(labels, ["*bb", "+ab", "exit"]);
        assert_eq!(lines[0].offset, 0);
        assert_eq!(lines[0].bytes, MUL_BB);
        assert_eq!(lines[1].offset, MUL_BB.len());
        assert_eq!(lines[1].bytes, ADD_AB);
        assert_eq!(lines[2].bytes, [0xC3]);

        let win = listing(&program("=aa"), CallingConvention::Win64)
            .expect("listing should succeed");
        assert_eq!(win[0].label, "entry");
        assert_eq!(win[0].bytes, [0x57, 0x48, 0x89, 0xCF]);
        assert_eq!(win.last().map(|line| line.bytes.clone()), Some(vec![0x5F, 0xC3]));
    }
}
