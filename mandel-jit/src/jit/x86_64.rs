//! Fixed-format SSE2 encodings for the handful of instructions the code
//! generator needs. Memory operands are always `[rdi + disp]`, where `rdi`
//! holds the register file base address.

use crate::vm::{VmError, VmResult};

/// Longest single encoding: prefix, escape, opcode, ModRM, disp32.
pub const MAX_ENCODED_LEN: usize = 8;

const RDI: u8 = 0b111;
const MOD_DISP8: u8 = 0b01 << 6;
const MOD_DISP32: u8 = 0b10 << 6;
const MOD_REGISTER: u8 = 0b11 << 6;

const PREFIX_PACKED_DOUBLE: u8 = 0x66;
const PREFIX_SCALAR_DOUBLE: u8 = 0xF2;
const ESCAPE: u8 = 0x0F;

const OP_MOV_LOAD: u8 = 0x10;
const OP_MOV_STORE: u8 = 0x11;
const OP_ADD: u8 = 0x58;
const OP_MUL: u8 = 0x59;
const OP_SUB: u8 = 0x5C;

/// Scratch lanes. Only the first six are used, all caller-saved on both
/// System V and Win64.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Xmm {
    Xmm0 = 0,
    Xmm1 = 1,
    Xmm2 = 2,
    Xmm3 = 3,
    Xmm4 = 4,
    Xmm5 = 5,
}

impl Xmm {
    fn code(self) -> u8 {
        self as u8
    }
}

/// `[rdi + disp]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mem {
    pub disp: i32,
}

impl Mem {
    pub const fn base(disp: i32) -> Self {
        Self { disp }
    }
}

/// Bounds-checked cursor over a fixed-capacity output buffer.
pub struct CodeBuffer<'a> {
    bytes: &'a mut [u8],
    len: usize,
}

impl<'a> CodeBuffer<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    fn emit(&mut self, encoded: &[u8]) -> VmResult<()> {
        let end = self.len + encoded.len();
        if end > self.bytes.len() {
            return Err(VmError::CodeBufferOverflow {
                capacity: self.bytes.len(),
                required: end,
            });
        }
        self.bytes[self.len..end].copy_from_slice(encoded);
        self.len = end;
        Ok(())
    }

    fn emit_sse_memory(&mut self, prefix: u8, opcode: u8, reg: Xmm, mem: Mem) -> VmResult<()> {
        let reg_field = reg.code() << 3;
        match i8::try_from(mem.disp) {
            Ok(disp8) => self.emit(&[
                prefix,
                ESCAPE,
                opcode,
                MOD_DISP8 | reg_field | RDI,
                disp8.to_le_bytes()[0],
            ]),
            Err(_) => {
                let disp32 = mem.disp.to_le_bytes();
                self.emit(&[
                    prefix,
                    ESCAPE,
                    opcode,
                    MOD_DISP32 | reg_field | RDI,
                    disp32[0],
                    disp32[1],
                    disp32[2],
                    disp32[3],
                ])
            }
        }
    }

    fn emit_sse_register(&mut self, prefix: u8, opcode: u8, reg: Xmm, rm: Xmm) -> VmResult<()> {
        self.emit(&[
            prefix,
            ESCAPE,
            opcode,
            MOD_REGISTER | reg.code() << 3 | rm.code(),
        ])
    }

    /// `movupd dst, [rdi+disp]`: loads a complex pair.
    pub fn movupd_load(&mut self, dst: Xmm, src: Mem) -> VmResult<()> {
        self.emit_sse_memory(PREFIX_PACKED_DOUBLE, OP_MOV_LOAD, dst, src)
    }

    /// `movupd [rdi+disp], src`: stores a complex pair.
    pub fn movupd_store(&mut self, dst: Mem, src: Xmm) -> VmResult<()> {
        self.emit_sse_memory(PREFIX_PACKED_DOUBLE, OP_MOV_STORE, src, dst)
    }

    /// `addpd dst, [rdi+disp]`. The memory operand must be 16-byte aligned.
    pub fn addpd_load(&mut self, dst: Xmm, src: Mem) -> VmResult<()> {
        self.emit_sse_memory(PREFIX_PACKED_DOUBLE, OP_ADD, dst, src)
    }

    pub fn movsd_load(&mut self, dst: Xmm, src: Mem) -> VmResult<()> {
        self.emit_sse_memory(PREFIX_SCALAR_DOUBLE, OP_MOV_LOAD, dst, src)
    }

    pub fn movsd_store(&mut self, dst: Mem, src: Xmm) -> VmResult<()> {
        self.emit_sse_memory(PREFIX_SCALAR_DOUBLE, OP_MOV_STORE, src, dst)
    }

    /// `movsd dst, src` in the store form (`0F 11`, source in ModRM.reg).
    pub fn movsd_reg(&mut self, dst: Xmm, src: Xmm) -> VmResult<()> {
        self.emit_sse_register(PREFIX_SCALAR_DOUBLE, OP_MOV_STORE, src, dst)
    }

    pub fn mulsd(&mut self, dst: Xmm, src: Xmm) -> VmResult<()> {
        self.emit_sse_register(PREFIX_SCALAR_DOUBLE, OP_MUL, dst, src)
    }

    pub fn addsd(&mut self, dst: Xmm, src: Xmm) -> VmResult<()> {
        self.emit_sse_register(PREFIX_SCALAR_DOUBLE, OP_ADD, dst, src)
    }

    pub fn subsd(&mut self, dst: Xmm, src: Xmm) -> VmResult<()> {
        self.emit_sse_register(PREFIX_SCALAR_DOUBLE, OP_SUB, dst, src)
    }

    pub fn push_rdi(&mut self) -> VmResult<()> {
        self.emit(&[0x57])
    }

    pub fn mov_rdi_rcx(&mut self) -> VmResult<()> {
        self.emit(&[0x48, 0x89, 0xCF]) // mov rdi, rcx
    }

    pub fn pop_rdi(&mut self) -> VmResult<()> {
        self.emit(&[0x5F])
    }

    pub fn ret(&mut self) -> VmResult<()> {
        self.emit(&[0xC3])
    }
}
