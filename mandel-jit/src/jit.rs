mod codegen;
mod memory;
mod x86_64;

use std::fmt;

use tracing::debug;

use crate::program::Program;
use crate::vm::{RegisterFile, VmError, VmResult};

pub use codegen::{
    CallingConvention, ListingLine, MAX_INSTRUCTION_BYTES, assemble, assemble_for,
    code_size_bound, emit_instruction, emit_program, listing, register_offset,
};
pub use memory::{ExecutableRegion, FinalizedRegion, live_executable_regions};
pub use x86_64::{CodeBuffer, MAX_ENCODED_LEN, Mem, Xmm};

type NativeEntry = unsafe extern "C" fn(*mut RegisterFile);

/// Whether generated code can run on this host. The encoder works everywhere;
/// only execution needs an x86_64 CPU and an OS whose mappings we know.
pub fn native_jit_supported() -> bool {
    cfg!(target_arch = "x86_64") && (cfg!(unix) || cfg!(windows))
}

/// Native code for one program, ready to call.
pub struct CompiledUnit {
    program: Program,
    region: FinalizedRegion,
    code_len: usize,
}

impl CompiledUnit {
    /// Runs the program once against `registers`.
    pub fn call(&self, registers: &mut RegisterFile) {
        // SAFETY: the region holds a complete routine ending in `ret`, emitted
        // for the host calling convention. It reads and writes only the 64
        // bytes behind the pointer, which the exclusive borrow keeps valid and
        // aligned for the whole call.
        unsafe {
            let entry = std::mem::transmute::<*const u8, NativeEntry>(self.region.entry());
            entry(registers.as_mut_ptr());
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The emitted machine code.
    pub fn code(&self) -> &[u8] {
        self.region.bytes(self.code_len)
    }

    /// Size of the backing mapping, a whole number of pages.
    pub fn region_len(&self) -> usize {
        self.region.len()
    }
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("program", &self.program.to_string())
            .field("entry", &self.region.entry())
            .field("code_len", &self.code_len)
            .finish()
    }
}

pub fn compile(program: &Program) -> VmResult<CompiledUnit> {
    if !native_jit_supported() {
        return Err(VmError::UnsupportedHost);
    }
    let convention = CallingConvention::host();
    let mut region = ExecutableRegion::allocate(code_size_bound(program, convention))?;
    let code_len = {
        let mut code = CodeBuffer::new(region.as_mut_slice());
        emit_program(program, &mut code, convention)?;
        code.len()
    };
    let region = region.finalize()?;
    debug!(
        "compiled program={program} instructions={} code_len={code_len} region_len={}",
        program.len(),
        region.len()
    );
    Ok(CompiledUnit {
        program: program.clone(),
        region,
        code_len,
    })
}

/// Parses and compiles `text`. Parsing happens first, so malformed text never
/// maps any executable memory.
pub fn compile_text(text: &str) -> VmResult<CompiledUnit> {
    let program = Program::parse(text)?;
    compile(&program)
}
