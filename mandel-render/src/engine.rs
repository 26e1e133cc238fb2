use std::fmt;
use std::str::FromStr;

use jit::{Hardcoded, Interpreted, Kernel, Program, compile, native_jit_supported};
use tracing::{info, warn};

use crate::error::RenderResult;
use crate::logging::{category_jit, engine_label};

/// How a program gets executed for each pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    Jit,
    Interpret,
    /// Ignores the program and runs a fixed `b = b*b + a`.
    Hardcoded,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Jit => "jit",
            Engine::Interpret => "interpret",
            Engine::Hardcoded => "hardcoded",
        }
    }

    /// The engine that will actually run: `Jit` degrades to `Interpret` on
    /// hosts that cannot execute generated code.
    pub fn effective(self) -> Engine {
        if self == Engine::Jit && !native_jit_supported() {
            Engine::Interpret
        } else {
            self
        }
    }

    /// Builds the kernel for `program`. Compile errors are returned, never
    /// swallowed by the fallback.
    pub fn kernel(self, program: &Program) -> RenderResult<Box<dyn Kernel>> {
        let effective = self.effective();
        if effective != self {
            warn!(
                "{} native code generation unavailable on this host, falling back to {}",
                category_jit(),
                engine_label(effective.as_str())
            );
        }

        let kernel: Box<dyn Kernel> = match effective {
            Engine::Jit => {
                let unit = compile(program)?;
                info!(
                    "{} compiled {} instruction(s) into {} bytes",
                    category_jit(),
                    program.len(),
                    unit.code().len()
                );
                Box::new(unit)
            }
            Engine::Interpret => Box::new(Interpreted::new(program.clone())),
            Engine::Hardcoded => Box::new(Hardcoded),
        };
        info!("{} engine={}", category_jit(), engine_label(effective.as_str()));
        Ok(kernel)
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "jit" => Ok(Engine::Jit),
            "interpret" | "interpreter" => Ok(Engine::Interpret),
            "hardcoded" => Ok(Engine::Hardcoded),
            other => Err(format!(
                "unknown engine '{other}' (expected jit, interpret or hardcoded)"
            )),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
