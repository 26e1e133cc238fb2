use std::fmt;
use std::io;

use jit::VmError;

#[derive(Debug)]
pub enum RenderError {
    Vm(VmError),
    Io(io::Error),
    InvalidViewport(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Vm(err) => write!(f, "{err}"),
            RenderError::Io(err) => write!(f, "i/o error: {err}"),
            RenderError::InvalidViewport(reason) => write!(f, "invalid viewport: {reason}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Vm(err) => Some(err),
            RenderError::Io(err) => Some(err),
            RenderError::InvalidViewport(_) => None,
        }
    }
}

impl From<VmError> for RenderError {
    fn from(value: VmError) -> Self {
        RenderError::Vm(value)
    }
}

impl From<io::Error> for RenderError {
    fn from(value: io::Error) -> Self {
        RenderError::Io(value)
    }
}
