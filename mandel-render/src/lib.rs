mod engine;
mod error;
mod escape;
mod image;
mod logging;
mod viewport;

pub use engine::Engine;
pub use error::{RenderError, RenderResult};
pub use escape::{DEFAULT_MAX_ITERATIONS, ESCAPE_RADIUS_SQUARED, escape_time, escape_time_in};
pub use image::{EscapeImage, ImageFormat, palette, render, shade};
pub use logging::init as init_logging;
pub use logging::{category_jit, category_render, engine_label};
pub use viewport::Viewport;
