#![allow(dead_code, unused_imports)]

pub use jit::{Complex, Hardcoded, Interpreted, Program, compile, native_jit_supported};
pub use render::{
    DEFAULT_MAX_ITERATIONS, Engine, EscapeImage, ImageFormat, Viewport, escape_time, render,
    shade,
};

pub const MANDELBROT: &str = "*bb+ab";

pub fn mandelbrot() -> Program {
    Program::parse(MANDELBROT).expect("program should parse")
}

pub fn small_viewport() -> Viewport {
    Viewport::default().with_size(64, 36)
}

pub fn encode(image: &EscapeImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Vec::new();
    image
        .write_to(format, &mut out)
        .expect("writing to a Vec should succeed");
    out
}

/// Splits a netpbm header `P? W H MAXVAL\n` off `bytes`.
pub fn split_header(bytes: &[u8]) -> (String, u32, u32, u32, &[u8]) {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while fields.len() < 4 {
        if bytes[pos].is_ascii_whitespace() {
            if pos > start {
                fields.push(String::from_utf8_lossy(&bytes[start..pos]).into_owned());
            }
            start = pos + 1;
        }
        pos += 1;
    }
    let number = |field: &String| field.parse::<u32>().expect("numeric header field");
    (
        fields[0].clone(),
        number(&fields[1]),
        number(&fields[2]),
        number(&fields[3]),
        &bytes[pos..],
    )
}
