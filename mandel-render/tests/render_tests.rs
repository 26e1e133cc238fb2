mod common;

use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn boundary_point_never_escapes_on_any_engine() {
    let program = mandelbrot();
    let point = Complex::new(-1.0, 0.0);
    for engine in [Engine::Jit, Engine::Interpret, Engine::Hardcoded] {
        let kernel = engine.kernel(&program).expect("kernel should build");
        assert_eq!(escape_time(&kernel, point, 256), 256, "engine {engine}");
    }
}

#[test]
fn engines_render_identical_images() {
    let program = mandelbrot();
    let viewport = small_viewport();
    let reference = render(&Interpreted::new(program.clone()), &viewport, 256)
        .expect("render should succeed");

    let hardcoded = render(&Hardcoded, &viewport, 256).expect("render should succeed");
    assert_eq!(hardcoded, reference);

    if native_jit_supported() {
        let unit = compile(&program).expect("compile should succeed");
        let native = render(&unit, &viewport, 256).expect("render should succeed");
        assert_eq!(native, reference);
    }
}

#[test]
fn jit_matches_interpreter_at_random_points() {
    if !native_jit_supported() {
        return;
    }
    let program = mandelbrot();
    let unit = compile(&program).expect("compile should succeed");
    let interpreted = Interpreted::new(program);
    let mut rng = StdRng::seed_from_u64(0x7265_6e64);
    for _ in 0..500 {
        let point = Complex::new(rng.gen_range(-2.0..0.6), rng.gen_range(-1.2..1.2));
        assert_eq!(
            escape_time(&unit, point, 512),
            escape_time(&interpreted, point, 512),
            "point {point:?}"
        );
    }
}

#[test]
fn binary_pgm_has_header_and_one_byte_per_pixel() {
    let viewport = small_viewport();
    let image = render(&Hardcoded, &viewport, DEFAULT_MAX_ITERATIONS).expect("render");
    let bytes = encode(&image, ImageFormat::Pgm);
    let (magic, width, height, maxval, body) = split_header(&bytes);
    assert_eq!(magic, "P5");
    assert_eq!((width, height, maxval), (64, 36, 255));
    assert_eq!(body.len(), 64 * 36);
    let expected: Vec<u8> = image.shades().collect();
    assert_eq!(body, expected.as_slice());
}

#[test]
fn ascii_pgm_lists_every_shade() {
    let viewport = Viewport::default().with_size(8, 4);
    let image = render(&Hardcoded, &viewport, 50).expect("render");
    let bytes = encode(&image, ImageFormat::PgmAscii);
    let (magic, width, height, maxval, body) = split_header(&bytes);
    assert_eq!(magic, "P2");
    assert_eq!((width, height, maxval), (8, 4, 255));

    let text = std::str::from_utf8(body).expect("ascii body");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    let values: Vec<u8> = text
        .split_ascii_whitespace()
        .map(|value| value.parse().expect("numeric shade"))
        .collect();
    let expected: Vec<u8> = image.counts().iter().map(|&count| shade(count, 50)).collect();
    assert_eq!(values, expected);
}

#[test]
fn ppm_has_three_bytes_per_pixel() {
    let viewport = small_viewport();
    let image = render(&Hardcoded, &viewport, 256).expect("render");
    let bytes = encode(&image, ImageFormat::Ppm);
    let (magic, width, height, maxval, body) = split_header(&bytes);
    assert_eq!(magic, "P6");
    assert_eq!((width, height, maxval), (64, 36, 255));
    assert_eq!(body.len(), 64 * 36 * 3);

    // The centre pixel samples the origin, inside the set.
    let centre = (18 * 64 + 32) * 3;
    assert_eq!(&body[centre..centre + 3], &[0, 0, 0]);
}

#[test]
fn never_escaped_pixels_are_black() {
    let viewport = Viewport::default()
        .with_size(4, 4)
        .with_bounds(-0.1, 0.1, -0.1, 0.1);
    let image = render(&Hardcoded, &viewport, 256).expect("render");
    assert!(image.counts().iter().all(|&count| count == 256));
    assert!(image.shades().all(|value| value == 0));
}

#[test]
fn malformed_program_reports_the_fragment() {
    let err = Program::parse("*bb+ax").expect_err("parse should fail");
    assert!(err.to_string().contains("+ax"), "message: {err}");
}
