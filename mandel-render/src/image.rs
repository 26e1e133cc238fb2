use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::Instant;

use jit::{Kernel, RegisterFile};
use tracing::{debug, info};

use crate::error::RenderResult;
use crate::escape::escape_time_in;
use crate::logging::category_render;
use crate::viewport::Viewport;

const MAXVAL: u8 = 255;

/// Escape-time counts for every pixel of a viewport, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeImage {
    width: u32,
    height: u32,
    max_iterations: u32,
    counts: Vec<u32>,
}

impl EscapeImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn count_at(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.counts
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        self.counts.chunks(self.width.max(1) as usize)
    }

    pub fn shades(&self) -> impl Iterator<Item = u8> + '_ {
        self.counts
            .iter()
            .map(move |&count| shade(count, self.max_iterations))
    }

    pub fn write_to<W: Write>(&self, format: ImageFormat, out: &mut W) -> io::Result<()> {
        match format {
            ImageFormat::Pgm => self.write_pgm(out),
            ImageFormat::PgmAscii => self.write_pgm_ascii(out),
            ImageFormat::Ppm => self.write_ppm(out),
        }
    }

    /// Binary greyscale, `P5`.
    pub fn write_pgm<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "P5\n{} {}\n{}\n", self.width, self.height, MAXVAL)?;
        for row in self.rows() {
            let line: Vec<u8> = row
                .iter()
                .map(|&count| shade(count, self.max_iterations))
                .collect();
            out.write_all(&line)?;
        }
        out.flush()
    }

    /// ASCII greyscale, `P2`, one image row per line.
    pub fn write_pgm_ascii<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "P2\n{} {}\n{}\n", self.width, self.height, MAXVAL)?;
        for row in self.rows() {
            let line = row
                .iter()
                .map(|&count| shade(count, self.max_iterations).to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "{line}")?;
        }
        out.flush()
    }

    /// Binary colour, `P6`, through [`palette`].
    pub fn write_ppm<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "P6\n{} {}\n{}\n", self.width, self.height, MAXVAL)?;
        for row in self.rows() {
            let line: Vec<u8> = row
                .iter()
                .flat_map(|&count| palette(shade(count, self.max_iterations)))
                .collect();
            out.write_all(&line)?;
        }
        out.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Pgm,
    PgmAscii,
    Ppm,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Pgm => "pgm",
            ImageFormat::PgmAscii => "pgm-ascii",
            ImageFormat::Ppm => "ppm",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pgm" => Ok(ImageFormat::Pgm),
            "pgm-ascii" => Ok(ImageFormat::PgmAscii),
            "ppm" => Ok(ImageFormat::Ppm),
            other => Err(format!(
                "unknown image format '{other}' (expected pgm, pgm-ascii or ppm)"
            )),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grey level for an escape count: black for points that never escaped,
/// otherwise the count scaled onto `0..=255`.
pub fn shade(iterations: u32, max_iterations: u32) -> u8 {
    if iterations >= max_iterations {
        return 0;
    }
    let scaled = u64::from(iterations) * 256 / u64::from(max_iterations);
    scaled.min(u64::from(MAXVAL)) as u8
}

const PALETTE_STOPS: [(u8, [u8; 3]); 5] = [
    (0, [0, 7, 100]),
    (64, [32, 107, 203]),
    (128, [237, 255, 255]),
    (192, [255, 170, 0]),
    (255, [64, 2, 0]),
];

/// Colour for a grey level. Zero stays black so the set itself is solid.
pub fn palette(shade: u8) -> [u8; 3] {
    if shade == 0 {
        return [0, 0, 0];
    }
    let upper = PALETTE_STOPS
        .iter()
        .position(|(stop, _)| *stop >= shade)
        .unwrap_or(PALETTE_STOPS.len() - 1);
    let (hi_stop, hi) = PALETTE_STOPS[upper];
    let (lo_stop, lo) = PALETTE_STOPS[upper.saturating_sub(1)];
    if hi_stop == lo_stop {
        return hi;
    }
    let span = u32::from(hi_stop - lo_stop);
    let offset = u32::from(shade - lo_stop);
    let mut rgb = [0u8; 3];
    for channel in 0..3 {
        let from = u32::from(lo[channel]);
        let to = u32::from(hi[channel]);
        rgb[channel] = ((from * (span - offset) + to * offset) / span) as u8;
    }
    rgb
}

/// Runs `kernel` over every pixel of `viewport`.
pub fn render<K: Kernel + ?Sized>(
    kernel: &K,
    viewport: &Viewport,
    max_iterations: u32,
) -> RenderResult<EscapeImage> {
    viewport.validate()?;
    info!(
        "{} rendering {viewport} max_iterations={max_iterations}",
        category_render()
    );

    let started = Instant::now();
    let mut registers = RegisterFile::new();
    let mut counts = Vec::with_capacity(viewport.pixel_count());
    let report_every = (viewport.height / 10).max(1);
    for y in 0..viewport.height {
        for x in 0..viewport.width {
            let point = viewport.point_at(x, y);
            counts.push(escape_time_in(kernel, &mut registers, point, max_iterations));
        }
        if (y + 1) % report_every == 0 {
            debug!("rendered rows={}/{}", y + 1, viewport.height);
        }
    }

    let steps: u64 = counts.iter().map(|&count| u64::from(count)).sum();
    info!(
        "{} rendered {} pixels steps={steps} elapsed_ms={}",
        category_render(),
        counts.len(),
        started.elapsed().as_millis()
    );
    Ok(EscapeImage {
        width: viewport.width,
        height: viewport.height,
        max_iterations,
        counts,
    })
}
