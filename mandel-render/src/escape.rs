use jit::{Complex, Kernel, Register, RegisterFile};

/// `|b|^2` at which a point counts as escaped.
pub const ESCAPE_RADIUS_SQUARED: f64 = 4.0;
pub const DEFAULT_MAX_ITERATIONS: u32 = 256;

/// Number of kernel steps before register `b` leaves the radius-2 disc,
/// starting from a zeroed register file with `a = point`. Returns
/// `max_iterations` for points that never escape.
pub fn escape_time<K: Kernel + ?Sized>(kernel: &K, point: Complex, max_iterations: u32) -> u32 {
    let mut registers = RegisterFile::new();
    escape_time_in(kernel, &mut registers, point, max_iterations)
}

/// Like [`escape_time`], reusing `registers` as scratch space.
pub fn escape_time_in<K: Kernel + ?Sized>(
    kernel: &K,
    registers: &mut RegisterFile,
    point: Complex,
    max_iterations: u32,
) -> u32 {
    registers.reset(point);

    let mut iterations = 0;
    while iterations < max_iterations
        && registers[Register::B].norm_sqr() < ESCAPE_RADIUS_SQUARED
    {
        kernel.step(registers);
        iterations += 1;
    }
    iterations
}
