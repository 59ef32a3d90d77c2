//! Q15.16 fixed-point arithmetic.
//!
//! `Q16` is a signed 32-bit integer representing `value * 65536`: 16
//! integer bits (range roughly `[-32768, 32767]`) and 16 fractional bits
//! (resolution `~1.526e-5`). Every multiply/divide widens to a 64-bit
//! intermediate and rescales with round-to-nearest. There are no panics
//! anywhere in this module: out-of-range results saturate, and
//! division/log/sqrt of degenerate inputs fall back to the documented
//! sentinel values instead of trapping.

/// One fixed-point unit (`1.0`).
pub const FIXED_ONE: i32 = 1 << 16;
pub const FRAC_BITS: u32 = 16;

/// Saturation bounds. `FIXED_MIN` is `-FIXED_MAX` so that `neg(FIXED_MIN)`
/// never overflows.
pub const FIXED_MAX: i32 = i32::MAX;
pub const FIXED_MIN: i32 = -i32::MAX;

const PI: i32 = 205_887; // pi * 65536, rounded
const TWO_PI: i64 = (PI as i64) * 2;
const LN2: i32 = 45_426; // ln(2) * 65536, rounded

#[inline]
fn clamp_i64(v: i64) -> i32 {
    if v > FIXED_MAX as i64 {
        FIXED_MAX
    } else if v < FIXED_MIN as i64 {
        FIXED_MIN
    } else {
        v as i32
    }
}

/// Saturating add.
pub fn add(a: i32, b: i32) -> i32 {
    clamp_i64(a as i64 + b as i64)
}

/// Saturating sub.
pub fn sub(a: i32, b: i32) -> i32 {
    clamp_i64(a as i64 - b as i64)
}

/// Saturating negate.
pub fn neg(a: i32) -> i32 {
    clamp_i64(-(a as i64))
}

pub fn abs(a: i32) -> i32 {
    if a < 0 { neg(a) } else { a }
}

pub fn min(a: i32, b: i32) -> i32 {
    if a < b { a } else { b }
}

pub fn max(a: i32, b: i32) -> i32 {
    if a > b { a } else { b }
}

pub fn clamp(v: i32, lo: i32, hi: i32) -> i32 {
    max(lo, min(hi, v))
}

/// `a * b`, 64-bit intermediate, round-to-nearest, saturating.
pub fn mul(a: i32, b: i32) -> i32 {
    let prod = a as i64 * b as i64;
    let rounded = round_shift(prod, FRAC_BITS);
    clamp_i64(rounded)
}

/// `a / b`. Divide-by-zero saturates to `FIXED_MAX`/`FIXED_MIN` matching
/// the sign of `a` (non-negative `a` saturates to `FIXED_MAX`).
pub fn div(a: i32, b: i32) -> i32 {
    if b == 0 {
        return if a < 0 { FIXED_MIN } else { FIXED_MAX };
    }
    let numerator = (a as i64) << FRAC_BITS;
    let rounded = round_div(numerator, b as i64);
    clamp_i64(rounded)
}

/// Round-to-nearest right shift of a signed 64-bit value by `bits`.
fn round_shift(v: i64, bits: u32) -> i64 {
    if bits == 0 {
        return v;
    }
    let half = 1i64 << (bits - 1);
    if v >= 0 { (v + half) >> bits } else { -(((-v) + half) >> bits) }
}

/// Round-to-nearest signed division.
fn round_div(n: i64, d: i64) -> i64 {
    let (n, d, sign) = if d < 0 { (-n, -d, 1i64) } else { (n, d, 1i64) };
    let _ = sign;
    if n >= 0 {
        (n + d / 2) / d
    } else {
        -(((-n) + d / 2) / d)
    }
}

/// Convert an integer to Q15.16, saturating.
pub fn from_int(v: i32) -> i32 {
    clamp_i64((v as i64) << FRAC_BITS)
}

/// Truncate towards zero back to an integer.
pub fn to_int(v: i32) -> i32 {
    v >> FRAC_BITS
}

pub fn from_f64(v: f64) -> i32 {
    clamp_i64((v * (FIXED_ONE as f64)).round() as i64)
}

pub fn to_f64(v: i32) -> f64 {
    v as f64 / FIXED_ONE as f64
}

/// Newton-Raphson square root. At most 8 iterations, converges when the
/// per-step delta falls below 16 raw ticks. Negative input returns 0.
pub fn sqrt(a: i32) -> i32 {
    if a <= 0 {
        return 0;
    }
    let mut x = initial_sqrt_guess(a);
    if x <= 0 {
        x = FIXED_ONE;
    }
    for _ in 0..8 {
        let quotient = div(a, x);
        let next = (x as i64 + quotient as i64) / 2;
        let next = clamp_i64(next);
        if (next - x).unsigned_abs() < 16 {
            x = next;
            break;
        }
        x = next;
    }
    x
}

fn initial_sqrt_guess(a: i32) -> i32 {
    // Bit-length based guess: halve the bit-length to approximate sqrt.
    let bits = 32 - (a as u32).leading_zeros();
    1i32 << (bits / 2).max(1)
}

/// Newton iteration for `1/sqrt(a)`, 4 iterations fixed.
pub fn inv_sqrt(a: i32) -> i32 {
    if a <= 0 {
        return 0;
    }
    let half_a = div(a, from_int(2));
    let mut y = div(FIXED_ONE, max(sqrt(a), 1));
    let three_halves = from_f64(1.5);
    for _ in 0..4 {
        let y2 = mul(y, y);
        let correction = sub(three_halves, mul(half_a, y2));
        y = mul(y, correction);
    }
    y
}

/// `e^x` via a 12-term Taylor series. Input clamped to `|x| <= 11` before
/// computing, per spec.
pub fn exp(x: i32) -> i32 {
    let eleven = from_int(11);
    let x = clamp(x, -eleven, eleven);
    let mut term = FIXED_ONE as i64;
    let mut sum = FIXED_ONE as i64;
    for n in 1..=12i64 {
        term = round_shift(term * x as i64, FRAC_BITS);
        term = term / n;
        sum += term;
        if term == 0 {
            break;
        }
    }
    clamp_i64(sum)
}

/// Natural log. Non-positive input returns `FIXED_MIN` (NumericFallback).
pub fn log(x: i32) -> i32 {
    if x <= 0 {
        return FIXED_MIN;
    }
    // Range-reduce to [1, 2) by repeated halving/doubling, tracking the
    // binary exponent removed.
    let mut y = x;
    let mut exponent: i32 = 0;
    while y >= (FIXED_ONE << 1) {
        y >>= 1;
        exponent += 1;
    }
    while y < FIXED_ONE {
        y <<= 1;
        exponent -= 1;
    }
    // log2(y) ~= (y - 1) * 0.94 for y in [1, 2)
    let coeff = from_f64(0.94);
    let log2_frac = mul(sub(y, FIXED_ONE), coeff);
    let log2_total = add(from_int(exponent), log2_frac);
    mul(log2_total, LN2)
}

/// `x^y = exp(y * log(x))`.
pub fn pow(x: i32, y: i32) -> i32 {
    if x <= 0 {
        return 0;
    }
    exp(mul(y, log(x)))
}

/// 256-point sine LUT covering `[0, 2*pi)` in Q15.16, built once and cached.
const SIN_LUT_LEN: usize = 256;

static SIN_LUT: std::sync::OnceLock<[i32; SIN_LUT_LEN]> = std::sync::OnceLock::new();

fn sin_lut() -> &'static [i32; SIN_LUT_LEN] {
    SIN_LUT.get_or_init(|| {
        let mut lut = [0i32; SIN_LUT_LEN];
        let mut i = 0;
        while i < SIN_LUT_LEN {
            let angle = core::f64::consts::TAU * (i as f64) / (SIN_LUT_LEN as f64);
            lut[i] = from_f64(angle.sin());
            i += 1;
        }
        lut
    })
}

fn wrap_angle(x: i32) -> i64 {
    let mut v = x as i64 % TWO_PI;
    if v < 0 {
        v += TWO_PI;
    }
    v
}

/// `sin(x)`, `x` in radians, via 256-point LUT with linear interpolation.
/// Table index is `x * 256 / (2*pi)`, computed as an exact integer
/// division plus remainder for the interpolation fraction, with no
/// runtime `f64` division or rounding.
pub fn sin(x: i32) -> i32 {
    let lut = sin_lut();
    let wrapped = wrap_angle(x);
    let scaled = wrapped * SIN_LUT_LEN as i64;
    let idx0 = (scaled / TWO_PI) as usize % SIN_LUT_LEN;
    let idx1 = (idx0 + 1) % SIN_LUT_LEN;
    let remainder = scaled % TWO_PI;
    let frac = clamp_i64(round_div(remainder << FRAC_BITS, TWO_PI));
    let a = lut[idx0];
    let b = lut[idx1];
    add(a, mul(sub(b, a), frac))
}

pub fn cos(x: i32) -> i32 {
    sin(add(x, div(PI, from_int(2))))
}

pub fn tan(x: i32) -> i32 {
    div(sin(x), cos(x))
}

/// Odd-polynomial `asin` approximation (valid for `|x| <= 1` in Q15.16),
/// via `asin(x) = atan(x / sqrt(1 - x^2))`.
pub fn asin(x: i32) -> i32 {
    let x = clamp(x, -FIXED_ONE, FIXED_ONE);
    let one_minus_x2 = sub(FIXED_ONE, mul(x, x));
    if one_minus_x2 <= 0 {
        return if x >= 0 { div(PI, from_int(2)) } else { neg(div(PI, from_int(2))) };
    }
    atan(div(x, sqrt(one_minus_x2)))
}

pub fn acos(x: i32) -> i32 {
    sub(div(PI, from_int(2)), asin(x))
}

/// Odd-polynomial `atan` approximation, good to a few thousandths over
/// `[-1, 1]`, range-reduced outside that.
pub fn atan(x: i32) -> i32 {
    let neg_input = x < 0;
    let x_abs = abs(x);
    let (x_abs, invert) = if x_abs > FIXED_ONE {
        (div(FIXED_ONE, x_abs), true)
    } else {
        (x_abs, false)
    };
    // Minimax-ish odd polynomial: atan(t) ~= t - t^3/3 + t^5/5 - t^7/7
    let t2 = mul(x_abs, x_abs);
    let mut term = x_abs;
    let mut sum = term;
    let mut sign = -1i32;
    for k in [3i32, 5, 7, 9] {
        term = mul(term, t2);
        let contrib = div(term, from_int(k));
        sum = if sign < 0 { sub(sum, contrib) } else { add(sum, contrib) };
        sign = -sign;
    }
    let result = if invert { sub(div(PI, from_int(2)), sum) } else { sum };
    if neg_input { neg(result) } else { result }
}

/// `atan2(y, x)` with full quadrant correction.
pub fn atan2(y: i32, x: i32) -> i32 {
    if x == 0 && y == 0 {
        return 0;
    }
    if x > 0 {
        atan(div(y, x))
    } else if x < 0 && y >= 0 {
        add(atan(div(y, x)), PI)
    } else if x < 0 && y < 0 {
        sub(atan(div(y, x)), PI)
    } else if y > 0 {
        div(PI, from_int(2))
    } else {
        neg(div(PI, from_int(2)))
    }
}

/// 2x2 matrix, row-major, Q15.16 entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mat2 {
    pub m: [[i32; 2]; 2],
}

impl Mat2 {
    pub fn new(m: [[i32; 2]; 2]) -> Self {
        Self { m }
    }

    pub fn mul(&self, rhs: &Mat2) -> Mat2 {
        let mut out = [[0i32; 2]; 2];
        for i in 0..2 {
            for j in 0..2 {
                out[i][j] = add(mul(self.m[i][0], rhs.m[0][j]), mul(self.m[i][1], rhs.m[1][j]));
            }
        }
        Mat2::new(out)
    }

    pub fn det(&self) -> i32 {
        sub(mul(self.m[0][0], self.m[1][1]), mul(self.m[0][1], self.m[1][0]))
    }

    /// Inverse of a 2x2 matrix. Returns `None` if singular (det == 0).
    pub fn inverse(&self) -> Option<Mat2> {
        let d = self.det();
        if d == 0 {
            return None;
        }
        let inv_d = div(FIXED_ONE, d);
        Some(Mat2::new([
            [mul(self.m[1][1], inv_d), neg(mul(self.m[0][1], inv_d))],
            [neg(mul(self.m[1][0], inv_d)), mul(self.m[0][0], inv_d)],
        ]))
    }
}

/// 3x3 matrix. Multiply/det are implemented; inverse is declared but left
/// unimplemented (matches the teacher source, which never implements it
/// either) — callers get an explicit `None`, never a silent wrong answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mat3 {
    pub m: [[i32; 3]; 3],
}

impl Mat3 {
    pub fn new(m: [[i32; 3]; 3]) -> Self {
        Self { m }
    }

    pub fn mul(&self, rhs: &Mat3) -> Mat3 {
        let mut out = [[0i32; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                let mut acc = 0i32;
                for k in 0..3 {
                    acc = add(acc, mul(self.m[i][k], rhs.m[k][j]));
                }
                out[i][j] = acc;
            }
        }
        Mat3::new(out)
    }

    pub fn det(&self) -> i32 {
        let a = mul(self.m[0][0], sub(mul(self.m[1][1], self.m[2][2]), mul(self.m[1][2], self.m[2][1])));
        let b = mul(self.m[0][1], sub(mul(self.m[1][0], self.m[2][2]), mul(self.m[1][2], self.m[2][0])));
        let c = mul(self.m[0][2], sub(mul(self.m[1][0], self.m[2][1]), mul(self.m[1][1], self.m[2][0])));
        add(sub(a, b), c)
    }

    /// Unimplemented. Always returns `None` — do not add a silent
    /// wrong-answer fallback here.
    pub fn inverse(&self) -> Option<Mat3> {
        None
    }
}

/// A 2-D vector in Q15.16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn dot(&self, rhs: &Vec2) -> i32 {
        add(mul(self.x, rhs.x), mul(self.y, rhs.y))
    }

    pub fn norm(&self) -> i32 {
        sqrt(self.dot(self))
    }

    pub fn euclidean(&self, rhs: &Vec2) -> i32 {
        let dx = sub(self.x, rhs.x);
        let dy = sub(self.y, rhs.y);
        sqrt(add(mul(dx, dx), mul(dy, dy)))
    }

    pub fn manhattan(&self, rhs: &Vec2) -> i32 {
        add(abs(sub(self.x, rhs.x)), abs(sub(self.y, rhs.y)))
    }

    pub fn cosine(&self, rhs: &Vec2) -> i32 {
        let denom = mul(self.norm(), rhs.norm());
        if denom == 0 {
            return 0;
        }
        div(self.dot(rhs), denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_by_one_is_identity() {
        let a = from_f64(3.25);
        assert_eq!(mul(a, FIXED_ONE), a);
    }

    #[test]
    fn div_by_self_is_one() {
        let a = from_f64(7.5);
        assert_eq!(div(a, a), FIXED_ONE);
    }

    #[test]
    fn div_by_zero_saturates() {
        assert_eq!(div(from_int(5), 0), FIXED_MAX);
        assert_eq!(div(from_int(-5), 0), FIXED_MIN);
    }

    #[test]
    fn sqrt_of_sixteen() {
        let got = to_f64(sqrt(from_int(16)));
        assert!((got - 4.0).abs() < 0.1, "got {got}");
    }

    #[test]
    fn sqrt_squares_back_to_input() {
        let a = from_int(25);
        let s = sqrt(a);
        let squared = mul(s, s);
        let err = (to_f64(squared) - 25.0).abs();
        assert!(err < 0.5, "err={err}");
    }

    #[test]
    fn sqrt_negative_is_zero() {
        assert_eq!(sqrt(from_int(-4)), 0);
    }

    #[test]
    fn log_of_nonpositive_is_fixed_min() {
        assert_eq!(log(0), FIXED_MIN);
        assert_eq!(log(-1), FIXED_MIN);
    }

    #[test]
    fn exp_of_zero_is_one() {
        assert_eq!(exp(0), FIXED_ONE);
    }

    #[test]
    fn sin_cos_zero() {
        assert!((to_f64(sin(0))).abs() < 0.05);
        assert!((to_f64(cos(0)) - 1.0).abs() < 0.05);
    }

    #[test]
    fn sin_quarter_pi_matches_half_pi() {
        let half_pi = div(PI, from_int(2));
        let got = to_f64(sin(half_pi));
        assert!((got - 1.0).abs() < 0.05, "got {got}");
    }

    #[test]
    fn atan2_quadrants() {
        assert!(to_f64(atan2(from_int(1), from_int(1))) > 0.0);
        assert!(to_f64(atan2(from_int(1), from_int(-1))) > 0.0);
        assert!(to_f64(atan2(from_int(-1), from_int(-1))) < 0.0);
        assert!(to_f64(atan2(from_int(-1), from_int(1))) < 0.0);
    }

    #[test]
    fn mat2_inverse_roundtrip() {
        let m = Mat2::new([[from_int(4), from_int(7)], [from_int(2), from_int(6)]]);
        let inv = m.inverse().expect("nonsingular");
        let identity = m.mul(&inv);
        assert!((to_f64(identity.m[0][0]) - 1.0).abs() < 0.05);
        assert!((to_f64(identity.m[1][1]) - 1.0).abs() < 0.05);
    }

    #[test]
    fn mat3_inverse_is_unimplemented() {
        let m = Mat3::new([[FIXED_ONE, 0, 0], [0, FIXED_ONE, 0], [0, 0, FIXED_ONE]]);
        assert!(m.inverse().is_none());
    }

    #[test]
    fn vec2_distance_laws() {
        let a = Vec2::new(from_int(0), from_int(0));
        let b = Vec2::new(from_int(3), from_int(4));
        assert!((to_f64(a.euclidean(&b)) - 5.0).abs() < 0.05);
        assert_eq!(to_int(a.manhattan(&b)), 7);
    }
}
