//! Online statistics: Welford accumulator, histograms, Shannon entropy,
//! and small fixed-order moving filters.

use crate::fixed::{self, FIXED_ONE};

/// Numerically stable online mean/variance (Welford's algorithm). Avoids
/// the catastrophic cancellation a naive sum-of-squares two-pass estimator
/// suffers on integer streams.
#[derive(Debug, Clone, Copy)]
pub struct Welford {
    pub n: u32,
    pub mean: i32,
    pub m2: i64,
    pub min: i32,
    pub max: i32,
}

impl Default for Welford {
    fn default() -> Self {
        Self::new()
    }
}

impl Welford {
    pub fn new() -> Self {
        Self { n: 0, mean: 0, m2: 0, min: i32::MAX, max: i32::MIN }
    }

    pub fn add(&mut self, x: i32) {
        self.n += 1;
        let delta = fixed::sub(x, self.mean);
        self.mean = fixed::add(self.mean, fixed::div(delta, fixed::from_int(self.n as i32)));
        let delta2 = fixed::sub(x, self.mean);
        // m2 accumulates in a wider integer so long streams don't drift.
        self.m2 += (delta as i64 * delta2 as i64) >> fixed::FRAC_BITS;
        self.min = if x < self.min { x } else { self.min };
        self.max = if x > self.max { x } else { self.max };
    }

    pub fn variance(&self) -> i32 {
        if self.n < 2 {
            return 0;
        }
        let v = self.m2 / (self.n as i64 - 1);
        if v > i32::MAX as i64 { i32::MAX } else { v as i32 }
    }

    pub fn std_dev(&self) -> i32 {
        fixed::sqrt(self.variance())
    }
}

/// Fixed-capacity linear histogram, `N` bins.
#[derive(Debug, Clone)]
pub struct Histogram<const N: usize> {
    pub bins: [u32; N],
    pub num_bins: usize,
    pub min_val: i32,
    pub max_val: i32,
    pub bin_width: i32,
    pub total_samples: u32,
    pub peak_bin: usize,
    pub peak_count: u32,
}

impl<const N: usize> Histogram<N> {
    /// Build a histogram over `[min_val, max_val]` with `num_bins <= N`
    /// evenly sized bins.
    pub fn new(min_val: i32, max_val: i32, num_bins: usize) -> Self {
        let num_bins = num_bins.clamp(1, N);
        let range = fixed::max(1, fixed::sub(max_val, min_val));
        let bin_width = fixed::max(1, fixed::div(range, fixed::from_int(num_bins as i32)));
        Self {
            bins: [0u32; N],
            num_bins,
            min_val,
            max_val,
            bin_width,
            total_samples: 0,
            peak_bin: 0,
            peak_count: 0,
        }
    }

    /// Reject `x` outside `[min_val, max_val]`; otherwise bucket it.
    pub fn add(&mut self, x: i32) -> bool {
        if x < self.min_val || x > self.max_val {
            return false;
        }
        let offset = fixed::sub(x, self.min_val);
        let raw_bin = fixed::to_int(fixed::div(offset, self.bin_width));
        let bin = (raw_bin as usize).min(self.num_bins - 1);
        self.bins[bin] += 1;
        self.total_samples += 1;
        if self.bins[bin] > self.peak_count {
            self.peak_count = self.bins[bin];
            self.peak_bin = bin;
        }
        true
    }

    /// Smallest bin whose cumulative count reaches `total * p / 100`.
    pub fn percentile(&self, p: u32) -> i32 {
        if self.total_samples == 0 {
            return self.min_val;
        }
        let target = (self.total_samples as u64 * p as u64).div_ceil(100);
        let mut cumulative = 0u64;
        for i in 0..self.num_bins {
            cumulative += self.bins[i] as u64;
            if cumulative >= target {
                return fixed::add(self.min_val, fixed::mul(fixed::from_int(i as i32), self.bin_width));
            }
        }
        self.max_val
    }

    pub fn median(&self) -> i32 {
        self.percentile(50)
    }

    pub fn mode(&self) -> i32 {
        let half_bin = fixed::div(self.bin_width, fixed::from_int(2));
        fixed::add(
            self.min_val,
            fixed::mul(fixed::add(fixed::from_int(self.peak_bin as i32), fixed::div(half_bin, self.bin_width)), self.bin_width),
        )
    }
}

/// Shannon entropy in bits/byte over a 256-entry byte-frequency table.
pub fn shannon_entropy(freq: &[u32; 256]) -> i32 {
    let total: u64 = freq.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return 0;
    }
    let mut bits = 0i32;
    for &count in freq.iter() {
        if count == 0 {
            continue;
        }
        let p = fixed::div(fixed::from_int(count as i32), fixed::from_int(total as i32));
        // -p * log2(p) = -p * ln(p) / ln(2)
        let ln_p = fixed::log(p);
        let log2_p = fixed::div(ln_p, fixed::from_f64(core::f64::consts::LN_2));
        let term = fixed::neg(fixed::mul(p, log2_p));
        bits = fixed::add(bits, term);
    }
    bits
}

/// Direct-form FIR moving average, order `<= 8`.
#[derive(Debug, Clone)]
pub struct Fir<const N: usize> {
    taps: [i32; N],
    history: [i32; N],
    pos: usize,
    filled: usize,
}

impl<const N: usize> Fir<N> {
    /// Equal-weight moving average over the last `N` samples.
    pub fn moving_average() -> Self {
        let weight = fixed::div(FIXED_ONE, fixed::from_int(N as i32));
        Self { taps: [weight; N], history: [0; N], pos: 0, filled: 0 }
    }

    pub fn push(&mut self, x: i32) -> i32 {
        self.history[self.pos] = x;
        self.pos = (self.pos + 1) % N;
        self.filled = (self.filled + 1).min(N);

        let mut acc = 0i32;
        for i in 0..self.filled {
            let idx = (self.pos + N - 1 - i) % N;
            acc = fixed::add(acc, fixed::mul(self.taps[i], self.history[idx]));
        }
        acc
    }
}

/// Direct-form-II single-pole IIR low-pass, order `<= 4` via cascading.
#[derive(Debug, Clone, Copy)]
pub struct Iir {
    alpha: i32,
    state: i32,
    initialized: bool,
}

impl Iir {
    /// `alpha` in `[0, FIXED_ONE]` — higher alpha tracks input faster.
    pub fn new(alpha: i32) -> Self {
        Self { alpha: fixed::clamp(alpha, 0, FIXED_ONE), state: 0, initialized: false }
    }

    pub fn push(&mut self, x: i32) -> i32 {
        if !self.initialized {
            self.state = x;
            self.initialized = true;
            return self.state;
        }
        let delta = fixed::mul(self.alpha, fixed::sub(x, self.state));
        self.state = fixed::add(self.state, delta);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{from_int, to_f64};

    #[test]
    fn welford_one_to_ten() {
        let mut w = Welford::new();
        for x in 1..=10 {
            w.add(from_int(x));
        }
        assert!((to_f64(w.mean) - 5.5).abs() < 0.1);
        assert!((to_f64(w.variance()) - 9.166).abs() < 0.5);
        assert_eq!(w.min, from_int(1));
        assert_eq!(w.max, from_int(10));
    }

    #[test]
    fn welford_single_sample_has_zero_variance() {
        let mut w = Welford::new();
        w.add(from_int(5));
        assert_eq!(w.variance(), 0);
    }

    #[test]
    fn histogram_peak_and_total() {
        let mut h: Histogram<16> = Histogram::new(from_int(0), from_int(16), 16);
        for _ in 0..5 {
            h.add(from_int(3));
        }
        h.add(from_int(10));
        assert_eq!(h.peak_count, 5);
        let total: u32 = h.bins.iter().sum();
        assert_eq!(total, h.total_samples);
        assert_eq!(total, 6);
    }

    #[test]
    fn histogram_rejects_out_of_range() {
        let mut h: Histogram<8> = Histogram::new(from_int(0), from_int(10), 8);
        assert!(!h.add(from_int(-1)));
        assert!(!h.add(from_int(11)));
        assert_eq!(h.total_samples, 0);
    }

    #[test]
    fn entropy_uniform_bytes_is_high() {
        let mut freq = [0u32; 256];
        for f in freq.iter_mut() {
            *f = 1;
        }
        let h = shannon_entropy(&freq);
        assert!(to_f64(h) > 7.0, "got {}", to_f64(h));
    }

    #[test]
    fn entropy_constant_byte_is_zero() {
        let mut freq = [0u32; 256];
        freq[0x42] = 100;
        let h = shannon_entropy(&freq);
        assert!(to_f64(h) < 0.1, "got {}", to_f64(h));
    }

    #[test]
    fn entropy_sixteen_values_is_midrange() {
        let mut freq = [0u32; 256];
        for v in 0..16u32 {
            freq[v as usize] = 10;
        }
        let h = shannon_entropy(&freq);
        let bits = to_f64(h);
        assert!(bits > 3.0 && bits < 5.0, "got {bits}");
    }

    #[test]
    fn fir_converges_to_constant_input() {
        let mut fir: Fir<4> = Fir::moving_average();
        let mut last = 0;
        for _ in 0..4 {
            last = fir.push(from_int(10));
        }
        assert!((to_f64(last) - 10.0).abs() < 0.1);
    }

    #[test]
    fn iir_tracks_step_input() {
        let mut iir = Iir::new(fixed::from_f64(0.5));
        iir.push(from_int(0));
        let mut v = 0;
        for _ in 0..10 {
            v = iir.push(from_int(10));
        }
        assert!((to_f64(v) - 10.0).abs() < 0.1);
    }
}
