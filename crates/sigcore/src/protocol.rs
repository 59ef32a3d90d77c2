//! Protocol inference engine (C6): pulse-width histogramming, peak
//! clustering, and modulation/encoding classification.

use crate::fixed;
use crate::stats::{Histogram, Welford};
use crate::types::{Frame, Pulse, FRAME_RING_CAPACITY, PULSE_RING_CAPACITY, SYMBOL_ALPHABET_CAPACITY};

const MAX_HIST_BINS: usize = 256;
const MIN_PULSES_FOR_ANALYSIS: usize = 10;
const MIN_FRAMES_FOR_ANALYSIS: usize = 2;

/// `0.4` and `0.6` in Q15.16, the Manchester transition-rate band.
const MANCHESTER_RATE_LOW: i32 = 26214;
const MANCHESTER_RATE_HIGH: i32 = 39322;
/// `1.8` and `2.2` in Q15.16, the PWM long/short ratio band.
const PWM_RATIO_LOW: i32 = 117965;
const PWM_RATIO_HIGH: i32 = 144179;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    #[default]
    Unknown,
    Ook,
    Fsk,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Unknown,
    Manchester,
    Pwm,
    Nrz,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolCluster {
    pub center_us: u32,
    pub spread_us: u32,
    pub symbol_id: usize,
}

#[derive(Debug, Clone)]
pub struct ProtocolHypothesis {
    pub modulation: Modulation,
    pub encoding: Encoding,
    pub baud_rate: u32,
    pub symbol_period_us: u32,
    pub short_pulse_width_us: u32,
    pub long_pulse_width_us: u32,
    pub symbol_alphabet: [SymbolCluster; SYMBOL_ALPHABET_CAPACITY],
    pub symbol_count: usize,
    pub preamble_length_bits: u32,
    pub payload_bits: u32,
    pub checksum_bits: u32,
    pub modulation_confidence: u8,
    pub encoding_confidence: u8,
    pub timing_confidence: u8,
    pub frame_structure_confidence: u8,
    pub overall_confidence: u8,
}

impl Default for ProtocolHypothesis {
    fn default() -> Self {
        Self {
            modulation: Modulation::default(),
            encoding: Encoding::default(),
            baud_rate: 0,
            symbol_period_us: 0,
            short_pulse_width_us: 0,
            long_pulse_width_us: 0,
            symbol_alphabet: [SymbolCluster::default(); SYMBOL_ALPHABET_CAPACITY],
            symbol_count: 0,
            preamble_length_bits: 0,
            payload_bits: 0,
            checksum_bits: 0,
            modulation_confidence: 0,
            encoding_confidence: 0,
            timing_confidence: 0,
            frame_structure_confidence: 0,
            overall_confidence: 0,
        }
    }
}

impl ProtocolHypothesis {
    fn recompute_overall(&mut self) {
        let sum = self.modulation_confidence as u32
            + self.encoding_confidence as u32
            + self.timing_confidence as u32
            + self.frame_structure_confidence as u32;
        self.overall_confidence = (sum / 4) as u8;
    }
}

pub struct ProtocolInferenceEngine {
    pulses: Vec<Pulse>,
    frames: Vec<([u8; 64], usize, u32)>, // (data, length, duration_us)
    hypothesis: ProtocolHypothesis,
}

impl Default for ProtocolInferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolInferenceEngine {
    pub fn new() -> Self {
        Self {
            pulses: Vec::with_capacity(PULSE_RING_CAPACITY),
            frames: Vec::with_capacity(FRAME_RING_CAPACITY),
            hypothesis: ProtocolHypothesis::default(),
        }
    }

    pub fn on_pulse(&mut self, pulse: Pulse) {
        if self.pulses.len() < PULSE_RING_CAPACITY {
            self.pulses.push(pulse);
        } else {
            log::warn!("protocol engine pulse buffer at capacity ({PULSE_RING_CAPACITY}), dropping pulse");
        }
    }

    pub fn on_frame(&mut self, frame: &Frame) {
        if self.frames.len() < FRAME_RING_CAPACITY {
            self.frames.push((frame.data, frame.length, frame.duration_us));
        } else {
            log::warn!("protocol engine frame buffer at capacity ({FRAME_RING_CAPACITY}), dropping frame");
        }
    }

    pub fn snapshot_hypothesis(&self) -> ProtocolHypothesis {
        self.hypothesis.clone()
    }

    /// Run the full pipeline if enough data has accumulated (`>= 10`
    /// pulses or `>= 2` frames); otherwise leaves the last hypothesis
    /// untouched.
    pub fn analyze(&mut self) {
        if self.pulses.len() < MIN_PULSES_FOR_ANALYSIS && self.frames.len() < MIN_FRAMES_FOR_ANALYSIS {
            return;
        }

        let (mark_hist, space_hist) = build_histograms(&self.pulses);
        let clusters = cluster_peaks(&mark_hist);

        let mut hyp = ProtocolHypothesis::default();
        hyp.symbol_count = clusters.len().min(SYMBOL_ALPHABET_CAPACITY);
        for (i, c) in clusters.iter().take(SYMBOL_ALPHABET_CAPACITY).enumerate() {
            hyp.symbol_alphabet[i] = *c;
        }

        let (modulation, mod_confidence) = classify_modulation(&self.pulses, &clusters);
        hyp.modulation = modulation;
        hyp.modulation_confidence = mod_confidence;

        let (encoding, enc_confidence) = classify_encoding(&self.pulses, &clusters);
        hyp.encoding = encoding;
        hyp.encoding_confidence = enc_confidence;

        let (symbol_period_us, baud_rate, timing_confidence) = timing(&clusters, &self.pulses);
        hyp.symbol_period_us = symbol_period_us;
        hyp.baud_rate = baud_rate;
        hyp.timing_confidence = timing_confidence;

        if let (Some(min_w), Some(max_w)) = (mark_hist_min(&mark_hist), mark_hist_max(&mark_hist)) {
            hyp.short_pulse_width_us = min_w;
            hyp.long_pulse_width_us = max_w;
        }

        let preamble_bits = preamble_length_bits(&self.frames);
        hyp.preamble_length_bits = preamble_bits;

        let (payload_bits, checksum_bits, frame_confidence) = frame_structure(&self.frames, preamble_bits);
        hyp.payload_bits = payload_bits;
        hyp.checksum_bits = checksum_bits;
        hyp.frame_structure_confidence = frame_confidence;

        hyp.recompute_overall();
        log::debug!(
            "protocol inference: modulation={:?} encoding={:?} overall_confidence={}",
            hyp.modulation,
            hyp.encoding,
            hyp.overall_confidence
        );
        self.hypothesis = hyp;
        let _ = space_hist; // retained for symmetry with the mark histogram; not separately reported
    }
}

fn mark_hist_min(h: &Histogram<MAX_HIST_BINS>) -> Option<u32> {
    if h.total_samples == 0 { None } else { Some(fixed::to_int(h.min_val).max(0) as u32) }
}
fn mark_hist_max(h: &Histogram<MAX_HIST_BINS>) -> Option<u32> {
    if h.total_samples == 0 { None } else { Some(fixed::to_int(h.max_val).max(0) as u32) }
}

fn build_histograms(pulses: &[Pulse]) -> (Histogram<MAX_HIST_BINS>, Histogram<MAX_HIST_BINS>) {
    let marks: Vec<u16> = pulses.iter().filter(|p| p.level == 1).map(|p| p.width_us).collect();
    let spaces: Vec<u16> = pulses.iter().filter(|p| p.level == 0).map(|p| p.width_us).collect();
    (histogram_of(&marks), histogram_of(&spaces))
}

fn histogram_of(widths: &[u16]) -> Histogram<MAX_HIST_BINS> {
    if widths.is_empty() {
        return Histogram::new(0, fixed::from_int(1), 1);
    }
    let min_w = *widths.iter().min().unwrap() as i32;
    let max_w = *widths.iter().max().unwrap() as i32;
    let range = (max_w - min_w).max(1) as usize;
    let num_bins = range.min(MAX_HIST_BINS).max(1);
    let mut h: Histogram<MAX_HIST_BINS> = Histogram::new(fixed::from_int(min_w), fixed::from_int(max_w.max(min_w + 1)), num_bins);
    for &w in widths {
        h.add(fixed::from_int(w as i32));
    }
    h
}

/// Up to 3 peaks: bins whose count strictly exceeds both neighbors and
/// `total / 20`.
fn cluster_peaks(hist: &Histogram<MAX_HIST_BINS>) -> Vec<SymbolCluster> {
    let mut clusters = Vec::new();
    if hist.total_samples == 0 {
        return clusters;
    }
    let threshold = hist.total_samples / 20;
    for bin in 1..hist.num_bins.saturating_sub(1) {
        let count = hist.bins[bin];
        if count > hist.bins[bin - 1] && count > hist.bins[bin + 1] && count > threshold {
            let center = fixed::to_int(fixed::add(hist.min_val, fixed::mul(fixed::from_int(bin as i32), hist.bin_width))).max(0) as u32;
            let spread = fixed::to_int(fixed::mul(fixed::from_int(2), hist.bin_width)).max(0) as u32;
            clusters.push(SymbolCluster { center_us: center, spread_us: spread, symbol_id: clusters.len() });
            if clusters.len() == 3 {
                break;
            }
        }
    }
    clusters
}

/// OOK precedence over FSK over ASK when predicates overlap.
fn classify_modulation(pulses: &[Pulse], clusters: &[SymbolCluster]) -> (Modulation, u8) {
    if pulses.is_empty() {
        return (Modulation::Unknown, 0);
    }
    let long_count = pulses.iter().filter(|p| p.width_us as u32 > 1000).count();
    let is_ook = long_count * 3 > pulses.len();

    if is_ook {
        let mark_total: u32 = pulses.iter().filter(|p| p.level == 1).map(|p| p.width_us as u32).sum();
        let space_total: u32 = pulses.iter().filter(|p| p.level == 0).map(|p| p.width_us as u32).sum();
        let ratio_confirmed = if space_total > 0 {
            mark_total >= space_total * 2 || space_total >= mark_total * 2
        } else {
            false
        };
        return (Modulation::Ook, if ratio_confirmed { 90 } else { 50 });
    }
    if clusters.len() >= 2 {
        return (Modulation::Fsk, 85);
    }
    (Modulation::Ask, 80)
}

fn classify_encoding(pulses: &[Pulse], clusters: &[SymbolCluster]) -> (Encoding, u8) {
    if pulses.len() < 2 {
        return (Encoding::Unknown, 30);
    }
    let transitions = pulses.windows(2).filter(|w| w[0].level != w[1].level).count();
    let rate = fixed::div(fixed::from_int(transitions as i32), fixed::from_int((pulses.len() - 1) as i32));
    if (MANCHESTER_RATE_LOW..=MANCHESTER_RATE_HIGH).contains(&rate) {
        return (Encoding::Manchester, 90);
    }
    if clusters.len() == 2 {
        let a = fixed::from_int(clusters[0].center_us.max(1) as i32);
        let b = fixed::from_int(clusters[1].center_us.max(1) as i32);
        let ratio = fixed::max(fixed::div(a, b), fixed::div(b, a));
        if (PWM_RATIO_LOW..=PWM_RATIO_HIGH).contains(&ratio) {
            return (Encoding::Pwm, 85);
        }
    }
    (Encoding::Nrz, 50)
}

fn timing(clusters: &[SymbolCluster], pulses: &[Pulse]) -> (u32, u32, u8) {
    let Some(min_cluster) = clusters.iter().map(|c| c.center_us).min() else {
        return (0, 0, 30);
    };
    let baud = if min_cluster == 0 { 0 } else { 1_000_000 / min_cluster };

    let mut w = Welford::new();
    for p in pulses {
        w.add(fixed::from_int(p.width_us as i32));
    }
    let mean = fixed::max(w.mean, 1);
    let std_dev = w.std_dev();
    let confidence = if std_dev < fixed::div(mean, fixed::from_int(10)) {
        90
    } else if std_dev < fixed::div(mean, fixed::from_int(5)) {
        70
    } else {
        50
    };
    (min_cluster, baud, confidence)
}

fn preamble_length_bits(frames: &[([u8; 64], usize, u32)]) -> u32 {
    if frames.len() < 2 {
        return 0;
    }
    let shortest = frames.iter().map(|(_, len, _)| *len).min().unwrap_or(0);
    let mut prefix_bytes = 0usize;
    'outer: for i in 0..shortest {
        let byte = frames[0].0[i];
        for (data, _, _) in frames.iter().skip(1) {
            if data[i] != byte {
                break 'outer;
            }
        }
        prefix_bytes += 1;
    }
    (prefix_bytes * 8) as u32
}

fn frame_structure(frames: &[([u8; 64], usize, u32)], preamble_bits: u32) -> (u32, u32, u8) {
    if frames.is_empty() {
        return (0, 0, 30);
    }
    let sum_len: i32 = frames.iter().map(|(_, len, _)| *len as i32).sum();
    let avg_len = fixed::div(fixed::from_int(sum_len), fixed::from_int(frames.len() as i32));
    let checksum_bits = if avg_len > fixed::from_int(4) { 16 } else { 8 };
    let preamble_bytes = fixed::from_int((preamble_bits / 8) as i32);
    let checksum_bytes = fixed::from_int((checksum_bits / 8) as i32);
    let payload_bytes = fixed::max(fixed::sub(fixed::sub(avg_len, preamble_bytes), checksum_bytes), 0);
    let confidence = if frames.len() >= 5 { 85 } else { 60 };
    let payload_bits = fixed::to_int(fixed::mul(payload_bytes, fixed::from_int(8))).max(0) as u32;
    (payload_bits, checksum_bits, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ook_pulses() -> Vec<Pulse> {
        let mut v = Vec::new();
        for i in 0..30u32 {
            v.push(Pulse::new((i % 2) as u8, if i % 2 == 0 { 1200 } else { 300 }, i * 1500));
        }
        v
    }

    #[test]
    fn ook_detected_for_mostly_long_pulses() {
        let mut engine = ProtocolInferenceEngine::new();
        for p in ook_pulses() {
            engine.on_pulse(p);
        }
        engine.analyze();
        let hyp = engine.snapshot_hypothesis();
        assert_eq!(hyp.modulation, Modulation::Ook);
        assert!(hyp.modulation_confidence >= 50);
    }

    #[test]
    fn manchester_detected_for_near_half_transition_rate() {
        let mut engine = ProtocolInferenceEngine::new();
        // Alternate every pulse -> transition rate ~1.0, too high; instead
        // alternate every other pulse to land near 0.5.
        let mut level = 0u8;
        for i in 0..40u32 {
            if i % 2 == 0 {
                level ^= 1;
            }
            engine.on_pulse(Pulse::new(level, 400, i * 400));
        }
        engine.analyze();
        let hyp = engine.snapshot_hypothesis();
        assert_eq!(hyp.encoding, Encoding::Manchester);
    }

    #[test]
    fn overall_confidence_is_mean_of_four_axes() {
        let mut engine = ProtocolInferenceEngine::new();
        for p in ook_pulses() {
            engine.on_pulse(p);
        }
        for _ in 0..3 {
            engine.on_frame(&Frame::new(0, 800, -40, 433_920_000, &[1, 2, 3, 4], 0, 4));
        }
        engine.analyze();
        let hyp = engine.snapshot_hypothesis();
        let expected = (hyp.modulation_confidence as u32
            + hyp.encoding_confidence as u32
            + hyp.timing_confidence as u32
            + hyp.frame_structure_confidence as u32)
            / 4;
        assert_eq!(hyp.overall_confidence as u32, expected);
    }

    #[test]
    fn preamble_is_longest_common_byte_prefix() {
        let frames = vec![
            ([0xAAu8, 0xBB, 0x01, 0x00, 0, 0, 0, 0].into_iter().chain(std::iter::repeat(0)).take(64).collect::<Vec<_>>(), 4, 800u32),
            ([0xAAu8, 0xBB, 0x02, 0x00, 0, 0, 0, 0].into_iter().chain(std::iter::repeat(0)).take(64).collect::<Vec<_>>(), 4, 800u32),
        ];
        let framed: Vec<([u8; 64], usize, u32)> = frames
            .into_iter()
            .map(|(v, len, dur)| {
                let mut arr = [0u8; 64];
                arr.copy_from_slice(&v);
                (arr, len, dur)
            })
            .collect();
        assert_eq!(preamble_length_bits(&framed), 16);
    }

    #[test]
    fn below_thresholds_leaves_hypothesis_untouched() {
        let mut engine = ProtocolInferenceEngine::new();
        engine.on_pulse(Pulse::new(1, 100, 0));
        engine.analyze();
        let hyp = engine.snapshot_hypothesis();
        assert_eq!(hyp.modulation, Modulation::Unknown);
    }
}
