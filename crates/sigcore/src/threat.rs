//! Threat model (C7): entropy, static-bit masking, CRC-fit search over a
//! built-in polynomial table, rolling-code/replay heuristics, and
//! composite scoring.

use crate::crc::{self, CrcSpec};
use crate::stats::shannon_entropy;
use crate::types::{Frame, CRC_POLY_CAPACITY, ENTROPY_HISTORY_SIZE, MAX_FRAME_DATA, PAYLOAD_RING_CAPACITY, REPLAY_INDEX_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ThreatLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThreatAssessment {
    pub level: ThreatLevel,
    pub vulnerability_score: u32,
    pub entropy_bits_x1000: u32, // entropy in bits/byte, fixed-point x1000 for integer storage
    pub has_checksum: bool,
    pub has_rolling_code: bool,
    pub is_static: bool,
    pub static_ratio: u8,
}

#[derive(Debug, Clone, Copy)]
struct CrcFit {
    spec: CrcSpec,
    position_from_end: usize,
}

#[derive(Default)]
struct Payload {
    data: [u8; MAX_FRAME_DATA],
    len: usize,
}

#[derive(Default)]
pub struct ThreatEngine {
    analyzing: bool,
    payloads: Vec<Payload>, // bounded to PAYLOAD_RING_CAPACITY below
    freq: [u32; 256],
    static_mask: Vec<bool>,
    crc_fit: Option<CrcFit>,
    replay_indices: Vec<usize>,
    exact_replay_detected: bool,
    assessment: ThreatAssessment,
}

impl ThreatEngine {
    pub fn new() -> Self {
        Self {
            payloads: Vec::with_capacity(PAYLOAD_RING_CAPACITY),
            replay_indices: Vec::with_capacity(REPLAY_INDEX_CAPACITY),
            ..Self::default()
        }
    }

    pub fn start_analysis(&mut self) {
        self.analyzing = true;
        self.payloads.clear();
        self.freq = [0; 256];
        self.static_mask.clear();
        self.crc_fit = None;
        self.replay_indices.clear();
        self.exact_replay_detected = false;
        self.assessment = ThreatAssessment::default();
    }

    pub fn stop_analysis(&mut self) {
        self.analyzing = false;
    }

    pub fn on_frame(&mut self, frame: &Frame) {
        if !self.analyzing {
            return;
        }
        if self.payloads.len() >= PAYLOAD_RING_CAPACITY {
            log::warn!("threat engine payload ring at capacity ({PAYLOAD_RING_CAPACITY}), dropping frame");
            return;
        }
        let payload = frame.payload();
        for &b in payload {
            self.freq[b as usize] += 1;
        }

        if self.static_mask.is_empty() {
            self.static_mask = vec![true; payload.len() * 8];
        } else if !self.payloads.is_empty() {
            let first = &self.payloads[0];
            let bits = self.static_mask.len();
            for bit in 0..bits {
                let byte_idx = bit / 8;
                let bit_idx = 7 - (bit % 8);
                if byte_idx >= payload.len() || byte_idx >= first.len {
                    self.static_mask[bit] = false;
                    continue;
                }
                let a = (first.data[byte_idx] >> bit_idx) & 1;
                let b = (payload[byte_idx] >> bit_idx) & 1;
                if a != b {
                    self.static_mask[bit] = false;
                }
            }
        }

        for (idx, existing) in self.payloads.iter().enumerate() {
            if existing.len == payload.len() && existing.data[..existing.len] == *payload {
                if self.replay_indices.len() < REPLAY_INDEX_CAPACITY {
                    self.replay_indices.push(idx);
                }
                self.exact_replay_detected = true;
            }
        }

        let mut stored = Payload::default();
        let n = payload.len().min(MAX_FRAME_DATA);
        stored.data[..n].copy_from_slice(&payload[..n]);
        stored.len = n;
        self.payloads.push(stored);
    }

    fn entropy_bits(&self) -> i32 {
        shannon_entropy(&self.freq)
    }

    fn static_ratio(&self) -> u8 {
        if self.static_mask.is_empty() {
            return 0;
        }
        let set = self.static_mask.iter().filter(|&&b| b).count();
        ((set * 100) / self.static_mask.len()) as u8
    }

    fn preamble(&self) -> Vec<u8> {
        if self.payloads.len() < 2 {
            return Vec::new();
        }
        let max_len = 4.min(self.payloads.iter().map(|p| p.len).min().unwrap_or(0));
        let mut prefix = Vec::new();
        'outer: for i in 0..max_len {
            let byte = self.payloads[0].data[i];
            for p in &self.payloads[1..] {
                if p.data[i] != byte {
                    break 'outer;
                }
            }
            prefix.push(byte);
        }
        prefix
    }

    /// Try each built-in polynomial against every CRC end-position from
    /// `len-crc_width` (the CRC sits flush against the end of the frame)
    /// out to `len-4`; declare a fit once `> 80%` of frames match. The
    /// search must start at the CRC's own width, not a fixed `2`, or a
    /// trailing single-byte CRC-8 can never be found.
    fn crc_fit(&self) -> Option<CrcFit> {
        if self.payloads.is_empty() {
            return None;
        }
        for spec in crc::POLY_TABLE.iter().take(CRC_POLY_CAPACITY) {
            let crc_width_bytes = (spec.width as usize) / 8;
            if crc_width_bytes == 0 || crc_width_bytes > 4 {
                continue;
            }
            for position_from_end in crc_width_bytes..=4usize {
                let mut matches = 0usize;
                let mut eligible = 0usize;
                for p in &self.payloads {
                    let len = p.len;
                    if len < position_from_end {
                        continue;
                    }
                    eligible += 1;
                    let crc_start = len - position_from_end;
                    let crc_end = crc_start + crc_width_bytes;
                    if crc_end > len {
                        continue;
                    }
                    let body = &p.data[..crc_start];
                    let stored = read_be(&p.data[crc_start..crc_end]);
                    if crc::compute(spec, body) == stored {
                        matches += 1;
                    }
                }
                if eligible > 0 && matches * 100 > eligible * 80 {
                    return Some(CrcFit { spec: *spec, position_from_end });
                }
            }
        }
        None
    }

    /// For each byte position, extract a `u32` window across frames and
    /// reject trivially sequential or single-period-repeating series.
    fn rolling_code_positions(&self) -> Vec<usize> {
        if self.payloads.len() < ENTROPY_HISTORY_SIZE {
            return Vec::new();
        }
        let min_len = self.payloads.iter().map(|p| p.len).min().unwrap_or(0);
        let mut positions = Vec::new();
        for pos in 0..min_len {
            let series: Vec<u8> = self.payloads.iter().map(|p| p.data[pos]).collect();
            if is_sequential(&series) || is_single_period_repeating(&series) {
                continue;
            }
            positions.push(pos);
        }
        positions
    }

    /// Run the full analysis pipeline over accumulated frames.
    pub fn assess(&mut self) -> ThreatAssessment {
        if self.payloads.is_empty() {
            self.assessment = ThreatAssessment::default();
            return self.assessment.clone();
        }

        let entropy = self.entropy_bits();
        let static_ratio = self.static_ratio();
        let crc_fit = self.crc_fit();
        self.crc_fit = crc_fit;
        let rolling_positions = self.rolling_code_positions();

        let four = crate::fixed::from_int(4);
        let mut score: i64 = 0;
        if entropy < four {
            let deficit = crate::fixed::sub(four, entropy);
            score += crate::fixed::to_int(crate::fixed::mul(deficit, crate::fixed::from_int(75))) as i64;
        }
        score += (static_ratio as i64 * 25) / 10;
        let has_checksum = crc_fit.is_some();
        if !has_checksum {
            score += 200;
        }
        let has_rolling_code = !rolling_positions.is_empty();
        if !has_rolling_code {
            score += 150;
        }
        if self.exact_replay_detected {
            score += 100;
        }
        let vulnerability_score = score.clamp(0, 1000) as u32;

        let level = match vulnerability_score {
            900..=1000 => ThreatLevel::Critical,
            700..=899 => ThreatLevel::High,
            400..=699 => ThreatLevel::Medium,
            _ => ThreatLevel::Low,
        };

        let assessment = ThreatAssessment {
            level,
            vulnerability_score,
            entropy_bits_x1000: entropy_bits_x1000(entropy),
            has_checksum,
            has_rolling_code,
            is_static: static_ratio == 100,
            static_ratio,
        };
        if matches!(assessment.level, ThreatLevel::High | ThreatLevel::Critical) {
            log::warn!(
                "threat assessment: level={} score={} over {} frames",
                assessment.level.as_str(),
                assessment.vulnerability_score,
                self.payloads.len()
            );
        } else {
            log::trace!("threat assessment: level={} score={}", assessment.level.as_str(), assessment.vulnerability_score);
        }
        self.assessment = assessment.clone();
        assessment
    }

    pub fn snapshot_assessment(&self) -> ThreatAssessment {
        self.assessment.clone()
    }

    /// Render a short human-readable report into `buf`, truncated to
    /// `max` bytes (UTF-8 boundary safe).
    pub fn report_text(&self, max: usize) -> String {
        let a = &self.assessment;
        let text = format!(
            "level={} score={} entropy={:.2} checksum={} rolling={} static={}%",
            a.level.as_str(),
            a.vulnerability_score,
            a.entropy_bits_x1000 as f64 / 1000.0,
            a.has_checksum,
            a.has_rolling_code,
            a.static_ratio
        );
        truncate_utf8(&text, max)
    }

    pub fn preamble_snapshot(&self) -> Vec<u8> {
        self.preamble()
    }

    pub fn replay_indices(&self) -> &[usize] {
        &self.replay_indices
    }
}

fn truncate_utf8(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// `entropy` (Q15.16 bits/byte) scaled to an integer `bits * 1000`, clamped
/// to non-negative.
fn entropy_bits_x1000(entropy: i32) -> u32 {
    let scaled = crate::fixed::mul(crate::fixed::max(entropy, 0), crate::fixed::from_int(1000));
    crate::fixed::to_int(scaled).max(0) as u32
}

fn read_be(bytes: &[u8]) -> u32 {
    let mut v = 0u32;
    for &b in bytes {
        v = (v << 8) | b as u32;
    }
    v
}

fn is_sequential(series: &[u8]) -> bool {
    series.windows(2).all(|w| w[1] == w[0].wrapping_add(1))
}

fn is_single_period_repeating(series: &[u8]) -> bool {
    for period in 1..series.len() {
        if series.len() % period != 0 {
            continue;
        }
        if series.chunks(period).all(|c| c == &series[..period]) {
            return true;
        }
    }
    false
}

/// Single-frame quick-assess path: entropy over that one payload, an
/// all-same-byte detector, and a three-band classification.
pub fn quick_assess(payload: &[u8]) -> ThreatAssessment {
    let mut freq = [0u32; 256];
    for &b in payload {
        freq[b as usize] += 1;
    }
    let entropy = shannon_entropy(&freq);
    let uniform = !payload.is_empty() && payload.iter().all(|&b| b == payload[0]);

    let (level, score) = if entropy < crate::fixed::from_int(2) || uniform {
        (ThreatLevel::High, 700)
    } else if entropy < crate::fixed::from_int(4) {
        (ThreatLevel::Medium, 400)
    } else {
        (ThreatLevel::Low, 200)
    };

    ThreatAssessment {
        level,
        vulnerability_score: score,
        entropy_bits_x1000: entropy_bits_x1000(entropy),
        has_checksum: false,
        has_rolling_code: false,
        is_static: uniform,
        static_ratio: if uniform { 100 } else { 0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(data: &[u8]) -> Frame {
        Frame::new(0, 800, -50, 433_920_000, data, 0, 0)
    }

    #[test]
    fn identical_frames_score_critical() {
        let mut engine = ThreatEngine::new();
        engine.start_analysis();
        for _ in 0..256 {
            engine.on_frame(&frame_with(&[0x42, 0x42, 0x42, 0x42]));
        }
        let assessment = engine.assess();
        assert_eq!(assessment.static_ratio, 100);
        assert!(!assessment.has_checksum);
        assert_eq!(assessment.level, ThreatLevel::Critical);
        assert!(assessment.vulnerability_score >= 900);
    }

    #[test]
    fn vulnerability_score_is_bounded_and_level_agrees() {
        let mut engine = ThreatEngine::new();
        engine.start_analysis();
        for i in 0..50u8 {
            engine.on_frame(&frame_with(&[i, i.wrapping_mul(7), 0xAB, 0xCD]));
        }
        let a = engine.assess();
        assert!(a.vulnerability_score <= 1000);
        let expected_level = match a.vulnerability_score {
            900..=1000 => ThreatLevel::Critical,
            700..=899 => ThreatLevel::High,
            400..=699 => ThreatLevel::Medium,
            _ => ThreatLevel::Low,
        };
        assert_eq!(a.level, expected_level);
    }

    #[test]
    fn replay_detected_for_repeated_frame() {
        let mut engine = ThreatEngine::new();
        engine.start_analysis();
        engine.on_frame(&frame_with(&[1, 2, 3]));
        engine.on_frame(&frame_with(&[4, 5, 6]));
        engine.on_frame(&frame_with(&[1, 2, 3]));
        let _ = engine.assess();
        assert!(!engine.replay_indices().is_empty());
    }

    #[test]
    fn quick_assess_uniform_payload_is_high() {
        let a = quick_assess(&[0x11; 16]);
        assert_eq!(a.level, ThreatLevel::High);
    }

    #[test]
    fn quick_assess_high_entropy_is_low() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let a = quick_assess(&payload);
        assert_eq!(a.level, ThreatLevel::Low);
    }

    #[test]
    fn crc_fit_finds_embedded_crc8() {
        let mut engine = ThreatEngine::new();
        engine.start_analysis();
        for i in 0..20u8 {
            let mut body = vec![i, i.wrapping_mul(3), 0xAA];
            let crc = crc::compute(&crc::CRC8, &body) as u8;
            body.push(crc);
            engine.on_frame(&frame_with(&body));
        }
        let _ = engine.assess();
        assert!(engine.crc_fit.is_some());
    }

    #[test]
    fn sequential_series_is_not_rolling_code() {
        let series: Vec<u8> = (0..150u8).map(|i| i.wrapping_mul(1)).collect();
        assert!(is_sequential(&series[..10]));
    }
}
