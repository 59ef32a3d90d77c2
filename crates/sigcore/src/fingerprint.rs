//! Fingerprinting engine (C5): per-device physical-layer fingerprints,
//! weighted similarity, a fixed-capacity device table, and temporal drift
//! tracking.

use crate::crc::crc16_ccitt;
use crate::error::{CoreError, CoreResult};
use crate::fixed;
use crate::stats::Welford;
use crate::types::{
    Frame, Ring, DEVICE_NAME_CAPACITY, DEVICE_TABLE_CAPACITY, FINGERPRINT_RING_CAPACITY,
    FINGERPRINT_SAMPLE_TARGET, RSSI_SAMPLE_RING_CAPACITY, RSSI_SIGNATURE_LEN, TEMPORAL_HISTORY_LEN,
    TEMPORAL_RECORD_CAPACITY,
};

/// Byte length of the fixed-size portion of a persisted fingerprint
/// record, before the null-terminated device name: `drift_mean u32 LE,
/// drift_variance u32 LE, rise_time_avg u16 LE, fall_time_avg u16 LE,
/// clock_stability_ppm u8, rssi_signature[16], unique_hash u16 LE`.
pub const FINGERPRINT_RECORD_LEN: usize = 4 + 4 + 2 + 2 + 1 + RSSI_SIGNATURE_LEN + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    Sampling,
    Analyzing,
    Matching,
    Learning,
}

/// Compact physical-layer fingerprint record. `unique_hash` is computed
/// last, over every other field; writing any other field invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RfFingerprint {
    pub drift_mean: i32,
    pub drift_variance: i32,
    pub rise_time_avg: i32,
    pub fall_time_avg: i32,
    pub clock_stability_ppm: u8,
    pub rssi_signature: [u8; RSSI_SIGNATURE_LEN],
    pub unique_hash: u16,
}

impl Default for RfFingerprint {
    fn default() -> Self {
        Self {
            drift_mean: 0,
            drift_variance: 0,
            rise_time_avg: 0,
            fall_time_avg: 0,
            clock_stability_ppm: 0,
            rssi_signature: [0; RSSI_SIGNATURE_LEN],
            unique_hash: 0,
        }
    }
}

/// `rise_time_avg`/`fall_time_avg` are Q15.16 fixed-point; the persisted
/// record stores them as a plain `i16`, so narrowing converts to an
/// integer first rather than truncating the fixed-point bit pattern,
/// which would drop the whole-unit part and keep only the fraction.
fn narrow_slope(v: i32) -> i16 {
    fixed::to_int(v).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn widen_slope(v: i16) -> i32 {
    fixed::from_int(v as i32)
}

impl RfFingerprint {
    /// Serialize every field except `unique_hash`, in the same layout as
    /// the persisted record — `rise_time_avg`/`fall_time_avg` narrowed to
    /// `u16` LE — so a reader hashing the on-disk image reproduces this
    /// hash exactly.
    fn hashable_bytes(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(4 + 4 + 2 + 2 + 1 + RSSI_SIGNATURE_LEN);
        v.extend_from_slice(&(self.drift_mean as u32).to_le_bytes());
        v.extend_from_slice(&(self.drift_variance as u32).to_le_bytes());
        v.extend_from_slice(&(narrow_slope(self.rise_time_avg) as u16).to_le_bytes());
        v.extend_from_slice(&(narrow_slope(self.fall_time_avg) as u16).to_le_bytes());
        v.push(self.clock_stability_ppm);
        v.extend_from_slice(&self.rssi_signature);
        v
    }

    /// Recompute `unique_hash` from the current field values.
    pub fn finalize_hash(&mut self) {
        self.unique_hash = crc16_ccitt(&self.hashable_bytes());
    }

    pub fn hash_is_valid(&self) -> bool {
        crc16_ccitt(&self.hashable_bytes()) == self.unique_hash
    }

    /// Serialize into the persisted record layout: the fixed fields in
    /// declaration order, little-endian, followed by `name` as UTF-8 and a
    /// null terminator.
    pub fn to_record_bytes(&self, name: &str) -> CoreResult<Vec<u8>> {
        if name.len() > DEVICE_NAME_CAPACITY {
            return Err(CoreError::NameTooLong { max: DEVICE_NAME_CAPACITY });
        }
        let mut buf = Vec::with_capacity(FINGERPRINT_RECORD_LEN + name.len() + 1);
        buf.extend_from_slice(&(self.drift_mean as u32).to_le_bytes());
        buf.extend_from_slice(&(self.drift_variance as u32).to_le_bytes());
        buf.extend_from_slice(&(narrow_slope(self.rise_time_avg) as u16).to_le_bytes());
        buf.extend_from_slice(&(narrow_slope(self.fall_time_avg) as u16).to_le_bytes());
        buf.push(self.clock_stability_ppm);
        buf.extend_from_slice(&self.rssi_signature);
        buf.extend_from_slice(&self.unique_hash.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        Ok(buf)
    }

    /// Parse a persisted record back into a fingerprint and its device
    /// name. `rise_time_avg`/`fall_time_avg` are recovered by sign-extending
    /// the stored `u16`, matching the truncation `to_record_bytes` applies.
    pub fn from_record_bytes(bytes: &[u8]) -> CoreResult<(Self, String)> {
        if bytes.len() < FINGERPRINT_RECORD_LEN + 1 {
            return Err(CoreError::TruncatedRecord { need: FINGERPRINT_RECORD_LEN + 1, got: bytes.len() });
        }
        let drift_mean = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as i32;
        let drift_variance = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as i32;
        let rise_time_avg = widen_slope(u16::from_le_bytes(bytes[8..10].try_into().unwrap()) as i16);
        let fall_time_avg = widen_slope(u16::from_le_bytes(bytes[10..12].try_into().unwrap()) as i16);
        let clock_stability_ppm = bytes[12];
        let mut rssi_signature = [0u8; RSSI_SIGNATURE_LEN];
        let rssi_start = 13;
        rssi_signature.copy_from_slice(&bytes[rssi_start..rssi_start + RSSI_SIGNATURE_LEN]);
        let hash_start = rssi_start + RSSI_SIGNATURE_LEN;
        let unique_hash = u16::from_le_bytes(bytes[hash_start..hash_start + 2].try_into().unwrap());

        let name_bytes = &bytes[FINGERPRINT_RECORD_LEN..];
        let nul = name_bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or(CoreError::TruncatedRecord { need: FINGERPRINT_RECORD_LEN + 1, got: bytes.len() })?;
        if nul > DEVICE_NAME_CAPACITY {
            return Err(CoreError::NameTooLong { max: DEVICE_NAME_CAPACITY });
        }
        let name = core::str::from_utf8(&name_bytes[..nul]).unwrap_or("").to_string();

        Ok((
            Self {
                drift_mean,
                drift_variance,
                rise_time_avg,
                fall_time_avg,
                clock_stability_ppm,
                rssi_signature,
                unique_hash,
            },
            name,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceBand {
    None,
    Low,
    Medium,
    High,
}

pub fn confidence_band(confidence: u8) -> ConfidenceBand {
    match confidence {
        90..=100 => ConfidenceBand::High,
        70..=89 => ConfidenceBand::Medium,
        50..=69 => ConfidenceBand::Low,
        _ => ConfidenceBand::None,
    }
}

/// Weighted similarity: drift 30%, slopes 25%, clock 20%, RSSI 25%.
/// Returns a confidence percentage in `[0, 100]`.
pub fn similarity(a: &RfFingerprint, b: &RfFingerprint) -> u8 {
    let drift_d = (a.drift_mean - b.drift_mean).unsigned_abs().min(2_560_000) as i64 * 10000 / 2_560_000;
    let slope_sum = (a.rise_time_avg - b.rise_time_avg).unsigned_abs() as i64
        + (a.fall_time_avg - b.fall_time_avg).unsigned_abs() as i64;
    let slope_d = (slope_sum / 2).min(655_360) * 10000 / 655_360;
    let clock_d = (a.clock_stability_ppm as i32 - b.clock_stability_ppm as i32).unsigned_abs() as i64 * 10000 / 255;
    let rssi_sum: i64 = a
        .rssi_signature
        .iter()
        .zip(b.rssi_signature.iter())
        .map(|(&x, &y)| (x as i64 - y as i64).unsigned_abs())
        .sum();
    let rssi_d = rssi_sum.min(16 * 255) * 10000 / (16 * 255);

    let d = (drift_d * 30 + slope_d * 25 + clock_d * 20 + rssi_d * 25) / 100;
    let confidence = 100i64 - (100 * d) / 10000;
    confidence.clamp(0, 100) as u8
}

#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub fingerprint: RfFingerprint,
    pub name: [u8; DEVICE_NAME_CAPACITY],
    pub name_len: usize,
    pub first_seen: u32,
    pub last_seen: u32,
    pub match_count: u32,
}

impl DeviceEntry {
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }
}

/// Fixed-capacity map from synthetic device id to `DeviceEntry`.
/// Insertion order is preserved; `delete` clears a slot without
/// renumbering the others.
#[derive(Debug, Clone)]
pub struct DeviceTable {
    entries: Vec<Option<DeviceEntry>>,
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self { entries: Vec::with_capacity(DEVICE_TABLE_CAPACITY) }
    }
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a new device. Reuses a deleted slot if one exists so the
    /// table never grows past capacity while churning; otherwise appends.
    /// This is a direct, one-shot control call (unlike frame/pulse
    /// ingest), so a full table is reported as `CoreError::CapacityExceeded`
    /// rather than silently dropped.
    pub fn insert(&mut self, fingerprint: RfFingerprint, name: &str, now: u32) -> CoreResult<u16> {
        let mut name_buf = [0u8; DEVICE_NAME_CAPACITY];
        let bytes = name.as_bytes();
        let n = bytes.len().min(DEVICE_NAME_CAPACITY);
        name_buf[..n].copy_from_slice(&bytes[..n]);
        let entry =
            DeviceEntry { fingerprint, name: name_buf, name_len: n, first_seen: now, last_seen: now, match_count: 0 };

        if let Some(slot) = self.entries.iter().position(|e| e.is_none()) {
            self.entries[slot] = Some(entry);
            return Ok(slot as u16);
        }
        if self.entries.len() >= DEVICE_TABLE_CAPACITY {
            log::warn!("device table at capacity ({DEVICE_TABLE_CAPACITY}), dropping insert for \"{name}\"");
            return Err(CoreError::CapacityExceeded { capacity: DEVICE_TABLE_CAPACITY });
        }
        self.entries.push(Some(entry));
        Ok((self.entries.len() - 1) as u16)
    }

    pub fn get(&self, id: u16) -> Option<&DeviceEntry> {
        self.entries.get(id as usize).and_then(|e| e.as_ref())
    }

    pub fn get_checked(&self, id: u16) -> CoreResult<&DeviceEntry> {
        self.get(id).ok_or(CoreError::UnknownDevice(id))
    }

    pub fn delete(&mut self, id: u16) -> bool {
        match self.entries.get_mut(id as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &DeviceEntry)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| e.as_ref().map(|e| (i as u16, e)))
    }

    fn record_match(&mut self, id: u16, now: u32) {
        if let Some(Some(entry)) = self.entries.get_mut(id as usize) {
            entry.last_seen = now;
            entry.match_count += 1;
        }
    }
}

/// Per-device history of recent fingerprints, used to detect drift from a
/// learned baseline.
#[derive(Debug, Clone)]
pub struct TemporalRecord {
    pub device_id: u16,
    pub baseline_fingerprint: RfFingerprint,
    pub history: Ring<RfFingerprint, TEMPORAL_HISTORY_LEN>,
    pub first_seen: u32,
    pub last_seen: u32,
    pub match_count: u32,
    pub drift_detected: bool,
    pub drift_magnitude: u8,
}

/// Drift is flagged once a fingerprint's distance from its baseline
/// exceeds 20% of the normalization constant (the similarity scale is
/// already normalized to `[0, 100]`, so that constant is 100).
const DRIFT_THRESHOLD_PERCENT: i64 = 20;

/// Inverse of `similarity`, on the same `0..100` scale.
fn distance(a: &RfFingerprint, b: &RfFingerprint) -> i64 {
    100 - similarity(a, b) as i64
}

/// Fingerprint acquisition + matching state machine.
pub struct FingerprintEngine {
    pub state: State,
    frames_captured: u32,
    last_timestamp: Option<u32>,
    intervals: Ring<i32, FINGERPRINT_RING_CAPACITY>,
    symbol_timings: Ring<i32, FINGERPRINT_RING_CAPACITY>,
    rssi_envelope: [u8; RSSI_SIGNATURE_LEN],
    rssi_samples: Ring<i32, RSSI_SAMPLE_RING_CAPACITY>,
    current: RfFingerprint,
    pub device_table: DeviceTable,
    temporal: Vec<Option<TemporalRecord>>,
}

impl Default for FingerprintEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintEngine {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            frames_captured: 0,
            last_timestamp: None,
            intervals: Ring::new(),
            symbol_timings: Ring::new(),
            rssi_envelope: [0; RSSI_SIGNATURE_LEN],
            rssi_samples: Ring::new(),
            current: RfFingerprint::default(),
            device_table: DeviceTable::new(),
            temporal: (0..TEMPORAL_RECORD_CAPACITY).map(|_| None).collect(),
        }
    }

    pub fn start(&mut self) {
        log::debug!("fingerprint engine: Idle -> Sampling");
        self.state = State::Sampling;
        self.frames_captured = 0;
        self.last_timestamp = None;
        self.intervals.clear();
        self.symbol_timings.clear();
        self.rssi_envelope = [0; RSSI_SIGNATURE_LEN];
        self.rssi_samples.clear();
    }

    pub fn stop(&mut self) {
        if self.state == State::Sampling {
            self.analyze();
        } else {
            self.state = State::Idle;
        }
    }

    /// Progress through sampling, `0..100`.
    pub fn snapshot_progress(&self) -> u8 {
        match self.state {
            State::Idle => 0,
            State::Sampling => {
                ((self.frames_captured as u64 * 100) / FINGERPRINT_SAMPLE_TARGET as u64).min(99) as u8
            }
            _ => 100,
        }
    }

    pub fn snapshot_fingerprint(&self) -> RfFingerprint {
        self.current
    }

    pub fn on_frame(&mut self, frame: &Frame) {
        if self.state != State::Sampling {
            return;
        }
        if let Some(last) = self.last_timestamp {
            let interval = frame.timestamp_us.wrapping_sub(last) as i32;
            self.intervals.push(fixed::from_int(interval));
        }
        self.last_timestamp = Some(frame.timestamp_us);

        if frame.length > 0 {
            let symbol_period = fixed::div(fixed::from_int(frame.duration_us as i32), fixed::from_int(frame.length as i32));
            self.symbol_timings.push(symbol_period);
        }

        let slot = (self.frames_captured % RSSI_SIGNATURE_LEN as u32) as usize;
        self.rssi_envelope[slot] = (frame.rssi_dbm as i32 + 128).clamp(0, 255) as u8;

        self.frames_captured += 1;
        if self.frames_captured >= FINGERPRINT_SAMPLE_TARGET {
            self.analyze();
        }
    }

    pub fn on_rssi_sample(&mut self, rssi_u8: u8, _timestamp_us: u32) {
        if self.state != State::Sampling {
            return;
        }
        self.rssi_samples.push(fixed::from_int(rssi_u8 as i32));
    }

    /// Sampling -> Analyzing transition: batch-compute every fingerprint
    /// field, then hash it.
    fn analyze(&mut self) {
        log::debug!("fingerprint engine: Sampling -> Analyzing ({} frames captured)", self.frames_captured);
        self.state = State::Analyzing;

        let mut w = Welford::new();
        for v in self.intervals.iter() {
            w.add(v);
        }
        let drift_mean = w.mean;
        let drift_variance = w.variance();

        let samples: Vec<i32> = self.rssi_samples.iter().collect();
        let (rise_time_avg, fall_time_avg) = mean_slopes(&samples);

        let clock_stability_ppm = clock_stability(&self.symbol_timings.iter().collect::<Vec<_>>());

        let mut fp = RfFingerprint {
            drift_mean,
            drift_variance,
            rise_time_avg,
            fall_time_avg,
            clock_stability_ppm,
            rssi_signature: self.rssi_envelope,
            unique_hash: 0,
        };
        fp.finalize_hash();
        self.current = fp;
        self.state = State::Matching;
    }

    /// Scan the device table for the best match. On a match at or above
    /// `Low`, update (or create) the device's temporal record.
    pub fn find_match(&mut self, fp: &RfFingerprint, now: u32) -> (u8, Option<u16>) {
        let mut best_confidence = 0u8;
        let mut best_id = None;
        for (id, entry) in self.device_table.iter() {
            let c = similarity(fp, &entry.fingerprint);
            if c > best_confidence {
                best_confidence = c;
                best_id = Some(id);
            }
        }

        if let Some(id) = best_id {
            if confidence_band(best_confidence) != ConfidenceBand::None {
                self.device_table.record_match(id, now);
                self.update_temporal(id, fp, now);
            }
        }
        (best_confidence, best_id)
    }

    fn update_temporal(&mut self, id: u16, fp: &RfFingerprint, now: u32) {
        let idx = id as usize;
        if idx >= self.temporal.len() {
            return;
        }
        let slot = &mut self.temporal[idx];
        if slot.is_none() {
            *slot = Some(TemporalRecord {
                device_id: id,
                baseline_fingerprint: *fp,
                history: Ring::new(),
                first_seen: now,
                last_seen: now,
                match_count: 0,
                drift_detected: false,
                drift_magnitude: 0,
            });
        }
        if let Some(record) = slot {
            record.history.push(*fp);
            record.last_seen = now;
            record.match_count += 1;
            let magnitude_percent = distance(&record.baseline_fingerprint, fp).clamp(0, 100);
            record.drift_magnitude = magnitude_percent as u8;
            record.drift_detected = magnitude_percent >= DRIFT_THRESHOLD_PERCENT;
        }
    }

    pub fn temporal_record(&self, id: u16) -> Option<&TemporalRecord> {
        self.temporal.get(id as usize).and_then(|t| t.as_ref())
    }

    /// Given a claimed device name, check the fingerprint against that
    /// device's record and against the best non-claimed match. If some
    /// other device matches better than the claimed one, this indicates
    /// forgery and returns confidence `0`; otherwise returns the claimed
    /// confidence.
    pub fn counterfeit_check(&self, fp: &RfFingerprint, claimed_device_name: &str) -> u8 {
        let mut claimed_confidence = 0u8;
        let mut best_other = 0u8;
        for (_, entry) in self.device_table.iter() {
            let c = similarity(fp, &entry.fingerprint);
            if entry.name_str() == claimed_device_name {
                claimed_confidence = claimed_confidence.max(c);
            } else if c > best_other {
                best_other = c;
            }
        }
        if best_other > claimed_confidence {
            log::warn!(
                "counterfeit check failed for claimed device \"{claimed_device_name}\": \
                 a different device matches better ({best_other} > {claimed_confidence})"
            );
            0
        } else {
            claimed_confidence
        }
    }
}

/// Mean positive and negative first differences of a sample sequence.
fn mean_slopes(samples: &[i32]) -> (i32, i32) {
    if samples.len() < 2 {
        return (0, 0);
    }
    let mut rise_sum = 0i64;
    let mut rise_n = 0i64;
    let mut fall_sum = 0i64;
    let mut fall_n = 0i64;
    for w in samples.windows(2) {
        let d = w[1] - w[0];
        if d > 0 {
            rise_sum += d as i64;
            rise_n += 1;
        } else if d < 0 {
            fall_sum += d as i64;
            fall_n += 1;
        }
    }
    let rise = if rise_n > 0 { (rise_sum / rise_n) as i32 } else { 0 };
    let fall = if fall_n > 0 { (fall_sum / fall_n) as i32 } else { 0 };
    (rise, fall)
}

/// `std_dev(symbol_timings) * 1_000_000 / mean(symbol_timings)`, clamped
/// to `[0, 255]`.
fn clock_stability(timings: &[i32]) -> u8 {
    if timings.is_empty() {
        return 0;
    }
    let mut w = Welford::new();
    for &t in timings {
        w.add(t);
    }
    if w.mean == 0 {
        return 0;
    }
    let std_dev = w.std_dev();
    let ppm = fixed::mul(fixed::div(std_dev, w.mean), fixed::from_int(1_000_000));
    fixed::to_int(ppm).clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fp(seed: i32) -> RfFingerprint {
        let mut fp = RfFingerprint {
            drift_mean: fixed::from_int(1000 + seed),
            drift_variance: fixed::from_int(10),
            rise_time_avg: fixed::from_int(5),
            fall_time_avg: fixed::from_int(-5),
            clock_stability_ppm: 10,
            rssi_signature: [128; RSSI_SIGNATURE_LEN],
            unique_hash: 0,
        };
        fp.finalize_hash();
        fp
    }

    #[test]
    fn hash_is_deterministic_and_field_order_sensitive() {
        let mut a = sample_fp(0);
        let valid = a.hash_is_valid();
        assert!(valid);
        a.drift_mean = fixed::from_int(9999);
        assert!(!a.hash_is_valid());
    }

    #[test]
    fn similarity_self_is_100() {
        let fp = sample_fp(0);
        assert_eq!(similarity(&fp, &fp), 100);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = sample_fp(0);
        let b = sample_fp(50);
        let ab = similarity(&a, &b) as i32;
        let ba = similarity(&b, &a) as i32;
        assert!((ab - ba).abs() <= 1);
    }

    #[test]
    fn device_table_insert_get_delete() {
        let mut table = DeviceTable::new();
        let id = table.insert(sample_fp(0), "sensor-a", 100).unwrap();
        assert_eq!(table.get(id).unwrap().name_str(), "sensor-a");
        assert!(table.delete(id));
        assert!(table.get(id).is_none());
        assert!(!table.delete(id));
    }

    #[test]
    fn device_table_enforces_capacity() {
        let mut table = DeviceTable::new();
        for i in 0..DEVICE_TABLE_CAPACITY {
            assert!(table.insert(sample_fp(i as i32), "d", 0).is_ok());
        }
        assert!(matches!(
            table.insert(sample_fp(999), "overflow", 0),
            Err(CoreError::CapacityExceeded { capacity }) if capacity == DEVICE_TABLE_CAPACITY
        ));
    }

    #[test]
    fn find_match_updates_temporal_record() {
        let mut engine = FingerprintEngine::new();
        let fp = sample_fp(0);
        let id = engine.device_table.insert(fp, "sensor", 0).unwrap();
        let (confidence, found_id) = engine.find_match(&fp, 10);
        assert_eq!(confidence, 100);
        assert_eq!(found_id, Some(id));
        let record = engine.temporal_record(id).expect("temporal record created");
        assert_eq!(record.match_count, 1);
        assert!(!record.drift_detected);
    }

    #[test]
    fn counterfeit_check_flags_better_other_match() {
        let mut engine = FingerprintEngine::new();
        let genuine = sample_fp(0);
        let mut forged = genuine;
        forged.drift_mean = fixed::from_int(50_000);
        forged.finalize_hash();

        engine.device_table.insert(genuine, "genuine-device", 0).unwrap();
        engine.device_table.insert(forged, "other-device", 0).unwrap();

        // Claiming to be genuine-device while actually presenting a
        // fingerprint that matches "other-device" far better.
        let result = engine.counterfeit_check(&forged, "genuine-device");
        assert_eq!(result, 0);
    }

    #[test]
    fn record_round_trips_and_rehashes_to_the_same_value() {
        let fp = sample_fp(7);
        let bytes = fp.to_record_bytes("porch-sensor").expect("name within capacity");
        assert_eq!(bytes.len(), FINGERPRINT_RECORD_LEN + "porch-sensor".len() + 1);

        let (parsed, name) = RfFingerprint::from_record_bytes(&bytes).expect("well-formed record");
        assert_eq!(name, "porch-sensor");
        assert_eq!(parsed, fp);
        assert!(parsed.hash_is_valid());
        assert_eq!(crc16_ccitt(&parsed.hashable_bytes()), parsed.unique_hash);
    }

    #[test]
    fn record_name_over_capacity_is_rejected() {
        let fp = sample_fp(0);
        let long_name = "a".repeat(DEVICE_NAME_CAPACITY + 1);
        assert!(matches!(fp.to_record_bytes(&long_name), Err(CoreError::NameTooLong { .. })));
    }

    #[test]
    fn record_truncated_buffer_is_rejected() {
        let fp = sample_fp(0);
        let bytes = fp.to_record_bytes("d").unwrap();
        assert!(matches!(
            RfFingerprint::from_record_bytes(&bytes[..FINGERPRINT_RECORD_LEN]),
            Err(CoreError::TruncatedRecord { .. })
        ));
    }

    #[test]
    fn get_checked_reports_unknown_device() {
        let table = DeviceTable::new();
        assert!(matches!(table.get_checked(42), Err(CoreError::UnknownDevice(42))));
    }

    #[test]
    fn sampling_auto_stops_at_target_frame_count() {
        let mut engine = FingerprintEngine::new();
        engine.start();
        for i in 0..FINGERPRINT_SAMPLE_TARGET {
            let frame = Frame::new(i * 1000, 800, -50, 433_920_000, &[1, 2, 3, 4], 0, 4);
            engine.on_frame(&frame);
        }
        assert_eq!(engine.state, State::Matching);
        assert!(engine.snapshot_fingerprint().hash_is_valid());
    }
}
