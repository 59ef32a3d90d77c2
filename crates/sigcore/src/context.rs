//! Core facade (C8): a single `parking_lot::Mutex` serializing ingest and
//! analysis across the fingerprinting, clustering, protocol-inference, and
//! threat engines. A host collaborator drives this surface directly; it
//! owns no I/O and performs no allocation beyond what each engine already
//! pre-sizes at construction.

use parking_lot::Mutex;

use crate::cluster::{self, DataPoint, KMeansResult};
use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::fingerprint::{ConfidenceBand, FingerprintEngine, RfFingerprint};
use crate::protocol::{ProtocolHypothesis, ProtocolInferenceEngine};
use crate::threat::{ThreatAssessment, ThreatEngine};
use crate::types::{Frame, Pulse, PULSE_RING_CAPACITY};

struct Inner {
    config: CoreConfig,
    fingerprint: FingerprintEngine,
    protocol: ProtocolInferenceEngine,
    threat: ThreatEngine,
    cluster_dataset: Vec<DataPoint>,
    last_cluster_result: KMeansResult,
    healthy: bool,
}

impl Inner {
    fn new(config: CoreConfig) -> Self {
        Self {
            config,
            fingerprint: FingerprintEngine::new(),
            protocol: ProtocolInferenceEngine::new(),
            threat: ThreatEngine::new(),
            cluster_dataset: Vec::with_capacity(PULSE_RING_CAPACITY),
            last_cluster_result: cluster::run(&mut [], 0),
            healthy: true,
        }
    }
}

/// Owns every engine behind one lock, mirroring the spec's single
/// core-wide-mutex concurrency model: ingest calls are short and
/// constant-time, analyze/query calls hold the lock for the duration of
/// the pass.
pub struct CoreContext {
    inner: Mutex<Inner>,
}

impl Default for CoreContext {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl CoreContext {
    pub fn new(config: CoreConfig) -> Self {
        Self { inner: Mutex::new(Inner::new(config)) }
    }

    /// Reinitialize every engine to its idle/empty state, as if freshly
    /// constructed, keeping the current configuration.
    pub fn reset(&self) {
        log::debug!("core context reset: reinitializing every engine");
        let mut inner = self.inner.lock();
        let config = inner.config;
        *inner = Inner::new(config);
    }

    pub fn config(&self) -> CoreConfig {
        self.inner.lock().config
    }

    /// `false` once any engine has observed state it cannot reconcile
    /// (spec §7 `InternalInvariantBroken`); currently always `true`, as no
    /// analysis path here can reach such a state, but the accessor is the
    /// seam a future invariant check would report through.
    pub fn healthy(&self) -> bool {
        self.inner.lock().healthy
    }

    // --- ingest surface -------------------------------------------------

    pub fn on_pulse(&self, pulse: Pulse) {
        let mut inner = self.inner.lock();
        inner.protocol.on_pulse(pulse);
    }

    pub fn on_frame(&self, frame: &Frame) {
        let mut inner = self.inner.lock();
        inner.fingerprint.on_frame(frame);
        inner.protocol.on_frame(frame);
        inner.threat.on_frame(frame);
    }

    pub fn on_rssi_sample(&self, rssi_u8: u8, timestamp_us: u32) {
        let mut inner = self.inner.lock();
        inner.fingerprint.on_rssi_sample(rssi_u8, timestamp_us);
    }

    pub fn push_cluster_point(&self, point: DataPoint) {
        let mut inner = self.inner.lock();
        if inner.cluster_dataset.len() < PULSE_RING_CAPACITY {
            inner.cluster_dataset.push(point);
        }
    }

    // --- fingerprinting surface -----------------------------------------

    pub fn start_fingerprinting(&self) {
        self.inner.lock().fingerprint.start();
    }

    pub fn stop_fingerprinting(&self) {
        self.inner.lock().fingerprint.stop();
    }

    pub fn fingerprint_progress(&self) -> u8 {
        self.inner.lock().fingerprint.snapshot_progress()
    }

    pub fn snapshot_fingerprint(&self) -> RfFingerprint {
        self.inner.lock().fingerprint.snapshot_fingerprint()
    }

    pub fn register_device(&self, fingerprint: RfFingerprint, name: &str, now: u32) -> CoreResult<u16> {
        self.inner.lock().fingerprint.device_table.insert(fingerprint, name, now)
    }

    pub fn find_match(&self, fingerprint: &RfFingerprint, now: u32) -> (u8, Option<u16>) {
        self.inner.lock().fingerprint.find_match(fingerprint, now)
    }

    pub fn confidence_band(&self, confidence: u8) -> ConfidenceBand {
        crate::fingerprint::confidence_band(confidence)
    }

    pub fn counterfeit_check(&self, fingerprint: &RfFingerprint, claimed_device_name: &str) -> u8 {
        self.inner.lock().fingerprint.counterfeit_check(fingerprint, claimed_device_name)
    }

    pub fn device_count(&self) -> usize {
        self.inner.lock().fingerprint.device_table.len()
    }

    /// Device name for a registered id, or `CoreError::UnknownDevice` if
    /// no such id was ever assigned (or it was later deleted).
    pub fn device_name(&self, id: u16) -> CoreResult<String> {
        self.inner.lock().fingerprint.device_table.get_checked(id).map(|entry| entry.name_str().to_string())
    }

    /// Serialize a fingerprint into the persisted record format: the host
    /// collaborator owns writing it to storage.
    pub fn persist_fingerprint(&self, fingerprint: &RfFingerprint, name: &str) -> CoreResult<Vec<u8>> {
        fingerprint.to_record_bytes(name)
    }

    /// Parse a persisted fingerprint record back into a fingerprint and
    /// its device name.
    pub fn load_fingerprint_record(bytes: &[u8]) -> CoreResult<(RfFingerprint, String)> {
        RfFingerprint::from_record_bytes(bytes)
    }

    // --- clustering surface ----------------------------------------------

    pub fn run_clustering(&self, k: usize) -> KMeansResult {
        let mut inner = self.inner.lock();
        let result = cluster::run(&mut inner.cluster_dataset, k);
        inner.last_cluster_result = result.clone();
        result
    }

    pub fn find_optimal_clustering(&self, k_min: usize, k_max: usize) -> KMeansResult {
        let inner = self.inner.lock();
        cluster::find_optimal_k(&inner.cluster_dataset, k_min, k_max)
    }

    pub fn snapshot_clustering(&self) -> KMeansResult {
        self.inner.lock().last_cluster_result.clone()
    }

    // --- protocol inference surface --------------------------------------

    pub fn analyze_protocol(&self) {
        self.inner.lock().protocol.analyze();
    }

    pub fn snapshot_protocol_hypothesis(&self) -> ProtocolHypothesis {
        self.inner.lock().protocol.snapshot_hypothesis()
    }

    // --- threat model surface ---------------------------------------------

    pub fn start_threat_analysis(&self) {
        self.inner.lock().threat.start_analysis();
    }

    pub fn stop_threat_analysis(&self) {
        self.inner.lock().threat.stop_analysis();
    }

    pub fn assess_threat(&self) -> ThreatAssessment {
        self.inner.lock().threat.assess()
    }

    pub fn snapshot_threat(&self) -> ThreatAssessment {
        self.inner.lock().threat.snapshot_assessment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u32) -> Frame {
        Frame::new(seq * 1000, 800, -50, 433_920_000, &[0xAA, 0xBB, 0x01, 0x02], 0, 4)
    }

    #[test]
    fn reset_clears_device_table_and_cluster_state() {
        let ctx = CoreContext::default();
        ctx.start_fingerprinting();
        for i in 0..10 {
            ctx.on_frame(&frame(i));
        }
        ctx.push_cluster_point(DataPoint::new(0, 0));
        ctx.reset();
        assert_eq!(ctx.device_count(), 0);
        assert!(ctx.healthy());
    }

    #[test]
    fn ingest_and_analyze_share_state_across_engines() {
        let ctx = CoreContext::default();
        ctx.start_threat_analysis();
        for i in 0..5u32 {
            ctx.on_frame(&frame(i));
        }
        let assessment = ctx.assess_threat();
        assert_eq!(assessment.level as i32, ctx.snapshot_threat().level as i32);
    }

    #[test]
    fn config_round_trips() {
        let cfg = CoreConfig::default().with_device_capacity(16);
        let ctx = CoreContext::new(cfg);
        assert_eq!(ctx.config().device_capacity, 16);
    }

    #[test]
    fn device_name_reports_unknown_id() {
        let ctx = CoreContext::default();
        assert!(ctx.device_name(3).is_err());
        let fp = ctx.snapshot_fingerprint();
        let id = ctx.register_device(fp, "gate-remote", 0).expect("device table has room");
        assert_eq!(ctx.device_name(id).unwrap(), "gate-remote");
    }

    #[test]
    fn persisted_fingerprint_round_trips_through_the_facade() {
        let ctx = CoreContext::default();
        for i in 0..10u32 {
            ctx.on_frame(&frame(i));
        }
        let fp = ctx.snapshot_fingerprint();
        let bytes = ctx.persist_fingerprint(&fp, "porch-sensor").expect("name within capacity");
        let (parsed, name) = CoreContext::load_fingerprint_record(&bytes).expect("well-formed record");
        assert_eq!(name, "porch-sensor");
        assert_eq!(parsed, fp);
    }
}
