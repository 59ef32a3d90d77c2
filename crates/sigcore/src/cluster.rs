//! k-means clustering over 2-D feature points, with silhouette-based
//! k-selection and a streaming re-cluster variant.

use crate::fixed::{self, Vec2};
use crate::types::{K_MAX, PULSE_RING_CAPACITY};

pub const KMEANS_MAX_ITERATIONS: u32 = 100;
/// Convergence threshold: Manhattan distance of centroid movement below
/// `FIXED_ONE / 200` (0.5%). Large-magnitude features (e.g. raw
/// microsecond widths) may need a caller-supplied relative threshold
/// instead — see `KMeans::run_with_threshold`.
pub const CONVERGE_THRESHOLD: i32 = fixed::FIXED_ONE / 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPoint {
    pub x: i32,
    pub y: i32,
    pub cluster_id: usize,
}

impl DataPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y, cluster_id: 0 }
    }

    fn point(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Centroid {
    pub x: i32,
    pub y: i32,
    pub point_count: u32,
    pub inertia: i64,
}

impl Centroid {
    fn point(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub k: usize,
    pub centroids: [Centroid; K_MAX],
    pub iterations: u32,
    pub converged: bool,
    pub total_inertia: i64,
    pub silhouette_score: i32,
}

impl KMeansResult {
    fn empty() -> Self {
        Self {
            k: 0,
            centroids: [Centroid::default(); K_MAX],
            iterations: 0,
            converged: false,
            total_inertia: 0,
            silhouette_score: 0,
        }
    }
}

/// Clamp/rewrite `k` per spec: `k == 0` becomes the documented default of
/// 3; `k > dataset.len()` is clamped down to the dataset size; the result
/// is always in `[1, K_MAX]`.
fn normalize_k(k: usize, dataset_len: usize) -> usize {
    let k = if k == 0 { 3 } else { k };
    let k = k.min(dataset_len.max(1));
    k.min(K_MAX)
}

/// Run k-means to convergence (or the iteration cap) over `dataset`.
/// Seeds centroids with the first `k` points, a deterministic choice
/// given the input order.
pub fn run(dataset: &mut [DataPoint], k: usize) -> KMeansResult {
    run_with_threshold(dataset, k, CONVERGE_THRESHOLD)
}

pub fn run_with_threshold(dataset: &mut [DataPoint], k: usize, converge_threshold: i32) -> KMeansResult {
    if dataset.is_empty() {
        return KMeansResult::empty();
    }
    let k = normalize_k(k, dataset.len());

    let mut centroids = [Centroid::default(); K_MAX];
    for i in 0..k {
        centroids[i].x = dataset[i].x;
        centroids[i].y = dataset[i].y;
    }

    let mut iterations = 0u32;
    let mut converged = false;

    for iter in 0..KMEANS_MAX_ITERATIONS {
        iterations = iter + 1;

        // Assign.
        let mut sums = [(0i64, 0i64, 0u32, 0i64); K_MAX];
        for point in dataset.iter_mut() {
            let mut best = 0usize;
            let mut best_dist = i32::MAX;
            for c in 0..k {
                let d = point.point().euclidean(&centroids[c].point());
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            point.cluster_id = best;
            sums[best].0 += point.x as i64;
            sums[best].1 += point.y as i64;
            sums[best].2 += 1;
            sums[best].3 += (best_dist as i64) * (best_dist as i64);
        }

        // Update.
        let mut movement = 0i64;
        for c in 0..k {
            let (sum_x, sum_y, count, inertia) = sums[c];
            let (new_x, new_y) = if count > 0 {
                (
                    fixed::div(sum_x as i32, fixed::from_int(count as i32)),
                    fixed::div(sum_y as i32, fixed::from_int(count as i32)),
                )
            } else {
                (centroids[c].x, centroids[c].y)
            };
            movement += (new_x - centroids[c].x).unsigned_abs() as i64
                + (new_y - centroids[c].y).unsigned_abs() as i64;
            centroids[c].x = new_x;
            centroids[c].y = new_y;
            centroids[c].point_count = count;
            centroids[c].inertia = inertia;
        }

        if movement < converge_threshold as i64 {
            converged = true;
            break;
        }
    }

    let total_inertia: i64 = centroids[..k].iter().map(|c| c.inertia).sum();
    let silhouette_score = silhouette(dataset, &centroids[..k]);

    KMeansResult { k, centroids, iterations, converged, total_inertia, silhouette_score }
}

/// Mean silhouette score over all points: `s(i) = (b-a)/max(a,b)`, `a(i)`
/// the mean distance to same-cluster peers, `b(i)` the minimum over other
/// clusters of the mean distance to that cluster.
fn silhouette(dataset: &[DataPoint], centroids: &[Centroid]) -> i32 {
    if dataset.len() < 2 || centroids.len() < 2 {
        return 0;
    }
    let mut total = 0i64;
    let mut n = 0i64;
    for p in dataset {
        let mut same_sum = 0i64;
        let mut same_count = 0i64;
        let mut other_best = i32::MAX;
        for c in 0..centroids.len() {
            let peers: Vec<&DataPoint> = dataset.iter().filter(|q| q.cluster_id == c).collect();
            if peers.is_empty() {
                continue;
            }
            let mean_dist: i64 = peers.iter().map(|q| p.point().euclidean(&q.point()) as i64).sum::<i64>()
                / peers.len() as i64;
            if c == p.cluster_id {
                same_sum = mean_dist;
                same_count = peers.len() as i64;
            } else if (mean_dist as i32) < other_best {
                other_best = mean_dist as i32;
            }
        }
        if same_count <= 1 {
            continue; // singleton cluster contributes no defined a(i)
        }
        let a = same_sum;
        let b = if other_best == i32::MAX { a } else { other_best as i64 };
        let denom = a.max(b).max(1);
        let s = ((b - a) * fixed::FIXED_ONE as i64) / denom;
        total += s;
        n += 1;
    }
    if n == 0 {
        return 0;
    }
    (total / n) as i32
}

/// Run k-means for every `k` in `[k_min, k_max]`, returning the result
/// with the highest silhouette score.
pub fn find_optimal_k(dataset: &[DataPoint], k_min: usize, k_max: usize) -> KMeansResult {
    let k_min = k_min.max(1);
    let k_max = k_max.max(k_min).min(K_MAX);
    let mut best: Option<KMeansResult> = None;
    for k in k_min..=k_max {
        let mut working: Vec<DataPoint> = dataset.to_vec();
        let result = run(&mut working, k);
        let better = match &best {
            None => true,
            Some(b) => result.silhouette_score > b.silhouette_score,
        };
        if better {
            best = Some(result);
        }
    }
    best.unwrap_or_else(KMeansResult::empty)
}

/// Append-only streaming dataset that re-runs k-means every 50 points,
/// keeping only the last completed re-run as its snapshot.
#[derive(Debug, Clone)]
pub struct StreamingKMeans {
    dataset: Vec<DataPoint>,
    k: usize,
    last_result: KMeansResult,
}

impl StreamingKMeans {
    pub fn new(k: usize) -> Self {
        Self { dataset: Vec::with_capacity(PULSE_RING_CAPACITY), k, last_result: KMeansResult::empty() }
    }

    /// Push a point; ignored once the dataset reaches `PULSE_RING_CAPACITY`
    /// (CapacityExceeded, dropped silently per spec §5).
    pub fn push(&mut self, point: DataPoint) {
        if self.dataset.len() >= PULSE_RING_CAPACITY {
            log::warn!("streaming k-means dataset at capacity ({PULSE_RING_CAPACITY}), dropping point");
            return;
        }
        self.dataset.push(point);
        if self.dataset.len() % 50 == 0 {
            log::trace!("streaming k-means re-cluster at {} points", self.dataset.len());
            self.last_result = run(&mut self.dataset, self.k);
        }
    }

    pub fn snapshot(&self) -> &KMeansResult {
        &self.last_result
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::from_int;

    fn two_clusters() -> Vec<DataPoint> {
        let mut v = Vec::new();
        for i in 0..10 {
            v.push(DataPoint::new(from_int(10 + (i % 3)), from_int(10 + (i % 2))));
        }
        for i in 0..10 {
            v.push(DataPoint::new(from_int(20 + (i % 3)), from_int(20 + (i % 2))));
        }
        v
    }

    #[test]
    fn two_clusters_converge_with_good_silhouette() {
        let mut data = two_clusters();
        let result = run(&mut data, 2);
        assert!(result.converged);
        assert!(result.iterations <= 5, "iterations={}", result.iterations);
        let sil = fixed::to_f64(result.silhouette_score);
        assert!(sil > 0.5, "silhouette={sil}");
    }

    #[test]
    fn point_counts_sum_to_dataset_len_on_convergence() {
        let mut data = two_clusters();
        let result = run(&mut data, 2);
        assert!(result.converged);
        let sum: u32 = result.centroids[..result.k].iter().map(|c| c.point_count).sum();
        assert_eq!(sum as usize, data.len());
    }

    #[test]
    fn k_zero_becomes_three() {
        let mut data = two_clusters();
        let result = run(&mut data, 0);
        assert_eq!(result.k, 3);
    }

    #[test]
    fn k_larger_than_dataset_clamps() {
        let mut data = vec![DataPoint::new(from_int(1), from_int(1)), DataPoint::new(from_int(2), from_int(2))];
        let result = run(&mut data, 5);
        assert_eq!(result.k, 2);
    }

    #[test]
    fn find_optimal_k_picks_two_for_two_clusters() {
        let data = two_clusters();
        let result = find_optimal_k(&data, 1, 4);
        assert_eq!(result.k, 2);
    }

    #[test]
    fn streaming_kmeans_snapshots_every_fifty() {
        let mut stream = StreamingKMeans::new(2);
        for p in two_clusters().into_iter().cycle().take(49) {
            stream.push(p);
        }
        assert_eq!(stream.snapshot().k, 0); // no re-run yet
        stream.push(DataPoint::new(from_int(1), from_int(1)));
        assert_eq!(stream.len(), 50);
        assert!(stream.snapshot().k > 0);
    }
}
