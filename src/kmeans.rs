// K-means used to initialize EM responsibilities

use log::trace;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

const LLOYD_MAX_ITER: usize = 300;

/// Result of a k-means run.
#[derive(Debug, Clone)]
pub(crate) struct KMeansOutcome {
    /// Index of the nearest centroid for every sample.
    pub labels: Array1<usize>,
    /// Sum of squared distances to the assigned centroids.
    pub inertia: f64,
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index whose cumulative squared distance first reaches `target`. Points at
/// distance zero are never picked; when rounding keeps the running sum below
/// `target` the last point with a positive distance is used.
fn draw_by_distance(closest: &[f64], target: f64) -> usize {
    let mut acc = 0.0;
    let mut last_positive = 0;
    for (i, &d) in closest.iter().enumerate() {
        if d > 0.0 {
            acc += d;
            last_positive = i;
            if acc >= target {
                return i;
            }
        }
    }
    last_positive
}

/// k-means++ seeding: the first centroid is drawn uniformly, every further one
/// with probability proportional to its squared distance from the chosen set.
fn kmeans_plusplus_init(data: ArrayView2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n_samples = data.nrows();
    let mut centroids = Array2::<f64>::zeros((k, data.ncols()));

    let first = rng.gen_range(0..n_samples);
    centroids.row_mut(0).assign(&data.row(first));

    let mut closest: Vec<f64> = data
        .axis_iter(Axis(0))
        .map(|row| squared_distance(row, centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 && total.is_finite() {
            draw_by_distance(&closest, rng.gen::<f64>() * total)
        } else {
            // every sample coincides with a chosen centroid
            rng.gen_range(0..n_samples)
        };
        centroids.row_mut(c).assign(&data.row(chosen));
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            let d = squared_distance(row, centroids.row(c));
            if d < closest[i] {
                closest[i] = d;
            }
        }
    }
    centroids
}

fn assign(data: ArrayView2<f64>, centroids: &Array2<f64>, labels: &mut Array1<usize>) -> (bool, f64) {
    let mut changed = false;
    let mut inertia = 0.0;
    for (i, row) in data.axis_iter(Axis(0)).enumerate() {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (c, centroid) in centroids.axis_iter(Axis(0)).enumerate() {
            let d = squared_distance(row, centroid);
            if d < best_dist {
                best_dist = d;
                best = c;
            }
        }
        if labels[i] != best {
            labels[i] = best;
            changed = true;
        }
        inertia += best_dist;
    }
    (changed, inertia)
}

/// Seeded k-means (k-means++ then Lloyd iterations).
///
/// Callers guarantee `1 <= k <= data.nrows()`. A cluster that loses all of its
/// samples keeps its previous centroid.
pub(crate) fn kmeans(data: ArrayView2<f64>, k: usize, rng: &mut ChaCha8Rng) -> KMeansOutcome {
    let (n_samples, n_features) = data.dim();
    let mut centroids = kmeans_plusplus_init(data, k, rng);
    let mut labels = Array1::from_elem(n_samples, usize::MAX);
    let mut inertia = f64::INFINITY;

    for iter in 0..LLOYD_MAX_ITER {
        let (changed, current_inertia) = assign(data, &centroids, &mut labels);
        inertia = current_inertia;
        if !changed {
            trace!("k-means with k={} settled after {} iterations", k, iter);
            break;
        }

        let mut sums = Array2::<f64>::zeros((k, n_features));
        let mut counts = vec![0usize; k];
        for (row, &label) in data.axis_iter(Axis(0)).zip(labels.iter()) {
            let mut acc = sums.row_mut(label);
            acc += &row;
            counts[label] += 1;
        }
        for c in 0..k {
            if counts[c] > 0 {
                let mean = &sums.row(c) / counts[c] as f64;
                centroids.row_mut(c).assign(&mean);
            }
        }
    }

    KMeansOutcome {
        labels,
        inertia,
    }
}
