//! Small-scale color quantizer.
//!
//! Lloyd's algorithm with k-means++ style seeding, repeated over several
//! independent attempts, keeping the attempt with the lowest weighted
//! distortion. The same routine runs at two scales: over the distinct
//! colors of a whole image set to build the global palette, and over the
//! 16 pixels of a single block to build a 2/4/8-color sub-palette.
//!
//! Two quirks of the reference algorithm are reproduced deliberately
//! because they change the output: the seeding roulette accumulates plain
//! Euclidean distances (not squared), and each point's running minimum
//! seed distance persists across attempts.

use rand::Rng;

use crate::block::Block;
use crate::distance::DistanceTable;
use crate::error::Result;
use crate::palette::{ColorF, Palette, Rgb};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Cluster capacity for the whole-image-set instancing.
pub const GLOBAL_CAPACITY: usize = 256;
/// Cluster capacity for the per-block instancing.
pub const BLOCK_CAPACITY: usize = 8;

/// A color point with an occurrence weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedColor {
    /// The point's color.
    pub color: ColorF,
    /// Occurrence count (pixel count for global points, 1 per block pixel).
    pub weight: u64,
}

#[derive(Debug, Clone, Copy)]
struct Point {
    color: ColorF,
    weight: u64,
    cluster: usize,
    // Running minimum distance to any chosen seed. Shrinks monotonically
    // and intentionally carries over between attempts.
    seed_dist: f64,
}

/// K-means color quantizer configuration.
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    k: usize,
    max_steps: usize,
    attempts: usize,
}

impl Quantizer {
    /// Create a quantizer for `k` clusters, clamped into `[1, capacity]`.
    ///
    /// Out-of-range `k` is clamped rather than rejected.
    pub fn new(k: usize, capacity: usize, max_steps: usize, attempts: usize) -> Self {
        Self {
            k: k.clamp(1, capacity.max(1)),
            max_steps: max_steps.max(1),
            attempts: attempts.max(1),
        }
    }

    /// The effective cluster count.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Cluster the points, returning the best-of-attempts centroid set.
    ///
    /// The result holds exactly `min(k, points.len())` centroids. Empty
    /// input yields an empty result.
    pub fn run<R: Rng>(&self, points: &[WeightedColor], rng: &mut R) -> Vec<ColorF> {
        let k = self.k.min(points.len());
        if k == 0 {
            return Vec::new();
        }
        let mut state = KMeans::new(points, k);
        let mut best_score = f64::MAX;
        let mut best: Vec<ColorF> = Vec::new();
        for attempt in 0..self.attempts {
            state.seed(rng);
            for _ in 0..self.max_steps {
                state.assign();
                if state.changed == 0 {
                    break;
                }
                state.update();
            }
            state.assign();
            let score = state.score();
            if attempt == 0 || score < best_score {
                best_score = score;
                best = state.centroids.clone();
            }
        }
        best
    }
}

struct KMeans {
    points: Vec<Point>,
    centroids: Vec<ColorF>,
    k: usize,
    changed: usize,
}

impl KMeans {
    fn new(points: &[WeightedColor], k: usize) -> Self {
        let points = points
            .iter()
            .map(|p| Point {
                color: p.color,
                weight: p.weight,
                cluster: 0,
                seed_dist: f64::MAX,
            })
            .collect();
        Self {
            points,
            centroids: Vec::new(),
            k,
            changed: 0,
        }
    }

    /// k-means++ style seeding: chosen points are swapped to the front,
    /// the next seed is drawn by weighted roulette over each remaining
    /// point's distance to its nearest already-chosen seed.
    fn seed<R: Rng>(&mut self, rng: &mut R) {
        let n = self.points.len();
        let first = rng.gen_range(0..n);
        self.points.swap(0, first);
        let mut seed_ind = 0;
        while seed_ind < self.k - 1 {
            let mut sum = 0.0;
            for i in seed_ind + 1..n {
                let dist = self.points[i].color.distance(self.points[seed_ind].color);
                if dist < self.points[i].seed_dist {
                    self.points[i].seed_dist = dist;
                }
                sum += self.points[i].seed_dist;
            }
            let roll = rng.gen::<f64>() * sum;
            seed_ind += 1;
            let mut acc = 0.0;
            let mut next = n - 1;
            for i in seed_ind + 1..n {
                acc += self.points[i].seed_dist;
                if acc > roll {
                    next = i;
                    break;
                }
            }
            self.points.swap(seed_ind, next);
        }
        self.centroids.clear();
        self.centroids
            .extend(self.points[..self.k].iter().map(|p| p.color));
    }

    /// Assignment step: each point joins its nearest centroid; counts how
    /// many points changed cluster.
    #[cfg(not(feature = "parallel"))]
    fn assign(&mut self) {
        let centroids = &self.centroids;
        self.changed = self
            .points
            .iter_mut()
            .map(|p| reassign(p, centroids))
            .sum();
    }

    #[cfg(feature = "parallel")]
    fn assign(&mut self) {
        let centroids = &self.centroids;
        // Per-block instances are too small to be worth spawning for.
        if self.points.len() < 4096 {
            self.changed = self
                .points
                .iter_mut()
                .map(|p| reassign(p, centroids))
                .sum();
        } else {
            self.changed = self
                .points
                .par_iter_mut()
                .map(|p| reassign(p, centroids))
                .sum();
        }
    }

    /// Update step: each centroid moves to the weighted mean of its
    /// cluster; zero-weight clusters keep their previous centroid.
    fn update(&mut self) {
        let mut sums = vec![ColorF::default(); self.k];
        let mut sizes = vec![0u64; self.k];
        for p in &self.points {
            let w = p.weight as f64;
            sizes[p.cluster] += p.weight;
            sums[p.cluster].r += p.color.r * w;
            sums[p.cluster].g += p.color.g * w;
            sums[p.cluster].b += p.color.b * w;
        }
        for i in 0..self.k {
            if sizes[i] == 0 {
                continue;
            }
            let size = sizes[i] as f64;
            self.centroids[i] = ColorF::new(sums[i].r / size, sums[i].g / size, sums[i].b / size);
        }
    }

    /// Weighted distortion of the current assignment.
    fn score(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.color.distance(self.centroids[p.cluster]).sqrt() * p.weight as f64)
            .sum()
    }
}

#[inline]
fn reassign(p: &mut Point, centroids: &[ColorF]) -> usize {
    let old = p.cluster;
    let mut min_dist = p.color.distance(centroids[old]);
    let mut new = old;
    for (c, centroid) in centroids.iter().enumerate() {
        let dist = p.color.distance(*centroid);
        if dist < min_dist {
            min_dist = dist;
            new = c;
        }
    }
    if new != old {
        p.cluster = new;
        1
    } else {
        0
    }
}

/// Weighted distortion of `points` against a fixed centroid set.
///
/// Same scoring as the quantizer uses internally to pick its best attempt.
pub fn distortion(points: &[WeightedColor], centroids: &[ColorF]) -> f64 {
    points
        .iter()
        .map(|p| {
            let nearest = centroids
                .iter()
                .map(|c| p.color.distance(*c))
                .fold(f64::MAX, f64::min);
            nearest.sqrt() * p.weight as f64
        })
        .sum()
}

/// Build a global palette from a weighted color histogram.
///
/// Centroids are rounded back to 8-bit colors and sorted by luma so that
/// similar brightnesses sit at neighboring indices.
pub fn global_palette<R: Rng>(
    histogram: &[(Rgb, u64)],
    k: usize,
    max_steps: usize,
    attempts: usize,
    rng: &mut R,
) -> Result<Palette> {
    let points: Vec<WeightedColor> = histogram
        .iter()
        .map(|&(color, weight)| WeightedColor {
            color: color.to_float(),
            weight,
        })
        .collect();
    let quantizer = Quantizer::new(k, GLOBAL_CAPACITY, max_steps, attempts);
    let centroids = quantizer.run(&points, rng);
    let mut colors: Vec<Rgb> = centroids.iter().map(|c| c.to_rgb()).collect();
    colors.sort_by(|a, b| {
        a.to_float()
            .luma()
            .partial_cmp(&b.to_float().luma())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Palette::new(colors)
}

/// Derive a `colors`-entry sub-palette for one block.
///
/// The block's pixels are mapped through the distance table into float
/// colors, clustered, and each centroid mapped back to its nearest global
/// palette index. The result is sorted ascending and always holds exactly
/// `colors` entries (duplicates possible on small palettes).
pub fn block_subpalette<R: Rng>(
    block: &Block,
    table: &DistanceTable,
    colors: usize,
    max_steps: usize,
    attempts: usize,
    rng: &mut R,
) -> Vec<u8> {
    let points: Vec<WeightedColor> = block
        .iter()
        .map(|&px| WeightedColor {
            color: table.color(px),
            weight: 1,
        })
        .collect();
    let quantizer = Quantizer::new(colors, BLOCK_CAPACITY, max_steps, attempts);
    let centroids = quantizer.run(&points, rng);
    let mut subpal: Vec<u8> = centroids.iter().map(|c| table.nearest_index(*c)).collect();
    subpal.sort_unstable();
    subpal
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn points_from(colors: &[(u8, u8, u8)]) -> Vec<WeightedColor> {
        colors
            .iter()
            .map(|&(r, g, b)| WeightedColor {
                color: Rgb::new(r, g, b).to_float(),
                weight: 1,
            })
            .collect()
    }

    #[test]
    fn test_k_is_clamped() {
        assert_eq!(Quantizer::new(500, GLOBAL_CAPACITY, 10, 1).k(), 256);
        assert_eq!(Quantizer::new(0, BLOCK_CAPACITY, 10, 1).k(), 1);
        assert_eq!(Quantizer::new(20, BLOCK_CAPACITY, 10, 1).k(), 8);
    }

    #[test]
    fn test_exact_centroid_count() {
        let points = points_from(&[
            (0, 0, 0),
            (255, 255, 255),
            (255, 0, 0),
            (0, 255, 0),
            (0, 0, 255),
            (128, 128, 128),
        ]);
        let mut rng = StdRng::seed_from_u64(1);
        for k in 1..=4 {
            let result = Quantizer::new(k, BLOCK_CAPACITY, 20, 3).run(&points, &mut rng);
            assert_eq!(result.len(), k);
        }
    }

    #[test]
    fn test_k_clamped_to_point_count() {
        let points = points_from(&[(0, 0, 0), (255, 255, 255)]);
        let mut rng = StdRng::seed_from_u64(2);
        let result = Quantizer::new(8, BLOCK_CAPACITY, 10, 2).run(&points, &mut rng);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_two_clusters_split_two_colors() {
        // Two tight groups of points must produce one centroid per group.
        let points = points_from(&[
            (0, 0, 0),
            (5, 5, 5),
            (250, 250, 250),
            (255, 255, 255),
        ]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut result = Quantizer::new(2, BLOCK_CAPACITY, 20, 4).run(&points, &mut rng);
        result.sort_by(|a, b| a.luma().partial_cmp(&b.luma()).unwrap());
        assert!(result[0].luma() < 0.1);
        assert!(result[1].luma() > 0.9);
    }

    #[test]
    fn test_best_of_attempts_not_worse_than_first() {
        // The first of N attempts consumes the same RNG draws as a
        // single-attempt run with the same seed, so best-of-N must score
        // at or below it.
        let points = points_from(&[
            (10, 0, 0),
            (0, 200, 30),
            (90, 90, 90),
            (255, 255, 0),
            (0, 0, 255),
            (180, 20, 140),
            (60, 120, 10),
            (240, 240, 240),
        ]);
        let single = Quantizer::new(3, BLOCK_CAPACITY, 15, 1)
            .run(&points, &mut StdRng::seed_from_u64(42));
        let multi = Quantizer::new(3, BLOCK_CAPACITY, 15, 6)
            .run(&points, &mut StdRng::seed_from_u64(42));
        assert!(distortion(&points, &multi) <= distortion(&points, &single) + 1e-12);
    }

    #[test]
    fn test_weights_pull_centroid() {
        // One cluster, two colors: the heavy point dominates the mean.
        let points = vec![
            WeightedColor {
                color: ColorF::new(0.0, 0.0, 0.0),
                weight: 99,
            },
            WeightedColor {
                color: ColorF::new(1.0, 1.0, 1.0),
                weight: 1,
            },
        ];
        let mut rng = StdRng::seed_from_u64(4);
        let result = Quantizer::new(1, BLOCK_CAPACITY, 10, 2).run(&points, &mut rng);
        assert_eq!(result.len(), 1);
        assert!(result[0].luma() < 0.05);
    }

    #[test]
    fn test_global_palette_sorted_by_luma() {
        let histogram = [
            (Rgb::new(255, 255, 255), 10),
            (Rgb::new(0, 0, 0), 10),
            (Rgb::new(128, 128, 128), 10),
        ];
        let mut rng = StdRng::seed_from_u64(5);
        let pal = global_palette(&histogram, 3, 20, 3, &mut rng).unwrap();
        assert_eq!(pal.len(), 3);
        let lumas: Vec<f64> = pal.colors().iter().map(|c| c.to_float().luma()).collect();
        assert!(lumas.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_subpalette_indices_in_range_and_sorted() {
        let pal = Palette::new(vec![
            Rgb::new(0, 0, 0),
            Rgb::new(60, 60, 60),
            Rgb::new(120, 120, 120),
            Rgb::new(200, 200, 200),
            Rgb::new(255, 255, 255),
        ])
        .unwrap();
        let table = DistanceTable::new(&pal);
        let block: Block = [0, 0, 4, 4, 0, 0, 4, 4, 0, 0, 4, 4, 0, 0, 4, 4];
        let mut rng = StdRng::seed_from_u64(6);
        let subpal = block_subpalette(&block, &table, 2, 10, 2, &mut rng);
        assert_eq!(subpal.len(), 2);
        assert!(subpal.iter().all(|&i| (i as usize) < pal.len()));
        assert!(subpal.windows(2).all(|w| w[0] <= w[1]));
        // Two clean pixel groups must map straight back to their colors.
        assert_eq!(subpal, vec![0, 4]);
    }
}
