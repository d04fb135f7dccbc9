//! Precomputed perceptual color-distance table.
//!
//! All quality comparisons in the codec reduce to O(1) lookups into a
//! `len × len` matrix built once per palette. The metric weights channel
//! differences by Rec. 601 coefficients and penalizes luma twice, biasing
//! everything downstream toward preserving brightness over hue.

use crate::palette::{ColorF, Palette};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Precomputed pairwise perceptual distances and lumas for one palette.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    len: usize,
    matrix: Vec<f64>,
    floats: Vec<ColorF>,
    lumas: Vec<f64>,
}

/// Perceptual difference between two normalized colors with known lumas.
#[inline]
fn perceptual_diff(a: ColorF, a_luma: f64, b: ColorF, b_luma: f64) -> f64 {
    let dr = a.r - b.r;
    let dg = a.g - b.g;
    let db = a.b - b.b;
    let channel = dr * dr * 0.299 + dg * dg * 0.587 + db * db * 0.114;
    let dl = a_luma - b_luma;
    channel * 0.75 + dl * dl
}

impl DistanceTable {
    /// Build the table for a palette.
    pub fn new(palette: &Palette) -> Self {
        let floats: Vec<ColorF> = palette.colors().iter().map(|c| c.to_float()).collect();
        let lumas: Vec<f64> = floats.iter().map(|c| c.luma()).collect();
        let len = floats.len();
        let matrix = build_matrix(&floats, &lumas);
        debug_assert_eq!(matrix.len(), len * len);
        Self {
            len,
            matrix,
            floats,
            lumas,
        }
    }

    /// Number of palette colors covered by the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; the table covers at least one color.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Perceptual distance between two palette colors.
    #[inline]
    pub fn compare(&self, a: u8, b: u8) -> f64 {
        self.matrix[a as usize * self.len + b as usize]
    }

    /// Normalized float form of a palette color.
    #[inline]
    pub fn color(&self, index: u8) -> ColorF {
        self.floats[index as usize]
    }

    /// Index of the palette color closest to an arbitrary color.
    ///
    /// Brute-force scan with the same perceptual metric as [`compare`];
    /// ties resolve to the lowest index.
    ///
    /// [`compare`]: DistanceTable::compare
    pub fn nearest_index(&self, color: ColorF) -> u8 {
        let luma = color.luma();
        let mut min_dist = f64::MAX;
        let mut min_index = 0usize;
        for i in 0..self.len {
            let dist = perceptual_diff(color, luma, self.floats[i], self.lumas[i]);
            if dist < min_dist {
                min_dist = dist;
                min_index = i;
            }
        }
        min_index as u8
    }
}

#[cfg(feature = "parallel")]
fn build_matrix(floats: &[ColorF], lumas: &[f64]) -> Vec<f64> {
    let len = floats.len();
    let mut matrix = vec![0.0; len * len];
    matrix
        .par_chunks_mut(len)
        .enumerate()
        .for_each(|(i, row)| {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = perceptual_diff(floats[i], lumas[i], floats[j], lumas[j]);
            }
        });
    matrix
}

#[cfg(not(feature = "parallel"))]
fn build_matrix(floats: &[ColorF], lumas: &[f64]) -> Vec<f64> {
    let len = floats.len();
    let mut matrix = vec![0.0; len * len];
    for i in 0..len {
        for j in 0..len {
            matrix[i * len + j] = perceptual_diff(floats[i], lumas[i], floats[j], lumas[j]);
        }
    }
    matrix
}
