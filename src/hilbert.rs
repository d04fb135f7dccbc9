//! Hilbert-curve traversal order for the block grid.
//!
//! Reordering blocks along a space-filling curve before encoding keeps
//! spatially adjacent blocks adjacent in the chain, which lengthens runs
//! and improves cache hits. The curve covers the smallest power-of-two
//! square containing the grid, centered, and skips cells outside it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Point {
    x: usize,
    y: usize,
}

const INIT_POINTS: [Point; 4] = [
    Point { x: 0, y: 0 },
    Point { x: 0, y: 1 },
    Point { x: 1, y: 1 },
    Point { x: 1, y: 0 },
];

/// Coordinates of curve step `hindex` on an `n`×`n` grid (`n` a power of
/// two). Iterative base-4 digit expansion, two bits per recursion level.
fn hindex_to_xy(hindex: usize, n: usize) -> Point {
    let mut p = INIT_POINTS[hindex & 0b11];
    let mut h = hindex >> 2;
    let mut i = 4;
    while i <= n {
        let half = i / 2;
        match h & 0b11 {
            0 => p = Point { x: p.y, y: p.x },
            1 => p.y += half,
            2 => {
                p.x += half;
                p.y += half;
            }
            _ => {
                p = Point {
                    x: i - 1 - p.y,
                    y: half - 1 - p.x,
                }
            }
        }
        h >>= 2;
        i *= 2;
    }
    p
}

/// Visiting order of a `width`×`height` grid along the Hilbert curve.
///
/// Returns `width·height` grid indices; entry `i` is the linear position
/// of the `i`-th cell visited. The curve runs over the bounding
/// power-of-two square with the grid centered inside it, and positions
/// outside the grid are skipped.
pub fn hilbert_order(width: usize, height: usize) -> Vec<usize> {
    let mut size = 1usize;
    while size < width.max(height) {
        size *= 2;
    }
    let offset_x = (size - width) / 2;
    let offset_y = (size - height) / 2;

    let mut order = Vec::with_capacity(width * height);
    for hindex in 0..size * size {
        let p = hindex_to_xy(hindex, size);
        if p.x >= offset_x && p.x < offset_x + width && p.y >= offset_y && p.y < offset_y + height {
            order.push(p.x - offset_x + (p.y - offset_y) * width);
        }
    }
    order
}

/// Gather items into curve order: output `i` holds `items[order[i]]`.
pub fn apply_order<T: Copy>(items: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&n| items[n]).collect()
}

/// Scatter curve-ordered items back to grid order. The inverse of
/// [`apply_order`] for the same `order`.
pub fn invert_order<T: Copy + Default>(items: &[T], order: &[usize]) -> Vec<T> {
    let mut out = vec![T::default(); items.len()];
    for (i, &n) in order.iter().enumerate() {
        out[n] = items[i];
    }
    out
}
