//! Block transform: flat index images to fixed 4×4 blocks and back.

use crate::distance::DistanceTable;

/// Side length of a block in pixels.
pub const BLOCK_DIM: usize = 4;
/// Number of pixels in a block.
pub const BLOCK_PIXELS: usize = 16;

/// A 4×4 tile of palette indices in row-major order, the codec's atomic
/// encoding unit.
pub type Block = [u8; BLOCK_PIXELS];

/// Split a flat index image into 4×4 blocks.
///
/// Widths and heights that are not multiples of four are padded by
/// repeating the edge pixel. Returns the blocks plus the block-grid
/// dimensions.
pub fn blocks_from_image(indices: &[u8], width: usize, height: usize) -> (Vec<Block>, usize, usize) {
    let bw = width.div_ceil(BLOCK_DIM);
    let bh = height.div_ceil(BLOCK_DIM);
    let mut blocks = vec![[0u8; BLOCK_PIXELS]; bw * bh];
    for y in 0..bh {
        for x in 0..bw {
            let block = &mut blocks[x + y * bw];
            for by in 0..BLOCK_DIM {
                for bx in 0..BLOCK_DIM {
                    let ix = (x * BLOCK_DIM + bx).min(width - 1);
                    let iy = (y * BLOCK_DIM + by).min(height - 1);
                    block[bx + by * BLOCK_DIM] = indices[ix + iy * width];
                }
            }
        }
    }
    (blocks, bw, bh)
}

/// Reassemble blocks into a flat index image of `bw·4 × bh·4` pixels.
///
/// The inverse of [`blocks_from_image`] up to edge padding; callers crop
/// back to the original dimensions if they were not block-aligned.
pub fn blocks_to_image(blocks: &[Block], bw: usize, bh: usize) -> Vec<u8> {
    let width = bw * BLOCK_DIM;
    let height = bh * BLOCK_DIM;
    let mut indices = vec![0u8; width * height];
    for y in 0..bh {
        for x in 0..bw {
            let block = &blocks[x + y * bw];
            for by in 0..BLOCK_DIM {
                for bx in 0..BLOCK_DIM {
                    let ix = x * BLOCK_DIM + bx;
                    let iy = y * BLOCK_DIM + by;
                    indices[ix + iy * width] = block[bx + by * BLOCK_DIM];
                }
            }
        }
    }
    indices
}

/// Summed perceptual distance between two blocks, pixel by pixel.
#[inline]
pub fn block_distance(a: &Block, b: &Block, table: &DistanceTable) -> f64 {
    let mut acc = 0.0;
    for i in 0..BLOCK_PIXELS {
        acc += table.compare(a[i], b[i]);
    }
    acc
}
