//! # rvc
//!
//! A lossy block codec for palettized video.
//!
//! Frames are flat arrays of 8-bit indices into a shared global palette,
//! split into 4×4 blocks. The encoder walks each frame block by block,
//! picking the cheapest opcode family whose perceptual error clears a
//! quality threshold: skip, repeat, solid fill, 2/4/8-color sub-palettes
//! (fresh or cached), or raw indices. Decoding is exact byte replay; the
//! only loss happens at encode time.
//!
//! ## Features
//!
//! - **Perceptual distance tables** over the global palette
//! - **k-means color quantization** for global and per-block palettes
//! - **Sub-byte bit packing** (1/2/3 bits per pixel) on the wire
//! - **RVF container** framing with keyframe flags
//! - Optional parallel table building and clustering via `parallel`
//!
//! ## Example
//!
//! ```rust
//! use rvc::{Block, FrameDecoder, FrameEncoder, Palette, Rgb};
//!
//! let palette = Palette::new(vec![
//!     Rgb::new(0, 0, 0),
//!     Rgb::new(255, 255, 255),
//! ])?;
//! let frame: Vec<Block> = vec![[1; 16], [1; 16], [0; 16]];
//!
//! let mut encoder = FrameEncoder::with_seed(palette, 0.02, 42);
//! encoder.encode(&frame)?;
//! let bytes = encoder.pack()?;
//!
//! let mut decoder = FrameDecoder::new();
//! let decoded = decoder.decode(&bytes, frame.len(), None)?;
//! assert_eq!(decoded, encoder.last_frame());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod block;
pub mod cache;
pub mod decode;
pub mod distance;
pub mod encode;
pub mod error;
pub mod hilbert;
pub mod pack;
pub mod palette;
pub mod quantize;
pub mod rvf;

pub use block::{blocks_from_image, blocks_to_image, Block, BLOCK_DIM, BLOCK_PIXELS};
pub use decode::FrameDecoder;
pub use distance::DistanceTable;
pub use encode::{EncodeStats, FrameEncoder};
pub use error::{Error, Result};
pub use palette::{ColorF, Palette, Rgb, MAX_PALETTE_LEN};
pub use quantize::global_palette;
