//! Error types for the rvc codec.

use std::fmt;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during encoding or decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The palette contains no colors.
    EmptyPalette,
    /// The palette holds more colors than an index byte can address.
    PaletteTooLarge(usize),
    /// Block count of a frame doesn't match the previous-frame reference.
    FrameSizeMismatch {
        /// Block count of the reference frame.
        expected: usize,
        /// Block count actually supplied.
        actual: usize,
    },
    /// The chain contains a SKIP run but no previous frame was supplied.
    MissingPreviousFrame,
    /// A run's count is zero or exceeds its family's wire-format cap.
    RunCountOutOfRange {
        /// Index of the offending run in the chain.
        run_index: usize,
        /// The out-of-range count.
        count: usize,
    },
    /// A run's metadata or pixel data doesn't fit its opcode family.
    MalformedRun {
        /// Index of the offending run in the chain.
        run_index: usize,
    },
    /// The byte stream ended before the declared run was complete.
    TruncatedStream {
        /// Index of the run being unpacked when the stream ran out.
        run_index: usize,
    },
    /// A cached sub-palette run referenced a slot that was never written.
    InvalidCacheSlot {
        /// Index of the offending run in the chain.
        run_index: usize,
        /// The slot id carried in the run's metadata.
        slot: u8,
    },
    /// The decoded chain produced a different number of blocks than expected.
    BlockCountMismatch {
        /// Expected number of blocks in the frame.
        expected: usize,
        /// Number of blocks the chain actually produced.
        actual: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyPalette => {
                write!(f, "Palette must contain at least one color")
            }
            Error::PaletteTooLarge(len) => {
                write!(f, "Palette has {} colors, maximum is 256", len)
            }
            Error::FrameSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "Frame has {} blocks, previous frame has {}",
                    actual, expected
                )
            }
            Error::MissingPreviousFrame => {
                write!(f, "Chain contains SKIP but no previous frame was supplied")
            }
            Error::RunCountOutOfRange { run_index, count } => {
                write!(
                    f,
                    "Run {} has count {}, outside its family's valid range",
                    run_index, count
                )
            }
            Error::MalformedRun { run_index } => {
                write!(
                    f,
                    "Run {} carries metadata or pixel data that doesn't fit its opcode",
                    run_index
                )
            }
            Error::TruncatedStream { run_index } => {
                write!(f, "Byte stream truncated in run {}", run_index)
            }
            Error::InvalidCacheSlot { run_index, slot } => {
                write!(f, "Run {} references unused cache slot {}", run_index, slot)
            }
            Error::BlockCountMismatch { expected, actual } => {
                write!(
                    f,
                    "Chain decoded to {} blocks, expected {}",
                    actual, expected
                )
            }
        }
    }
}

impl std::error::Error for Error {}
