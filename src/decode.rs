//! Frame decoder: exact inverse of the encoder's chain semantics.
//!
//! Decoding is deterministic byte replay. The decoder keeps its own cache
//! banks and registers fresh sub-palettes in the same order the encoder
//! did, so slot ids resolve identically without any side channel.

use crate::block::{Block, BLOCK_PIXELS};
use crate::cache::CacheBanks;
use crate::error::{Error, Result};
use crate::pack::{unpack_chain, Run, RunKind};

/// Stateful frame decoder for one video sequence.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    caches: CacheBanks,
}

impl FrameDecoder {
    /// Create a decoder with empty cache banks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one frame's packed bytes into `block_count` blocks.
    ///
    /// `previous` must be the previous decoded frame whenever the stream
    /// contains SKIP runs; clean frames decode with `None`.
    pub fn decode(
        &mut self,
        data: &[u8],
        block_count: usize,
        previous: Option<&[Block]>,
    ) -> Result<Vec<Block>> {
        if let Some(prev) = previous {
            if prev.len() != block_count {
                return Err(Error::FrameSizeMismatch {
                    expected: block_count,
                    actual: prev.len(),
                });
            }
        }
        let chain = unpack_chain(data)?;
        self.decode_chain(&chain, block_count, previous)
    }

    /// Decode an already-unpacked chain. Exposed for callers that inspect
    /// runs before reconstructing.
    ///
    /// Chains from [`unpack_chain`] are well-formed by construction;
    /// hand-built runs whose metadata or pixel data doesn't fit their
    /// family fail with [`Error::MalformedRun`].
    pub fn decode_chain(
        &mut self,
        chain: &[Run],
        block_count: usize,
        previous: Option<&[Block]>,
    ) -> Result<Vec<Block>> {
        self.caches.reset_all();
        let mut out: Vec<Block> = Vec::with_capacity(block_count);
        let mut last_block: Block = [0u8; BLOCK_PIXELS];

        for (run_index, run) in chain.iter().enumerate() {
            validate_shape(run, run_index)?;
            if out.len() + run.count > block_count {
                return Err(Error::BlockCountMismatch {
                    expected: block_count,
                    actual: out.len() + run.count,
                });
            }
            match run.kind {
                RunKind::Skip => {
                    let prev = previous.ok_or(Error::MissingPreviousFrame)?;
                    for _ in 0..run.count {
                        last_block = prev[out.len()];
                        out.push(last_block);
                    }
                }
                RunKind::Repeat => {
                    for _ in 0..run.count {
                        out.push(last_block);
                    }
                }
                RunKind::Solid => {
                    last_block = [run.metadata[0]; BLOCK_PIXELS];
                    for _ in 0..run.count {
                        out.push(last_block);
                    }
                }
                RunKind::SolidSep => {
                    for &color in &run.metadata {
                        last_block = [color; BLOCK_PIXELS];
                        out.push(last_block);
                    }
                }
                RunKind::Pal2 | RunKind::Pal4 | RunKind::Pal8 => {
                    if let Some(size) = run.kind.subpal_size() {
                        self.caches.bank_mut(size).add(&run.metadata);
                    }
                    for member in &run.pixel_data {
                        last_block = translate(member, &run.metadata, run_index)?;
                        out.push(last_block);
                    }
                }
                RunKind::Pal2Cache | RunKind::Pal4Cache | RunKind::Pal8Cache => {
                    let slot = run.metadata[0];
                    let size = match run.kind {
                        RunKind::Pal2Cache => 2,
                        RunKind::Pal4Cache => 4,
                        _ => 8,
                    };
                    let subpal = self
                        .caches
                        .bank(size)
                        .get(slot)
                        .ok_or(Error::InvalidCacheSlot { run_index, slot })?;
                    for member in &run.pixel_data {
                        last_block = translate(member, subpal, run_index)?;
                        out.push(last_block);
                    }
                }
                RunKind::Raw => {
                    for member in &run.pixel_data {
                        last_block = *member;
                        out.push(last_block);
                    }
                }
            }
        }

        if out.len() != block_count {
            return Err(Error::BlockCountMismatch {
                expected: block_count,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}

/// Check that a run's metadata and pixel data fit its opcode family.
fn validate_shape(run: &Run, run_index: usize) -> Result<()> {
    let meta_len = if run.kind == RunKind::SolidSep {
        run.count
    } else {
        run.kind.metadata_len()
    };
    let members = if run.kind.member_bytes() > 0 {
        run.count
    } else {
        0
    };
    if run.count == 0 || run.metadata.len() != meta_len || run.pixel_data.len() != members {
        return Err(Error::MalformedRun { run_index });
    }
    Ok(())
}

/// Map local sub-palette indices back to global palette indices.
///
/// Wire-unpacked members can't exceed the sub-palette range, but
/// hand-built ones can; those fail instead of panicking.
#[inline]
fn translate(member: &Block, subpal: &[u8], run_index: usize) -> Result<Block> {
    let mut block = [0u8; BLOCK_PIXELS];
    for (dst, &local) in block.iter_mut().zip(member.iter()) {
        *dst = *subpal
            .get(usize::from(local))
            .ok_or(Error::MalformedRun { run_index })?;
    }
    Ok(block)
}
