//! Frame encoder: the per-block decision engine and chain builder.
//!
//! For every block the encoder walks a fixed list of candidate tiers in
//! ascending marginal byte cost, evaluates every eligible chooser in the
//! tier, and accepts the tier's best proposal as soon as its score falls
//! strictly below the quality threshold. RAW terminates the walk with a
//! score of zero, so every block always finds a valid encoding. The
//! choice is greedy and per-block; nothing backtracks across blocks.
//!
//! Temporal state: SKIP compares against the encoder's own reconstruction
//! of the previous frame, never the source, so the decoder replaying the
//! packed bytes stays bit-exact with the encoder's bookkeeping.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::block::{block_distance, Block, BLOCK_PIXELS};
use crate::cache::CacheBanks;
use crate::distance::DistanceTable;
use crate::error::{Error, Result};
use crate::pack::{pack_chain, Run, RunKind};
use crate::palette::Palette;
use crate::quantize::block_subpalette;

/// Lloyd iterations per sub-palette attempt.
const SUBPAL_STEPS: usize = 10;
/// Independent seeding attempts per sub-palette.
const SUBPAL_ATTEMPTS: usize = 2;

/// A transient candidate encoding for one block.
struct Proposal {
    kind: RunKind,
    metadata: Vec<u8>,
    pixels: Option<Block>,
    first: bool,
    score: f64,
    result: Block,
}

/// The choosers, one per opcode-family variant the engine can try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chooser {
    ContinueSkip,
    ContinueRepeat,
    ContinueSolid,
    Skip,
    Repeat,
    Solid,
    ContinuePal2,
    ContinuePal2Cache,
    Pal2Cache,
    ContinuePal4,
    ContinuePal4Cache,
    Pal2,
    Pal4Cache,
    ContinuePal8,
    ContinuePal8Cache,
    Pal4,
    Pal8Cache,
    ContinueRaw,
    Pal8,
    Raw,
}

/// Tier groups in ascending marginal encoded-byte cost. Within a group
/// every eligible chooser runs and the lowest score wins; the group is
/// accepted once its winner clears the threshold. Cached sub-palette
/// groups interleave with continuations of the next-larger family, which
/// cost the same marginal bytes.
const TIERS: &[&[Chooser]] = &[
    &[
        Chooser::ContinueSkip,
        Chooser::ContinueRepeat,
        Chooser::ContinueSolid,
    ],
    &[Chooser::Skip, Chooser::Repeat],
    &[
        Chooser::Solid,
        Chooser::ContinuePal2,
        Chooser::ContinuePal2Cache,
    ],
    &[
        Chooser::Pal2Cache,
        Chooser::ContinuePal4,
        Chooser::ContinuePal4Cache,
    ],
    &[Chooser::Pal2],
    &[
        Chooser::Pal4Cache,
        Chooser::ContinuePal8,
        Chooser::ContinuePal8Cache,
    ],
    &[Chooser::Pal4],
    &[Chooser::Pal8Cache, Chooser::ContinueRaw],
    &[Chooser::Pal8],
    &[Chooser::Raw],
];

/// Run-length cap the encoder honors per family. The wire format allows
/// long RAW runs, but the engine never emits them.
fn encoder_cap(kind: RunKind) -> usize {
    match kind {
        RunKind::Skip | RunKind::Repeat | RunKind::Solid => 4096,
        _ => 16,
    }
}

const KIND_COUNT: usize = 11;

fn kind_index(kind: RunKind) -> usize {
    match kind {
        RunKind::Skip => 0,
        RunKind::Repeat => 1,
        RunKind::Solid => 2,
        RunKind::SolidSep => 3,
        RunKind::Pal2 => 4,
        RunKind::Pal2Cache => 5,
        RunKind::Pal4 => 6,
        RunKind::Pal4Cache => 7,
        RunKind::Pal8 => 8,
        RunKind::Pal8Cache => 9,
        RunKind::Raw => 10,
    }
}

/// Per-family counters for one encoded frame, owned by the encoder and
/// read through an accessor so parallel sessions never share state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeStats {
    runs: [u64; KIND_COUNT],
    blocks: [u64; KIND_COUNT],
}

impl EncodeStats {
    fn record(&mut self, kind: RunKind, first: bool) {
        let i = kind_index(kind);
        if first {
            self.runs[i] += 1;
        }
        self.blocks[i] += 1;
    }

    /// Number of runs opened with this family.
    pub fn runs(&self, kind: RunKind) -> u64 {
        self.runs[kind_index(kind)]
    }

    /// Number of blocks encoded with this family.
    pub fn blocks(&self, kind: RunKind) -> u64 {
        self.blocks[kind_index(kind)]
    }

    /// Total number of runs in the frame.
    pub fn total_runs(&self) -> u64 {
        self.runs.iter().sum()
    }

    /// Total number of blocks in the frame.
    pub fn total_blocks(&self) -> u64 {
        self.blocks.iter().sum()
    }
}

/// Stateful frame encoder for one video sequence.
///
/// Call [`encode`] once per frame in display order; the encoder keeps its
/// own reconstruction of the previous frame as the SKIP reference.
///
/// [`encode`]: FrameEncoder::encode
pub struct FrameEncoder {
    palette: Palette,
    table: DistanceTable,
    threshold: f64,
    chain: Vec<Run>,
    caches: CacheBanks,
    last_frame: Vec<Block>,
    last_block: Option<Block>,
    rng: StdRng,
    stats: EncodeStats,
}

impl FrameEncoder {
    /// Create an encoder for a palette and quality threshold.
    ///
    /// Lower thresholds force later (more expensive, more faithful)
    /// tiers; a threshold of zero degenerates to all-RAW output.
    pub fn new(palette: Palette, threshold: f64) -> Self {
        let seed = rand::random();
        Self::with_seed(palette, threshold, seed)
    }

    /// Create an encoder with a fixed RNG seed for reproducible output.
    pub fn with_seed(palette: Palette, threshold: f64, seed: u64) -> Self {
        let table = DistanceTable::new(&palette);
        Self {
            palette,
            table,
            threshold,
            chain: Vec::new(),
            caches: CacheBanks::new(),
            last_frame: Vec::new(),
            last_block: None,
            rng: StdRng::seed_from_u64(seed),
            stats: EncodeStats::default(),
        }
    }

    /// Encode one frame of blocks into a fresh chain.
    ///
    /// Fails with [`Error::FrameSizeMismatch`] when a previous frame
    /// exists and its block count differs.
    pub fn encode(&mut self, blocks: &[Block]) -> Result<()> {
        if !self.last_frame.is_empty() && self.last_frame.len() != blocks.len() {
            return Err(Error::FrameSizeMismatch {
                expected: self.last_frame.len(),
                actual: blocks.len(),
            });
        }
        self.chain.clear();
        self.caches.reset_all();
        self.last_block = None;
        self.stats = EncodeStats::default();

        let mut reconstruction = Vec::with_capacity(blocks.len());
        for (pos, block) in blocks.iter().enumerate() {
            let proposal = self.choose(block, pos);
            reconstruction.push(proposal.result);
            self.accept(proposal);
        }
        self.last_frame = reconstruction;
        Ok(())
    }

    /// Serialize the current chain to bytes.
    ///
    /// The engine caps every run it builds, so this only fails if the
    /// chain was tampered with between encode and pack.
    pub fn pack(&self) -> Result<Vec<u8>> {
        pack_chain(&self.chain)
    }

    /// True when the chain holds no SKIP runs, i.e. the frame decodes
    /// without a previous-frame reference and can serve as a keyframe.
    pub fn is_clean(&self) -> bool {
        !self.chain.iter().any(|run| run.kind == RunKind::Skip)
    }

    /// The chain built by the last [`encode`] call.
    ///
    /// [`encode`]: FrameEncoder::encode
    pub fn chain(&self) -> &[Run] {
        &self.chain
    }

    /// The encoder-side reconstruction of the last encoded frame.
    pub fn last_frame(&self) -> &[Block] {
        &self.last_frame
    }

    /// Counters for the last encoded frame.
    pub fn stats(&self) -> &EncodeStats {
        &self.stats
    }

    /// The palette this encoder was built for.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The precomputed distance table.
    pub fn table(&self) -> &DistanceTable {
        &self.table
    }

    fn choose(&mut self, block: &Block, pos: usize) -> Proposal {
        for (tier_index, tier) in TIERS.iter().enumerate() {
            let terminal = tier_index + 1 == TIERS.len();
            let mut best: Option<Proposal> = None;
            for &chooser in *tier {
                if let Some(proposal) = self.propose(chooser, block, pos) {
                    let better = match &best {
                        Some(b) => proposal.score < b.score,
                        None => true,
                    };
                    if better {
                        best = Some(proposal);
                    }
                }
            }
            if let Some(proposal) = best {
                if terminal || proposal.score < self.threshold {
                    return proposal;
                }
            }
        }
        unreachable!("RAW chooser always yields a proposal")
    }

    fn propose(&mut self, chooser: Chooser, block: &Block, pos: usize) -> Option<Proposal> {
        match chooser {
            Chooser::ContinueSkip => self.continue_simple(RunKind::Skip, block, pos),
            Chooser::ContinueRepeat => self.continue_simple(RunKind::Repeat, block, pos),
            Chooser::ContinueSolid => self.continue_simple(RunKind::Solid, block, pos),
            Chooser::Skip => self.propose_skip(block, pos),
            Chooser::Repeat => self.propose_repeat(block),
            Chooser::Solid => Some(self.propose_solid(block)),
            Chooser::ContinuePal2 => self.continue_pal(RunKind::Pal2, block),
            Chooser::ContinuePal2Cache => self.continue_pal(RunKind::Pal2Cache, block),
            Chooser::ContinuePal4 => self.continue_pal(RunKind::Pal4, block),
            Chooser::ContinuePal4Cache => self.continue_pal(RunKind::Pal4Cache, block),
            Chooser::ContinuePal8 => self.continue_pal(RunKind::Pal8, block),
            Chooser::ContinuePal8Cache => self.continue_pal(RunKind::Pal8Cache, block),
            Chooser::Pal2Cache => self.propose_cached_pal(2, block),
            Chooser::Pal4Cache => self.propose_cached_pal(4, block),
            Chooser::Pal8Cache => self.propose_cached_pal(8, block),
            Chooser::Pal2 => Some(self.propose_fresh_pal(2, block)),
            Chooser::Pal4 => Some(self.propose_fresh_pal(4, block)),
            Chooser::Pal8 => Some(self.propose_fresh_pal(8, block)),
            Chooser::ContinueRaw => self.continue_raw(block),
            Chooser::Raw => Some(Proposal {
                kind: RunKind::Raw,
                metadata: Vec::new(),
                pixels: Some(*block),
                first: true,
                score: 0.0,
                result: *block,
            }),
        }
    }

    /// Continuation of a SKIP, REPEAT or SOLID run: same reference as the
    /// run's own, scored against this block.
    fn continue_simple(&self, kind: RunKind, block: &Block, pos: usize) -> Option<Proposal> {
        let run = self.chain.last()?;
        if run.kind != kind || run.count >= encoder_cap(kind) {
            return None;
        }
        let result = match kind {
            RunKind::Skip => *self.last_frame.get(pos)?,
            RunKind::Repeat => self.last_block?,
            RunKind::Solid => [run.metadata[0]; BLOCK_PIXELS],
            _ => return None,
        };
        Some(Proposal {
            kind,
            metadata: Vec::new(),
            pixels: None,
            first: false,
            score: block_distance(block, &result, &self.table),
            result,
        })
    }

    fn propose_skip(&self, block: &Block, pos: usize) -> Option<Proposal> {
        let reference = *self.last_frame.get(pos)?;
        Some(Proposal {
            kind: RunKind::Skip,
            metadata: Vec::new(),
            pixels: None,
            first: true,
            score: block_distance(block, &reference, &self.table),
            result: reference,
        })
    }

    fn propose_repeat(&self, block: &Block) -> Option<Proposal> {
        let reference = self.last_block?;
        Some(Proposal {
            kind: RunKind::Repeat,
            metadata: Vec::new(),
            pixels: None,
            first: true,
            score: block_distance(block, &reference, &self.table),
            result: reference,
        })
    }

    /// Brute-force the whole palette for the single best fill color.
    fn propose_solid(&self, block: &Block) -> Proposal {
        let mut best_color = 0u8;
        let mut best_score = f64::MAX;
        for color in 0..self.palette.len() {
            let color = color as u8;
            let mut acc = 0.0;
            for &px in block.iter() {
                acc += self.table.compare(px, color);
            }
            if acc < best_score {
                best_score = acc;
                best_color = color;
            }
        }
        Proposal {
            kind: RunKind::Solid,
            metadata: vec![best_color],
            pixels: None,
            first: true,
            score: best_score,
            result: [best_color; BLOCK_PIXELS],
        }
    }

    /// Continuation of a sub-palette run: reuse the run's sub-palette for
    /// one more member.
    fn continue_pal(&self, kind: RunKind, block: &Block) -> Option<Proposal> {
        let run = self.chain.last()?;
        if run.kind != kind || run.count >= encoder_cap(kind) {
            return None;
        }
        let size = kind.subpal_size()?;
        let subpal: &[u8] = if kind.is_cached_pal() {
            self.caches.bank(size).get(run.metadata[0])?
        } else {
            &run.metadata
        };
        let (local, result, score) = apply_subpal(block, subpal, &self.table);
        Some(Proposal {
            kind,
            metadata: Vec::new(),
            pixels: Some(local),
            first: false,
            score,
            result,
        })
    }

    /// Best cached sub-palette of the given size, if the bank has any.
    /// Ties keep the earliest entry in insertion order.
    fn propose_cached_pal(&self, size: usize, block: &Block) -> Option<Proposal> {
        let kind = match size {
            2 => RunKind::Pal2Cache,
            4 => RunKind::Pal4Cache,
            _ => RunKind::Pal8Cache,
        };
        let mut best: Option<Proposal> = None;
        for (slot, subpal) in self.caches.bank(size).iter() {
            let (local, result, score) = apply_subpal(block, subpal, &self.table);
            let better = match &best {
                Some(b) => score < b.score,
                None => true,
            };
            if better {
                best = Some(Proposal {
                    kind,
                    metadata: vec![slot],
                    pixels: Some(local),
                    first: true,
                    score,
                    result,
                });
            }
        }
        best
    }

    /// Derive a fresh sub-palette with the quantizer and apply it.
    fn propose_fresh_pal(&mut self, size: usize, block: &Block) -> Proposal {
        let kind = match size {
            2 => RunKind::Pal2,
            4 => RunKind::Pal4,
            _ => RunKind::Pal8,
        };
        let subpal = block_subpalette(
            block,
            &self.table,
            size,
            SUBPAL_STEPS,
            SUBPAL_ATTEMPTS,
            &mut self.rng,
        );
        let (local, result, score) = apply_subpal(block, &subpal, &self.table);
        Proposal {
            kind,
            metadata: subpal,
            pixels: Some(local),
            first: true,
            score,
            result,
        }
    }

    fn continue_raw(&self, block: &Block) -> Option<Proposal> {
        let run = self.chain.last()?;
        if run.kind != RunKind::Raw || run.count >= encoder_cap(RunKind::Raw) {
            return None;
        }
        Some(Proposal {
            kind: RunKind::Raw,
            metadata: Vec::new(),
            pixels: Some(*block),
            first: false,
            score: 0.0,
            result: *block,
        })
    }

    /// Commit an accepted proposal: extend or open a run, register fresh
    /// sub-palettes in their cache bank, update temporal state.
    fn accept(&mut self, proposal: Proposal) {
        self.stats.record(proposal.kind, proposal.first);
        self.last_block = Some(proposal.result);
        if proposal.first {
            if let Some(size) = proposal.kind.subpal_size() {
                if proposal.kind.is_fresh_pal() {
                    self.caches.bank_mut(size).add(&proposal.metadata);
                }
            }
            let mut pixel_data = Vec::new();
            if let Some(px) = proposal.pixels {
                pixel_data.push(px);
            }
            self.chain.push(Run {
                kind: proposal.kind,
                count: 1,
                metadata: proposal.metadata,
                pixel_data,
            });
        } else if let Some(run) = self.chain.last_mut() {
            run.count += 1;
            if let Some(px) = proposal.pixels {
                run.pixel_data.push(px);
            }
        }
    }
}

/// Map every block pixel to its nearest sub-palette entry.
///
/// Returns the local index array, the reconstructed block and the summed
/// perceptual distortion. Ties resolve to the earliest sub-palette entry.
fn apply_subpal(block: &Block, subpal: &[u8], table: &DistanceTable) -> (Block, Block, f64) {
    let mut local = [0u8; BLOCK_PIXELS];
    let mut result = [0u8; BLOCK_PIXELS];
    let mut score = 0.0;
    for i in 0..BLOCK_PIXELS {
        let mut best = f64::MAX;
        let mut best_j = 0usize;
        for (j, &global) in subpal.iter().enumerate() {
            let dist = table.compare(block[i], global);
            if dist < best {
                best = dist;
                best_j = j;
            }
        }
        local[i] = best_j as u8;
        result[i] = subpal[best_j];
        score += best;
    }
    (local, result, score)
}
