//! Bitstream packer and unpacker for encoded block chains.
//!
//! Each run serializes as one opcode byte (top nibble = opcode family,
//! bottom nibble = run length), optionally one extra length byte for the
//! long forms, family-specific metadata, then per-member pixel data.
//! Sub-palette pixel indices pack MSB-first in raster order.

use crate::error::{Error, Result};

/// Opcode families a chain entry can carry.
///
/// `SolidSep` is decodable for forward compatibility but never produced
/// by the decision engine, and the encoder never emits the RAW long form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Copy the block at the same position from the previous frame.
    Skip,
    /// Repeat the previously reconstructed block.
    Repeat,
    /// Fill every pixel with one palette color shared by the run.
    Solid,
    /// Fill with one palette color per run member.
    SolidSep,
    /// Fresh 2-color sub-palette, 1 bit per pixel.
    Pal2,
    /// Cached 2-color sub-palette referenced by slot id.
    Pal2Cache,
    /// Fresh 4-color sub-palette, 2 bits per pixel.
    Pal4,
    /// Cached 4-color sub-palette referenced by slot id.
    Pal4Cache,
    /// Fresh 8-color sub-palette, 3 bits per pixel.
    Pal8,
    /// Cached 8-color sub-palette referenced by slot id.
    Pal8Cache,
    /// All 16 palette indices stored verbatim.
    Raw,
}

impl RunKind {
    /// The short-form opcode byte with a zero count nibble.
    #[inline]
    pub fn base_opcode(self) -> u8 {
        match self {
            RunKind::Skip => 0x00,
            RunKind::Repeat => 0x20,
            RunKind::Solid => 0x40,
            RunKind::SolidSep => 0x60,
            RunKind::Pal2 => 0x80,
            RunKind::Pal2Cache => 0x90,
            RunKind::Pal4 => 0xA0,
            RunKind::Pal4Cache => 0xB0,
            RunKind::Pal8 => 0xC0,
            RunKind::Pal8Cache => 0xD0,
            RunKind::Raw => 0xE0,
        }
    }

    /// Whether a long (12-bit count) form exists for this family.
    #[inline]
    pub fn has_long_form(self) -> bool {
        matches!(
            self,
            RunKind::Skip | RunKind::Repeat | RunKind::Solid | RunKind::SolidSep | RunKind::Raw
        )
    }

    /// Largest run count the wire format can express for this family.
    #[inline]
    pub fn max_count(self) -> usize {
        if self.has_long_form() {
            4096
        } else {
            16
        }
    }

    /// Shared metadata bytes carried by the first member of a run.
    ///
    /// `SolidSep` is the exception handled separately: it carries one
    /// color byte per member instead of shared metadata.
    #[inline]
    pub fn metadata_len(self) -> usize {
        match self {
            RunKind::Skip | RunKind::Repeat | RunKind::SolidSep | RunKind::Raw => 0,
            RunKind::Solid | RunKind::Pal2Cache | RunKind::Pal4Cache | RunKind::Pal8Cache => 1,
            RunKind::Pal2 => 2,
            RunKind::Pal4 => 4,
            RunKind::Pal8 => 8,
        }
    }

    /// Packed pixel-data bytes per run member.
    #[inline]
    pub fn member_bytes(self) -> usize {
        match self {
            RunKind::Pal2 | RunKind::Pal2Cache => 2,
            RunKind::Pal4 | RunKind::Pal4Cache => 4,
            RunKind::Pal8 | RunKind::Pal8Cache => 6,
            RunKind::Raw => 16,
            _ => 0,
        }
    }

    /// Size of the sub-palette this family decodes through, if any.
    #[inline]
    pub fn subpal_size(self) -> Option<usize> {
        match self {
            RunKind::Pal2 | RunKind::Pal2Cache => Some(2),
            RunKind::Pal4 | RunKind::Pal4Cache => Some(4),
            RunKind::Pal8 | RunKind::Pal8Cache => Some(8),
            _ => None,
        }
    }

    /// True for the cached sub-palette variants.
    #[inline]
    pub fn is_cached_pal(self) -> bool {
        matches!(
            self,
            RunKind::Pal2Cache | RunKind::Pal4Cache | RunKind::Pal8Cache
        )
    }

    /// True for the fresh sub-palette variants.
    #[inline]
    pub fn is_fresh_pal(self) -> bool {
        matches!(self, RunKind::Pal2 | RunKind::Pal4 | RunKind::Pal8)
    }

    fn from_nibble(nibble: u8) -> (RunKind, bool) {
        match nibble {
            0x0 => (RunKind::Skip, false),
            0x1 => (RunKind::Skip, true),
            0x2 => (RunKind::Repeat, false),
            0x3 => (RunKind::Repeat, true),
            0x4 => (RunKind::Solid, false),
            0x5 => (RunKind::Solid, true),
            0x6 => (RunKind::SolidSep, false),
            0x7 => (RunKind::SolidSep, true),
            0x8 => (RunKind::Pal2, false),
            0x9 => (RunKind::Pal2Cache, false),
            0xA => (RunKind::Pal4, false),
            0xB => (RunKind::Pal4Cache, false),
            0xC => (RunKind::Pal8, false),
            0xD => (RunKind::Pal8Cache, false),
            0xE => (RunKind::Raw, false),
            0xF => (RunKind::Raw, true),
            _ => unreachable!(),
        }
    }
}

/// One chain entry: at least one consecutive block sharing an opcode and
/// (for most families) metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    /// Opcode family of every member.
    pub kind: RunKind,
    /// Number of blocks the run covers; at least 1.
    pub count: usize,
    /// Shared metadata (palette indices or a cache slot id). For
    /// `SolidSep` this holds one color byte per member instead.
    pub metadata: Vec<u8>,
    /// Per-member local pixel indices, one array per member, for the
    /// sub-palette and raw families; empty otherwise.
    pub pixel_data: Vec<[u8; 16]>,
}

/// Pack 16 one-bit values into 2 bytes, MSB-first.
#[inline]
pub fn pack_indices2(pixels: &[u8; 16]) -> [u8; 2] {
    pack_bits::<2>(pixels, 1)
}

/// Unpack 2 bytes into 16 one-bit values.
#[inline]
pub fn unpack_indices2(bytes: &[u8; 2]) -> [u8; 16] {
    unpack_bits(bytes, 1)
}

/// Pack 16 two-bit values into 4 bytes, MSB-first.
#[inline]
pub fn pack_indices4(pixels: &[u8; 16]) -> [u8; 4] {
    pack_bits::<4>(pixels, 2)
}

/// Unpack 4 bytes into 16 two-bit values.
#[inline]
pub fn unpack_indices4(bytes: &[u8; 4]) -> [u8; 16] {
    unpack_bits(bytes, 2)
}

/// Pack 16 three-bit values into 6 bytes, MSB-first.
#[inline]
pub fn pack_indices8(pixels: &[u8; 16]) -> [u8; 6] {
    pack_bits::<6>(pixels, 3)
}

/// Unpack 6 bytes into 16 three-bit values.
#[inline]
pub fn unpack_indices8(bytes: &[u8; 6]) -> [u8; 16] {
    unpack_bits(bytes, 3)
}

fn pack_bits<const N: usize>(pixels: &[u8; 16], bits: u32) -> [u8; N] {
    let mask = (1u32 << bits) - 1;
    let mut out = [0u8; N];
    let mut acc = 0u32;
    let mut filled = 0u32;
    let mut oi = 0;
    for &px in pixels {
        acc = (acc << bits) | (u32::from(px) & mask);
        filled += bits;
        while filled >= 8 {
            filled -= 8;
            out[oi] = (acc >> filled) as u8;
            oi += 1;
        }
    }
    debug_assert_eq!(oi, N);
    out
}

fn unpack_bits(bytes: &[u8], bits: u32) -> [u8; 16] {
    let mask = (1u32 << bits) - 1;
    let mut out = [0u8; 16];
    let mut acc = 0u32;
    let mut filled = 0u32;
    let mut bi = 0;
    for px in out.iter_mut() {
        while filled < bits {
            acc = (acc << 8) | u32::from(bytes[bi]);
            bi += 1;
            filled += 8;
        }
        filled -= bits;
        *px = ((acc >> filled) & mask) as u8;
    }
    out
}

fn write_header(out: &mut Vec<u8>, kind: RunKind, count: usize, run_index: usize) -> Result<()> {
    if count == 0 || count > kind.max_count() {
        // A short-form family with count > 16 would alias into the next
        // opcode's nibble, so out-of-cap counts must never reach the wire.
        return Err(Error::RunCountOutOfRange { run_index, count });
    }
    let c = count - 1;
    if count <= 16 {
        out.push(kind.base_opcode() | c as u8);
    } else {
        out.push(kind.base_opcode() | 0x10 | ((c >> 8) as u8 & 0x0F));
        out.push((c & 0xFF) as u8);
    }
    Ok(())
}

/// Serialize a chain of runs to bytes.
///
/// Fails with [`Error::RunCountOutOfRange`] when a run's count is zero or
/// exceeds what its family's header form can express.
pub fn pack_chain(chain: &[Run]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (run_index, run) in chain.iter().enumerate() {
        write_header(&mut out, run.kind, run.count, run_index)?;
        match run.kind {
            RunKind::Skip | RunKind::Repeat => {}
            RunKind::Solid
            | RunKind::SolidSep
            | RunKind::Pal2
            | RunKind::Pal2Cache
            | RunKind::Pal4
            | RunKind::Pal4Cache
            | RunKind::Pal8
            | RunKind::Pal8Cache => out.extend_from_slice(&run.metadata),
            RunKind::Raw => {}
        }
        for member in &run.pixel_data {
            match run.kind {
                RunKind::Pal2 | RunKind::Pal2Cache => {
                    out.extend_from_slice(&pack_indices2(member));
                }
                RunKind::Pal4 | RunKind::Pal4Cache => {
                    out.extend_from_slice(&pack_indices4(member));
                }
                RunKind::Pal8 | RunKind::Pal8Cache => {
                    out.extend_from_slice(&pack_indices8(member));
                }
                RunKind::Raw => out.extend_from_slice(member),
                _ => {}
            }
        }
    }
    Ok(out)
}

/// Deserialize a byte stream back into a chain of runs.
///
/// The exact inverse of [`pack_chain`]. A truncated stream fails with the
/// index of the run being read when the bytes ran out.
pub fn unpack_chain(data: &[u8]) -> Result<Vec<Run>> {
    let mut runs = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let run_index = runs.len();
        let opcode = data[pos];
        pos += 1;
        let (kind, long) = RunKind::from_nibble(opcode >> 4);
        let count = if long {
            let extra = *data
                .get(pos)
                .ok_or(Error::TruncatedStream { run_index })?;
            pos += 1;
            ((usize::from(opcode & 0x0F) << 8) | usize::from(extra)) + 1
        } else {
            usize::from(opcode & 0x0F) + 1
        };

        let meta_len = if kind == RunKind::SolidSep {
            count
        } else {
            kind.metadata_len()
        };
        let metadata = take(data, &mut pos, meta_len, run_index)?.to_vec();

        let member_bytes = kind.member_bytes();
        let mut pixel_data = Vec::new();
        if member_bytes > 0 {
            pixel_data.reserve(count);
            for _ in 0..count {
                let bytes = take(data, &mut pos, member_bytes, run_index)?;
                let member = match kind {
                    RunKind::Pal2 | RunKind::Pal2Cache => unpack_bits(bytes, 1),
                    RunKind::Pal4 | RunKind::Pal4Cache => unpack_bits(bytes, 2),
                    RunKind::Pal8 | RunKind::Pal8Cache => unpack_bits(bytes, 3),
                    RunKind::Raw => {
                        let mut raw = [0u8; 16];
                        raw.copy_from_slice(bytes);
                        raw
                    }
                    _ => unreachable!(),
                };
                pixel_data.push(member);
            }
        }

        runs.push(Run {
            kind,
            count,
            metadata,
            pixel_data,
        });
    }
    Ok(runs)
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize, run_index: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).filter(|&e| e <= data.len());
    match end {
        Some(end) => {
            let slice = &data[*pos..end];
            *pos = end;
            Ok(slice)
        }
        None => Err(Error::TruncatedStream { run_index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack2_round_trip_exhaustive() {
        // Every possible 16-pixel 1-bit pattern.
        for bits in 0..=u16::MAX {
            let mut pixels = [0u8; 16];
            for (i, px) in pixels.iter_mut().enumerate() {
                *px = ((bits >> (15 - i)) & 1) as u8;
            }
            let packed = pack_indices2(&pixels);
            assert_eq!(packed, bits.to_be_bytes());
            assert_eq!(unpack_indices2(&packed), pixels);
        }
    }

    #[test]
    fn test_pack4_round_trip_samples() {
        let samples: [[u8; 16]; 4] = [
            [0; 16],
            [3; 16],
            [0, 1, 2, 3, 3, 2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 0],
            [1, 3, 0, 2, 2, 0, 3, 1, 3, 3, 0, 0, 1, 1, 2, 2],
        ];
        for pixels in &samples {
            assert_eq!(unpack_indices4(&pack_indices4(pixels)), *pixels);
        }
        // Walk a spread of dense patterns too.
        for seed in 0u32..512 {
            let mut pixels = [0u8; 16];
            let mut s = seed.wrapping_mul(2654435761);
            for px in pixels.iter_mut() {
                s = s.wrapping_mul(1664525).wrapping_add(1013904223);
                *px = ((s >> 13) & 3) as u8;
            }
            assert_eq!(unpack_indices4(&pack_indices4(&pixels)), pixels);
        }
    }

    #[test]
    fn test_pack8_round_trip_samples() {
        for seed in 0u32..512 {
            let mut pixels = [0u8; 16];
            let mut s = seed.wrapping_mul(2246822519);
            for px in pixels.iter_mut() {
                s = s.wrapping_mul(1664525).wrapping_add(1013904223);
                *px = ((s >> 11) & 7) as u8;
            }
            assert_eq!(unpack_indices8(&pack_indices8(&pixels)), pixels);
        }
    }

    #[test]
    fn test_msb_first_bit_order() {
        // Pixel 0 lands in the highest bits of the first byte.
        let mut pixels = [0u8; 16];
        pixels[0] = 1;
        assert_eq!(pack_indices2(&pixels), [0b1000_0000, 0]);
        let mut pixels = [0u8; 16];
        pixels[0] = 3;
        assert_eq!(pack_indices4(&pixels), [0b1100_0000, 0, 0, 0]);
        let mut pixels = [0u8; 16];
        pixels[0] = 7;
        assert_eq!(pack_indices8(&pixels), [0b1110_0000, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_short_header_counts() {
        for count in 1..=16 {
            let chain = [Run {
                kind: RunKind::Skip,
                count,
                metadata: vec![],
                pixel_data: vec![],
            }];
            let bytes = pack_chain(&chain).unwrap();
            assert_eq!(bytes, vec![(count - 1) as u8]);
            assert_eq!(unpack_chain(&bytes).unwrap(), chain);
        }
    }

    #[test]
    fn test_long_header_counts() {
        for &count in &[17usize, 256, 4095, 4096] {
            let chain = [Run {
                kind: RunKind::Solid,
                count,
                metadata: vec![7],
                pixel_data: vec![],
            }];
            let bytes = pack_chain(&chain).unwrap();
            let c = count - 1;
            assert_eq!(bytes[0], 0x50 | (c >> 8) as u8);
            assert_eq!(bytes[1], (c & 0xFF) as u8);
            assert_eq!(bytes[2], 7);
            assert_eq!(unpack_chain(&bytes).unwrap(), chain);
        }
    }

    #[test]
    fn test_out_of_cap_counts_are_rejected() {
        // PAL2 has no long form; count 17 would alias into the
        // PAL2-CACHE opcode if it ever reached the wire.
        let cases = [
            (RunKind::Pal2, 17, vec![0, 1]),
            (RunKind::Raw, 4097, vec![]),
            (RunKind::Solid, 4097, vec![3]),
            (RunKind::Skip, 0, vec![]),
        ];
        for (kind, count, metadata) in cases {
            let chain = [Run {
                kind,
                count,
                metadata,
                pixel_data: vec![],
            }];
            assert_eq!(
                pack_chain(&chain).unwrap_err(),
                Error::RunCountOutOfRange {
                    run_index: 0,
                    count
                }
            );
        }
    }

    #[test]
    fn test_pal_chain_round_trip() {
        let chain = [
            Run {
                kind: RunKind::Pal2,
                count: 2,
                metadata: vec![3, 9],
                pixel_data: vec![[0, 1, 0, 1, 1, 1, 0, 0, 0, 0, 1, 1, 1, 0, 1, 0]; 2],
            },
            Run {
                kind: RunKind::Pal4Cache,
                count: 1,
                metadata: vec![0],
                pixel_data: vec![[0, 1, 2, 3, 0, 1, 2, 3, 3, 2, 1, 0, 3, 2, 1, 0]],
            },
            Run {
                kind: RunKind::Pal8,
                count: 1,
                metadata: vec![0, 1, 2, 3, 4, 5, 6, 7],
                pixel_data: vec![[7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7]],
            },
            Run {
                kind: RunKind::Raw,
                count: 1,
                metadata: vec![],
                pixel_data: vec![[200, 1, 9, 255, 0, 3, 17, 42, 8, 8, 8, 8, 90, 91, 92, 93]],
            },
        ];
        let bytes = pack_chain(&chain).unwrap();
        assert_eq!(unpack_chain(&bytes).unwrap(), chain.to_vec());
    }

    #[test]
    fn test_solid_sep_is_decodable() {
        // Never emitted by the decision engine but valid on the wire:
        // one color byte per member.
        let chain = [Run {
            kind: RunKind::SolidSep,
            count: 3,
            metadata: vec![10, 20, 30],
            pixel_data: vec![],
        }];
        let bytes = pack_chain(&chain).unwrap();
        assert_eq!(bytes, vec![0x62, 10, 20, 30]);
        assert_eq!(unpack_chain(&bytes).unwrap(), chain);
    }

    #[test]
    fn test_truncated_metadata_reports_run_index() {
        // A SOLID opcode with its color byte missing, after one good run.
        let bytes = vec![0x00, 0x40];
        assert_eq!(
            unpack_chain(&bytes).unwrap_err(),
            Error::TruncatedStream { run_index: 1 }
        );
    }

    #[test]
    fn test_truncated_pixel_data_reports_run_index() {
        // PAL2 declaring 2 members but carrying bytes for one.
        let mut bytes = vec![0x81, 3, 9];
        bytes.extend_from_slice(&[0xFF, 0x00]);
        assert_eq!(
            unpack_chain(&bytes).unwrap_err(),
            Error::TruncatedStream { run_index: 0 }
        );
    }

    #[test]
    fn test_truncated_long_count_byte() {
        assert_eq!(
            unpack_chain(&[0x10]).unwrap_err(),
            Error::TruncatedStream { run_index: 0 }
        );
    }
}
