//! RVF container: the on-disk framing around packed frame payloads.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic "RVF" 0x03
//! u32 width, u32 height, u32 frame_count
//! f32 frame_time (seconds per frame)
//! u8 flags
//! u8 palette_len - 1, then palette_len RGB byte triples
//! per frame: u32 size, u8 flags, payload, u32 size (again)
//! ```
//!
//! The frame size counts the flags byte, the payload and the trailing
//! size word, so a player can walk frames forward or backward. Audio
//! blocks are not supported; files carrying them are rejected.

use std::fmt;
use std::io::{self, Read, Write};

use crate::error::Error;
use crate::palette::{Palette, Rgb};

/// File magic, version 3.
pub const MAGIC: [u8; 4] = [b'R', b'V', b'F', 3];

/// Header flag: payloads are packed chains rather than raw indices.
pub const COMPRESSION_FULL: u8 = 0b0000_0001;
/// Header flag: an audio block follows the palette (not supported).
pub const AUDIO_BLOCK: u8 = 0b0000_0010;
/// Header flag: interleaved audio stream (not supported).
pub const AUDIO_STREAM: u8 = 0b0000_0100;

/// Frame flag: decodes without a previous-frame reference.
pub const FRAME_IS_KEYFRAME: u8 = 0b0000_0001;
/// Frame flag: first frame of the sequence.
pub const FRAME_IS_FIRST: u8 = 0b0000_0010;
/// Frame flag: last frame of the sequence.
pub const FRAME_IS_LAST: u8 = 0b0000_0100;

/// Container-level failure.
#[derive(Debug)]
pub enum RvfError {
    /// Underlying reader or writer failed.
    Io(io::Error),
    /// The first four bytes are not the RVF magic.
    BadMagic,
    /// Magic matched but the version byte did not.
    BadVersion(u8),
    /// The file carries an audio block or stream.
    UnsupportedAudio,
    /// A frame record's leading and trailing sizes disagree, or a record
    /// is shorter than its fixed fields.
    CorruptFrame,
    /// Palette or payload data failed codec-level validation.
    Codec(Error),
}

impl fmt::Display for RvfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RvfError::Io(err) => write!(f, "i/o error: {err}"),
            RvfError::BadMagic => write!(f, "not an RVF file"),
            RvfError::BadVersion(v) => write!(f, "unsupported RVF version {v}"),
            RvfError::UnsupportedAudio => write!(f, "audio-bearing RVF files are not supported"),
            RvfError::CorruptFrame => write!(f, "corrupt frame record"),
            RvfError::Codec(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RvfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RvfError::Io(err) => Some(err),
            RvfError::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RvfError {
    fn from(err: io::Error) -> Self {
        RvfError::Io(err)
    }
}

impl From<Error> for RvfError {
    fn from(err: Error) -> Self {
        RvfError::Codec(err)
    }
}

/// Write a standalone palette file: count−1 byte, then RGB triples.
///
/// Same layout as the palette section of the container header.
pub fn write_palette<W: Write>(mut out: W, palette: &Palette) -> Result<(), RvfError> {
    out.write_all(&[(palette.len() - 1) as u8])?;
    for color in palette.colors() {
        out.write_all(&[color.r, color.g, color.b])?;
    }
    Ok(())
}

/// Read a standalone palette file written by [`write_palette`].
pub fn read_palette<R: Read>(mut input: R) -> Result<Palette, RvfError> {
    let len = usize::from(read_array::<1, _>(&mut input)?[0]) + 1;
    let mut colors = Vec::with_capacity(len);
    for _ in 0..len {
        let rgb = read_array::<3, _>(&mut input)?;
        colors.push(Rgb::new(rgb[0], rgb[1], rgb[2]));
    }
    Ok(Palette::new(colors)?)
}

/// Fixed per-file parameters stored in the header.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoHeader {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Number of frame records in the file.
    pub frame_count: u32,
    /// Seconds per frame.
    pub frame_time: f32,
    /// True when payloads are packed chains.
    pub compressed: bool,
}

/// Sequential writer for one RVF file.
pub struct RvfWriter<W: Write> {
    out: W,
}

impl<W: Write> RvfWriter<W> {
    /// Write the file header and palette, leaving the writer positioned
    /// at the first frame record.
    pub fn new(mut out: W, header: &VideoHeader, palette: &Palette) -> Result<Self, RvfError> {
        out.write_all(&MAGIC)?;
        out.write_all(&header.width.to_le_bytes())?;
        out.write_all(&header.height.to_le_bytes())?;
        out.write_all(&header.frame_count.to_le_bytes())?;
        out.write_all(&header.frame_time.to_le_bytes())?;
        let flags = if header.compressed { COMPRESSION_FULL } else { 0 };
        out.write_all(&[flags])?;
        out.write_all(&[(palette.len() - 1) as u8])?;
        for color in palette.colors() {
            out.write_all(&[color.r, color.g, color.b])?;
        }
        Ok(Self { out })
    }

    /// Append one frame record.
    pub fn write_frame(&mut self, payload: &[u8], flags: u8) -> Result<(), RvfError> {
        let size = (payload.len() + 1 + 4) as u32;
        self.out.write_all(&size.to_le_bytes())?;
        self.out.write_all(&[flags])?;
        self.out.write_all(payload)?;
        self.out.write_all(&size.to_le_bytes())?;
        Ok(())
    }

    /// Append one uncompressed frame: bare index bytes, no record
    /// framing. Only valid in files written with `compressed: false`.
    pub fn write_frame_raw(&mut self, indices: &[u8]) -> Result<(), RvfError> {
        self.out.write_all(indices)?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W, RvfError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// One frame record read back from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Frame flags (`FRAME_IS_KEYFRAME` and friends).
    pub flags: u8,
    /// Packed chain bytes (or raw indices for uncompressed files).
    pub payload: Vec<u8>,
}

/// Sequential reader for one RVF file.
pub struct RvfReader<R: Read> {
    input: R,
    header: VideoHeader,
    palette: Palette,
    frames_read: u32,
}

impl<R: Read> RvfReader<R> {
    /// Parse the header and palette.
    pub fn new(mut input: R) -> Result<Self, RvfError> {
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if magic[..3] != MAGIC[..3] {
            return Err(RvfError::BadMagic);
        }
        if magic[3] != MAGIC[3] {
            return Err(RvfError::BadVersion(magic[3]));
        }
        let width = read_u32(&mut input)?;
        let height = read_u32(&mut input)?;
        let frame_count = read_u32(&mut input)?;
        let frame_time = f32::from_le_bytes(read_array::<4, _>(&mut input)?);
        let flags = read_array::<1, _>(&mut input)?[0];
        if flags & (AUDIO_BLOCK | AUDIO_STREAM) != 0 {
            return Err(RvfError::UnsupportedAudio);
        }
        let palette_len = usize::from(read_array::<1, _>(&mut input)?[0]) + 1;
        let mut colors = Vec::with_capacity(palette_len);
        for _ in 0..palette_len {
            let rgb = read_array::<3, _>(&mut input)?;
            colors.push(Rgb::new(rgb[0], rgb[1], rgb[2]));
        }
        let palette = Palette::new(colors)?;
        Ok(Self {
            input,
            header: VideoHeader {
                width,
                height,
                frame_count,
                frame_time,
                compressed: flags & COMPRESSION_FULL != 0,
            },
            palette,
            frames_read: 0,
        })
    }

    /// The parsed file header.
    pub fn header(&self) -> &VideoHeader {
        &self.header
    }

    /// The global palette stored in the file.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Read the next frame record, or `None` past the last frame.
    ///
    /// For uncompressed files the payload is `width·height` bare index
    /// bytes and the flags are zero.
    pub fn read_frame(&mut self) -> Result<Option<FrameRecord>, RvfError> {
        if self.frames_read >= self.header.frame_count {
            return Ok(None);
        }
        if !self.header.compressed {
            let len = self.header.width as usize * self.header.height as usize;
            let mut payload = vec![0u8; len];
            self.input.read_exact(&mut payload)?;
            self.frames_read += 1;
            return Ok(Some(FrameRecord { flags: 0, payload }));
        }
        let size = read_u32(&mut self.input)? as usize;
        if size < 1 + 4 {
            return Err(RvfError::CorruptFrame);
        }
        let flags = read_array::<1, _>(&mut self.input)?[0];
        let mut payload = vec![0u8; size - 1 - 4];
        self.input.read_exact(&mut payload)?;
        let trailing = read_u32(&mut self.input)? as usize;
        if trailing != size {
            return Err(RvfError::CorruptFrame);
        }
        self.frames_read += 1;
        Ok(Some(FrameRecord { flags, payload }))
    }
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32, RvfError> {
    Ok(u32::from_le_bytes(read_array::<4, _>(input)?))
}

fn read_array<const N: usize, R: Read>(input: &mut R) -> Result<[u8; N], RvfError> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Palette {
        Palette::new(vec![
            Rgb::new(0, 0, 0),
            Rgb::new(128, 64, 32),
            Rgb::new(255, 255, 255),
        ])
        .unwrap()
    }

    fn header(frames: u32) -> VideoHeader {
        VideoHeader {
            width: 320,
            height: 240,
            frame_count: frames,
            frame_time: 1.0 / 30.0,
            compressed: true,
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut writer = RvfWriter::new(Vec::new(), &header(2), &palette()).unwrap();
        writer
            .write_frame(&[1, 2, 3], FRAME_IS_FIRST | FRAME_IS_KEYFRAME)
            .unwrap();
        writer.write_frame(&[9, 8], FRAME_IS_LAST).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = RvfReader::new(&bytes[..]).unwrap();
        assert_eq!(reader.header(), &header(2));
        assert_eq!(reader.palette().len(), 3);
        assert_eq!(reader.palette().color(1), Rgb::new(128, 64, 32));
        let first = reader.read_frame().unwrap().unwrap();
        assert_eq!(first.flags, FRAME_IS_FIRST | FRAME_IS_KEYFRAME);
        assert_eq!(first.payload, vec![1, 2, 3]);
        let last = reader.read_frame().unwrap().unwrap();
        assert_eq!(last.flags, FRAME_IS_LAST);
        assert_eq!(last.payload, vec![9, 8]);
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_size_counts_fixed_fields() {
        let mut writer = RvfWriter::new(Vec::new(), &header(1), &palette()).unwrap();
        writer.write_frame(&[0xAA; 10], 0).unwrap();
        let bytes = writer.finish().unwrap();
        // Header: 4 magic + 12 dims/count + 4 time + 1 flags + 1 + 9 palette.
        let frame = &bytes[31..];
        assert_eq!(u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]), 15);
        assert_eq!(frame[frame.len() - 4..], 15u32.to_le_bytes());
    }

    #[test]
    fn test_bad_magic_and_version() {
        assert!(matches!(
            RvfReader::new(&b"XVF\x03rest"[..]),
            Err(RvfError::BadMagic)
        ));
        assert!(matches!(
            RvfReader::new(&b"RVF\x02rest"[..]),
            Err(RvfError::BadVersion(2))
        ));
    }

    #[test]
    fn test_audio_files_are_rejected() {
        let mut writer = RvfWriter::new(Vec::new(), &header(0), &palette()).unwrap();
        writer.write_frame(&[], 0).unwrap();
        let mut bytes = writer.finish().unwrap();
        bytes[20] |= AUDIO_BLOCK;
        assert!(matches!(
            RvfReader::new(&bytes[..]),
            Err(RvfError::UnsupportedAudio)
        ));
    }

    #[test]
    fn test_palette_file_round_trip() {
        let mut bytes = Vec::new();
        write_palette(&mut bytes, &palette()).unwrap();
        assert_eq!(bytes.len(), 1 + 3 * 3);
        assert_eq!(bytes[0], 2);
        assert_eq!(read_palette(&bytes[..]).unwrap(), palette());
    }

    #[test]
    fn test_uncompressed_frames_are_bare_indices() {
        let mut h = header(2);
        h.width = 4;
        h.height = 2;
        h.compressed = false;
        let mut writer = RvfWriter::new(Vec::new(), &h, &palette()).unwrap();
        writer.write_frame_raw(&[1; 8]).unwrap();
        writer.write_frame_raw(&[2; 8]).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = RvfReader::new(&bytes[..]).unwrap();
        assert!(!reader.header().compressed);
        assert_eq!(reader.read_frame().unwrap().unwrap().payload, vec![1; 8]);
        assert_eq!(reader.read_frame().unwrap().unwrap().payload, vec![2; 8]);
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_mismatched_trailing_size_is_corrupt() {
        let mut writer = RvfWriter::new(Vec::new(), &header(1), &palette()).unwrap();
        writer.write_frame(&[5, 6, 7], 0).unwrap();
        let mut bytes = writer.finish().unwrap();
        let end = bytes.len();
        bytes[end - 4] ^= 0xFF;
        let mut reader = RvfReader::new(&bytes[..]).unwrap();
        assert!(matches!(reader.read_frame(), Err(RvfError::CorruptFrame)));
    }
}
