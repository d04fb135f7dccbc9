//! Palette and color primitives.
//!
//! Everything in the codec works on indices into a single global [`Palette`].
//! Color math happens on normalized float colors; the integer form only
//! exists at the edges (palette storage, container I/O).

use crate::error::{Error, Result};

/// An 8-bit RGB color as stored in a palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    /// Red component.
    pub r: u8,
    /// Green component.
    pub g: u8,
    /// Blue component.
    pub b: u8,
}

impl Rgb {
    /// Create a color from components.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to a normalized float color.
    #[inline]
    pub fn to_float(self) -> ColorF {
        ColorF {
            r: f64::from(self.r) / 255.0,
            g: f64::from(self.g) / 255.0,
            b: f64::from(self.b) / 255.0,
        }
    }
}

/// A normalized (0..1 per channel) float color used for all comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorF {
    /// Red component, 0..1.
    pub r: f64,
    /// Green component, 0..1.
    pub g: f64,
    /// Blue component, 0..1.
    pub b: f64,
}

impl ColorF {
    /// Create a color from components.
    #[inline]
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Clamp all channels into 0..1.
    #[inline]
    pub fn normalized(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
        }
    }

    /// Euclidean distance in RGB space.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Squared Euclidean distance in RGB space.
    #[inline]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dr = self.r - other.r;
        let dg = self.g - other.g;
        let db = self.b - other.b;
        dr * dr + dg * dg + db * db
    }

    /// Rec. 601 luma of the color.
    #[inline]
    pub fn luma(self) -> f64 {
        0.299 * self.r + 0.587 * self.g + 0.114 * self.b
    }

    /// Round back to an 8-bit color, clamping out-of-range channels.
    #[inline]
    pub fn to_rgb(self) -> Rgb {
        let n = self.normalized();
        Rgb {
            r: (n.r * 255.0).round() as u8,
            g: (n.g * 255.0).round() as u8,
            b: (n.b * 255.0).round() as u8,
        }
    }
}

/// Maximum number of colors a palette can hold.
pub const MAX_PALETTE_LEN: usize = 256;

/// An ordered, index-addressed list of up to 256 colors.
///
/// Immutable for the lifetime of an encoding session. Every pixel value in
/// the codec is an index in `[0, len)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb>,
}

impl Palette {
    /// Create a palette, validating the color count.
    pub fn new(colors: Vec<Rgb>) -> Result<Self> {
        if colors.is_empty() {
            return Err(Error::EmptyPalette);
        }
        if colors.len() > MAX_PALETTE_LEN {
            return Err(Error::PaletteTooLarge(colors.len()));
        }
        Ok(Self { colors })
    }

    /// Number of colors in the palette.
    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always false; a palette is never empty once constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// The color stored at `index`.
    #[inline]
    pub fn color(&self, index: u8) -> Rgb {
        self.colors[index as usize]
    }

    /// All colors in index order.
    #[inline]
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }
}
