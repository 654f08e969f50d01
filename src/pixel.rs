use crate::{Channels, Header, encode::EncodeError};

/// One RGBA pixel. Decoded images are always held with four components, the
/// original channel count lives next to them in [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    /// Previous pixel at the start of every QOI stream.
    pub const START: Self = Self::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn from_array([r, g, b, a]: [u8; 4]) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Adds signed deltas to the color channels modulo 256, alpha untouched.
    pub fn wrapping_add_rgb(self, dr: i8, dg: i8, db: i8) -> Self {
        Self {
            r: self.r.wrapping_add_signed(dr),
            g: self.g.wrapping_add_signed(dg),
            b: self.b.wrapping_add_signed(db),
            a: self.a,
        }
    }
}

impl From<[u8; 4]> for Pixel {
    fn from(rgba: [u8; 4]) -> Self {
        Self::from_array(rgba)
    }
}

/// Row-major pixels of one image plus its dimensions and original channel
/// count. `pixels.len() == width * height` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    pixels: Vec<Pixel>,
}

impl PixelBuffer {
    pub fn new(
        width: u32,
        height: u32,
        channels: Channels,
        pixels: Vec<Pixel>,
    ) -> Result<Self, EncodeError> {
        if width == 0 || height == 0 {
            return Err(EncodeError::ZeroDimension { width, height });
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or(EncodeError::SizeOverflow { width, height })?;
        if pixels.len() != expected {
            return Err(EncodeError::BufferLength {
                expected,
                found: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Wraps decoder output. The header was validated when it was read and
    /// the decoder stops at exactly `width * height` pixels.
    pub(crate) fn from_decoded(header: Header, pixels: Vec<Pixel>) -> Self {
        debug_assert!(header.width > 0 && header.height > 0);
        debug_assert_eq!(
            pixels.len(),
            header.width as usize * header.height as usize
        );
        Self {
            width: header.width,
            height: header.height,
            channels: header.channels,
            pixels,
        }
    }

    /// Builds a buffer from packed 8-bit samples, `channels` bytes per pixel.
    /// RGB input gets an opaque alpha.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: &[u8],
    ) -> Result<Self, EncodeError> {
        let channels =
            Channels::from_byte(channels).ok_or(EncodeError::InvalidChannels { found: channels })?;
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels.count()))
            .ok_or(EncodeError::SizeOverflow { width, height })?;
        if data.len() != expected {
            return Err(EncodeError::BufferLength {
                expected,
                found: data.len(),
            });
        }
        let pixels = match channels {
            Channels::Rgb => data
                .chunks_exact(3)
                .map(|x| Pixel::new(x[0], x[1], x[2], 255))
                .collect(),
            Channels::Rgba => data
                .chunks_exact(4)
                .map(|x| Pixel::new(x[0], x[1], x[2], x[3]))
                .collect(),
        };
        Self::new(width, height, channels, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<Pixel> {
        self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[Pixel]> {
        self.pixels.chunks_exact(self.width as usize)
    }

    /// Number of bytes in one unfiltered scanline at the original channel
    /// count.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.channels.count()
    }

    /// Packs one row into `out` at the original channel count, dropping
    /// alpha for RGB images.
    pub(crate) fn pack_row(&self, row: &[Pixel], out: &mut Vec<u8>) {
        match self.channels {
            Channels::Rgb => {
                for p in row {
                    out.extend_from_slice(&[p.r, p.g, p.b]);
                }
            }
            Channels::Rgba => {
                for p in row {
                    out.extend_from_slice(&p.to_array());
                }
            }
        }
    }

    /// All samples packed at the original channel count.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.pixels.len() * self.channels.count());
        for row in self.rows() {
            self.pack_row(row, &mut data);
        }
        data
    }
}
