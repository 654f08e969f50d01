//! Converts QOI images into PNG files.
//!
//! The QOI stream is decoded into a [`PixelBuffer`], which is then filtered,
//! deflated and framed as PNG chunks. Nothing in here touches the file system
//! except through a [`Storage`] implementation handed in by the caller.

mod cache;
mod checksum;
mod chunk;
mod convert;
mod decode;
mod deflate;
mod encode;
mod error;
mod filter;
mod pixel;
mod png;
mod storage;

pub use cache::ColorCache;
pub use checksum::{Adler32, Crc32, adler32, crc32};
pub use chunk::Chunk;
pub use convert::*;
pub use decode::*;
pub use deflate::{Compression, zlib_compress};
pub use encode::*;
pub use error::{Error, ErrorKind};
pub use filter::{FilterStrategy, FilterType, filter_scanlines};
pub use pixel::{Pixel, PixelBuffer};
pub use png::*;
pub use storage::{FileStorage, MemoryStorage, Storage};

/// Length of the fixed QOI header, magic included.
pub const QOI_HEADER_LEN: usize = 14;
pub const QOI_MAGIC: [u8; 4] = *b"qoif";
pub const QOI_END_MARKER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
    pub colorspace: Colorspace,
}

impl Header {
    /// Number of pixels in the image, or `None` when `width * height *
    /// channels` does not fit in a `u32`.
    pub fn checked_pixel_count(&self) -> Option<u32> {
        let n_pixels = self.width.checked_mul(self.height)?;
        n_pixels.checked_mul(self.channels as u32)?;
        Some(n_pixels)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channels {
    #[default]
    Rgb = 3,
    Rgba = 4,
}

impl Channels {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            3 => Some(Self::Rgb),
            4 => Some(Self::Rgba),
            _ => None,
        }
    }

    pub fn count(self) -> usize {
        self as usize
    }
}

/// Carried through as metadata only, no color correction is ever applied.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colorspace {
    #[default]
    /// sRGB with linear alpha.
    Srgb = 0,
    /// All channels linear.
    Linear = 1,
}

impl Colorspace {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Srgb),
            1 => Some(Self::Linear),
            _ => None,
        }
    }
}

/// The hashing function used by QOI.
pub fn qoi_hash(pixel: Pixel) -> usize {
    let [r, g, b, a] = pixel.to_array().map(usize::from);
    (r * 3 + g * 5 + b * 7 + a * 11) % 64
}
