use derive_more::{Display, Error};
use log::debug;

use crate::{
    Channels, PixelBuffer,
    checksum::Crc32,
    deflate::{Compression, zlib_compress},
    encode::EncodeError,
    filter::{FilterStrategy, filter_scanlines},
};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Largest chunk payload, and largest image dimension, PNG allows.
pub const PNG_MAX_LEN: usize = (1 << 31) - 1;

pub const DEFAULT_IDAT_CHUNK_SIZE: usize = 8192;

const IHDR: [u8; 4] = *b"IHDR";
const IDAT: [u8; 4] = *b"IDAT";
const IEND: [u8; 4] = *b"IEND";

const BIT_DEPTH: u8 = 8;
const COLOR_TYPE_RGB: u8 = 2;
const COLOR_TYPE_RGBA: u8 = 6;

/// How a [`PixelBuffer`] gets turned into PNG bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub filter: FilterStrategy,
    pub compression: Compression,
    /// Upper bound on the payload of each IDAT chunk.
    pub idat_chunk_size: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            filter: FilterStrategy::default(),
            compression: Compression::default(),
            idat_chunk_size: DEFAULT_IDAT_CHUNK_SIZE,
        }
    }
}

/// One PNG chunk, borrowed from the stream it was read from or built for
/// writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngChunk<'a> {
    pub kind: [u8; 4],
    pub data: &'a [u8],
}

impl<'a> PngChunk<'a> {
    pub fn new(kind: [u8; 4], data: &'a [u8]) -> Self {
        Self { kind, data }
    }

    /// CRC-32 over the type tag followed by the payload.
    pub fn crc(&self) -> u32 {
        let mut crc = Crc32::new();
        crc.update(&self.kind);
        crc.update(self.data);
        crc.finish()
    }

    /// Length, type, payload, CRC. The caller keeps the payload below
    /// [`PNG_MAX_LEN`].
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.kind);
        out.extend_from_slice(self.data);
        out.extend_from_slice(&self.crc().to_be_bytes());
    }

    /// Type tag as text, for messages.
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }
}

/// Frames an already deflated image as a PNG file: signature, IHDR, the
/// zlib stream split across IDAT chunks and an empty IEND.
pub fn write_png(
    width: u32,
    height: u32,
    channels: u8,
    zlib: &[u8],
    idat_chunk_size: usize,
) -> Result<Vec<u8>, EncodeError> {
    let color_type = match Channels::from_byte(channels) {
        Some(Channels::Rgb) => COLOR_TYPE_RGB,
        Some(Channels::Rgba) => COLOR_TYPE_RGBA,
        None => return Err(EncodeError::InvalidChannels { found: channels }),
    };
    if width == 0 || height == 0 {
        return Err(EncodeError::ZeroDimension { width, height });
    }
    if width as usize > PNG_MAX_LEN || height as usize > PNG_MAX_LEN {
        return Err(EncodeError::SizeOverflow { width, height });
    }
    if !(1..=PNG_MAX_LEN).contains(&idat_chunk_size) {
        return Err(EncodeError::InvalidIdatSize {
            size: idat_chunk_size,
        });
    }

    let n_idat = zlib.len().div_ceil(idat_chunk_size).max(1);
    let mut out = Vec::with_capacity(PNG_SIGNATURE.len() + 25 + zlib.len() + n_idat * 12 + 12);
    out.extend_from_slice(&PNG_SIGNATURE);

    let mut ihdr = [0u8; 13];
    ihdr[0..4].copy_from_slice(&width.to_be_bytes());
    ihdr[4..8].copy_from_slice(&height.to_be_bytes());
    ihdr[8] = BIT_DEPTH;
    ihdr[9] = color_type;
    // compression, filter and interlace methods are all 0
    PngChunk::new(IHDR, &ihdr).write_to(&mut out);

    if zlib.is_empty() {
        PngChunk::new(IDAT, &[]).write_to(&mut out);
    }
    for piece in zlib.chunks(idat_chunk_size) {
        PngChunk::new(IDAT, piece).write_to(&mut out);
    }
    PngChunk::new(IEND, &[]).write_to(&mut out);

    debug!(
        "wrote {width}x{height} PNG (color type {color_type}), {} bytes in {n_idat} IDAT chunks",
        zlib.len()
    );
    Ok(out)
}

/// Filters, compresses and frames `buffer`.
pub fn encode_png(buffer: &PixelBuffer, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
    if !(1..=PNG_MAX_LEN).contains(&options.idat_chunk_size) {
        return Err(EncodeError::InvalidIdatSize {
            size: options.idat_chunk_size,
        });
    }
    let filtered = filter_scanlines(buffer, options.filter);
    let zlib = zlib_compress(&filtered, options.compression);
    debug!(
        "{:?} filter, {} filtered bytes, {} compressed",
        options.filter,
        filtered.len(),
        zlib.len()
    );
    write_png(
        buffer.width(),
        buffer.height(),
        buffer.channels() as u8,
        &zlib,
        options.idat_chunk_size,
    )
}

/// Malformed PNG framing found by [`read_chunks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum ChunkError {
    #[display("missing PNG signature")]
    BadSignature,
    #[display("chunk at offset {offset} is truncated")]
    Truncated { offset: usize },
    #[display("chunk at offset {offset} declares length {length} beyond 2^31-1")]
    LengthOverflow { offset: usize, length: u32 },
    #[display("CRC mismatch in chunk at offset {offset}: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        offset: usize,
        stored: u32,
        computed: u32,
    },
}

/// Walks the chunks of a PNG file in order, checking every CRC.
///
/// The signature is checked up front. Iteration stops at the end of the
/// input or at the first error.
pub fn read_chunks(png: &[u8]) -> Result<PngChunks<'_>, ChunkError> {
    let rest = png
        .strip_prefix(PNG_SIGNATURE.as_slice())
        .ok_or(ChunkError::BadSignature)?;
    Ok(PngChunks {
        data: rest,
        offset: PNG_SIGNATURE.len(),
        failed: false,
    })
}

#[derive(Debug, Clone)]
pub struct PngChunks<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> PngChunks<'a> {
    fn read_chunk(&mut self) -> Result<PngChunk<'a>, ChunkError> {
        let offset = self.offset;
        let truncated = ChunkError::Truncated { offset };
        let (length, rest) = self.data.split_first_chunk::<4>().ok_or(truncated)?;
        let length = u32::from_be_bytes(*length);
        if length as usize > PNG_MAX_LEN {
            return Err(ChunkError::LengthOverflow { offset, length });
        }
        let (kind, rest) = rest.split_first_chunk::<4>().ok_or(truncated)?;
        if rest.len() < length as usize + 4 {
            return Err(truncated);
        }
        let (data, rest) = rest.split_at(length as usize);
        let (stored, rest) = rest.split_first_chunk::<4>().ok_or(truncated)?;

        let chunk = PngChunk::new(*kind, data);
        let stored = u32::from_be_bytes(*stored);
        let computed = chunk.crc();
        if stored != computed {
            return Err(ChunkError::CrcMismatch {
                offset,
                stored,
                computed,
            });
        }
        self.offset += 12 + data.len();
        self.data = rest;
        Ok(chunk)
    }
}

impl<'a> Iterator for PngChunks<'a> {
    type Item = Result<PngChunk<'a>, ChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        let result = self.read_chunk();
        self.failed = result.is_err();
        Some(result)
    }
}
