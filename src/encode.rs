use std::iter::Peekable;

use derive_more::{Display, Error};

use crate::{
    ColorCache, Colorspace, Header, Pixel, PixelBuffer, QOI_END_MARKER, QOI_HEADER_LEN, QOI_MAGIC,
    chunk::{Chunk, MAX_RUN},
    error::ErrorKind,
};

/// Rejected encoder input. These are all caller mistakes, never problems in
/// decoded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum EncodeError {
    #[display("invalid channel count {found}, expected 3 or 4")]
    InvalidChannels { found: u8 },
    #[display("image has a zero dimension ({width}x{height})")]
    ZeroDimension { width: u32, height: u32 },
    #[display("pixel data has {found} entries, expected {expected}")]
    BufferLength { expected: usize, found: usize },
    #[display("image size {width}x{height} is too large to encode")]
    SizeOverflow { width: u32, height: u32 },
    #[display("IDAT chunk size {size} is outside 1..=2147483647")]
    InvalidIdatSize { size: usize },
}

impl EncodeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

/// Encodes a buffer as a QOI stream, header and end marker included.
pub fn encode(buffer: &PixelBuffer, colorspace: Colorspace) -> Result<Vec<u8>, EncodeError> {
    let header = Header {
        width: buffer.width(),
        height: buffer.height(),
        channels: buffer.channels(),
        colorspace,
    };
    if header.checked_pixel_count().is_none() {
        return Err(EncodeError::SizeOverflow {
            width: header.width,
            height: header.height,
        });
    }

    let mut output = Vec::with_capacity(QOI_HEADER_LEN + buffer.pixels().len() + QOI_END_MARKER.len());
    let mut encoder = EncoderState::new(header, &mut output);
    encoder.encode_header();
    let mut pixels = buffer.pixels().iter().copied().peekable();
    while let Some(pixel) = pixels.next() {
        encoder.encode_chunk(pixel, &mut pixels);
    }
    encoder.finish();
    Ok(output)
}

/// Convenience function that builds the [`PixelBuffer`] and calls `encode`.
pub fn encode_raw(
    width: u32,
    height: u32,
    channels: u8,
    colorspace: Colorspace,
    data: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    let buffer = PixelBuffer::from_raw(width, height, channels, data)?;
    encode(&buffer, colorspace)
}

#[derive(Debug)]
pub(crate) struct EncoderState<'a> {
    pub(crate) header: Header,
    pub(crate) cache: ColorCache,
    pub(crate) previous_pixel: Pixel,
    pub(crate) output: &'a mut Vec<u8>,
}

impl<'a> EncoderState<'a> {
    pub(crate) fn new(header: Header, output: &'a mut Vec<u8>) -> Self {
        Self {
            header,
            cache: ColorCache::new(),
            previous_pixel: Pixel::START,
            output,
        }
    }

    pub(crate) fn encode_header(&mut self) {
        self.output.extend_from_slice(&QOI_MAGIC);
        self.output.extend_from_slice(&self.header.width.to_be_bytes());
        self.output.extend_from_slice(&self.header.height.to_be_bytes());
        self.output.push(self.header.channels as u8);
        self.output.push(self.header.colorspace as u8);
    }

    /// Emits the chunk for `pixel`, swallowing following pixels into a run
    /// when they repeat it.
    pub(crate) fn encode_chunk(
        &mut self,
        pixel: Pixel,
        pixels: &mut Peekable<impl Iterator<Item = Pixel>>,
    ) -> Chunk {
        let chunk = self.select_chunk(pixel, pixels);
        chunk.write_to(self.output);
        chunk
    }

    fn select_chunk(
        &mut self,
        pixel: Pixel,
        pixels: &mut Peekable<impl Iterator<Item = Pixel>>,
    ) -> Chunk {
        if pixel == self.previous_pixel {
            let mut run = 1;
            while run < MAX_RUN && pixels.next_if_eq(&pixel).is_some() {
                run += 1;
            }
            return Chunk::Run(run);
        }

        let chunk = if let Some(index) = self.cache.find(pixel) {
            Chunk::Index(index)
        } else if pixel.a != self.previous_pixel.a {
            // every other op requires the alpha to carry over
            Chunk::Rgba(pixel.to_array())
        } else {
            self.try_diff(pixel)
                .or_else(|| self.try_luma(pixel))
                .unwrap_or(Chunk::Rgb([pixel.r, pixel.g, pixel.b]))
        };
        // the decoder only caches pixels it builds from a literal or delta
        if !matches!(chunk, Chunk::Index(_)) {
            self.cache.insert(pixel);
        }
        self.previous_pixel = pixel;
        chunk
    }

    fn deltas(&self, pixel: Pixel) -> (i8, i8, i8) {
        let previous = self.previous_pixel;
        (
            pixel.r.wrapping_sub(previous.r) as i8,
            pixel.g.wrapping_sub(previous.g) as i8,
            pixel.b.wrapping_sub(previous.b) as i8,
        )
    }

    fn try_diff(&self, pixel: Pixel) -> Option<Chunk> {
        let (dr, dg, db) = self.deltas(pixel);
        let in_range = |d: i8| (-2..=1).contains(&d);
        (in_range(dr) && in_range(dg) && in_range(db)).then_some(Chunk::Diff { dr, dg, db })
    }

    fn try_luma(&self, pixel: Pixel) -> Option<Chunk> {
        let (dr, dg, db) = self.deltas(pixel);
        let dr_dg = dr.checked_sub(dg)?;
        let db_dg = db.checked_sub(dg)?;
        let in_range = (-32..=31).contains(&dg)
            && (-8..=7).contains(&dr_dg)
            && (-8..=7).contains(&db_dg);
        in_range.then_some(Chunk::Luma { dg, dr_dg, db_dg })
    }

    pub(crate) fn finish(self) {
        self.output.extend_from_slice(&QOI_END_MARKER);
    }
}
