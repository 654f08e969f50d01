use derive_more::{Display, Error};
use log::{debug, trace, warn};

use crate::{
    Channels, ColorCache, Colorspace, Header, Pixel, PixelBuffer, QOI_END_MARKER, QOI_HEADER_LEN,
    QOI_MAGIC,
    chunk::{Chunk, MAX_RUN},
    error::ErrorKind,
};

/// Decodes a complete QOI stream. Either every pixel is recovered and the end
/// marker is intact, or an error is returned and nothing else.
pub fn decode(input: &[u8]) -> Result<(PixelBuffer, Header), DecodeError> {
    let mut reader = ByteReader::new(input);
    let header = read_header(&mut reader)?;
    let n_pixels = header.width as usize * header.height as usize;

    // A single chunk never yields more than MAX_RUN pixels, so a body too
    // short for the claimed size is rejected before allocating for it.
    let min_body = n_pixels.div_ceil(MAX_RUN as usize) + QOI_END_MARKER.len();
    if reader.remaining() < min_body {
        return Err(DecodeError::Truncated {
            offset: input.len(),
            needed: min_body - reader.remaining(),
        });
    }

    let mut decoder = Decoder::new(header);
    while decoder.pixels.len() < n_pixels {
        decoder.decode_chunk(&mut reader)?;
    }
    decoder.verify_eof_sequence(&mut reader)?;
    if reader.remaining() > 0 {
        warn!(
            "ignoring {} byte(s) after the QOI end marker",
            reader.remaining()
        );
    }
    debug!(
        "decoded {}x{} QOI image ({:?}, {:?}) from {} chunks",
        header.width, header.height, header.channels, header.colorspace, decoder.n_chunks
    );

    Ok((PixelBuffer::from_decoded(header, decoder.pixels), header))
}

/// Parses and validates only the 14 byte header.
pub fn decode_header(input: &[u8]) -> Result<Header, DecodeError> {
    read_header(&mut ByteReader::new(input))
}

/// Cursor over the input that reports truncation with the offset it
/// happened at.
#[derive(Debug, Clone)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let truncated = DecodeError::Truncated {
            offset: self.position,
            needed: N,
        };
        let bytes = self
            .data
            .get(self.position..self.position + N)
            .ok_or(truncated)?;
        self.position += N;
        let mut result = [0u8; N];
        result.copy_from_slice(bytes);
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum DecodeError {
    #[display("stream truncated at byte {offset}, {needed} more byte(s) expected")]
    Truncated { offset: usize, needed: usize },
    #[display("invalid magic {found:02x?}, expected \"qoif\"")]
    InvalidMagic { found: [u8; 4] },
    #[display("invalid channel count {found} at byte 12, expected 3 or 4")]
    InvalidChannels { found: u8 },
    #[display("invalid colorspace {found} at byte 13, expected 0 or 1")]
    InvalidColorspace { found: u8 },
    #[display("invalid end marker {found:02x?} at byte {offset}, expected 00 00 00 00 00 00 00 01")]
    InvalidEndMarker { offset: usize, found: [u8; 8] },
    #[display("run of {run} at byte {offset} exceeds the {remaining} pixel(s) left in the image")]
    RunOverflow {
        offset: usize,
        run: u8,
        remaining: usize,
    },
    #[display("image has a zero dimension ({width}x{height})")]
    ZeroDimension { width: u32, height: u32 },
    #[display("image size {width}x{height}x{channels} overflows 32 bits")]
    SizeOverflow { width: u32, height: u32, channels: u8 },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ZeroDimension { .. } | Self::SizeOverflow { .. } => ErrorKind::Size,
            _ => ErrorKind::Format,
        }
    }
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<Header, DecodeError> {
    let bytes = reader.read_array::<QOI_HEADER_LEN>()?;
    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != QOI_MAGIC {
        return Err(DecodeError::InvalidMagic { found: magic });
    }
    let width = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let height = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let channels =
        Channels::from_byte(bytes[12]).ok_or(DecodeError::InvalidChannels { found: bytes[12] })?;
    let colorspace = Colorspace::from_byte(bytes[13])
        .ok_or(DecodeError::InvalidColorspace { found: bytes[13] })?;
    let header = Header {
        width,
        height,
        channels,
        colorspace,
    };

    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimension { width, height });
    }
    if header.checked_pixel_count().is_none() {
        return Err(DecodeError::SizeOverflow {
            width,
            height,
            channels: channels as u8,
        });
    }
    trace!("QOI header: {header:?}");
    Ok(header)
}

#[derive(Debug, Clone)]
pub(crate) struct Decoder {
    pub(crate) cache: ColorCache,
    pub(crate) previous_pixel: Pixel,
    pub(crate) pixels: Vec<Pixel>,
    /// Pixel count the header promises.
    pub(crate) n_pixels: usize,
    pub(crate) n_chunks: usize,
}

impl Decoder {
    pub(crate) fn new(header: Header) -> Self {
        let n_pixels = header.width as usize * header.height as usize;
        Self {
            cache: ColorCache::new(),
            previous_pixel: Pixel::START,
            pixels: Vec::with_capacity(n_pixels),
            n_pixels,
            n_chunks: 0,
        }
    }

    /// Decodes one chunk and appends the pixels it yields.
    pub(crate) fn decode_chunk(&mut self, reader: &mut ByteReader<'_>) -> Result<(), DecodeError> {
        let offset = reader.position();
        let chunk = Chunk::read(reader)?;
        self.n_chunks += 1;
        let previous = self.previous_pixel;
        let current_pixel = match chunk {
            Chunk::Rgb([r, g, b]) => Pixel::new(r, g, b, previous.a),
            Chunk::Rgba(rgba) => Pixel::from_array(rgba),
            Chunk::Index(index) => {
                // already sits in its own slot, the cache stays as it is
                let pixel = self.cache.get(index);
                self.previous_pixel = pixel;
                self.pixels.push(pixel);
                return Ok(());
            }
            Chunk::Diff { dr, dg, db } => previous.wrapping_add_rgb(dr, dg, db),
            Chunk::Luma { dg, dr_dg, db_dg } => {
                previous.wrapping_add_rgb(dg + dr_dg, dg, dg + db_dg)
            }
            Chunk::Run(run) => {
                let remaining = self.n_pixels - self.pixels.len();
                if run as usize > remaining {
                    return Err(DecodeError::RunOverflow {
                        offset,
                        run,
                        remaining,
                    });
                }
                self.pixels
                    .extend(std::iter::repeat_n(previous, run as usize));
                return Ok(());
            }
        };
        self.cache.insert(current_pixel);
        self.previous_pixel = current_pixel;
        self.pixels.push(current_pixel);
        Ok(())
    }

    pub(crate) fn verify_eof_sequence(&self, reader: &mut ByteReader<'_>) -> Result<(), DecodeError> {
        let offset = reader.position();
        let found = reader.read_array::<8>()?;
        if found != QOI_END_MARKER {
            return Err(DecodeError::InvalidEndMarker { offset, found });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::qoi_hash;

    fn qoi_file(width: u32, height: u32, channels: u8, body: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"qoif");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[channels, 0]);
        data.extend_from_slice(body);
        data.extend_from_slice(&QOI_END_MARKER);
        data
    }

    #[test]
    fn two_rgb_literals() {
        let data = qoi_file(2, 1, 3, &[0xfe, 255, 0, 0, 0xfe, 0, 255, 0]);
        let (buffer, header) = decode(&data).unwrap();
        assert_eq!(header.channels, Channels::Rgb);
        assert_eq!(header.colorspace, Colorspace::Srgb);
        assert_eq!(
            buffer.pixels(),
            &[Pixel::new(255, 0, 0, 255), Pixel::new(0, 255, 0, 255)]
        );
    }

    #[test]
    fn buffer_takes_dimensions_from_header() {
        let data = qoi_file(3, 2, 4, &[0xfe, 7, 8, 9, 0xc4]);
        let (buffer, header) = decode(&data).unwrap();
        assert_eq!(header.channels, Channels::Rgba);
        assert_eq!((buffer.width(), buffer.height()), (3, 2));
        assert_eq!(buffer.channels(), Channels::Rgba);
        assert_eq!(buffer.pixels().len(), 6);
        assert_eq!(buffer.get(2, 1), Some(Pixel::new(7, 8, 9, 255)));
    }

    #[test]
    fn short_input_is_truncated() {
        let err = decode(b"qoif\0\0\0\x01").unwrap_err();
        assert_eq!(err, DecodeError::Truncated { offset: 0, needed: 14 });
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn wrong_magic() {
        let mut data = qoi_file(1, 1, 4, &[0xc0]);
        data[3] = b'x';
        let err = decode(&data).unwrap_err();
        assert_eq!(err, DecodeError::InvalidMagic { found: *b"qoix" });
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn header_fields_are_validated() {
        let mut data = qoi_file(1, 1, 5, &[0xc0]);
        assert_eq!(
            decode(&data).unwrap_err(),
            DecodeError::InvalidChannels { found: 5 }
        );
        data[12] = 4;
        data[13] = 2;
        assert_eq!(
            decode(&data).unwrap_err(),
            DecodeError::InvalidColorspace { found: 2 }
        );
    }

    #[test]
    fn zero_and_overflowing_dimensions_are_size_errors() {
        let err = decode(&qoi_file(0, 5, 4, &[])).unwrap_err();
        assert_eq!(err, DecodeError::ZeroDimension { width: 0, height: 5 });
        assert_eq!(err.kind(), ErrorKind::Size);

        let err = decode(&qoi_file(65536, 65536, 3, &[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Size);
    }

    #[test]
    fn body_too_short_for_dimensions() {
        // one run chunk cannot cover 63 pixels
        let data = qoi_file(63, 1, 4, &[0xfd]);
        assert!(matches!(
            decode(&data).unwrap_err(),
            DecodeError::Truncated { .. }
        ));
    }

    #[test]
    fn run_longer_than_image() {
        let data = qoi_file(2, 2, 4, &[0xc4]);
        assert_eq!(
            decode(&data).unwrap_err(),
            DecodeError::RunOverflow {
                offset: 14,
                run: 5,
                remaining: 4
            }
        );
    }

    #[test]
    fn missing_or_corrupt_end_marker() {
        let mut data = qoi_file(1, 1, 4, &[0xfe, 1, 2, 3]);
        data.pop();
        assert_eq!(
            decode(&data).unwrap_err(),
            DecodeError::Truncated {
                offset: 18,
                needed: 8
            }
        );

        let mut data = qoi_file(1, 1, 4, &[0xc0]);
        *data.last_mut().unwrap() = 2;
        assert_eq!(
            decode(&data).unwrap_err(),
            DecodeError::InvalidEndMarker {
                offset: 15,
                found: [0, 0, 0, 0, 0, 0, 0, 2]
            }
        );
    }

    #[test]
    fn trailing_bytes_after_marker_are_ignored() {
        let mut data = qoi_file(1, 1, 4, &[0xc0]);
        data.extend_from_slice(&[1, 2, 3]);
        let (buffer, _) = decode(&data).unwrap();
        assert_eq!(buffer.pixels(), &[Pixel::START]);
    }

    #[test]
    fn truncated_mid_chunk() {
        let mut data = qoi_file(10, 1, 4, &[]);
        data.truncate(QOI_HEADER_LEN);
        data.extend_from_slice(&[0xff, 1, 2, 3, 4, 0xff, 5, 6, 7, 8, 0xff]);
        assert_eq!(
            decode(&data).unwrap_err(),
            DecodeError::Truncated {
                offset: 25,
                needed: 4
            }
        );
    }

    #[test]
    fn run_at_start_repeats_opaque_black() {
        let data = qoi_file(3, 1, 3, &[0xc2]);
        let (buffer, _) = decode(&data).unwrap();
        assert_eq!(buffer.pixels(), &[Pixel::START; 3]);
    }

    #[test]
    fn rgb_literal_keeps_previous_alpha() {
        let data = qoi_file(2, 1, 4, &[0xff, 1, 2, 3, 40, 0xfe, 9, 9, 9]);
        let (buffer, _) = decode(&data).unwrap();
        assert_eq!(buffer.pixels()[1], Pixel::new(9, 9, 9, 40));
    }

    #[test]
    fn diff_and_luma_wrap_around() {
        let body = [
            0xfe, 0, 255, 1, // (0, 255, 1)
            0b01_01_11_00,   // dr -1, dg +1, db -2
            0b10_000000, 0x00, // dg -32, dr -40, db -40
        ];
        let data = qoi_file(3, 1, 3, &body);
        let (buffer, _) = decode(&data).unwrap();
        assert_eq!(
            buffer.pixels(),
            &[
                Pixel::new(0, 255, 1, 255),
                Pixel::new(255, 0, 255, 255),
                Pixel::new(215, 224, 215, 255),
            ]
        );
    }

    #[test]
    fn index_replays_cached_pixel() {
        let first = Pixel::new(10, 20, 30, 255);
        let index = qoi_hash(first) as u8;
        let body = [0xfe, 10, 20, 30, 0xfe, 1, 1, 1, index];
        let data = qoi_file(3, 1, 3, &body);
        let (buffer, _) = decode(&data).unwrap();
        assert_eq!(buffer.pixels()[2], first);
    }

    #[test]
    fn cache_holds_every_literal_diff_and_luma_pixel() {
        let body = [
            0xff, 1, 2, 3, 4, 0b01_11_10_01, 0b10_100000, 0x97, 0xfe, 200, 100, 50, 0xc1,
            0x00,
        ];
        let data = qoi_file(7, 1, 4, &body);
        let header = decode_header(&data).unwrap();
        let mut reader = ByteReader::new(&data[QOI_HEADER_LEN..]);
        let mut decoder = Decoder::new(header);
        let mut updates = 0;
        while decoder.pixels.len() < decoder.n_pixels {
            let before = decoder.cache;
            decoder.decode_chunk(&mut reader).unwrap();
            let last = *decoder.pixels.last().unwrap();
            if decoder.cache != before {
                updates += 1;
            }
            // the run and the index replay pixels that are already cached
            assert_eq!(decoder.cache.get(qoi_hash(last) as u8), last);
        }
        assert_eq!(updates, 4);
        decoder.verify_eof_sequence(&mut reader).unwrap();
    }

    #[test]
    fn run_does_not_touch_cache() {
        let header = Header {
            width: 4,
            height: 1,
            channels: Channels::Rgba,
            colorspace: Colorspace::Linear,
        };
        let mut decoder = Decoder::new(header);
        decoder
            .decode_chunk(&mut ByteReader::new(&[0xc3]))
            .unwrap();
        assert_eq!(decoder.cache, ColorCache::new());
        assert_eq!(decoder.pixels, vec![Pixel::START; 4]);
    }
}
