use crate::decode::{ByteReader, DecodeError};

const TAG_RGB: u8 = 0b1111_1110;
const TAG_RGBA: u8 = 0b1111_1111;

const MASK_TAG: u8 = 0b1100_0000;
const MASK_PAYLOAD: u8 = 0b0011_1111;
const TAG_INDEX: u8 = 0b0000_0000;
const TAG_DIFF: u8 = 0b0100_0000;
const TAG_LUMA: u8 = 0b1000_0000;
const TAG_RUN: u8 = 0b1100_0000;

/// Longest run a single RUN chunk can carry. 63 and 64 would encode as
/// `0xfe`/`0xff`, which are the RGB/RGBA tags.
pub const MAX_RUN: u8 = 62;

/// One tagged unit of a QOI body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// `QOI_OP_RGB`, alpha is carried over from the previous pixel.
    ///
    /// | 1 1 1 1 1 1 1 0 | r | g | b |
    Rgb([u8; 3]),
    /// `QOI_OP_RGBA`.
    ///
    /// | 1 1 1 1 1 1 1 1 | r | g | b | a |
    Rgba([u8; 4]),
    /// `QOI_OP_INDEX`, a slot of the color cache.
    ///
    /// | 0 0 | index (6) |
    Index(u8),
    /// `QOI_OP_DIFF`, each delta in `-2..=1`, stored with a bias of 2.
    ///
    /// | 0 1 | dr (2) | dg (2) | db (2) |
    Diff { dr: i8, dg: i8, db: i8 },
    /// `QOI_OP_LUMA`, `dg` in `-32..=31` stored with a bias of 32, the red and
    /// blue deltas relative to `dg` in `-8..=7` stored with a bias of 8.
    ///
    /// | 1 0 | dg (6) | dr - dg (4) | db - dg (4) |
    Luma { dg: i8, dr_dg: i8, db_dg: i8 },
    /// `QOI_OP_RUN`, the previous pixel repeated `1..=62` times, stored with a
    /// bias of -1.
    ///
    /// | 1 1 | run - 1 (6) |
    Run(u8),
}

impl Chunk {
    /// Reads the next chunk. The 8-bit RGB/RGBA tags are matched before the
    /// 2-bit tags.
    pub(crate) fn read(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let chunk = match reader.read_byte()? {
            TAG_RGB => Self::Rgb(reader.read_array()?),
            TAG_RGBA => Self::Rgba(reader.read_array()?),
            byte0 => match byte0 & MASK_TAG {
                TAG_INDEX => Self::Index(byte0 & MASK_PAYLOAD),
                TAG_DIFF => Self::Diff {
                    dr: ((byte0 >> 4) & 0b11) as i8 - 2,
                    dg: ((byte0 >> 2) & 0b11) as i8 - 2,
                    db: (byte0 & 0b11) as i8 - 2,
                },
                TAG_LUMA => {
                    let byte1 = reader.read_byte()?;
                    Self::Luma {
                        dg: (byte0 & MASK_PAYLOAD) as i8 - 32,
                        dr_dg: (byte1 >> 4) as i8 - 8,
                        db_dg: (byte1 & 0b1111) as i8 - 8,
                    }
                }
                // TAG_RUN, 0xfe and 0xff never get here
                _ => Self::Run((byte0 & MASK_PAYLOAD) + 1),
            },
        };
        Ok(chunk)
    }

    /// Appends the encoded chunk. Field values must be within the ranges
    /// documented on each variant.
    pub fn write_to(self, out: &mut Vec<u8>) {
        match self {
            Self::Rgb([r, g, b]) => out.extend_from_slice(&[TAG_RGB, r, g, b]),
            Self::Rgba([r, g, b, a]) => out.extend_from_slice(&[TAG_RGBA, r, g, b, a]),
            Self::Index(index) => out.push(TAG_INDEX | (index & MASK_PAYLOAD)),
            Self::Diff { dr, dg, db } => {
                debug_assert!([dr, dg, db].iter().all(|d| (-2..=1).contains(d)));
                let dr = (dr + 2) as u8;
                let dg = (dg + 2) as u8;
                let db = (db + 2) as u8;
                out.push(TAG_DIFF | (dr << 4) | (dg << 2) | db);
            }
            Self::Luma { dg, dr_dg, db_dg } => {
                debug_assert!((-32..=31).contains(&dg));
                debug_assert!((-8..=7).contains(&dr_dg) && (-8..=7).contains(&db_dg));
                let dg = (dg + 32) as u8;
                let dr_dg = (dr_dg + 8) as u8;
                let db_dg = (db_dg + 8) as u8;
                out.extend_from_slice(&[TAG_LUMA | dg, (dr_dg << 4) | db_dg]);
            }
            Self::Run(run) => {
                debug_assert!((1..=MAX_RUN).contains(&run));
                out.push(TAG_RUN | (run - 1));
            }
        }
    }

    /// Encoded length in bytes.
    pub fn encoded_len(self) -> usize {
        match self {
            Self::Rgb(_) => 4,
            Self::Rgba(_) => 5,
            Self::Luma { .. } => 2,
            Self::Index(_) | Self::Diff { .. } | Self::Run(_) => 1,
        }
    }
}
