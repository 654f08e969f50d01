use log::trace;

use crate::PixelBuffer;

/// PNG filter method 0 filter types, written as the first byte of each
/// scanline.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterType {
    #[default]
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl FilterType {
    pub const ALL: [Self; 5] = [Self::None, Self::Sub, Self::Up, Self::Average, Self::Paeth];

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Appends `row` filtered against `prev`, the unfiltered row above (all
    /// zero for the first row). `bpp` is the distance to the byte on the
    /// left, i.e. bytes per pixel.
    pub fn apply(self, row: &[u8], prev: &[u8], bpp: usize, out: &mut Vec<u8>) {
        debug_assert_eq!(row.len(), prev.len());
        let left = |i: usize| if i >= bpp { row[i - bpp] } else { 0 };
        let up_left = |i: usize| if i >= bpp { prev[i - bpp] } else { 0 };
        match self {
            Self::None => out.extend_from_slice(row),
            Self::Sub => out.extend(
                row.iter()
                    .enumerate()
                    .map(|(i, &x)| x.wrapping_sub(left(i))),
            ),
            Self::Up => out.extend(row.iter().zip(prev).map(|(&x, &b)| x.wrapping_sub(b))),
            Self::Average => out.extend(row.iter().enumerate().map(|(i, &x)| {
                let average = (left(i) as u16 + prev[i] as u16) / 2;
                x.wrapping_sub(average as u8)
            })),
            Self::Paeth => out.extend(
                row.iter()
                    .enumerate()
                    .map(|(i, &x)| x.wrapping_sub(paeth(left(i), prev[i], up_left(i)))),
            ),
        }
    }
}

/// How each scanline's filter type is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStrategy {
    /// The same filter for every row.
    Fixed(FilterType),
    /// Per row, the filter whose output has the smallest sum of absolute
    /// values when read as signed bytes.
    Adaptive,
}

impl Default for FilterStrategy {
    fn default() -> Self {
        Self::Fixed(FilterType::None)
    }
}

/// The Paeth predictor: whichever of left, up and upper-left is closest to
/// `left + up - up_left`, ties resolved in that order.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn score(filtered: &[u8]) -> u64 {
    filtered
        .iter()
        .map(|&x| (x as i8).unsigned_abs() as u64)
        .sum()
}

/// Produces the bytes that go into the zlib stream: every row packed at the
/// buffer's channel count and prefixed with its filter type.
pub fn filter_scanlines(buffer: &PixelBuffer, strategy: FilterStrategy) -> Vec<u8> {
    let bpp = buffer.channels().count();
    let row_len = buffer.row_bytes();
    let mut out = Vec::with_capacity((row_len + 1) * buffer.height() as usize);
    let mut prev = vec![0u8; row_len];
    let mut current = Vec::with_capacity(row_len);
    let mut candidate = Vec::with_capacity(row_len);
    let mut best = Vec::with_capacity(row_len);
    let mut used = [0usize; 5];

    for row in buffer.rows() {
        current.clear();
        buffer.pack_row(row, &mut current);
        match strategy {
            FilterStrategy::Fixed(filter) => {
                out.push(filter as u8);
                filter.apply(&current, &prev, bpp, &mut out);
                used[filter as usize] += 1;
            }
            FilterStrategy::Adaptive => {
                let mut best_filter = FilterType::None;
                let mut best_score = u64::MAX;
                for filter in FilterType::ALL {
                    candidate.clear();
                    filter.apply(&current, &prev, bpp, &mut candidate);
                    let candidate_score = score(&candidate);
                    if candidate_score < best_score {
                        best_score = candidate_score;
                        best_filter = filter;
                        std::mem::swap(&mut best, &mut candidate);
                    }
                }
                out.push(best_filter as u8);
                out.extend_from_slice(&best);
                used[best_filter as usize] += 1;
            }
        }
        std::mem::swap(&mut prev, &mut current);
    }
    trace!("filter usage (none, sub, up, average, paeth): {used:?}");
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Channels, Pixel};

    /// Undoes one filtered row, the way a PNG reader does.
    fn unfilter(filter: FilterType, row: &mut [u8], prev: &[u8], bpp: usize) {
        for i in 0..row.len() {
            let a = if i >= bpp { row[i - bpp] } else { 0 };
            let b = prev[i];
            let c = if i >= bpp { prev[i - bpp] } else { 0 };
            let predictor = match filter {
                FilterType::None => 0,
                FilterType::Sub => a,
                FilterType::Up => b,
                FilterType::Average => ((a as u16 + b as u16) / 2) as u8,
                FilterType::Paeth => paeth(a, b, c),
            };
            row[i] = row[i].wrapping_add(predictor);
        }
    }

    fn reconstruct(filtered: &[u8], row_len: usize, bpp: usize) -> Vec<u8> {
        let mut prev = vec![0u8; row_len];
        let mut raw = Vec::new();
        for line in filtered.chunks_exact(row_len + 1) {
            let filter = FilterType::from_byte(line[0]).unwrap();
            let mut row = line[1..].to_vec();
            unfilter(filter, &mut row, &prev, bpp);
            raw.extend_from_slice(&row);
            prev = row;
        }
        raw
    }

    fn noisy_buffer(width: u32, height: u32, channels: Channels) -> PixelBuffer {
        let mut seed = 0x2545_f491u32;
        let pixels = (0..width * height)
            .map(|i| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let [r, g, b, a] = seed.to_le_bytes();
                // mix in a gradient so that the predictors have something
                // to work with
                Pixel::new((r / 8).wrapping_add(i as u8), g / 4, b, a | 0x80)
            })
            .collect();
        PixelBuffer::new(width, height, channels, pixels).unwrap()
    }

    #[test]
    fn paeth_predictor() {
        assert_eq!(paeth(0, 0, 0), 0);
        assert_eq!(paeth(10, 20, 10), 20);
        assert_eq!(paeth(20, 10, 10), 20);
        assert_eq!(paeth(10, 10, 20), 10);
        assert_eq!(paeth(100, 50, 200), 50);
    }

    #[test]
    fn none_filter_layout() {
        let buffer = PixelBuffer::from_raw(2, 2, 3, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]).unwrap();
        let filtered = filter_scanlines(&buffer, FilterStrategy::default());
        assert_eq!(
            filtered,
            vec![0, 1, 2, 3, 4, 5, 6, 0, 7, 8, 9, 10, 11, 12]
        );
    }

    #[test]
    fn every_filter_reconstructs_the_image() {
        for channels in [Channels::Rgb, Channels::Rgba] {
            let buffer = noisy_buffer(7, 5, channels);
            let raw = buffer.to_raw();
            let mut strategies: Vec<_> = FilterType::ALL.map(FilterStrategy::Fixed).to_vec();
            strategies.push(FilterStrategy::Adaptive);
            for strategy in strategies {
                let filtered = filter_scanlines(&buffer, strategy);
                assert_eq!(filtered.len(), 5 * (1 + buffer.row_bytes()));
                assert_eq!(
                    reconstruct(&filtered, buffer.row_bytes(), channels.count()),
                    raw,
                    "{strategy:?} on {channels:?}"
                );
            }
        }
    }

    #[test]
    fn adaptive_prefers_up_for_repeated_rows() {
        let row = [10, 200, 37, 90, 3, 250];
        let mut data = row.to_vec();
        data.extend_from_slice(&row);
        let buffer = PixelBuffer::from_raw(2, 2, 3, &data).unwrap();
        let filtered = filter_scanlines(&buffer, FilterStrategy::Adaptive);
        assert_eq!(filtered[7], FilterType::Up as u8);
        assert!(filtered[8..].iter().all(|&x| x == 0));
    }

    #[test]
    fn sub_filter_on_flat_row() {
        let buffer = PixelBuffer::from_raw(3, 1, 4, &[5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5]).unwrap();
        let filtered = filter_scanlines(&buffer, FilterStrategy::Fixed(FilterType::Sub));
        assert_eq!(filtered, vec![1, 5, 5, 5, 5, 0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
