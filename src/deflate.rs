//! zlib (RFC 1950) wrapping of a deflate (RFC 1951) stream.
//!
//! Two block strategies are available. Stored blocks copy the payload
//! through uncompressed, 65535 bytes at a time. The fast strategy runs a
//! greedy hash-chain LZ77 matcher and writes one block with the fixed
//! Huffman codes, so no code tables have to be transmitted.

use log::debug;

use crate::checksum::Adler32;

/// CMF 0x78 (deflate, 32 KiB window) and FLG 0x01, which makes the pair a
/// multiple of 31 with no preset dictionary.
const ZLIB_HEADER: [u8; 2] = [0x78, 0x01];

const MAX_STORED: usize = 65535;

const BTYPE_STORED: u32 = 0b00;
const BTYPE_FIXED: u32 = 0b01;

const WINDOW_SIZE: usize = 1 << 15;
const HASH_BITS: u32 = 15;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 258;
/// Candidates visited per position before the matcher settles.
const MAX_CHAIN: usize = 64;
const NO_POS: u32 = u32::MAX;

const END_OF_BLOCK: u16 = 256;

/// Base length for each of the length symbols 257..=285.
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
/// Base distance for each of the distance codes 0..=29.
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Block strategy used by [`zlib_compress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// Uncompressed stored blocks.
    #[default]
    Stored,
    /// LZ77 with the fixed Huffman codes.
    Fast,
}

/// Deflates `data` and wraps it in a zlib header and Adler-32 trailer.
pub fn zlib_compress(data: &[u8], compression: Compression) -> Vec<u8> {
    let mut writer = BitWriter::with_capacity(data.len() + data.len() / MAX_STORED * 5 + 16);
    writer.write_bytes(&ZLIB_HEADER);
    match compression {
        Compression::Stored => write_stored_blocks(&mut writer, data),
        Compression::Fast => write_fixed_block(&mut writer, data),
    }
    let mut adler = Adler32::new();
    adler.update(data);
    writer.write_bytes(&adler.finish().to_be_bytes());
    let out = writer.finish();
    debug!(
        "deflated {} bytes into a {} byte zlib stream ({compression:?})",
        data.len(),
        out.len()
    );
    out
}

/// Packs bits least significant first, the order deflate reads them in.
#[derive(Debug, Default)]
struct BitWriter {
    out: Vec<u8>,
    acc: u64,
    n_bits: u32,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            acc: 0,
            n_bits: 0,
        }
    }

    /// Writes the low `count` bits of `value`, `count <= 32`.
    fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        debug_assert!(count == 32 || value >> count == 0);
        self.acc |= (value as u64) << self.n_bits;
        self.n_bits += count;
        while self.n_bits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.n_bits -= 8;
        }
    }

    /// Writes a Huffman code, which deflate stores most significant bit
    /// first.
    fn write_code(&mut self, code: u32, len: u32) {
        self.write_bits(code.reverse_bits() >> (32 - len), len);
    }

    /// Pads with zero bits up to the next byte boundary.
    fn align(&mut self) {
        if self.n_bits > 0 {
            self.out.push(self.acc as u8);
            self.acc = 0;
            self.n_bits = 0;
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.n_bits, 0);
        self.out.extend_from_slice(bytes);
    }

    fn finish(mut self) -> Vec<u8> {
        self.align();
        self.out
    }
}

/// An empty payload still gets one (empty) final block.
fn write_stored_blocks(writer: &mut BitWriter, data: &[u8]) {
    let mut blocks = data.chunks(MAX_STORED).peekable();
    if blocks.peek().is_none() {
        write_stored_block(writer, &[], true);
        return;
    }
    while let Some(block) = blocks.next() {
        write_stored_block(writer, block, blocks.peek().is_none());
    }
}

fn write_stored_block(writer: &mut BitWriter, block: &[u8], is_final: bool) {
    let len = block.len() as u16;
    writer.write_bits(is_final as u32, 1);
    writer.write_bits(BTYPE_STORED, 2);
    writer.align();
    writer.write_bytes(&len.to_le_bytes());
    writer.write_bytes(&(!len).to_le_bytes());
    writer.write_bytes(block);
}

/// Fixed Huffman code and its length for a literal/length symbol.
fn fixed_literal_code(symbol: u16) -> (u32, u32) {
    let symbol = symbol as u32;
    match symbol {
        0..=143 => (0x30 + symbol, 8),
        144..=255 => (0x190 + symbol - 144, 9),
        256..=279 => (symbol - 256, 7),
        _ => (0xc0 + symbol - 280, 8),
    }
}

/// Index into the base/extra tables of the last base not above `value`.
fn bucket(bases: &[u16], value: usize) -> usize {
    bases
        .iter()
        .rposition(|&base| base as usize <= value)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(u8),
    Match { length: usize, distance: usize },
}

fn write_token(writer: &mut BitWriter, token: Token) {
    match token {
        Token::Literal(byte) => {
            let (code, len) = fixed_literal_code(byte as u16);
            writer.write_code(code, len);
        }
        Token::Match { length, distance } => {
            let index = bucket(&LENGTH_BASE, length);
            let (code, len) = fixed_literal_code(257 + index as u16);
            writer.write_code(code, len);
            writer.write_bits(
                (length - LENGTH_BASE[index] as usize) as u32,
                LENGTH_EXTRA[index] as u32,
            );

            let index = bucket(&DIST_BASE, distance);
            writer.write_code(index as u32, 5);
            writer.write_bits(
                (distance - DIST_BASE[index] as usize) as u32,
                DIST_EXTRA[index] as u32,
            );
        }
    }
}

fn write_fixed_block(writer: &mut BitWriter, data: &[u8]) {
    writer.write_bits(1, 1);
    writer.write_bits(BTYPE_FIXED, 2);
    let mut matcher = Matcher::new(data);
    let mut n_matches = 0usize;
    while let Some(token) = matcher.next_token() {
        if matches!(token, Token::Match { .. }) {
            n_matches += 1;
        }
        write_token(writer, token);
    }
    let (code, len) = fixed_literal_code(END_OF_BLOCK);
    writer.write_code(code, len);
    writer.align();
    debug!("fixed block: {n_matches} back-references");
}

/// Greedy LZ77 over a 32 KiB window. `head` maps a 3-byte hash to the most
/// recent position, `prev` chains each position to the previous one with the
/// same hash.
struct Matcher<'a> {
    data: &'a [u8],
    pos: usize,
    head: Vec<u32>,
    prev: Vec<u32>,
}

impl<'a> Matcher<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            head: vec![NO_POS; 1 << HASH_BITS],
            prev: vec![NO_POS; WINDOW_SIZE],
        }
    }

    fn hash(&self, pos: usize) -> usize {
        let bytes = &self.data[pos..pos + MIN_MATCH];
        let h = ((bytes[0] as u32) << 10) ^ ((bytes[1] as u32) << 5) ^ bytes[2] as u32;
        (h & ((1 << HASH_BITS) - 1)) as usize
    }

    fn insert(&mut self, pos: usize) {
        if pos + MIN_MATCH > self.data.len() {
            return;
        }
        let h = self.hash(pos);
        self.prev[pos % WINDOW_SIZE] = self.head[h];
        self.head[h] = pos as u32;
    }

    fn longest_match(&self) -> Option<(usize, usize)> {
        let pos = self.pos;
        if pos + MIN_MATCH > self.data.len() {
            return None;
        }
        let max_len = (self.data.len() - pos).min(MAX_MATCH);
        let mut best: Option<(usize, usize)> = None;
        let mut candidate = self.head[self.hash(pos)];
        let mut chain = MAX_CHAIN;
        while candidate != NO_POS && chain > 0 {
            let start = candidate as usize;
            let distance = pos - start;
            if distance > WINDOW_SIZE {
                break;
            }
            let length = self.data[start..]
                .iter()
                .zip(&self.data[pos..pos + max_len])
                .take_while(|(a, b)| a == b)
                .count();
            if length >= MIN_MATCH && best.is_none_or(|(best_len, _)| length > best_len) {
                best = Some((length, distance));
                if length == max_len {
                    break;
                }
            }
            candidate = self.prev[start % WINDOW_SIZE];
            chain -= 1;
        }
        best
    }

    fn next_token(&mut self) -> Option<Token> {
        if self.pos >= self.data.len() {
            return None;
        }
        let token = match self.longest_match() {
            Some((length, distance)) => {
                for pos in self.pos..self.pos + length {
                    self.insert(pos);
                }
                self.pos += length;
                Token::Match { length, distance }
            }
            None => {
                let byte = self.data[self.pos];
                self.insert(self.pos);
                self.pos += 1;
                Token::Literal(byte)
            }
        };
        Some(token)
    }
}
