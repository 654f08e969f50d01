//! Converts one QOI image into a PNG file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use qoi2png::{
    Compression, DEFAULT_IDAT_CHUNK_SIZE, EncodeOptions, FileStorage, FilterStrategy, FilterType,
    convert_file, derive_output_path,
};

#[derive(Debug, Parser)]
#[command(version, about = "Convert a QOI image into a PNG file")]
struct Args {
    /// QOI file to read.
    input: PathBuf,
    /// PNG file to write. Defaults to the input path with a `.png` extension.
    output: Option<PathBuf>,
    /// Scanline filter applied to every row.
    #[arg(long, value_enum, default_value_t = FilterArg::None)]
    filter: FilterArg,
    #[arg(long, value_enum, default_value_t = CompressionArg::Stored)]
    compression: CompressionArg,
    /// Largest IDAT chunk payload in bytes.
    #[arg(long, default_value_t = DEFAULT_IDAT_CHUNK_SIZE)]
    idat_size: usize,
    /// More log output. Repeat for trace level. `RUST_LOG` overrides it.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FilterArg {
    None,
    Sub,
    Up,
    Average,
    Paeth,
    /// Pick the best filter per row.
    Adaptive,
}

impl From<FilterArg> for FilterStrategy {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::None => Self::Fixed(FilterType::None),
            FilterArg::Sub => Self::Fixed(FilterType::Sub),
            FilterArg::Up => Self::Fixed(FilterType::Up),
            FilterArg::Average => Self::Fixed(FilterType::Average),
            FilterArg::Paeth => Self::Fixed(FilterType::Paeth),
            FilterArg::Adaptive => Self::Adaptive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    /// Uncompressed deflate blocks.
    Stored,
    /// LZ77 with fixed Huffman codes.
    Fast,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Stored => Self::Stored,
            CompressionArg::Fast => Self::Fast,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| derive_output_path(&args.input));
    let options = EncodeOptions {
        filter: args.filter.into(),
        compression: args.compression.into(),
        idat_chunk_size: args.idat_size,
    };

    let summary = convert_file(&FileStorage, &args.input, &output, &options).with_context(|| {
        format!(
            "failed to convert {} to {}",
            args.input.display(),
            output.display()
        )
    })?;
    println!(
        "{}: {}x{}, {} channels, {} -> {} bytes",
        output.display(),
        summary.header.width,
        summary.header.height,
        summary.header.channels.count(),
        summary.input_len,
        summary.output_len
    );
    Ok(())
}
