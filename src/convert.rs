use std::path::{Path, PathBuf};

use log::info;

use crate::{EncodeOptions, Error, Header, Storage, decode, encode_png};

/// What [`convert_file`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSummary {
    pub header: Header,
    pub input_len: usize,
    pub output_len: usize,
}

/// Decodes a QOI stream and encodes it as PNG.
pub fn qoi_to_png(input: &[u8], options: &EncodeOptions) -> Result<Vec<u8>, Error> {
    let (buffer, _) = decode(input)?;
    Ok(encode_png(&buffer, options)?)
}

/// Reads `input` through `storage`, converts it and writes the PNG to
/// `output`. Nothing is written when decoding fails.
pub fn convert_file(
    storage: &impl Storage,
    input: &Path,
    output: &Path,
    options: &EncodeOptions,
) -> Result<ConvertSummary, Error> {
    let qoi = storage.read_all_bytes(input).map_err(|source| Error::Io {
        path: input.to_path_buf(),
        source,
    })?;
    let (buffer, header) = decode(&qoi)?;
    let png = encode_png(&buffer, options)?;
    storage
        .write_all_bytes(output, &png)
        .map_err(|source| Error::Io {
            path: output.to_path_buf(),
            source,
        })?;
    info!(
        "{} -> {}: {}x{} {:?}, {} -> {} bytes",
        input.display(),
        output.display(),
        header.width,
        header.height,
        header.channels,
        qoi.len(),
        png.len()
    );
    Ok(ConvertSummary {
        header,
        input_len: qoi.len(),
        output_len: png.len(),
    })
}

/// `input` with its extension replaced by `png`.
pub fn derive_output_path(input: &Path) -> PathBuf {
    input.with_extension("png")
}
