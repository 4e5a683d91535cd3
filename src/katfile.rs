//! Shared KAT file generation.
//!
//! ## Output layout
//!
//! ```text
//! --------------------------------------------------------------------------------
//! File Information:
//! 3 share version of 'kat/pdi.txt' with IOW = 32.
//! FIXED mask values are: 1A2B3C4D 0F0E0D0C
//! --------------------------------------------------------------------------------
//!
//! NUM = 3
//!
//! TV: 1
//! INS = 400000000000000000000000
//! HDR = 120000100000000000000000
//! DAT = ...
//! STT = ...
//!
//! ###EOF
//! ```
//!
//! The `FIXED` line is only present in fixed mode. `TV:` lines carry a
//! trailing space.

use crate::config::MaskConfig;
use crate::error::KatError;
use crate::mask::MaskSet;
use crate::record::Field;
use crate::transform::{FieldCounts, ShareEngine};
use rand_core::RngCore;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const RULE_WIDTH: usize = 80;
pub const EOF_MARKER: &str = "###EOF";

/// Write the file-information block and the `NUM =` line.
fn write_preamble<W: Write>(
    out: &mut W,
    source: &Path,
    config: &MaskConfig,
    fixed_masks: Option<&MaskSet>,
) -> std::io::Result<()> {
    let rule = "-".repeat(RULE_WIDTH);
    writeln!(out, "{rule}")?;
    writeln!(out, "File Information:")?;
    writeln!(
        out,
        "{} share version of '{}' with IOW = {}.",
        config.shares,
        source.display(),
        config.width
    )?;
    if let Some(masks) = fixed_masks {
        writeln!(out, "FIXED mask values are: {}", masks.to_preamble_hex())?;
    }
    writeln!(out, "{rule}")?;
    writeln!(out)?;
    writeln!(out, "NUM = {}", config.shares)
}

/// Mask every field read from `reader` and write the shared file to `writer`.
///
/// `source` names the input in the preamble and in read errors; `sink` names
/// the output in write errors. The engine starts with a fresh mask draw from
/// `rng`.
pub fn mask_stream<R: BufRead, W: Write, G: RngCore>(
    reader: R,
    writer: &mut W,
    source: &Path,
    sink: &Path,
    config: &MaskConfig,
    rng: G,
) -> Result<FieldCounts, KatError> {
    let mut engine = ShareEngine::new(config, rng);
    let write_err = |e: std::io::Error| KatError::io(sink, e);

    let fixed = config.policy.is_fixed().then(|| engine.masks());
    write_preamble(writer, source, config, fixed).map_err(write_err)?;
    tracing::debug!(
        source = %source.display(),
        masks = %engine.masks().to_preamble_hex().trim_end(),
        "initial masks"
    );

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| KatError::io(source, e))?;
        let Some(field) = Field::classify(idx + 1, &line)? else {
            continue;
        };
        let rendered = engine.apply(&field)?;
        if field.kind.tag().is_none() {
            // Blank line separates vectors.
            writeln!(writer).map_err(write_err)?;
        }
        writeln!(writer, "{rendered}").map_err(write_err)?;
    }

    writeln!(writer).map_err(write_err)?;
    writeln!(writer, "{EOF_MARKER}").map_err(write_err)?;
    writer.flush().map_err(write_err)?;
    tracing::debug!(
        source = %source.display(),
        redraws = engine.state().regenerations(),
        "mask stream finished"
    );
    Ok(engine.counts())
}

/// Mask `input` into a new file at `output`.
///
/// On any error the partially written output is removed.
pub fn write_shared_file<G: RngCore>(
    input: &Path,
    output: &Path,
    config: &MaskConfig,
    rng: G,
) -> Result<FieldCounts, KatError> {
    if !input.is_file() {
        return Err(KatError::MissingInputFile {
            path: input.to_path_buf(),
        });
    }
    let reader = BufReader::new(File::open(input).map_err(|e| KatError::io(input, e))?);
    let mut writer = BufWriter::new(File::create(output).map_err(|e| KatError::io(output, e))?);

    let result = mask_stream(reader, &mut writer, input, output, config, rng);
    drop(writer);

    match result {
        Ok(counts) => {
            tracing::info!(
                input = %input.display(),
                output = %output.display(),
                vectors = counts.vectors,
                data = counts.data,
                "wrote shared KAT file"
            );
            Ok(counts)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(output) {
                tracing::warn!(output = %output.display(), error = %rm, "could not remove partial output");
            }
            Err(e)
        }
    }
}
