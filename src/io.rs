use crate::cmd::IoArgs;
use crate::error::KatError;
use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Read all input text from --in file or stdin.
pub fn read_input(io_args: &IoArgs) -> Result<String> {
    match &io_args.r#in {
        Some(path) => {
            require_inputs(&[path.as_path()])?;
            fs::read_to_string(path).with_context(|| format!("read {:?}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("read stdin")?;
            Ok(buf)
        }
    }
}

/// Write output text to --out file or stdout.
pub fn write_output(io_args: &IoArgs, data: &str) -> Result<()> {
    match &io_args.out {
        Some(path) => fs::write(path, data).with_context(|| format!("write {:?}", path)),
        None => {
            use std::io::Write;
            io::stdout().write_all(data.as_bytes()).context("write stdout")?;
            io::stdout().flush().context("flush stdout")
        }
    }
}

/// Check that every input exists, logging each missing one.
///
/// Returns `MissingInputFile` for the first missing path.
pub fn require_inputs(paths: &[&Path]) -> Result<(), KatError> {
    let missing: Vec<&Path> = paths.iter().copied().filter(|p| !p.is_file()).collect();
    for path in &missing {
        tracing::error!(path = %path.display(), "input file does not exist");
    }
    match missing.first() {
        Some(path) => Err(KatError::MissingInputFile {
            path: path.to_path_buf(),
        }),
        None => Ok(()),
    }
}

/// Create the destination directory if needed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create destination directory {:?}", dir))
}
