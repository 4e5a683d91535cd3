use crate::config::{IoWidth, MaskConfig, MaskPolicy, ShareCount};
use crate::io;
use crate::katfile;
use crate::mask;
use crate::record::FieldKind;
use crate::unmask::{self, UnmaskedKat};
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Output file names written into `--dest`.
const SHARED_PDI: &str = "sharedPDI.txt";
const SHARED_SDI: &str = "sharedSDI.txt";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split the PDI and SDI test vector files into N-share boolean-masked versions
    Share(ShareArgs),
    /// Recombine a shared KAT file into its unmasked form
    Unmask(UnmaskArgs),
    /// Check that a shared KAT file recombines to its original
    Verify(VerifyArgs),
}

// ---------------------------------------------------------------------------
// Shared arg groups
// ---------------------------------------------------------------------------

/// Args for file input/output (both default to stdin/stdout).
#[derive(Args, Debug)]
pub struct IoArgs {
    /// Input file (defaults to stdin)
    #[arg(long, value_name = "FILE")]
    pub r#in: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Per-command args
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct ShareArgs {
    /// I/O width in bits (8, 16 or 32)
    #[arg(long, value_name = "BITS")]
    pub iow: IoWidth,

    /// Number of shares to create (2 to 4)
    #[arg(short = 'n', long = "num", value_name = "N")]
    pub num_shares: ShareCount,

    /// Use one mask set for every test vector in a file instead of fresh masks per vector
    #[arg(long)]
    pub fixed: bool,

    /// Directory holding the existing test vectors
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Name of the input PDI file
    #[arg(long, default_value = "pdi.txt")]
    pub pdi: PathBuf,

    /// Name of the input SDI file
    #[arg(long, default_value = "sdi.txt")]
    pub sdi: PathBuf,

    /// Destination directory for the shared files (created if missing)
    #[arg(long, default_value = ".")]
    pub dest: PathBuf,

    /// Seed for a reproducible mask stream (defaults to OS randomness)
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct UnmaskArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// I/O width in bits; read from the file preamble if omitted
    #[arg(long, value_name = "BITS")]
    pub iow: Option<IoWidth>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Original unmasked KAT file
    #[arg(long, value_name = "FILE")]
    pub original: PathBuf,

    /// Shared KAT file produced by `share`
    #[arg(long, value_name = "FILE")]
    pub shared: PathBuf,

    /// I/O width in bits; read from the shared file preamble if omitted
    #[arg(long, value_name = "BITS")]
    pub iow: Option<IoWidth>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Share(args) => share(args),
        Command::Unmask(args) => unmask(args),
        Command::Verify(args) => verify(args),
    }
}

fn share(args: ShareArgs) -> Result<()> {
    let config = MaskConfig::new(args.iow, args.num_shares, MaskPolicy::from_fixed(args.fixed))
        .with_seed(args.seed);

    let pdi = args.path.join(&args.pdi);
    let sdi = args.path.join(&args.sdi);
    io::require_inputs(&[pdi.as_path(), sdi.as_path()])?;

    tracing::info!(
        shares = %config.shares,
        iow = %config.width,
        fixed = config.policy.is_fixed(),
        dest = %args.dest.display(),
        "generating boolean masked PDI and SDI test vector files"
    );

    io::ensure_dir(&args.dest)?;
    let mut rng = mask::mask_rng(config.seed).context("seed mask RNG")?;

    for (input, name) in [(&pdi, SHARED_PDI), (&sdi, SHARED_SDI)] {
        let output = args.dest.join(name);
        katfile::write_shared_file(input, &output, &config, &mut rng)
            .with_context(|| format!("mask {:?}", input))?;
    }
    Ok(())
}

fn unmask(args: UnmaskArgs) -> Result<()> {
    let text = io::read_input(&args.io)?;
    let unmasked = UnmaskedKat::from_shared_text(&text, args.iow)?;
    let counts = unmasked.counts();
    tracing::info!(
        shares = %unmasked.shares,
        iow = %unmasked.width,
        vectors = counts.vectors,
        "recombined shared KAT file"
    );
    io::write_output(&args.io, &unmasked.to_text())
}

fn verify(args: VerifyArgs) -> Result<()> {
    io::require_inputs(&[args.original.as_path(), args.shared.as_path()])?;
    let original = std::fs::read_to_string(&args.original)
        .with_context(|| format!("read {:?}", args.original))?;
    let shared = std::fs::read_to_string(&args.shared)
        .with_context(|| format!("read {:?}", args.shared))?;

    let report = unmask::verify(&original, &shared, args.iow)?;
    if let Some(m) = &report.mismatch {
        tracing::error!(
            record = m.index,
            original_line = ?m.original_line,
            shared_line = ?m.shared_line,
            "records differ"
        );
        bail!(
            "shared file does not recombine to original: expected {}, found {}",
            describe(m.expected.as_ref()),
            describe(m.found.as_ref())
        );
    }

    let o = report.original;
    tracing::debug!(
        vectors = o.vectors,
        instructions = o.instructions,
        headers = o.headers,
        data = o.data,
        status = o.status,
        "original record counts"
    );
    let c = report.recombined;
    tracing::info!(
        vectors = c.vectors,
        instructions = c.instructions,
        headers = c.headers,
        data = c.data,
        status = c.status,
        "shared file recombines to original"
    );
    Ok(())
}

fn describe(kind: Option<&FieldKind>) -> String {
    match kind {
        Some(k) => format!("'{k}'"),
        None => "end of file".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PDI: &str = "\
################################################################################
#### Authenticated Encryption
#### MsgID=  1, KID=  1
#### Ad Size =    0, Msg Size =    4
################################################################################
# Instruction: Opcode=Authenticated Encryption
INS = 20
HDR = 12000004
# Info :                     Plaintext, EOT=1, Last=1, Length=4 bytes
DAT = 00112233
STT = E0

#### MsgID=  2, KID=  1
INS = 20
HDR = 12000004
DAT = 44556677
STT = E0
###EOF
";
    const SDI: &str = "#### MsgID=  1\nINS = 40\nHDR = C0000010\nDAT = 000102030405060708090A0B0C0D0E0F\n\
                       #### MsgID=  2\nINS = 40\nHDR = C0000010\nDAT = 0F0E0D0C0B0A09080706050403020100\n###EOF\n";

    fn share_args(dir: &std::path::Path, fixed: bool, seed: Option<u64>) -> ShareArgs {
        ShareArgs {
            iow: IoWidth::W32,
            num_shares: ShareCount::new(3).unwrap(),
            fixed,
            path: dir.to_path_buf(),
            pdi: "pdi.txt".into(),
            sdi: "sdi.txt".into(),
            dest: dir.join("out"),
            seed,
        }
    }

    #[test]
    fn share_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pdi.txt"), PDI).unwrap();
        fs::write(dir.path().join("sdi.txt"), SDI).unwrap();

        share(share_args(dir.path(), false, None)).unwrap();
        let shared_pdi = fs::read_to_string(dir.path().join("out").join(SHARED_PDI)).unwrap();
        assert!(shared_pdi.contains("\nTV: 1 \n"));
        assert!(shared_pdi.contains("\nTV: 2 \n"));
        assert_eq!(shared_pdi.matches("DAT = ").count(), 2);
        for (orig, shared) in [("pdi.txt", SHARED_PDI), ("sdi.txt", SHARED_SDI)] {
            verify(VerifyArgs {
                original: dir.path().join(orig),
                shared: dir.path().join("out").join(shared),
                iow: None,
            })
            .unwrap();
        }
    }

    #[test]
    fn seeded_runs_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pdi.txt"), PDI).unwrap();
        fs::write(dir.path().join("sdi.txt"), SDI).unwrap();

        let out = dir.path().join("out");
        share(share_args(dir.path(), true, Some(11))).unwrap();
        let first = fs::read_to_string(out.join(SHARED_SDI)).unwrap();
        share(share_args(dir.path(), true, Some(11))).unwrap();
        let second = fs::read_to_string(out.join(SHARED_SDI)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_sdi_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pdi.txt"), PDI).unwrap();

        let err = share(share_args(dir.path(), false, None)).unwrap_err();
        assert!(err.to_string().contains("sdi.txt"), "{err}");
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn verify_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pdi.txt"), PDI).unwrap();
        fs::write(dir.path().join("sdi.txt"), SDI).unwrap();
        share(share_args(dir.path(), false, None)).unwrap();

        let err = verify(VerifyArgs {
            original: dir.path().join("pdi.txt"),
            shared: dir.path().join("out").join(SHARED_SDI),
            iow: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("does not recombine"), "{err}");
    }
}
