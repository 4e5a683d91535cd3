//! Reading shared KAT files back into unmasked form.
//!
//! Share count comes from the `NUM =` line and word width from the
//! `with IOW = <bits>.` preamble line, unless the caller supplies one.
//! Instruction and header lines keep their first share (the trailing zero
//! words are checked), data words are XOR-recombined, status lines pass
//! through.

use crate::config::{IoWidth, ShareCount};
use crate::error::KatError;
use crate::katfile::EOF_MARKER;
use crate::record::{parse_str, Field, FieldKind};
use crate::transform::{combine_shares, FieldCounts};

const NUM_PREFIX: &str = "NUM =";
const IOW_MARKER: &str = "with IOW = ";
const TV_PREFIX: &str = "TV:";
const HEADER_DIGITS: usize = 8;

/// A shared file recombined into its unmasked records.
#[derive(Clone, Debug)]
pub struct UnmaskedKat {
    pub width: IoWidth,
    pub shares: ShareCount,
    pub fields: Vec<Field>,
}

impl UnmaskedKat {
    /// Parse and recombine a shared KAT file.
    pub fn from_shared_text(text: &str, width: Option<IoWidth>) -> Result<Self, KatError> {
        let shares = find_share_count(text)?;
        let width = match width {
            Some(w) => w,
            None => find_width(text)?,
        };

        let mut fields = Vec::new();
        let mut vector = None;
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            let kind = if let Some(id) = trimmed.strip_prefix(TV_PREFIX) {
                let id: u32 = id.trim().parse().map_err(|_| {
                    KatError::malformed(line, vector, format!("invalid TV id {:?}", id.trim()))
                })?;
                vector = Some(id);
                FieldKind::VectorBoundary(id)
            } else {
                let Some(field) = Field::classify(line, raw)? else {
                    continue;
                };
                unmask_field(field.kind, width, shares)
                    .map_err(|reason| KatError::malformed(line, vector, reason))?
            };
            fields.push(Field { line, kind });
        }

        Ok(Self {
            width,
            shares,
            fields,
        })
    }

    pub fn counts(&self) -> FieldCounts {
        let mut counts = FieldCounts::default();
        for f in &self.fields {
            counts.record(&f.kind);
        }
        counts
    }

    /// Render in the unmasked input layout, ending with `###EOF`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for f in &self.fields {
            if let FieldKind::VectorBoundary(_) = f.kind {
                if !out.is_empty() {
                    out.push('\n');
                }
            }
            out.push_str(&f.kind.to_string());
            out.push('\n');
        }
        out.push_str(EOF_MARKER);
        out.push('\n');
        out
    }
}

fn find_share_count(text: &str) -> Result<ShareCount, KatError> {
    let value = text
        .lines()
        .find_map(|l| l.trim().strip_prefix(NUM_PREFIX))
        .ok_or_else(|| KatError::InvalidConfiguration("shared file has no 'NUM =' line".into()))?;
    value.parse()
}

fn find_width(text: &str) -> Result<IoWidth, KatError> {
    let rest = text
        .lines()
        .find_map(|l| l.split_once(IOW_MARKER).map(|(_, rest)| rest))
        .ok_or_else(|| {
            KatError::InvalidConfiguration("shared file preamble does not state the IOW".into())
        })?;
    rest.trim_end().trim_end_matches('.').parse()
}

/// Split `payload` into its leading share and `shares - 1` trailing zero words.
fn strip_zero_padding(payload: &str, word: usize, shares: ShareCount) -> Result<String, String> {
    let pad = word * shares.mask_count();
    if payload.len() <= pad {
        return Err(format!(
            "{} hex digits cannot hold {} zero words of {word} digits plus a value",
            payload.len(),
            shares.mask_count()
        ));
    }
    let (value, zeros) = payload.split_at(payload.len() - pad);
    if zeros.bytes().any(|b| b != b'0') {
        return Err(format!("replicated shares {zeros:?} are not zero"));
    }
    Ok(value.to_string())
}

fn unmask_data(payload: &str, width: IoWidth, shares: ShareCount) -> Result<String, String> {
    let digits = width.hex_digits();
    let group = digits * shares.get();
    if payload.len() % group != 0 {
        return Err(format!(
            "{} hex digits is not a whole number of {}-share {}-bit words",
            payload.len(),
            shares,
            width
        ));
    }

    let mut out = String::with_capacity(payload.len() / shares.get());
    for word in payload.as_bytes().chunks(group) {
        let parts = word
            .chunks(digits)
            .map(|c| {
                let text = std::str::from_utf8(c).map_err(|e| e.to_string())?;
                u32::from_str_radix(text, 16).map_err(|e| format!("share {text:?}: {e}"))
            })
            .collect::<Result<Vec<u32>, String>>()?;
        out.push_str(&width.format_word(combine_shares(&parts)));
    }
    Ok(out)
}

fn unmask_field(kind: FieldKind, width: IoWidth, shares: ShareCount) -> Result<FieldKind, String> {
    Ok(match kind {
        FieldKind::Instruction(p) => {
            FieldKind::Instruction(strip_zero_padding(&p, width.hex_digits(), shares)?)
        }
        FieldKind::Header(p) => FieldKind::Header(strip_zero_padding(&p, HEADER_DIGITS, shares)?),
        FieldKind::Data(p) => FieldKind::Data(unmask_data(&p, width, shares)?),
        other => other,
    })
}

/// First point where an unmasked file and its original disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    /// Position in the record stream (0-based).
    pub index: usize,
    pub original_line: Option<usize>,
    pub shared_line: Option<usize>,
    pub expected: Option<FieldKind>,
    pub found: Option<FieldKind>,
}

/// Outcome of comparing a shared file against its source.
#[derive(Clone, Debug)]
pub struct VerifyReport {
    pub original: FieldCounts,
    pub recombined: FieldCounts,
    pub mismatch: Option<Mismatch>,
}

impl VerifyReport {
    #[cfg(test)]
    pub fn is_match(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// Recombine `shared` and compare every record with `original`, in order.
pub fn verify(
    original: &str,
    shared: &str,
    width: Option<IoWidth>,
) -> Result<VerifyReport, KatError> {
    let expected = parse_str(original)?;
    let unmasked = UnmaskedKat::from_shared_text(shared, width)?;

    let mut original_counts = FieldCounts::default();
    for f in &expected {
        original_counts.record(&f.kind);
    }

    let len = expected.len().max(unmasked.fields.len());
    let mismatch = (0..len).find_map(|i| {
        let e = expected.get(i);
        let g = unmasked.fields.get(i);
        let same = matches!((e, g), (Some(a), Some(b)) if a.kind == b.kind);
        (!same).then(|| Mismatch {
            index: i,
            original_line: e.map(|f| f.line),
            shared_line: g.map(|f| f.line),
            expected: e.map(|f| f.kind.clone()),
            found: g.map(|f| f.kind.clone()),
        })
    });

    Ok(VerifyReport {
        original: original_counts,
        recombined: unmasked.counts(),
        mismatch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MaskConfig, MaskPolicy};
    use crate::katfile::mask_stream;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;
    use std::io::Cursor;
    use std::path::Path;

    const SAMPLE: &str = "\
#### MsgID=  1
INS = 40
HDR = 12000004
DAT = 00112233
STT = E0

#### MsgID=  2
INS = 40
HDR = 12000008
DAT = DEADBEEFCAFEF00D
STT = E0
###EOF
";

    fn share(text: &str, bits: u32, n: u8, policy: MaskPolicy) -> String {
        let cfg = MaskConfig::new(
            IoWidth::from_bits(bits).unwrap(),
            ShareCount::new(n).unwrap(),
            policy,
        );
        let mut out = Vec::new();
        mask_stream(
            Cursor::new(text),
            &mut out,
            Path::new("sdi.txt"),
            Path::new("sharedSDI.txt"),
            &cfg,
            ChaCha20Rng::seed_from_u64(bits as u64 * 10 + n as u64),
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn recovers_original_records() {
        for bits in [8, 16, 32] {
            for n in 2..=4 {
                let shared = share(SAMPLE, bits, n, MaskPolicy::Fresh);
                let report = verify(SAMPLE, &shared, None).unwrap();
                assert!(report.is_match(), "{bits}-bit {n} shares: {:?}", report.mismatch);
                assert_eq!(report.original, report.recombined);
            }
        }
    }

    #[test]
    fn header_values_are_detected() {
        let shared = share(SAMPLE, 16, 3, MaskPolicy::Fixed);
        let unmasked = UnmaskedKat::from_shared_text(&shared, None).unwrap();
        assert_eq!(unmasked.width, IoWidth::W16);
        assert_eq!(unmasked.shares.get(), 3);
    }

    #[test]
    fn renders_input_layout() {
        let shared = share(SAMPLE, 8, 2, MaskPolicy::Fresh);
        let text = UnmaskedKat::from_shared_text(&shared, None).unwrap().to_text();
        assert_eq!(
            text,
            "#### MsgID=  1\nINS = 40\nHDR = 12000004\nDAT = 00112233\nSTT = E0\n\n\
             #### MsgID=  2\nINS = 40\nHDR = 12000008\nDAT = DEADBEEFCAFEF00D\nSTT = E0\n###EOF\n"
        );
    }

    #[test]
    fn tampered_share_is_a_mismatch() {
        let shared = share(SAMPLE, 8, 2, MaskPolicy::Fresh);
        let tampered: String = shared
            .lines()
            .map(|l| match l.strip_prefix("DAT = ") {
                Some(p) if p.len() == 16 => {
                    // Flip the low bit of the first share of the first word.
                    let first = u8::from_str_radix(&p[..2], 16).unwrap() ^ 1;
                    format!("DAT = {first:02X}{}\n", &p[2..])
                }
                _ => format!("{l}\n"),
            })
            .collect();
        let report = verify(SAMPLE, &tampered, None).unwrap();
        let m = report.mismatch.expect("tampering detected");
        assert_eq!(m.index, 3);
        assert_eq!(m.expected, Some(FieldKind::Data("00112233".into())));
    }

    #[test]
    fn missing_record_is_a_mismatch() {
        let shared = share(SAMPLE, 8, 2, MaskPolicy::Fresh);
        let truncated: String = shared
            .lines()
            .filter(|l| !l.starts_with("STT"))
            .map(|l| format!("{l}\n"))
            .collect();
        let report = verify(SAMPLE, &truncated, None).unwrap();
        assert!(!report.is_match());
        assert_eq!(report.recombined.status, 0);
    }

    #[test]
    fn nonzero_padding_rejected() {
        let text = "NUM = 2\nwith IOW = 8.\nTV: 1 \nINS = 4001\n";
        let err = UnmaskedKat::from_shared_text(text, None).unwrap_err();
        assert!(matches!(err, KatError::MalformedRecord { line: 4, vector: Some(1), .. }));
    }

    #[test]
    fn ragged_data_rejected() {
        let text = "NUM = 3\nwith IOW = 16.\nTV: 1 \nDAT = 00010002\n";
        assert!(UnmaskedKat::from_shared_text(text, None).is_err());
    }

    #[test]
    fn missing_num_rejected() {
        let err = UnmaskedKat::from_shared_text("TV: 1 \n", Some(IoWidth::W8)).unwrap_err();
        assert!(matches!(err, KatError::InvalidConfiguration(_)));
    }

    #[test]
    fn width_override_skips_preamble() {
        let text = "NUM = 2\nTV: 1 \nDAT = AE05\n";
        let unmasked = UnmaskedKat::from_shared_text(text, Some(IoWidth::W8)).unwrap();
        assert_eq!(unmasked.fields[1].kind, FieldKind::Data("AB".into()));
    }
}
