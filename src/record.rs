//! Line classifier for cryptotvgen-style KAT files.
//!
//! ```text
//! #### MsgID=  1
//! INS = 4000000000000000
//! HDR = 12000010
//! DAT = 000102030405060708090A0B0C0D0E0F
//! STT = E0000000
//! ```
//!
//! Each line maps to at most one [`Field`]. Anything else (blank lines,
//! comments, `###EOF`) yields `None` and is left for the caller to drop.

use crate::error::KatError;
use std::fmt;

const BOUNDARY_PREFIX: &str = "#### MsgID=";

/// Classified content of one line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Start of a new test vector, carrying its id.
    VectorBoundary(u32),
    Instruction(String),
    Header(String),
    Data(String),
    Status(String),
}

impl FieldKind {
    /// Three-letter tag used on the line (`INS`, `HDR`, ...); `None` for boundaries.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::VectorBoundary(_) => None,
            Self::Instruction(_) => Some("INS"),
            Self::Header(_) => Some("HDR"),
            Self::Data(_) => Some("DAT"),
            Self::Status(_) => Some("STT"),
        }
    }

    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::VectorBoundary(_) => None,
            Self::Instruction(p) | Self::Header(p) | Self::Data(p) | Self::Status(p) => Some(p),
        }
    }

    fn from_tag(tag: &str, payload: String) -> Option<Self> {
        match tag {
            "INS" => Some(Self::Instruction(payload)),
            "HDR" => Some(Self::Header(payload)),
            "DAT" => Some(Self::Data(payload)),
            "STT" => Some(Self::Status(payload)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VectorBoundary(id) => write!(f, "{BOUNDARY_PREFIX}{id:>3}"),
            other => {
                // Both options are Some for every non-boundary variant.
                let tag = other.tag().unwrap_or_default();
                let payload = other.payload().unwrap_or_default();
                write!(f, "{tag} = {payload}")
            }
        }
    }
}

/// A classified line together with its 1-based line number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub line: usize,
    pub kind: FieldKind,
}

impl Field {
    /// Classify one line of input.
    ///
    /// Returns `Ok(None)` for lines that carry no field. Payloads are
    /// normalised to uppercase; non-hex characters or an empty payload are a
    /// `MalformedRecord` error.
    pub fn classify(line: usize, text: &str) -> Result<Option<Self>, KatError> {
        let trimmed = text.trim();

        if let Some(rest) = trimmed.strip_prefix(BOUNDARY_PREFIX) {
            // cryptotvgen appends more keys after the id (`#### MsgID=  1, KID=  1`).
            let rest = rest.trim_start();
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let id: u32 = rest[..digits_end].parse().map_err(|_| {
                KatError::malformed(line, None, format!("invalid vector id in {trimmed:?}"))
            })?;
            return Ok(Some(Self {
                line,
                kind: FieldKind::VectorBoundary(id),
            }));
        }

        let Some((tag, value)) = trimmed.split_once('=') else {
            return Ok(None);
        };
        let tag = tag.trim();
        if !matches!(tag, "INS" | "HDR" | "DAT" | "STT") {
            return Ok(None);
        }

        let payload = parse_hex_payload(value.trim())
            .map_err(|reason| KatError::malformed(line, None, format!("{tag}: {reason}")))?;
        Ok(FieldKind::from_tag(tag, payload).map(|kind| Self { line, kind }))
    }
}

/// Classify every line of `text`, skipping lines that carry no field.
pub fn parse_str(text: &str) -> Result<Vec<Field>, KatError> {
    let mut fields = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(field) = Field::classify(idx + 1, line)? {
            fields.push(field);
        }
    }
    Ok(fields)
}

fn parse_hex_payload(value: &str) -> Result<String, String> {
    if value.is_empty() {
        return Err("empty payload".into());
    }
    if let Some((pos, c)) = value.char_indices().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(format!("non-hex character {c:?} at offset {pos}"));
    }
    Ok(value.to_ascii_uppercase())
}
