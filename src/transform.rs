//! Share transform engine.
//!
//! Consumes classified fields in file order and renders the masked line for
//! each one. The engine owns the [`MaskState`]; vector boundaries are the only
//! event that can change it, so fields must arrive in their original order.
//!
//! For a data word `w` and masks `m[0..N-1]`:
//!
//! ```text
//!   share 0     = w ^ m[0]
//!   share k     = m[k-1] ^ m[k]      (1 <= k <= N-2)
//!   share N-1   = m[N-2]
//! ```
//!
//! XOR over all shares telescopes back to `w`. The same mask set is used for
//! every word until the next boundary.

use crate::config::{IoWidth, MaskConfig, ShareCount};
use crate::error::KatError;
use crate::mask::{MaskSet, MaskState};
use crate::record::{Field, FieldKind};
use rand_core::RngCore;

/// Header padding is always one 32-bit word, whatever the bus width.
const HEADER_ZERO_WORD: &str = "00000000";

/// Split one word into `masks.share_count()` shares.
pub fn split_word(word: u32, masks: &MaskSet) -> Vec<u32> {
    let m = masks.values();
    let last = m.len() - 1;
    let mut shares = Vec::with_capacity(m.len() + 1);
    shares.push(word ^ m[0]);
    for k in 1..=last {
        shares.push(m[k - 1] ^ m[k]);
    }
    shares.push(m[last]);
    shares
}

/// XOR a group of shares back into the word they encode.
pub fn combine_shares(shares: &[u32]) -> u32 {
    shares.iter().fold(0, |acc, s| acc ^ s)
}

/// Mask a whole data payload, word-major: all shares of word 0, then word 1, ...
///
/// Returns the reason string on a length mismatch; the caller attaches the
/// line and vector.
pub fn mask_data_payload(payload: &str, masks: &MaskSet) -> Result<String, String> {
    let width = masks.width();
    let digits = width.hex_digits();
    if payload.len() % digits != 0 {
        return Err(format!(
            "payload of {} hex digits is not a multiple of {digits} ({}-bit words)",
            payload.len(),
            width
        ));
    }

    let mut out = String::with_capacity(payload.len() * masks.share_count());
    for chunk in payload.as_bytes().chunks(digits) {
        // Payloads are validated as ASCII hex by the parser.
        let text = std::str::from_utf8(chunk).map_err(|e| e.to_string())?;
        let word = u32::from_str_radix(text, 16).map_err(|e| format!("word {text:?}: {e}"))?;
        for share in split_word(word, masks) {
            out.push_str(&width.format_word(share));
        }
    }
    Ok(out)
}

/// Opcode or header tag followed by `shares - 1` zero words.
pub fn replicate_with_zeros(payload: &str, zero_word: &str, shares: ShareCount) -> String {
    let mut out = String::with_capacity(payload.len() + zero_word.len() * shares.mask_count());
    out.push_str(payload);
    for _ in 0..shares.mask_count() {
        out.push_str(zero_word);
    }
    out
}

/// Record counts seen by the engine, per field kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldCounts {
    pub vectors: usize,
    pub instructions: usize,
    pub headers: usize,
    pub data: usize,
    pub status: usize,
}

impl FieldCounts {
    pub fn record(&mut self, kind: &FieldKind) {
        match kind {
            FieldKind::VectorBoundary(_) => self.vectors += 1,
            FieldKind::Instruction(_) => self.instructions += 1,
            FieldKind::Header(_) => self.headers += 1,
            FieldKind::Data(_) => self.data += 1,
            FieldKind::Status(_) => self.status += 1,
        }
    }
}

/// Streaming transform from unmasked fields to masked output lines.
pub struct ShareEngine<R> {
    width: IoWidth,
    shares: ShareCount,
    state: MaskState,
    rng: R,
    current_vector: Option<u32>,
    counts: FieldCounts,
}

impl<R: RngCore> ShareEngine<R> {
    /// Create an engine; the initial mask set is drawn here.
    pub fn new(config: &MaskConfig, mut rng: R) -> Self {
        let state = MaskState::new(&mut rng, config.width, config.shares, config.policy);
        Self::from_state(config, state, rng)
    }

    /// Create an engine that starts from a known mask set.
    pub fn with_masks(config: &MaskConfig, masks: MaskSet, rng: R) -> Result<Self, KatError> {
        if masks.width() != config.width || masks.share_count() != config.shares.get() {
            return Err(KatError::InvalidConfiguration(format!(
                "mask set for {} shares at {} bits does not match {} shares at {} bits",
                masks.share_count(),
                masks.width(),
                config.shares,
                config.width
            )));
        }
        let state = MaskState::with_masks(masks, config.policy)?;
        Ok(Self::from_state(config, state, rng))
    }

    fn from_state(config: &MaskConfig, state: MaskState, rng: R) -> Self {
        Self {
            width: config.width,
            shares: config.shares,
            state,
            rng,
            current_vector: None,
            counts: FieldCounts::default(),
        }
    }

    pub fn masks(&self) -> &MaskSet {
        self.state.masks()
    }

    pub fn state(&self) -> &MaskState {
        &self.state
    }

    pub fn counts(&self) -> FieldCounts {
        self.counts
    }

    #[cfg(test)]
    pub fn current_vector(&self) -> Option<u32> {
        self.current_vector
    }

    /// Transform one field into its output text (without trailing newline).
    ///
    /// Boundaries render as `TV: <id> ` and may redraw the masks first.
    pub fn apply(&mut self, field: &Field) -> Result<String, KatError> {
        self.counts.record(&field.kind);
        let line = match &field.kind {
            FieldKind::VectorBoundary(id) => {
                self.current_vector = Some(*id);
                if self.state.on_vector_boundary(*id, &mut self.rng) {
                    tracing::debug!(
                        vector = id,
                        masks = %self.state.masks().to_preamble_hex().trim_end(),
                        "redrew masks"
                    );
                }
                format!("TV: {id} ")
            }
            FieldKind::Instruction(op) => format!(
                "INS = {}",
                replicate_with_zeros(op, &self.width.zero_word(), self.shares)
            ),
            FieldKind::Header(tag) => format!(
                "HDR = {}",
                replicate_with_zeros(tag, HEADER_ZERO_WORD, self.shares)
            ),
            FieldKind::Data(payload) => {
                let masked = mask_data_payload(payload, self.state.masks())
                    .map_err(|reason| KatError::malformed(field.line, self.current_vector, reason))?;
                format!("DAT = {masked}")
            }
            FieldKind::Status(status) => format!("STT = {status}"),
        };
        Ok(line)
    }
}
