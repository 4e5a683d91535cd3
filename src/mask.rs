//! Mask sets and their lifecycle.
//!
//! A mask set holds the N − 1 values that link adjacent shares. Every value
//! lies in `[1, 2^IOW − 1]`; zero is never drawn since it would leave a share
//! equal to its neighbour.
//!
//! Lifecycle:
//! - drawn once when a [`MaskState`] is created (this covers vector 1),
//! - redrawn at each vector boundary with id ≠ 1 under [`MaskPolicy::Fresh`],
//! - never redrawn under [`MaskPolicy::Fixed`].

use crate::config::{IoWidth, MaskPolicy, ShareCount};
use crate::error::KatError;
use rand_chacha::ChaCha20Rng;
use rand_core::{OsRng, RngCore, SeedableRng};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Ordered masks `m[0..N-1]` for one vector.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MaskSet {
    values: Vec<u32>,
    #[zeroize(skip)]
    width: IoWidth,
}

impl MaskSet {
    /// Draw `shares - 1` uniform non-zero masks.
    pub fn generate<R: RngCore>(rng: &mut R, width: IoWidth, shares: ShareCount) -> Self {
        let values = (0..shares.mask_count())
            .map(|_| draw_nonzero(rng, width))
            .collect();
        Self { values, width }
    }

    /// Build a mask set from explicit values (reproducible vectors, tests).
    pub fn from_values(width: IoWidth, values: Vec<u32>) -> Result<Self, KatError> {
        ShareCount::new((values.len() + 1).min(u8::MAX as usize) as u8)?;
        if let Some(bad) = values
            .iter()
            .find(|&&v| v == 0 || v > width.max_value())
        {
            return Err(KatError::InvalidConfiguration(format!(
                "mask {bad:#X} is outside [1, {:#X}] for {width}-bit words",
                width.max_value()
            )));
        }
        Ok(Self { values, width })
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn width(&self) -> IoWidth {
        self.width
    }

    /// Number of shares this set splits a word into.
    pub fn share_count(&self) -> usize {
        self.values.len() + 1
    }

    /// Hex rendering used in the fixed-mode preamble: each mask followed by a space.
    pub fn to_preamble_hex(&self) -> String {
        self.values
            .iter()
            .map(|&m| format!("{} ", self.width.format_word(m)))
            .collect()
    }
}

/// Uniform draw from `[1, max]` by masking to the word width and rejecting zero.
fn draw_nonzero<R: RngCore>(rng: &mut R, width: IoWidth) -> u32 {
    loop {
        let v = rng.next_u32() & width.max_value();
        if v != 0 {
            return v;
        }
    }
}

/// Current masks plus the policy that decides when they change.
#[derive(Debug)]
pub struct MaskState {
    masks: MaskSet,
    policy: MaskPolicy,
    shares: ShareCount,
    regenerations: usize,
}

impl MaskState {
    /// Start a run: masks are drawn immediately, regardless of policy.
    pub fn new<R: RngCore>(
        rng: &mut R,
        width: IoWidth,
        shares: ShareCount,
        policy: MaskPolicy,
    ) -> Self {
        Self {
            masks: MaskSet::generate(rng, width, shares),
            policy,
            shares,
            regenerations: 0,
        }
    }

    /// Start a run from a known mask set.
    pub fn with_masks(masks: MaskSet, policy: MaskPolicy) -> Result<Self, KatError> {
        let shares = ShareCount::new(masks.share_count() as u8)?;
        Ok(Self {
            masks,
            policy,
            shares,
            regenerations: 0,
        })
    }

    /// Handle a vector boundary. Returns `true` if the masks were redrawn.
    pub fn on_vector_boundary<R: RngCore>(&mut self, id: u32, rng: &mut R) -> bool {
        if id == 1 || self.policy.is_fixed() {
            return false;
        }
        self.masks = MaskSet::generate(rng, self.masks.width(), self.shares);
        self.regenerations += 1;
        true
    }

    pub fn masks(&self) -> &MaskSet {
        &self.masks
    }

    /// Redraws since the initial draw.
    pub fn regenerations(&self) -> usize {
        self.regenerations
    }
}

/// Mask RNG: ChaCha20 seeded from `seed`, or from the OS when absent.
pub fn mask_rng(seed: Option<u64>) -> Result<ChaCha20Rng, rand_core::Error> {
    match seed {
        Some(seed) => Ok(ChaCha20Rng::seed_from_u64(seed)),
        None => ChaCha20Rng::from_rng(OsRng),
    }
}
