//! Masking options: word width, share count, and mask lifecycle.
//!
//! All values are validated on construction, so a `MaskConfig` that exists is
//! always usable. Command-line parsing goes through the `FromStr` impls, which
//! means bad values are rejected before any file is touched.

use crate::error::KatError;
use std::fmt;
use std::str::FromStr;

/// Bit width of the hardware I/O bus; each data word has this many bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoWidth {
    W8,
    W16,
    W32,
}

impl IoWidth {
    #[cfg(test)]
    pub const ALL: [IoWidth; 3] = [IoWidth::W8, IoWidth::W16, IoWidth::W32];

    pub fn from_bits(bits: u32) -> Result<Self, KatError> {
        match bits {
            8 => Ok(Self::W8),
            16 => Ok(Self::W16),
            32 => Ok(Self::W32),
            other => Err(KatError::InvalidConfiguration(format!(
                "I/O width must be 8, 16 or 32 bits, got {other}"
            ))),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
        }
    }

    /// Hex digits per word (IOW / 4).
    pub fn hex_digits(self) -> usize {
        (self.bits() / 4) as usize
    }

    /// All-ones value for this width; also the largest legal mask.
    pub fn max_value(self) -> u32 {
        match self {
            Self::W32 => u32::MAX,
            w => (1u32 << w.bits()) - 1,
        }
    }

    /// Uppercase, zero-padded hex rendering of one word.
    pub fn format_word(self, word: u32) -> String {
        format!("{:0width$X}", word, width = self.hex_digits())
    }

    /// A zero word at this width (`00`, `0000`, `00000000`).
    pub fn zero_word(self) -> String {
        "0".repeat(self.hex_digits())
    }
}

impl fmt::Display for IoWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl FromStr for IoWidth {
    type Err = KatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits: u32 = s.trim().parse().map_err(|_| {
            KatError::InvalidConfiguration(format!("I/O width {s:?} is not a number"))
        })?;
        Self::from_bits(bits)
    }
}

/// Number of shares N each secret word is split into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShareCount(u8);

impl ShareCount {
    pub const MIN: u8 = 2;
    pub const MAX: u8 = 4;

    pub fn new(n: u8) -> Result<Self, KatError> {
        if !(Self::MIN..=Self::MAX).contains(&n) {
            return Err(KatError::InvalidConfiguration(format!(
                "share count must be between {} and {}, got {n}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(n))
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// Number of masks needed for this many shares (N - 1).
    pub fn mask_count(self) -> usize {
        self.get() - 1
    }
}

impl fmt::Display for ShareCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ShareCount {
    type Err = KatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s.trim().parse().map_err(|_| {
            KatError::InvalidConfiguration(format!("share count {s:?} is not a small number"))
        })?;
        Self::new(n)
    }
}

/// When masks are redrawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaskPolicy {
    /// New masks at the start of every vector after the first.
    #[default]
    Fresh,
    /// One mask set for the whole file.
    Fixed,
}

impl MaskPolicy {
    pub fn from_fixed(fixed: bool) -> Self {
        if fixed {
            Self::Fixed
        } else {
            Self::Fresh
        }
    }

    pub fn is_fixed(self) -> bool {
        self == Self::Fixed
    }
}

/// Validated options for one masking run.
#[derive(Clone, Debug)]
pub struct MaskConfig {
    pub width: IoWidth,
    pub shares: ShareCount,
    pub policy: MaskPolicy,
    /// Seed for a reproducible mask stream; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl MaskConfig {
    pub fn new(width: IoWidth, shares: ShareCount, policy: MaskPolicy) -> Self {
        Self {
            width,
            shares,
            policy,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_parse() {
        assert_eq!("8".parse::<IoWidth>().unwrap(), IoWidth::W8);
        assert_eq!("16".parse::<IoWidth>().unwrap(), IoWidth::W16);
        assert_eq!(" 32 ".parse::<IoWidth>().unwrap(), IoWidth::W32);
    }

    #[test]
    fn unsupported_width_rejected() {
        for bad in ["0", "4", "24", "64", "x"] {
            let err = bad.parse::<IoWidth>().unwrap_err();
            assert!(matches!(err, KatError::InvalidConfiguration(_)), "{bad}");
        }
    }

    #[test]
    fn width_geometry() {
        assert_eq!(IoWidth::W8.hex_digits(), 2);
        assert_eq!(IoWidth::W16.hex_digits(), 4);
        assert_eq!(IoWidth::W32.hex_digits(), 8);
        assert_eq!(IoWidth::W8.max_value(), 0xFF);
        assert_eq!(IoWidth::W16.max_value(), 0xFFFF);
        assert_eq!(IoWidth::W32.max_value(), 0xFFFF_FFFF);
    }

    #[test]
    fn format_word_pads_and_uppercases() {
        assert_eq!(IoWidth::W8.format_word(0x5), "05");
        assert_eq!(IoWidth::W16.format_word(0xab), "00AB");
        assert_eq!(IoWidth::W32.format_word(0xdead), "0000DEAD");
        assert_eq!(IoWidth::W16.zero_word(), "0000");
    }

    #[test]
    fn share_count_bounds() {
        assert!(ShareCount::new(1).is_err());
        assert!(ShareCount::new(5).is_err());
        for n in 2..=4 {
            let s = ShareCount::new(n).unwrap();
            assert_eq!(s.get(), n as usize);
            assert_eq!(s.mask_count(), n as usize - 1);
        }
        assert!("9".parse::<ShareCount>().is_err());
        assert!("-1".parse::<ShareCount>().is_err());
    }

    #[test]
    fn policy_defaults_to_fresh() {
        assert_eq!(MaskPolicy::default(), MaskPolicy::Fresh);
        assert!(MaskPolicy::from_fixed(true).is_fixed());
        assert!(!MaskPolicy::from_fixed(false).is_fixed());
    }
}
