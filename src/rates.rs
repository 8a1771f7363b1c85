//! Data rates, PHY packet types and automatic-fallback tables
//!
//! This module contains the legacy 802.11a/b/g rate set, the hardware
//! packet-type classification and the fixed fallback-rate tables consulted
//! by the radio's automatic-fallback engine.

use serde::{Deserialize, Serialize};

use crate::{Result, TxError};

/// Legacy 802.11a/b/g transmit rates.
///
/// The discriminant doubles as the hardware rate index used by the
/// airtime tables and the packet-number field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rate {
    R1M = 0,
    R2M = 1,
    R5M = 2,
    R11M = 3,
    R6M = 4,
    R9M = 5,
    R12M = 6,
    R18M = 7,
    R24M = 8,
    R36M = 9,
    R48M = 10,
    R54M = 11,
}

/// Number of entries in rate-indexed hardware tables.
pub const MAX_RATE: usize = 12;

impl Rate {
    /// Hardware rate index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// True for the four CCK/DSSS rates.
    pub fn is_cck(self) -> bool {
        self <= Rate::R11M
    }

    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(Self::R1M),
            1 => Ok(Self::R2M),
            2 => Ok(Self::R5M),
            3 => Ok(Self::R11M),
            4 => Ok(Self::R6M),
            5 => Ok(Self::R9M),
            6 => Ok(Self::R12M),
            7 => Ok(Self::R18M),
            8 => Ok(Self::R24M),
            9 => Ok(Self::R36M),
            10 => Ok(Self::R48M),
            11 => Ok(Self::R54M),
            other => Err(TxError::InvalidParameter(format!(
                "invalid rate index {}",
                other
            ))),
        }
    }
}

impl From<Rate> for u8 {
    fn from(rate: Rate) -> Self {
        rate as u8
    }
}

/// Hardware packet type, selecting the PHY modulation class.
///
/// `Gb` and `Ga` are the 11g mixed-mode variants protecting CCK and OFDM
/// receivers respectively; both use the dual (B + A) header layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PhyType {
    A = 0,
    B = 1,
    Gb = 2,
    Ga = 3,
}

impl PhyType {
    /// True for the 11g mixed-mode variants.
    pub fn is_g(self) -> bool {
        matches!(self, PhyType::Gb | PhyType::Ga)
    }

    /// Packet-type bits placed in the FIFO control word (bits 8-9).
    pub fn fifo_bits(self) -> u16 {
        (self as u16) << 8
    }
}

/// Preamble type used by the CCK PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Preamble {
    Long = 0,
    Short = 1,
}

/// Device-level automatic-fallback configuration.
///
/// Selects which of the two fixed fallback tables the radio walks when a
/// frame at the primary rate is not acknowledged. This is a device
/// configuration, not a per-packet choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackMode {
    None,
    /// Primary-biased table: falls back gently from the primary rate.
    Opt0,
    /// Alternate-biased table: falls back aggressively to robust rates.
    Opt1,
}

/// Fallback rates for primary rates 18M..=54M, first fallback step.
const FB_OPT0: [[Rate; 5]; 2] = [
    [Rate::R12M, Rate::R18M, Rate::R24M, Rate::R36M, Rate::R48M],
    [Rate::R12M, Rate::R12M, Rate::R18M, Rate::R24M, Rate::R36M],
];

const FB_OPT1: [[Rate; 5]; 2] = [
    [Rate::R12M, Rate::R18M, Rate::R24M, Rate::R24M, Rate::R36M],
    [Rate::R6M, Rate::R6M, Rate::R12M, Rate::R12M, Rate::R18M],
];

/// Fallback rate pair for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackRates {
    pub fb0: Rate,
    pub fb1: Rate,
}

/// Look up the two fallback rates for a primary rate.
///
/// Returns `None` below the 18M threshold or when fallback is disabled;
/// the radio then retries at the primary rate only.
pub fn fallback_rates(mode: FallbackMode, primary: Rate) -> Option<FallbackRates> {
    if primary < Rate::R18M {
        return None;
    }
    let idx = primary.index() - Rate::R18M.index();
    match mode {
        FallbackMode::None => None,
        FallbackMode::Opt0 => Some(FallbackRates {
            fb0: FB_OPT0[0][idx],
            fb1: FB_OPT0[1][idx],
        }),
        FallbackMode::Opt1 => Some(FallbackRates {
            fb0: FB_OPT1[0][idx],
            fb1: FB_OPT1[1][idx],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_ordering() {
        assert!(Rate::R1M < Rate::R11M);
        assert!(Rate::R11M < Rate::R6M); // index order, not Mb/s order
        assert!(Rate::R18M <= Rate::R54M);
        assert!(Rate::R11M.is_cck());
        assert!(!Rate::R6M.is_cck());
    }

    #[test]
    fn test_rate_round_trip() {
        for idx in 0..MAX_RATE as u8 {
            let rate = Rate::from_index(idx).unwrap();
            assert_eq!(u8::from(rate), idx);
        }
        assert!(Rate::from_index(12).is_err());
    }

    #[test]
    fn test_phy_fifo_bits() {
        assert_eq!(PhyType::A.fifo_bits(), 0x0000);
        assert_eq!(PhyType::B.fifo_bits(), 0x0100);
        assert_eq!(PhyType::Gb.fifo_bits(), 0x0200);
        assert_eq!(PhyType::Ga.fifo_bits(), 0x0300);
    }

    #[test]
    fn test_fallback_54m_opt0() {
        // Reference vector: 54M under the primary-biased table falls back
        // to 48M then 36M.
        let fb = fallback_rates(FallbackMode::Opt0, Rate::R54M).unwrap();
        assert_eq!(fb.fb0, Rate::R48M);
        assert_eq!(fb.fb1, Rate::R36M);
    }

    #[test]
    fn test_fallback_threshold() {
        assert!(fallback_rates(FallbackMode::Opt0, Rate::R12M).is_none());
        assert!(fallback_rates(FallbackMode::Opt0, Rate::R18M).is_some());
        assert!(fallback_rates(FallbackMode::None, Rate::R54M).is_none());
    }

    #[test]
    fn test_fallback_opt1_table() {
        let fb = fallback_rates(FallbackMode::Opt1, Rate::R54M).unwrap();
        assert_eq!(fb.fb0, Rate::R36M);
        assert_eq!(fb.fb1, Rate::R18M);

        let fb = fallback_rates(FallbackMode::Opt1, Rate::R18M).unwrap();
        assert_eq!(fb.fb0, Rate::R12M);
        assert_eq!(fb.fb1, Rate::R6M);
    }
}
