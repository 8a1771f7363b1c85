//! Baseband airtime model
//!
//! Time-on-air computation and PHY signal/service/length field generation
//! for the CCK and OFDM modulations. The numeric results are consumed as
//! opaque microsecond values by the duration calculations and written
//! verbatim into hardware header fields; receivers reproduce the same
//! arithmetic, so every rounding step here is load-bearing.

use crate::rates::{PhyType, Preamble, Rate, MAX_RATE};
use crate::wire::WireWriter;
use crate::Result;

/// Per-rate divisor for the airtime computation: bits per 8 us at CCK
/// rates, bits per OFDM symbol at OFDM rates.
const FRAME_TIME_DIVISOR: [u32; MAX_RATE] = [10, 20, 55, 110, 24, 36, 48, 72, 96, 144, 192, 216];

/// Hardware time-stamp offset per preamble type and rate, microseconds.
const TIME_STAMP_OFF: [[u16; MAX_RATE]; 2] = [
    // Long preamble
    [384, 288, 226, 209, 54, 43, 37, 31, 28, 25, 24, 23],
    // Short preamble
    [384, 192, 130, 113, 54, 43, 37, 31, 28, 25, 24, 23],
];

/// Time on air of a frame of `frame_length` bytes at `rate`, microseconds.
///
/// CCK rates: preamble + PLCP header (192 us long, 96 us short) plus the
/// rounded-up payload time. OFDM rates: 20 us preamble + signal, payload
/// rounded up to 4 us symbols, plus the 6 us signal extension on 2.4 GHz.
pub fn frame_time(preamble: Preamble, phy: PhyType, frame_length: u32, rate: Rate) -> u32 {
    let divisor = FRAME_TIME_DIVISOR[rate.index()];

    if rate.is_cck() {
        let preamble_time = match preamble {
            Preamble::Short => 96,
            Preamble::Long => 192,
        };
        let mut time = (frame_length * 80) / divisor;
        if (time * divisor) / 80 != frame_length {
            time += 1;
        }
        return preamble_time + time;
    }

    // 16 SERVICE bits and 6 tail bits ride along with the payload.
    let bits = frame_length * 8 + 22;
    let mut symbols = bits / divisor;
    if symbols * divisor != bits {
        symbols += 1;
    }
    let mut time = symbols * 4;
    if phy != PhyType::A {
        time += 6;
    }
    20 + time
}

/// Time-stamp offset written next to each duration field.
pub fn time_stamp_off(preamble: Preamble, rate: Rate) -> u16 {
    TIME_STAMP_OFF[preamble as usize][rate.index()]
}

/// PHY signal/service/length triplet prefixed to every transmit header.
///
/// For CCK (packet type B) the length field carries the frame airtime in
/// microseconds; for OFDM it carries the byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhyField {
    pub signal: u8,
    pub service: u8,
    pub length: u16,
}

/// Serialized size of a [`PhyField`].
pub const PHY_FIELD_LEN: usize = 4;

impl PhyField {
    pub fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        w.write_u8(self.signal)?;
        w.write_u8(self.service)?;
        w.write_u16_le(self.length)
    }
}

/// Compute the PHY field for a frame of `frame_length` bytes.
pub fn phy_field(preamble: Preamble, phy: PhyType, frame_length: u32, rate: Rate) -> PhyField {
    let bit_count = frame_length * 8;
    let mut ext_bit = false;
    let short = preamble == Preamble::Short;
    let mut count = 0u32;

    let signal = match rate {
        Rate::R1M => {
            count = bit_count;
            0x00
        }
        Rate::R2M => {
            count = bit_count / 2;
            if short {
                0x09
            } else {
                0x01
            }
        }
        Rate::R5M => {
            count = (bit_count * 10) / 55;
            if (count * 55) / 10 != bit_count {
                count += 1;
            }
            if short {
                0x0a
            } else {
                0x02
            }
        }
        Rate::R11M => {
            count = bit_count / 11;
            let tmp = count * 11;
            if tmp != bit_count {
                count += 1;
                if bit_count - tmp <= 3 {
                    ext_bit = true;
                }
            }
            if short {
                0x0b
            } else {
                0x03
            }
        }
        Rate::R6M => ofdm_signal(phy, 0x9b),
        Rate::R9M => ofdm_signal(phy, 0x9f),
        Rate::R12M => ofdm_signal(phy, 0x9a),
        Rate::R18M => ofdm_signal(phy, 0x9e),
        Rate::R24M => ofdm_signal(phy, 0x99),
        Rate::R36M => ofdm_signal(phy, 0x9d),
        Rate::R48M => ofdm_signal(phy, 0x98),
        Rate::R54M => ofdm_signal(phy, 0x9c),
    };

    if phy == PhyType::B {
        let mut service = 0x00;
        if ext_bit {
            service |= 0x80;
        }
        PhyField {
            signal,
            service,
            length: count as u16,
        }
    } else {
        PhyField {
            signal,
            service: 0x00,
            length: frame_length as u16,
        }
    }
}

fn ofdm_signal(phy: PhyType, a_code: u8) -> u8 {
    if phy == PhyType::A {
        a_code
    } else {
        a_code & !0x10
    }
}
