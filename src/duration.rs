//! Duration and reserved-time calculation
//!
//! Every transmit header carries one or more 16-bit microsecond fields:
//! the NAV duration written into the MAC header, and the "reserved time"
//! fields the hardware consults when it retries a frame at a fallback
//! rate without host intervention. The control-response frames (RTS 20
//! bytes, CTS/ACK 14 bytes) are always sent at the basic rate of the
//! matching modulation class.

use crate::config::DeviceConfig;
use crate::rates::{fallback_rates, FallbackMode, PhyType, Preamble, Rate};
use crate::baseband::frame_time;
use crate::{ACK_FRAME_LEN, RTS_FRAME_LEN};

/// Which duration field of a protection head is being computed.
///
/// The `B`/`A` letters name the modulation class of the responder's CTS
/// (CCK or OFDM); `F0`/`F1` variants price the frame at the first or
/// second fallback rate instead of the primary rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationKind {
    RtsBb,
    RtsBa,
    RtsAa,
    CtsBa,
    RtsBaF0,
    RtsAaF0,
    RtsBaF1,
    RtsAaF1,
    CtsBaF0,
    CtsBaF1,
}

/// Reservation shape for the auto-fallback "reserved time" header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsvKind {
    /// RTS and CTS both CCK (pure 11B protection).
    CckToCck,
    /// CCK RTS/CTS protecting an OFDM data frame (mixed 11G).
    CckToOfdm,
    /// RTS and CTS both OFDM (11A).
    OfdmToOfdm,
    /// CTS-to-self, no RTS on the air.
    CtsOnly,
}

/// Airtime calculator bound to the device's basic rates and preamble.
#[derive(Debug, Clone, Copy)]
pub struct DurationCalculator {
    preamble: Preamble,
    sifs: u32,
    top_cck: Rate,
    top_ofdm: Rate,
}

impl DurationCalculator {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            preamble: config.preamble,
            sifs: config.band.sifs(),
            top_cck: config.top_cck_rate,
            top_ofdm: config.top_ofdm_rate,
        }
    }

    fn ack_time(&self, phy: PhyType) -> u32 {
        let rate = if phy == PhyType::B {
            self.top_cck
        } else {
            self.top_ofdm
        };
        frame_time(self.preamble, phy, ACK_FRAME_LEN as u32, rate)
    }

    fn cts_time_cck(&self, phy: PhyType) -> u32 {
        frame_time(self.preamble, phy, ACK_FRAME_LEN as u32, self.top_cck)
    }

    fn cts_time_ofdm(&self, phy: PhyType) -> u32 {
        frame_time(self.preamble, phy, ACK_FRAME_LEN as u32, self.top_ofdm)
    }

    /// Airtime reserved for a data frame plus, when ACKed, SIFS and the
    /// ACK response at the basic rate of the frame's modulation class.
    pub fn tx_reserve_time(
        &self,
        phy: PhyType,
        frame_length: u32,
        rate: Rate,
        need_ack: bool,
    ) -> u16 {
        let data_time = frame_time(self.preamble, phy, frame_length, rate);
        if need_ack {
            (data_time + self.sifs + self.ack_time(phy)) as u16
        } else {
            data_time as u16
        }
    }

    /// NAV value for a data frame: SIFS plus the expected ACK, or zero
    /// when no ACK will follow.
    pub fn data_duration(&self, phy: PhyType, need_ack: bool) -> u16 {
        if need_ack {
            (self.sifs + self.ack_time(phy)) as u16
        } else {
            0
        }
    }

    /// Reserved time covering the whole protected exchange
    /// (RTS + CTS + DATA + ACK with the interleaving SIFS gaps), for
    /// the auto-fallback header fields.
    pub fn rts_cts_reserve_time(
        &self,
        kind: RsvKind,
        phy: PhyType,
        frame_length: u32,
        rate: Rate,
    ) -> u16 {
        let data_time = frame_time(self.preamble, phy, frame_length, rate);
        let rts_len = RTS_FRAME_LEN as u32;

        let total = match kind {
            RsvKind::CckToCck => {
                let rts = frame_time(self.preamble, phy, rts_len, self.top_cck);
                let cts = self.cts_time_cck(phy);
                let ack = cts;
                rts + cts + ack + data_time + 3 * self.sifs
            }
            RsvKind::CckToOfdm => {
                let rts = frame_time(self.preamble, phy, rts_len, self.top_cck);
                let cts = self.cts_time_cck(phy);
                let ack = self.cts_time_ofdm(phy);
                rts + cts + ack + data_time + 3 * self.sifs
            }
            RsvKind::OfdmToOfdm => {
                let rts = frame_time(self.preamble, phy, rts_len, self.top_ofdm);
                let cts = self.cts_time_ofdm(phy);
                let ack = cts;
                rts + cts + ack + data_time + 3 * self.sifs
            }
            RsvKind::CtsOnly => {
                let cts = self.cts_time_cck(phy);
                let ack = self.cts_time_ofdm(phy);
                cts + ack + data_time + 2 * self.sifs
            }
        };
        total as u16
    }

    /// NAV value for an RTS or CTS frame protecting a data frame.
    ///
    /// Fallback kinds reprice the protected data frame at the first or
    /// second fallback rate; they yield zero when the primary rate has no
    /// fallback entry or fallback is disabled.
    pub fn rts_cts_duration(
        &self,
        kind: DurationKind,
        frame_length: u32,
        phy: PhyType,
        rate: Rate,
        need_ack: bool,
        fallback: FallbackMode,
    ) -> u16 {
        let rsv = |r: Rate| u32::from(self.tx_reserve_time(phy, frame_length, r, need_ack));

        let fb = |slot: usize| -> Option<Rate> {
            fallback_rates(fallback, rate).map(|fb| if slot == 0 { fb.fb0 } else { fb.fb1 })
        };

        let dur = match kind {
            DurationKind::RtsBb | DurationKind::RtsBa => {
                self.cts_time_cck(phy) + 2 * self.sifs + rsv(rate)
            }
            DurationKind::RtsAa => self.cts_time_ofdm(phy) + 2 * self.sifs + rsv(rate),
            DurationKind::CtsBa => self.sifs + rsv(rate),
            DurationKind::RtsBaF0 => match fb(0) {
                Some(r) => self.cts_time_cck(phy) + 2 * self.sifs + rsv(r),
                None => 0,
            },
            DurationKind::RtsBaF1 => match fb(1) {
                Some(r) => self.cts_time_cck(phy) + 2 * self.sifs + rsv(r),
                None => 0,
            },
            DurationKind::RtsAaF0 => match fb(0) {
                Some(r) => self.cts_time_ofdm(phy) + 2 * self.sifs + rsv(r),
                None => 0,
            },
            DurationKind::RtsAaF1 => match fb(1) {
                Some(r) => self.cts_time_ofdm(phy) + 2 * self.sifs + rsv(r),
                None => 0,
            },
            DurationKind::CtsBaF0 => match fb(0) {
                Some(r) => self.sifs + rsv(r),
                None => 0,
            },
            DurationKind::CtsBaF1 => match fb(1) {
                Some(r) => self.sifs + rsv(r),
                None => 0,
            },
        };
        dur as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BandType;

    fn calc(band: BandType) -> DurationCalculator {
        let config = DeviceConfig {
            band,
            preamble: Preamble::Long,
            top_cck_rate: Rate::R11M,
            top_ofdm_rate: Rate::R24M,
            ..DeviceConfig::default()
        };
        DurationCalculator::new(&config)
    }

    #[test]
    fn test_tx_reserve_time_cck() {
        let c = calc(BandType::G);
        // 100 bytes at 11M long preamble: 265 us data, +10 SIFS,
        // +203 us CCK ACK.
        assert_eq!(c.tx_reserve_time(PhyType::B, 100, Rate::R11M, true), 478);
        assert_eq!(c.tx_reserve_time(PhyType::B, 100, Rate::R11M, false), 265);
    }

    #[test]
    fn test_tx_reserve_time_ofdm() {
        let c = calc(BandType::G);
        // 100 bytes at 54M mixed mode: 42 us data, +10 SIFS, +34 us ACK.
        assert_eq!(c.tx_reserve_time(PhyType::Ga, 100, Rate::R54M, true), 86);
    }

    #[test]
    fn test_data_duration() {
        let c = calc(BandType::G);
        assert_eq!(c.data_duration(PhyType::B, true), 213);
        assert_eq!(c.data_duration(PhyType::Ga, true), 44);
        assert_eq!(c.data_duration(PhyType::Ga, false), 0);
    }

    #[test]
    fn test_rts_cts_reserve_time() {
        let c = calc(BandType::G);
        // CCK exchange: 207 RTS + 203 CTS + 203 ACK + 265 data + 3*10.
        assert_eq!(
            c.rts_cts_reserve_time(RsvKind::CckToCck, PhyType::B, 100, Rate::R11M),
            878
        );
        // OFDM exchange: 34 + 34 + 34 + 42 + 30.
        assert_eq!(
            c.rts_cts_reserve_time(RsvKind::OfdmToOfdm, PhyType::Ga, 100, Rate::R54M),
            174
        );
        // Mixed: CCK RTS/CTS, OFDM ACK around an OFDM data frame.
        assert_eq!(
            c.rts_cts_reserve_time(RsvKind::CckToOfdm, PhyType::Ga, 100, Rate::R24M),
            536
        );
        // CTS-to-self drops the RTS leg and one SIFS.
        assert_eq!(
            c.rts_cts_reserve_time(RsvKind::CtsOnly, PhyType::Ga, 100, Rate::R54M),
            299
        );
    }

    #[test]
    fn test_rts_cts_duration_primary() {
        let c = calc(BandType::G);
        assert_eq!(
            c.rts_cts_duration(
                DurationKind::RtsBb,
                100,
                PhyType::B,
                Rate::R11M,
                true,
                FallbackMode::None
            ),
            701
        );
        assert_eq!(
            c.rts_cts_duration(
                DurationKind::RtsAa,
                100,
                PhyType::Ga,
                Rate::R54M,
                true,
                FallbackMode::None
            ),
            140
        );
        assert_eq!(
            c.rts_cts_duration(
                DurationKind::CtsBa,
                100,
                PhyType::Ga,
                Rate::R54M,
                true,
                FallbackMode::None
            ),
            96
        );
    }

    #[test]
    fn test_rts_cts_duration_fallback() {
        let c = calc(BandType::G);
        // 54M falls back to 48M in set 0: data frame repriced at 46 us.
        assert_eq!(
            c.rts_cts_duration(
                DurationKind::RtsAaF0,
                100,
                PhyType::Ga,
                Rate::R54M,
                true,
                FallbackMode::Opt0
            ),
            144
        );
        // Set 1 second slot for 54M is 18M.
        assert_eq!(
            c.rts_cts_duration(
                DurationKind::CtsBaF1,
                100,
                PhyType::Ga,
                Rate::R54M,
                true,
                FallbackMode::Opt1
            ),
            128
        );
        // Rates below 18M have no fallback entry.
        assert_eq!(
            c.rts_cts_duration(
                DurationKind::RtsAaF0,
                100,
                PhyType::Ga,
                Rate::R12M,
                true,
                FallbackMode::Opt0
            ),
            0
        );
    }
}
