//! Hardware transmit headers
//!
//! The per-frame header block handed to the radio: the FIFO control head,
//! the reserved-time words for the automatic-fallback engine, the optional
//! RTS/CTS protection head with its embedded control-frame body, and the
//! data head carrying PHY fields and durations for the frame itself.
//!
//! Layouts are hardware ABI. Every struct here serializes to an exact
//! byte count, reserved words included, and the size tests below pin
//! those counts.

use crate::baseband::{phy_field, time_stamp_off, PhyField};
use crate::config::{DeviceConfig, OperatingMode};
use crate::duration::{DurationCalculator, DurationKind, RsvKind};
use crate::mac::{MacAddr, FC_STYPE_CTS, FC_STYPE_RTS, FC_TYPE_CTL};
use crate::rates::{FallbackMode, PhyType, Rate};
use crate::wire::WireWriter;
use crate::{Result, CTS_FRAME_LEN, RTS_FRAME_LEN};

// FIFO control word bits.
pub const FIFOCTL_AUTO_FB_1: u16 = 0x1000;
pub const FIFOCTL_AUTO_FB_0: u16 = 0x0800;
pub const FIFOCTL_GRPACK: u16 = 0x0400;
pub const FIFOCTL_RTS: u16 = 0x0080;
pub const FIFOCTL_ISDMA0: u16 = 0x0040;
pub const FIFOCTL_GENINT: u16 = 0x0020;
pub const FIFOCTL_TMOEN: u16 = 0x0010;
pub const FIFOCTL_LRETRY: u16 = 0x0008;
pub const FIFOCTL_NEEDACK: u16 = 0x0002;

// Fragment control word bits. Bits 10-15 carry the MAC header length,
// bits 8-9 the cipher, bits 0-1 the fragment position.
pub const FRAGCTL_AES: u16 = 0x0300;
pub const FRAGCTL_TKIP: u16 = 0x0200;
pub const FRAGCTL_LEGACY: u16 = 0x0100;

/// MAC header length subfield of the fragment control word.
pub fn fragctl_hdr_len(mac_hdr_len: usize) -> u16 {
    (mac_hdr_len as u16) << 10
}

/// Serialized size of [`FifoHead`].
pub const FIFO_HEAD_LEN: usize = 24;

/// Leading control head of every non-beacon transmit buffer.
#[derive(Debug, Clone, Default)]
pub struct FifoHead {
    pub tx_key: [u8; 16],
    pub fifo_ctl: u16,
    pub time_stamp: u16,
    pub frag_ctl: u16,
    pub current_rate: u16,
}

impl FifoHead {
    pub fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        w.write(&self.tx_key)?;
        w.write_u16_le(self.fifo_ctl)?;
        w.write_u16_le(self.time_stamp)?;
        w.write_u16_le(self.frag_ctl)?;
        w.write_u16_le(self.current_rate)
    }
}

/// Serialized size of [`ShortFifoHead`].
pub const SHORT_FIFO_HEAD_LEN: usize = 12;

/// Abbreviated control head used by the beacon path.
#[derive(Debug, Clone, Default)]
pub struct ShortFifoHead {
    pub fifo_ctl: u16,
    pub time_stamp: u16,
    pub phy: PhyField,
    pub duration: u16,
    pub time_stamp_off: u16,
}

impl ShortFifoHead {
    pub fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        w.write_u16_le(self.fifo_ctl)?;
        w.write_u16_le(self.time_stamp)?;
        self.phy.serialize(w)?;
        w.write_u16_le(self.duration)?;
        w.write_u16_le(self.time_stamp_off)
    }
}

/// Reserved-time words consulted by the automatic-fallback engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RsvTimeHead {
    /// 11g frame protected by RTS: three exchange reservations plus the
    /// bare frame time at both modulation classes. 12 bytes.
    Rts {
        rts_ba: u16,
        rts_aa: u16,
        rts_bb: u16,
        time_a: u16,
        time_b: u16,
    },
    /// 11g frame behind CTS-to-self. 8 bytes.
    Cts { cts_ba: u16, time_a: u16, time_b: u16 },
    /// Single-class 11a/11b frame, with or without RTS. 4 bytes.
    Ab { rts: u16, time: u16 },
}

impl RsvTimeHead {
    pub fn serialized_len(&self) -> usize {
        match self {
            RsvTimeHead::Rts { .. } => 12,
            RsvTimeHead::Cts { .. } => 8,
            RsvTimeHead::Ab { .. } => 4,
        }
    }

    pub fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        match *self {
            RsvTimeHead::Rts {
                rts_ba,
                rts_aa,
                rts_bb,
                time_a,
                time_b,
            } => {
                w.write_u16_le(rts_ba)?;
                w.write_u16_le(rts_aa)?;
                w.write_u16_le(rts_bb)?;
                w.write_u16_le(0)?; // reserved
                w.write_u16_le(time_a)?;
                w.write_u16_le(time_b)
            }
            RsvTimeHead::Cts {
                cts_ba,
                time_a,
                time_b,
            } => {
                w.write_u16_le(cts_ba)?;
                w.write_u16_le(0)?; // reserved
                w.write_u16_le(time_a)?;
                w.write_u16_le(time_b)
            }
            RsvTimeHead::Ab { rts, time } => {
                w.write_u16_le(rts)?;
                w.write_u16_le(time)
            }
        }
    }
}

/// On-air RTS frame body embedded in the protection head, FCS excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtsBody {
    pub frame_control: u16,
    pub duration: u16,
    pub ra: MacAddr,
    pub ta: MacAddr,
}

pub const RTS_BODY_LEN: usize = 16;

impl RtsBody {
    fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        w.write_u16_le(self.frame_control)?;
        w.write_u16_le(self.duration)?;
        w.write(self.ra.as_bytes())?;
        w.write(self.ta.as_bytes())
    }
}

/// On-air CTS frame body, FCS excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtsBody {
    pub frame_control: u16,
    pub duration: u16,
    pub ra: MacAddr,
}

pub const CTS_BODY_LEN: usize = 10;

impl CtsBody {
    fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        w.write_u16_le(self.frame_control)?;
        w.write_u16_le(self.duration)?;
        w.write(self.ra.as_bytes())
    }
}

/// RTS or CTS protection head, one of six hardware layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionHead {
    /// 11g RTS: dual PHY fields, three durations. 32 bytes.
    RtsG {
        b: PhyField,
        a: PhyField,
        duration_ba: u16,
        duration_aa: u16,
        duration_bb: u16,
        body: RtsBody,
    },
    /// 11g RTS with fallback durations. 40 bytes.
    RtsGFb {
        b: PhyField,
        a: PhyField,
        duration_ba: u16,
        duration_aa: u16,
        duration_bb: u16,
        duration_ba_f0: u16,
        duration_aa_f0: u16,
        duration_ba_f1: u16,
        duration_aa_f1: u16,
        body: RtsBody,
    },
    /// Single-class 11a/11b RTS. 24 bytes.
    RtsAb {
        ab: PhyField,
        duration: u16,
        body: RtsBody,
    },
    /// 11a RTS with fallback durations. 28 bytes.
    RtsAFb {
        a: PhyField,
        duration: u16,
        duration_f0: u16,
        duration_f1: u16,
        body: RtsBody,
    },
    /// CTS-to-self. 20 bytes.
    Cts {
        b: PhyField,
        duration_ba: u16,
        body: CtsBody,
    },
    /// CTS-to-self with fallback durations. 24 bytes.
    CtsFb {
        b: PhyField,
        duration_ba: u16,
        duration_ba_f0: u16,
        duration_ba_f1: u16,
        body: CtsBody,
    },
}

impl ProtectionHead {
    pub fn serialized_len(&self) -> usize {
        match self {
            ProtectionHead::RtsG { .. } => 32,
            ProtectionHead::RtsGFb { .. } => 40,
            ProtectionHead::RtsAb { .. } => 24,
            ProtectionHead::RtsAFb { .. } => 28,
            ProtectionHead::Cts { .. } => 20,
            ProtectionHead::CtsFb { .. } => 24,
        }
    }

    pub fn is_rts(&self) -> bool {
        !matches!(self, ProtectionHead::Cts { .. } | ProtectionHead::CtsFb { .. })
    }

    pub fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        match self {
            ProtectionHead::RtsG {
                b,
                a,
                duration_ba,
                duration_aa,
                duration_bb,
                body,
            } => {
                b.serialize(w)?;
                a.serialize(w)?;
                w.write_u16_le(*duration_ba)?;
                w.write_u16_le(*duration_aa)?;
                w.write_u16_le(*duration_bb)?;
                w.write_u16_le(0)?; // reserved
                body.serialize(w)
            }
            ProtectionHead::RtsGFb {
                b,
                a,
                duration_ba,
                duration_aa,
                duration_bb,
                duration_ba_f0,
                duration_aa_f0,
                duration_ba_f1,
                duration_aa_f1,
                body,
            } => {
                b.serialize(w)?;
                a.serialize(w)?;
                w.write_u16_le(*duration_ba)?;
                w.write_u16_le(*duration_aa)?;
                w.write_u16_le(*duration_bb)?;
                w.write_u16_le(0)?; // reserved
                w.write_u16_le(*duration_ba_f0)?;
                w.write_u16_le(*duration_aa_f0)?;
                w.write_u16_le(*duration_ba_f1)?;
                w.write_u16_le(*duration_aa_f1)?;
                body.serialize(w)
            }
            ProtectionHead::RtsAb { ab, duration, body } => {
                ab.serialize(w)?;
                w.write_u16_le(*duration)?;
                w.write_u16_le(0)?; // reserved
                body.serialize(w)
            }
            ProtectionHead::RtsAFb {
                a,
                duration,
                duration_f0,
                duration_f1,
                body,
            } => {
                a.serialize(w)?;
                w.write_u16_le(*duration)?;
                w.write_u16_le(0)?; // reserved
                w.write_u16_le(*duration_f0)?;
                w.write_u16_le(*duration_f1)?;
                body.serialize(w)
            }
            ProtectionHead::Cts {
                b,
                duration_ba,
                body,
            } => {
                b.serialize(w)?;
                w.write_u16_le(*duration_ba)?;
                w.write_u16_le(0)?; // reserved
                body.serialize(w)?;
                w.write_u16_le(0) // reserved2
            }
            ProtectionHead::CtsFb {
                b,
                duration_ba,
                duration_ba_f0,
                duration_ba_f1,
                body,
            } => {
                b.serialize(w)?;
                w.write_u16_le(*duration_ba)?;
                w.write_u16_le(0)?; // reserved
                w.write_u16_le(*duration_ba_f0)?;
                w.write_u16_le(*duration_ba_f1)?;
                body.serialize(w)?;
                w.write_u16_le(0) // reserved2
            }
        }
    }
}

/// PHY fields, durations and timestamp offsets for the data frame itself,
/// one of four hardware layouts. The MAC header follows immediately on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataHead {
    /// 11g dual-class head. 16 bytes.
    G {
        b: PhyField,
        a: PhyField,
        duration_b: u16,
        duration_a: u16,
        time_stamp_off_b: u16,
        time_stamp_off_a: u16,
    },
    /// 11g dual-class head with fallback durations. 20 bytes.
    GFb {
        b: PhyField,
        a: PhyField,
        duration_b: u16,
        duration_a: u16,
        duration_a_f0: u16,
        duration_a_f1: u16,
        time_stamp_off_b: u16,
        time_stamp_off_a: u16,
    },
    /// Single-class 11a/11b head. 8 bytes.
    Ab {
        ab: PhyField,
        duration: u16,
        time_stamp_off: u16,
    },
    /// 11a head with fallback durations. 12 bytes.
    AFb {
        a: PhyField,
        duration: u16,
        duration_f0: u16,
        duration_f1: u16,
        time_stamp_off: u16,
    },
}

impl DataHead {
    /// NAV value to copy into the MAC header's duration field.
    pub fn duration(&self) -> u16 {
        match *self {
            DataHead::G { duration_a, .. } => duration_a,
            DataHead::GFb { duration_a, .. } => duration_a,
            DataHead::Ab { duration, .. } => duration,
            DataHead::AFb { duration, .. } => duration,
        }
    }

    pub fn serialized_len(&self) -> usize {
        match self {
            DataHead::G { .. } => 16,
            DataHead::GFb { .. } => 20,
            DataHead::Ab { .. } => 8,
            DataHead::AFb { .. } => 12,
        }
    }

    /// Byte offsets of the duration fields, relative to the head start.
    /// Used to patch the association ID back in for PS-Poll frames.
    pub fn duration_offsets(&self) -> &'static [usize] {
        match self {
            DataHead::G { .. } | DataHead::GFb { .. } => &[8, 10],
            DataHead::Ab { .. } | DataHead::AFb { .. } => &[4],
        }
    }

    pub fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        match self {
            DataHead::G {
                b,
                a,
                duration_b,
                duration_a,
                time_stamp_off_b,
                time_stamp_off_a,
            } => {
                b.serialize(w)?;
                a.serialize(w)?;
                w.write_u16_le(*duration_b)?;
                w.write_u16_le(*duration_a)?;
                w.write_u16_le(*time_stamp_off_b)?;
                w.write_u16_le(*time_stamp_off_a)
            }
            DataHead::GFb {
                b,
                a,
                duration_b,
                duration_a,
                duration_a_f0,
                duration_a_f1,
                time_stamp_off_b,
                time_stamp_off_a,
            } => {
                b.serialize(w)?;
                a.serialize(w)?;
                w.write_u16_le(*duration_b)?;
                w.write_u16_le(*duration_a)?;
                w.write_u16_le(*duration_a_f0)?;
                w.write_u16_le(*duration_a_f1)?;
                w.write_u16_le(*time_stamp_off_b)?;
                w.write_u16_le(*time_stamp_off_a)
            }
            DataHead::Ab {
                ab,
                duration,
                time_stamp_off,
            } => {
                ab.serialize(w)?;
                w.write_u16_le(*duration)?;
                w.write_u16_le(*time_stamp_off)
            }
            DataHead::AFb {
                a,
                duration,
                duration_f0,
                duration_f1,
                time_stamp_off,
            } => {
                a.serialize(w)?;
                w.write_u16_le(*duration)?;
                w.write_u16_le(*time_stamp_off)?;
                w.write_u16_le(*duration_f0)?;
                w.write_u16_le(*duration_f1)
            }
        }
    }
}

/// Builds the PHY-dependent header parts for one frame.
pub struct HeadBuilder<'a> {
    config: &'a DeviceConfig,
    calc: DurationCalculator,
}

impl<'a> HeadBuilder<'a> {
    pub fn new(config: &'a DeviceConfig) -> Self {
        Self {
            config,
            calc: DurationCalculator::new(config),
        }
    }

    pub fn calc(&self) -> &DurationCalculator {
        &self.calc
    }

    /// Reserved-time head for a frame, shaped by PHY class and whether an
    /// RTS exchange precedes it.
    pub fn rsv_time(
        &self,
        phy: PhyType,
        frame_length: u32,
        rate: Rate,
        need_ack: bool,
        with_rts: bool,
    ) -> RsvTimeHead {
        let c = &self.calc;
        if phy.is_g() {
            let time_a = c.tx_reserve_time(phy, frame_length, rate, need_ack);
            let time_b = c.tx_reserve_time(
                PhyType::B,
                frame_length,
                self.config.top_cck_rate,
                need_ack,
            );
            if with_rts {
                RsvTimeHead::Rts {
                    rts_ba: c.rts_cts_reserve_time(RsvKind::CckToOfdm, phy, frame_length, rate),
                    rts_aa: c.rts_cts_reserve_time(RsvKind::OfdmToOfdm, phy, frame_length, rate),
                    rts_bb: c.rts_cts_reserve_time(RsvKind::CckToCck, phy, frame_length, rate),
                    time_a,
                    time_b,
                }
            } else {
                RsvTimeHead::Cts {
                    cts_ba: c.rts_cts_reserve_time(RsvKind::CtsOnly, phy, frame_length, rate),
                    time_a,
                    time_b,
                }
            }
        } else {
            let kind = if phy == PhyType::A {
                RsvKind::OfdmToOfdm
            } else {
                RsvKind::CckToCck
            };
            RsvTimeHead::Ab {
                rts: if with_rts {
                    c.rts_cts_reserve_time(kind, phy, frame_length, rate)
                } else {
                    0
                },
                time: c.tx_reserve_time(phy, frame_length, rate, need_ack),
            }
        }
    }

    /// RTS head for a protected frame. `dest`/`src` are the data frame's
    /// endpoint addresses; the RTS receiver/transmitter pair depends on
    /// the operating mode.
    pub fn rts_head(
        &self,
        phy: PhyType,
        frame_length: u32,
        rate: Rate,
        need_ack: bool,
        fallback: FallbackMode,
        dest: MacAddr,
        src: MacAddr,
    ) -> ProtectionHead {
        let c = &self.calc;
        let rts_len = RTS_FRAME_LEN as u32;
        let preamble = self.config.preamble;
        let (ra, ta) = match self.config.mode {
            OperatingMode::AccessPoint => (dest, self.config.bssid),
            OperatingMode::Adhoc => (dest, self.config.own_addr),
            OperatingMode::Station => (self.config.bssid, src),
        };
        let frame_control = FC_TYPE_CTL | FC_STYPE_RTS;
        let dur =
            |kind| c.rts_cts_duration(kind, frame_length, phy, rate, need_ack, fallback);

        if phy.is_g() {
            let b = phy_field(preamble, PhyType::B, rts_len, self.config.top_cck_rate);
            let a = phy_field(preamble, phy, rts_len, self.config.top_ofdm_rate);
            let duration_ba = dur(DurationKind::RtsBa);
            let duration_aa = dur(DurationKind::RtsAa);
            // The all-CCK leg reprices the protected frame at the top CCK
            // basic rate.
            let duration_bb = c.rts_cts_duration(
                DurationKind::RtsBb,
                frame_length,
                PhyType::B,
                self.config.top_cck_rate,
                need_ack,
                fallback,
            );
            let body = RtsBody {
                frame_control,
                duration: duration_aa,
                ra,
                ta,
            };
            if fallback == FallbackMode::None {
                ProtectionHead::RtsG {
                    b,
                    a,
                    duration_ba,
                    duration_aa,
                    duration_bb,
                    body,
                }
            } else {
                ProtectionHead::RtsGFb {
                    b,
                    a,
                    duration_ba,
                    duration_aa,
                    duration_bb,
                    duration_ba_f0: dur(DurationKind::RtsBaF0),
                    duration_aa_f0: dur(DurationKind::RtsAaF0),
                    duration_ba_f1: dur(DurationKind::RtsBaF1),
                    duration_aa_f1: dur(DurationKind::RtsAaF1),
                    body,
                }
            }
        } else {
            // 11a and 11b share the combined head: the OFDM basic rate in
            // the PHY field and the OFDM-class duration, for both classes.
            let ab = phy_field(preamble, phy, rts_len, self.config.top_ofdm_rate);
            let duration = dur(DurationKind::RtsAa);
            let body = RtsBody {
                frame_control,
                duration,
                ra,
                ta,
            };
            if phy == PhyType::A && fallback != FallbackMode::None {
                ProtectionHead::RtsAFb {
                    a: ab,
                    duration,
                    duration_f0: dur(DurationKind::RtsAaF0),
                    duration_f1: dur(DurationKind::RtsAaF1),
                    body,
                }
            } else {
                ProtectionHead::RtsAb { ab, duration, body }
            }
        }
    }

    /// CTS-to-self head, used by every unprotected 11g frame. Receiver is
    /// the adapter itself.
    pub fn cts_head(
        &self,
        phy: PhyType,
        frame_length: u32,
        rate: Rate,
        need_ack: bool,
        fallback: FallbackMode,
    ) -> ProtectionHead {
        let c = &self.calc;
        let b = phy_field(
            self.config.preamble,
            PhyType::B,
            CTS_FRAME_LEN as u32,
            self.config.top_cck_rate,
        );
        let dur =
            |kind| c.rts_cts_duration(kind, frame_length, phy, rate, need_ack, fallback);
        let duration_ba = dur(DurationKind::CtsBa);
        let body = CtsBody {
            frame_control: FC_TYPE_CTL | FC_STYPE_CTS,
            duration: duration_ba,
            ra: self.config.own_addr,
        };
        if fallback == FallbackMode::None {
            ProtectionHead::Cts {
                b,
                duration_ba,
                body,
            }
        } else {
            ProtectionHead::CtsFb {
                b,
                duration_ba,
                duration_ba_f0: dur(DurationKind::CtsBaF0),
                duration_ba_f1: dur(DurationKind::CtsBaF1),
                body,
            }
        }
    }

    /// Data head for the frame itself.
    pub fn data_head(
        &self,
        phy: PhyType,
        frame_length: u32,
        rate: Rate,
        need_ack: bool,
        fallback: FallbackMode,
        with_rts: bool,
    ) -> DataHead {
        let c = &self.calc;
        let preamble = self.config.preamble;

        if phy.is_g() {
            let b = phy_field(preamble, PhyType::B, frame_length, self.config.top_cck_rate);
            let a = phy_field(preamble, phy, frame_length, rate);
            let duration_b = c.data_duration(PhyType::B, need_ack);
            let duration_a = c.data_duration(phy, need_ack);
            let time_stamp_off_b = time_stamp_off(preamble, self.config.top_cck_rate);
            let time_stamp_off_a = time_stamp_off(preamble, rate);
            if fallback == FallbackMode::None {
                DataHead::G {
                    b,
                    a,
                    duration_b,
                    duration_a,
                    time_stamp_off_b,
                    time_stamp_off_a,
                }
            } else {
                DataHead::GFb {
                    b,
                    a,
                    duration_b,
                    duration_a,
                    duration_a_f0: duration_a,
                    duration_a_f1: duration_a,
                    time_stamp_off_b,
                    time_stamp_off_a,
                }
            }
        } else {
            let ab = phy_field(preamble, phy, frame_length, rate);
            let duration = c.data_duration(phy, need_ack);
            let time_stamp_off = time_stamp_off(preamble, rate);
            // 11a frames take the fallback-shaped head on the bare path;
            // behind an RTS the short head is used unless fallback is on.
            let a_fb = phy == PhyType::A
                && (!with_rts || fallback != FallbackMode::None);
            if a_fb {
                DataHead::AFb {
                    a: ab,
                    duration,
                    duration_f0: duration,
                    duration_f1: duration,
                    time_stamp_off,
                }
            } else {
                DataHead::Ab {
                    ab,
                    duration,
                    time_stamp_off,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BandType;
    use crate::rates::Preamble;

    fn config() -> DeviceConfig {
        DeviceConfig {
            own_addr: MacAddr([0x02, 0, 0, 0, 0, 1]),
            bssid: MacAddr([0x02, 0, 0, 0, 0, 2]),
            band: BandType::G,
            preamble: Preamble::Long,
            top_cck_rate: Rate::R11M,
            top_ofdm_rate: Rate::R24M,
            ..DeviceConfig::default()
        }
    }

    fn serialize_len(f: impl Fn(&mut WireWriter) -> Result<()>) -> usize {
        let mut w = WireWriter::new(256);
        f(&mut w).unwrap();
        w.position()
    }

    #[test]
    fn test_fifo_head_layout() {
        let head = FifoHead {
            tx_key: [0; 16],
            fifo_ctl: 0x0282,
            time_stamp: 8000,
            frag_ctl: 0x6000,
            current_rate: 11,
        };
        let mut w = WireWriter::new(64);
        head.serialize(&mut w).unwrap();
        assert_eq!(w.position(), FIFO_HEAD_LEN);
        // fifo_ctl at offset 16, little-endian.
        assert_eq!(&w.as_slice()[16..18], &[0x82, 0x02]);
    }

    #[test]
    fn test_short_fifo_head_layout() {
        let head = ShortFifoHead::default();
        assert_eq!(serialize_len(|w| head.serialize(w)), SHORT_FIFO_HEAD_LEN);
    }

    #[test]
    fn test_rsv_time_head_sizes() {
        let cfg = config();
        let b = HeadBuilder::new(&cfg);
        let rts = b.rsv_time(PhyType::Ga, 100, Rate::R54M, true, true);
        let cts = b.rsv_time(PhyType::Ga, 100, Rate::R54M, true, false);
        let ab = b.rsv_time(PhyType::B, 100, Rate::R11M, true, false);
        assert_eq!(serialize_len(|w| rts.serialize(w)), 12);
        assert_eq!(serialize_len(|w| cts.serialize(w)), 8);
        assert_eq!(serialize_len(|w| ab.serialize(w)), 4);
        assert_eq!(rts.serialized_len(), 12);
        assert_eq!(cts.serialized_len(), 8);
        assert_eq!(ab.serialized_len(), 4);
    }

    #[test]
    fn test_ab_rsv_without_rts_zeroes_rts_word() {
        let cfg = config();
        let b = HeadBuilder::new(&cfg);
        match b.rsv_time(PhyType::A, 100, Rate::R24M, true, false) {
            RsvTimeHead::Ab { rts, time } => {
                assert_eq!(rts, 0);
                assert!(time > 0);
            }
            other => panic!("unexpected head {:?}", other),
        }
    }

    #[test]
    fn test_protection_head_sizes() {
        let cfg = config();
        let b = HeadBuilder::new(&cfg);
        let dest = MacAddr([0xaa; 6]);
        let src = MacAddr([0xbb; 6]);

        let rts_g = b.rts_head(PhyType::Ga, 400, Rate::R54M, true, FallbackMode::None, dest, src);
        let rts_g_fb = b.rts_head(PhyType::Ga, 400, Rate::R54M, true, FallbackMode::Opt0, dest, src);
        let rts_ab = b.rts_head(PhyType::B, 400, Rate::R11M, true, FallbackMode::None, dest, src);
        let rts_a_fb = b.rts_head(PhyType::A, 400, Rate::R54M, true, FallbackMode::Opt1, dest, src);
        let cts = b.cts_head(PhyType::Ga, 400, Rate::R54M, true, FallbackMode::None);
        let cts_fb = b.cts_head(PhyType::Ga, 400, Rate::R54M, true, FallbackMode::Opt0);

        for (head, len) in [
            (&rts_g, 32),
            (&rts_g_fb, 40),
            (&rts_ab, 24),
            (&rts_a_fb, 28),
            (&cts, 20),
            (&cts_fb, 24),
        ] {
            assert_eq!(head.serialized_len(), len);
            assert_eq!(serialize_len(|w| head.serialize(w)), len);
        }
    }

    #[test]
    fn test_rts_addresses_per_mode() {
        let dest = MacAddr([0xaa; 6]);
        let src = MacAddr([0xbb; 6]);

        let mut cfg = config();
        cfg.mode = OperatingMode::AccessPoint;
        let head = HeadBuilder::new(&cfg).rts_head(
            PhyType::Ga,
            400,
            Rate::R54M,
            true,
            FallbackMode::None,
            dest,
            src,
        );
        if let ProtectionHead::RtsG { body, .. } = &head {
            assert_eq!(body.ra, dest);
            assert_eq!(body.ta, cfg.bssid);
        } else {
            panic!("expected RtsG");
        }

        cfg.mode = OperatingMode::Station;
        let head = HeadBuilder::new(&cfg).rts_head(
            PhyType::Ga,
            400,
            Rate::R54M,
            true,
            FallbackMode::None,
            dest,
            src,
        );
        if let ProtectionHead::RtsG { body, .. } = &head {
            assert_eq!(body.ra, cfg.bssid);
            assert_eq!(body.ta, src);
        } else {
            panic!("expected RtsG");
        }
    }

    #[test]
    fn test_cts_is_addressed_to_self() {
        let cfg = config();
        let head = HeadBuilder::new(&cfg).cts_head(PhyType::Ga, 400, Rate::R54M, true, FallbackMode::None);
        if let ProtectionHead::Cts { body, duration_ba, .. } = &head {
            assert_eq!(body.ra, cfg.own_addr);
            assert_eq!(body.duration, *duration_ba);
            assert_eq!(body.frame_control, 0x00c4);
        } else {
            panic!("expected Cts");
        }
    }

    #[test]
    fn test_rts_g_duration_bb_is_cck_priced() {
        let cfg = config();
        let head = HeadBuilder::new(&cfg).rts_head(
            PhyType::Ga,
            100,
            Rate::R54M,
            true,
            FallbackMode::None,
            MacAddr([0xaa; 6]),
            MacAddr([0xbb; 6]),
        );
        if let ProtectionHead::RtsG {
            duration_aa,
            duration_bb,
            ..
        } = head
        {
            // OFDM leg: 34 us CTS + 2*SIFS + 86 us reserve at 54M.
            assert_eq!(duration_aa, 140);
            // CCK leg reprices the 100-byte frame at 11M: 203 us CTS +
            // 2*SIFS + 478 us reserve.
            assert_eq!(duration_bb, 701);
        } else {
            panic!("expected RtsG");
        }
    }

    #[test]
    fn test_11b_rts_head_uses_ofdm_basic_rate() {
        let cfg = config();
        let b = HeadBuilder::new(&cfg);
        let head = b.rts_head(
            PhyType::B,
            100,
            Rate::R11M,
            true,
            FallbackMode::None,
            MacAddr([0xaa; 6]),
            MacAddr([0xbb; 6]),
        );
        if let ProtectionHead::RtsAb { ab, duration, .. } = head {
            // 24M OFDM signal code in its mixed-mode form.
            assert_eq!(ab.signal, 0x89);
            let expected = b.calc().rts_cts_duration(
                DurationKind::RtsAa,
                100,
                PhyType::B,
                Rate::R11M,
                true,
                FallbackMode::None,
            );
            assert_eq!(duration, expected);
        } else {
            panic!("expected RtsAb");
        }
    }

    #[test]
    fn test_rts_body_frame_control() {
        let cfg = config();
        let head = HeadBuilder::new(&cfg).rts_head(
            PhyType::B,
            400,
            Rate::R11M,
            true,
            FallbackMode::None,
            MacAddr([0xaa; 6]),
            MacAddr([0xbb; 6]),
        );
        if let ProtectionHead::RtsAb { body, duration, .. } = &head {
            assert_eq!(body.frame_control, 0x00b4);
            assert_eq!(body.duration, *duration);
        } else {
            panic!("expected RtsAb");
        }
    }

    #[test]
    fn test_data_head_sizes_and_duration() {
        let cfg = config();
        let b = HeadBuilder::new(&cfg);

        let g = b.data_head(PhyType::Ga, 400, Rate::R54M, true, FallbackMode::None, false);
        let g_fb = b.data_head(PhyType::Ga, 400, Rate::R54M, true, FallbackMode::Opt0, false);
        let ab = b.data_head(PhyType::B, 400, Rate::R11M, true, FallbackMode::None, false);
        let a_fb = b.data_head(PhyType::A, 400, Rate::R54M, true, FallbackMode::Opt1, true);

        for (head, len) in [(&g, 16), (&g_fb, 20), (&ab, 8), (&a_fb, 12)] {
            assert_eq!(head.serialized_len(), len);
            assert_eq!(serialize_len(|w| head.serialize(w)), len);
        }

        // NAV of the G head is the OFDM-class duration: SIFS + OFDM ACK.
        assert_eq!(g.duration(), 44);
        // 11B falls back to Ab even with fallback configured.
        let b_fb = b.data_head(PhyType::B, 400, Rate::R11M, true, FallbackMode::Opt0, false);
        assert!(matches!(b_fb, DataHead::Ab { .. }));
    }

    #[test]
    fn test_bare_11a_path_takes_fallback_shaped_head() {
        let cfg = config();
        let b = HeadBuilder::new(&cfg);

        // No RTS: the 12-byte head, fallback durations pinned to the
        // primary duration.
        let bare = b.data_head(PhyType::A, 400, Rate::R24M, true, FallbackMode::None, false);
        assert_eq!(bare.serialized_len(), 12);
        if let DataHead::AFb {
            duration,
            duration_f0,
            duration_f1,
            ..
        } = bare
        {
            assert_eq!(duration_f0, duration);
            assert_eq!(duration_f1, duration);
        } else {
            panic!("expected AFb");
        }

        // Behind an RTS without fallback, the short head is used.
        let rts = b.data_head(PhyType::A, 400, Rate::R24M, true, FallbackMode::None, true);
        assert!(matches!(rts, DataHead::Ab { .. }));
    }

    #[test]
    fn test_a_fb_data_head_byte_layout() {
        let head = DataHead::AFb {
            a: PhyField {
                signal: 0x9c,
                service: 0,
                length: 100,
            },
            duration: 0x1111,
            duration_f0: 0x2222,
            duration_f1: 0x3333,
            time_stamp_off: 0x4444,
        };
        let mut w = WireWriter::new(16);
        head.serialize(&mut w).unwrap();
        // duration, time_stamp_off, then the two fallback durations.
        assert_eq!(
            &w.as_slice()[4..12],
            &[0x11, 0x11, 0x44, 0x44, 0x22, 0x22, 0x33, 0x33]
        );
    }

    #[test]
    fn test_data_head_duration_offsets() {
        let cfg = config();
        let b = HeadBuilder::new(&cfg);
        let g = b.data_head(PhyType::Ga, 400, Rate::R54M, true, FallbackMode::None, false);
        let mut w = WireWriter::new(64);
        g.serialize(&mut w).unwrap();
        for &off in g.duration_offsets() {
            let stored = u16::from_le_bytes([w.as_slice()[off], w.as_slice()[off + 1]]);
            assert_eq!(stored, 44);
        }
    }

    #[test]
    fn test_fragctl_hdr_len() {
        assert_eq!(fragctl_hdr_len(24), 0x6000);
        assert_eq!(fragctl_hdr_len(28), 0x7000);
    }
}
