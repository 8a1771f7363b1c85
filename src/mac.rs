//! 802.11 MAC header construction
//!
//! This module contains the 802.11 MAC header and Ethernet header
//! structures and the 802.3 to 802.11 translation logic, including
//! operating-mode address assignment and SNAP/802.1H encapsulation.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU16, Ordering};

use crate::config::{DeviceConfig, OperatingMode};
use crate::{Result, TxError, ETH_DATA_LEN, ETH_HDR_LEN};

/// A 48-bit IEEE MAC address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    /// Group bit of the first octet.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

// Frame-control bits (little-endian u16).
pub const FC_TYPE_DATA: u16 = 0x0008;
pub const FC_TYPE_CTL: u16 = 0x0004;
pub const FC_STYPE_RTS: u16 = 0x00b0;
pub const FC_STYPE_CTS: u16 = 0x00c0;
pub const FC_STYPE_PSPOLL: u16 = 0x00a0;
pub const FC_TO_DS: u16 = 0x0100;
pub const FC_FROM_DS: u16 = 0x0200;
pub const FC_MORE_FRAG: u16 = 0x0400;
pub const FC_PROTECTED: u16 = 0x4000;
/// Type + subtype mask used to classify incoming management headers.
pub const FC_TYPE_SUBTYPE_MASK: u16 = 0x00fc;
/// Frame-control value of a PS-Poll control frame.
pub const FC_PSPOLL: u16 = FC_TYPE_CTL | FC_STYPE_PSPOLL;

// SNAP/802.1H encapsulation.
pub const SNAP_RFC1042: [u8; 6] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00];
pub const SNAP_BRIDGE_TUNNEL: [u8; 6] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0xf8];
pub const ETHERTYPE_IPX: u16 = 0x8137;
pub const ETHERTYPE_APPLETALK_AARP: u16 = 0xf380;
pub const ETHERTYPE_EAPOL: u16 = 0x888e;

/// 802.3 Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dest: MacAddr,
    pub src: MacAddr,
    /// Ethertype in host order.
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Parse the leading 14 bytes of an Ethernet frame.
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < ETH_HDR_LEN {
            return Err(TxError::MalformedInput(
                "insufficient data for Ethernet header".to_string(),
            ));
        }
        let mut dest = [0u8; 6];
        let mut src = [0u8; 6];
        buf.copy_to_slice(&mut dest);
        buf.copy_to_slice(&mut src);
        let ethertype = buf.get_u16();
        Ok(Self {
            dest: MacAddr(dest),
            src: MacAddr(src),
            ethertype,
        })
    }

    /// True when the ethertype exceeds the 802.3 length field range and
    /// the payload must be wrapped in a SNAP header on the air.
    pub fn needs_snap(&self) -> bool {
        self.ethertype > ETH_DATA_LEN
    }

    /// SNAP OUI prefix used for this ethertype.
    pub fn snap_prefix(&self) -> &'static [u8; 6] {
        match self.ethertype {
            ETHERTYPE_IPX | ETHERTYPE_APPLETALK_AARP => &SNAP_BRIDGE_TUNNEL,
            _ => &SNAP_RFC1042,
        }
    }

    pub fn is_eapol(&self) -> bool {
        self.ethertype == ETHERTYPE_EAPOL
    }
}

/// Three-address 802.11 MAC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacHeader {
    pub frame_control: u16,
    pub duration: u16,
    pub addr1: MacAddr,
    pub addr2: MacAddr,
    pub addr3: MacAddr,
    pub seq_ctrl: u16,
}

impl MacHeader {
    /// Parse a header from caller-supplied 802.11 frame bytes.
    ///
    /// Short control headers (PS-Poll) carry only two addresses; addr3 is
    /// left zeroed for those.
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 16 {
            return Err(TxError::MalformedInput(
                "insufficient data for MAC header".to_string(),
            ));
        }
        let frame_control = buf.get_u16_le();
        let duration = buf.get_u16_le();
        let mut addr1 = [0u8; 6];
        let mut addr2 = [0u8; 6];
        buf.copy_to_slice(&mut addr1);
        buf.copy_to_slice(&mut addr2);
        let (addr3, seq_ctrl) = if buf.remaining() >= 8 {
            let mut addr3 = [0u8; 6];
            buf.copy_to_slice(&mut addr3);
            (MacAddr(addr3), buf.get_u16_le())
        } else {
            (MacAddr::ZERO, 0)
        };
        Ok(Self {
            frame_control,
            duration,
            addr1: MacAddr(addr1),
            addr2: MacAddr(addr2),
            addr3,
            seq_ctrl,
        })
    }

    /// Serialize as the 24-byte three-address header.
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.frame_control);
        buf.put_u16_le(self.duration);
        buf.put_slice(&self.addr1.0);
        buf.put_slice(&self.addr2.0);
        buf.put_slice(&self.addr3.0);
        buf.put_u16_le(self.seq_ctrl);
    }

    pub fn is_ps_poll(&self) -> bool {
        self.frame_control & FC_TYPE_SUBTYPE_MASK == FC_PSPOLL
    }

    pub fn is_protected(&self) -> bool {
        self.frame_control & FC_PROTECTED != 0
    }

    pub fn to_ds(&self) -> bool {
        self.frame_control & FC_TO_DS != 0
    }
}

/// A wrapping 12-bit transmit sequence counter.
///
/// Advanced once per frame (fragment bursts would share one value, but
/// this driver only emits single-fragment frames).
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU16);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    /// Return the current sequence number and advance, wrapping mod 4096.
    pub fn next(&self) -> u16 {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seq| {
                Some((seq + 1) & 0x0fff)
            })
            .unwrap_or(0)
    }

    /// Sequence number the next frame will carry, without advancing.
    pub fn current(&self) -> u16 {
        self.0.load(Ordering::Acquire) & 0x0fff
    }

    /// Most recently issued sequence number, for the packet-number field.
    pub fn last(&self) -> u16 {
        self.0.load(Ordering::Acquire).wrapping_sub(1) & 0x0fff
    }
}

/// Fragmentation state of a frame, encoded into sequence control and the
/// FIFO fragmentation subfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragKind {
    None,
    First,
    Middle,
    Last,
}

impl FragKind {
    pub fn frag_ctl_bits(self) -> u16 {
        match self {
            FragKind::None => 0x0000,
            FragKind::First => 0x0001,
            FragKind::Middle => 0x0002,
            FragKind::Last => 0x0003,
        }
    }
}

/// Translate an Ethernet header into an 802.11 data MAC header.
///
/// Address assignment and DS flags depend on the operating mode; the
/// duration field carries the NAV value computed by the data-head builder.
pub fn build_data_header(
    config: &DeviceConfig,
    eth: &EthernetHeader,
    duration: u16,
    encrypt: bool,
    frag: FragKind,
    frag_index: u16,
    seq: &SequenceCounter,
) -> MacHeader {
    let mut frame_control = FC_TYPE_DATA;

    let (addr1, addr2, addr3) = match config.mode {
        OperatingMode::AccessPoint => {
            frame_control |= FC_FROM_DS;
            (eth.dest, config.bssid, eth.src)
        }
        OperatingMode::Adhoc => (eth.dest, eth.src, config.bssid),
        OperatingMode::Station => {
            frame_control |= FC_TO_DS;
            (config.bssid, eth.src, eth.dest)
        }
    };

    if encrypt {
        frame_control |= FC_PROTECTED;
    }

    if matches!(frag, FragKind::First | FragKind::Middle) {
        frame_control |= FC_MORE_FRAG;
    }

    // Fragments of one burst share a sequence number; the counter
    // advances once, on the last (or only) fragment.
    let seq_ctrl = if matches!(frag, FragKind::None | FragKind::Last) {
        (seq.next() << 4) | (frag_index & 0x000f)
    } else {
        (seq.current() << 4) | (frag_index & 0x000f)
    };

    MacHeader {
        frame_control,
        duration,
        addr1,
        addr2,
        addr3,
        seq_ctrl,
    }
}
