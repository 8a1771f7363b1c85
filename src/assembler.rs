//! Frame assembly entry points
//!
//! `FrameAssembler` is the device-level object that turns outgoing
//! traffic into complete hardware transmit buffers and hands them to the
//! bulk-out transport. The buffer layout is fixed: a 4-byte descriptor,
//! the FIFO control head, the reserved-time words, an optional CCMP MIC
//! pseudo-header, an optional RTS/CTS protection head, the per-PHY data
//! head, then the MAC header, IV, payload and integrity trailer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, trace, warn};
use serde::Serialize;

use crate::baseband::{phy_field, time_stamp_off};
use crate::config::{
    BandType, DeviceConfig, OperatingMode, DEFAULT_MGMT_LIFETIME_RES_64US,
    DEFAULT_MSDU_LIFETIME_RES_64US,
};
use crate::context::{ContextHandle, PacketKind, TxContextPool};
use crate::crypto::{michael_mic, seal_in_place, EncryptionFramer, TkipMixer};
use crate::key::{CipherKind, KeyStore, TransmitKey};
use crate::mac::{build_data_header, EthernetHeader, FragKind, MacAddr, MacHeader, SequenceCounter};
use crate::protect::{
    fragctl_hdr_len, FifoHead, HeadBuilder, ShortFifoHead, FIFOCTL_GENINT, FIFOCTL_GRPACK,
    FIFOCTL_ISDMA0, FIFOCTL_LRETRY, FIFOCTL_NEEDACK, FIFOCTL_RTS, FIFOCTL_TMOEN, FRAGCTL_AES,
    FRAGCTL_LEGACY, FRAGCTL_TKIP, FIFOCTL_AUTO_FB_0, FIFOCTL_AUTO_FB_1,
};
use crate::rates::{fallback_rates, FallbackMode, PhyType, Rate};
use crate::wire::dword_pad;
use crate::{Result, TxError, ETH_HDR_LEN, FCS_LEN, MAC_HDR_ADDR2_LEN, MAC_HDR_LEN, SNAP_LEN};

/// Descriptor prefix at the head of every transmit buffer.
const DESCRIPTOR_LEN: usize = 4;

/// Where assembled buffers go. Implementations wrap the USB bulk-out
/// pipe; tests capture the buffers instead.
pub trait Transport: Send + Sync {
    fn submit(&self, kind: PacketKind, buffer: &[u8]) -> Result<()>;
}

/// A fully formed 802.11 management MPDU handed in by the MLME, FCS
/// excluded. The assembler rewrites its duration and sequence-control
/// fields; PS-Poll frames keep their association ID in the duration
/// slot.
#[derive(Debug, Clone, Copy)]
pub struct MgmtPacket<'a> {
    pub mpdu: &'a [u8],
}

/// Last frame recorded for one context slot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PktInfo {
    pub dest: MacAddr,
    pub fifo_ctl: u16,
}

/// Transmit-side counters.
#[derive(Debug, Default)]
pub struct TxStats {
    data_frames: AtomicU64,
    mgmt_frames: AtomicU64,
    beacons: AtomicU64,
    bytes: AtomicU64,
    dropped_no_context: AtomicU64,
    dropped_no_key: AtomicU64,
    transport_errors: AtomicU64,
    pkt_info: Mutex<Vec<PktInfo>>,
}

/// Point-in-time copy of [`TxStats`].
#[derive(Debug, Clone, Serialize)]
pub struct TxStatsSnapshot {
    pub data_frames: u64,
    pub mgmt_frames: u64,
    pub beacons: u64,
    pub bytes: u64,
    pub dropped_no_context: u64,
    pub dropped_no_key: u64,
    pub transport_errors: u64,
    pub pkt_info: Vec<PktInfo>,
}

impl TxStats {
    fn new(contexts: usize) -> Self {
        Self {
            pkt_info: Mutex::new(vec![PktInfo::default(); contexts]),
            ..Default::default()
        }
    }

    fn record(&self, pkt_no: u8, kind: PacketKind, dest: MacAddr, fifo_ctl: u16, bytes: usize) {
        match kind {
            PacketKind::Data => self.data_frames.fetch_add(1, Ordering::Relaxed),
            PacketKind::Mgmt => self.mgmt_frames.fetch_add(1, Ordering::Relaxed),
            PacketKind::Beacon => self.beacons.fetch_add(1, Ordering::Relaxed),
        };
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        let mut info = self.pkt_info.lock().unwrap();
        if let Some(slot) = info.get_mut(pkt_no as usize) {
            *slot = PktInfo { dest, fifo_ctl };
        }
    }

    pub fn snapshot(&self) -> TxStatsSnapshot {
        TxStatsSnapshot {
            data_frames: self.data_frames.load(Ordering::Relaxed),
            mgmt_frames: self.mgmt_frames.load(Ordering::Relaxed),
            beacons: self.beacons.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dropped_no_context: self.dropped_no_context.load(Ordering::Relaxed),
            dropped_no_key: self.dropped_no_key.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            pkt_info: self.pkt_info.lock().unwrap().clone(),
        }
    }
}

/// Device-level transmit frame assembler.
pub struct FrameAssembler<T: Transport> {
    config: DeviceConfig,
    transport: T,
    pool: Arc<TxContextPool>,
    keys: Arc<dyn KeyStore>,
    framer: EncryptionFramer,
    seq: SequenceCounter,
    stats: TxStats,
}

impl<T: Transport> FrameAssembler<T> {
    pub fn new(
        config: DeviceConfig,
        transport: T,
        keys: Arc<dyn KeyStore>,
        mixer: Option<Arc<dyn TkipMixer>>,
    ) -> Self {
        let pool = TxContextPool::new(config.tx_contexts);
        let stats = TxStats::new(config.tx_contexts);
        Self {
            config,
            transport,
            pool,
            keys,
            framer: EncryptionFramer::new(mixer),
            seq: SequenceCounter::new(),
            stats,
        }
    }

    pub fn stats(&self) -> TxStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pool(&self) -> &Arc<TxContextPool> {
        &self.pool
    }

    /// Basic rate for control-plane traffic on the current band.
    fn basic_rate(&self) -> (Rate, PhyType) {
        if self.config.band == BandType::A {
            (Rate::R6M, PhyType::A)
        } else {
            (Rate::R1M, PhyType::B)
        }
    }

    /// PHY packet type for a data frame at `rate`.
    fn data_phy(&self, rate: Rate) -> Result<PhyType> {
        if rate.is_cck() {
            if self.config.band == BandType::A {
                return Err(TxError::InvalidParameter(
                    "CCK rate on the 5 GHz band".to_string(),
                ));
            }
            return Ok(PhyType::B);
        }
        match self.config.band {
            BandType::A => Ok(PhyType::A),
            BandType::B => Err(TxError::InvalidParameter(
                "OFDM rate on an 11b-only device".to_string(),
            )),
            BandType::G => Ok(if self.config.protect_mode {
                PhyType::Gb
            } else {
                PhyType::Ga
            }),
        }
    }

    fn acquire(&self, kind: PacketKind) -> Result<ContextHandle> {
        self.pool.acquire(kind).map_err(|e| {
            self.stats.dropped_no_context.fetch_add(1, Ordering::Relaxed);
            warn!("no free transmit context");
            e
        })
    }

    /// Resolve the transmit key for an outgoing data frame. EAPOL frames
    /// use only the pairwise key and fall back to cleartext; everything
    /// else is dropped when no key resolves.
    fn data_key(
        &self,
        eth: &EthernetHeader,
    ) -> Result<Option<Arc<TransmitKey>>> {
        if !self.config.encryption_enabled {
            return Ok(None);
        }
        if eth.is_eapol() {
            return Ok(self.keys.pairwise_key(&eth.dest));
        }
        match self.keys.transmit_key(&eth.dest, &self.config.bssid) {
            Some(key) => Ok(Some(key)),
            None => {
                self.stats.dropped_no_key.fetch_add(1, Ordering::Relaxed);
                debug!("no transmit key for {:x?}", eth.dest.as_bytes());
                Err(TxError::KeyUnavailable)
            }
        }
    }

    /// Assemble and submit one Ethernet frame as an 802.11 data frame.
    ///
    /// `rate` is the rate-control decision for this frame; EAPOL and
    /// group-addressed traffic override it with a basic rate.
    pub fn send_data(&self, eth_frame: &[u8], rate: Rate) -> Result<()> {
        if eth_frame.len() <= ETH_HDR_LEN {
            return Err(TxError::MalformedInput(
                "Ethernet frame carries no payload".to_string(),
            ));
        }
        let eth = EthernetHeader::parse(&mut &eth_frame[..])?;
        let body = &eth_frame[ETH_HDR_LEN..];

        let multicast = eth.dest.is_multicast();
        let rate = if eth.is_eapol() {
            self.basic_rate().0
        } else if multicast && self.config.mode != OperatingMode::Station {
            if self.config.band == BandType::A {
                self.config.top_ofdm_rate
            } else {
                self.config.top_cck_rate
            }
        } else {
            rate
        };
        let phy = self.data_phy(rate)?;

        let need_ack = match self.config.mode {
            OperatingMode::Station => true,
            _ => !multicast,
        };

        let key = self.data_key(&eth)?;
        let encrypt = key.is_some();
        let (iv_len, icv_len, mic_len) = match key.as_deref() {
            Some(k) => (
                k.cipher().iv_len(),
                k.cipher().icv_len(),
                k.cipher().mic_len(),
            ),
            None => (0, 0, 0),
        };

        let body_len = body.len() + if eth.needs_snap() { SNAP_LEN } else { 0 };
        let padding = if encrypt { dword_pad(MAC_HDR_LEN) } else { 0 };
        let frame_size =
            (MAC_HDR_LEN + iv_len + body_len + mic_len + icv_len + FCS_LEN) as u32;

        let need_rts = need_ack && frame_size >= self.config.rts_threshold;
        let fallback = if fallback_rates(self.config.fallback, rate).is_some() {
            self.config.fallback
        } else {
            FallbackMode::None
        };

        let mut fifo_ctl = phy.fifo_bits() | FIFOCTL_TMOEN | FIFOCTL_GENINT;
        if need_ack {
            fifo_ctl |= FIFOCTL_NEEDACK;
        }
        if self.config.group_ack_policy {
            fifo_ctl |= FIFOCTL_GRPACK;
        }
        if need_rts {
            fifo_ctl |= FIFOCTL_RTS | FIFOCTL_LRETRY;
        }
        match fallback {
            FallbackMode::Opt0 => fifo_ctl |= FIFOCTL_AUTO_FB_0,
            FallbackMode::Opt1 => fifo_ctl |= FIFOCTL_AUTO_FB_1,
            FallbackMode::None => {}
        }

        let mut frag_ctl = fragctl_hdr_len(MAC_HDR_LEN) | FragKind::None.frag_ctl_bits();
        if let Some(k) = key.as_deref() {
            frag_ctl |= match k.cipher() {
                CipherKind::Wep => FRAGCTL_LEGACY,
                CipherKind::Tkip => FRAGCTL_TKIP,
                CipherKind::Ccmp => FRAGCTL_AES,
            };
        }

        // Consume the IV/TSC before anything is serialized; the FIFO head
        // carries the per-frame key block.
        let material = match key.as_deref() {
            Some(k) => Some(self.framer.frame_key(k, &self.config.own_addr)?),
            None => None,
        };

        let builder = HeadBuilder::new(&self.config);
        let data_head = builder.data_head(phy, frame_size, rate, need_ack, fallback, need_rts);
        let protection = if need_rts {
            Some(builder.rts_head(phy, frame_size, rate, need_ack, fallback, eth.dest, eth.src))
        } else if phy.is_g() {
            Some(builder.cts_head(phy, frame_size, rate, need_ack, fallback))
        } else {
            None
        };
        let rsv = builder.rsv_time(phy, frame_size, rate, need_ack, need_rts);

        let hdr = build_data_header(
            &self.config,
            &eth,
            data_head.duration(),
            encrypt,
            FragKind::None,
            0,
            &self.seq,
        );

        let mut ctx = self.acquire(PacketKind::Data)?;
        let w = &mut ctx.writer;
        w.write_zeros(DESCRIPTOR_LEN)?;

        let fifo = FifoHead {
            tx_key: material.as_ref().map(|m| m.tx_key).unwrap_or_default(),
            fifo_ctl,
            time_stamp: DEFAULT_MSDU_LIFETIME_RES_64US,
            frag_ctl,
            current_rate: rate.index() as u16,
        };
        fifo.serialize(w)?;
        rsv.serialize(w)?;

        if let (Some(m), true) = (material.as_ref(), mic_hdr_needed(key.as_deref())) {
            EncryptionFramer::mic_header(&hdr, body_len as u16, m.tsc).serialize(w)?;
        }
        if let Some(p) = &protection {
            p.serialize(w)?;
        }
        data_head.serialize(w)?;

        write_mac_header(w, &hdr, MAC_HDR_LEN)?;
        w.write_zeros(padding)?;
        if let Some(m) = &material {
            w.write(&m.iv)?;
        }

        let mut payload = Vec::with_capacity(body_len + mic_len + icv_len);
        if eth.needs_snap() {
            payload.extend_from_slice(eth.snap_prefix());
            payload.extend_from_slice(&eth.ethertype.to_be_bytes());
        }
        payload.extend_from_slice(body);
        if let Some(k) = key.as_deref() {
            if k.cipher() == CipherKind::Tkip {
                let mic = michael_mic(
                    k.mic_tx_key(self.config.wpa_none),
                    &eth.dest,
                    &eth.src,
                    &payload,
                );
                payload.extend_from_slice(&mic);
            }
            if self.config.software_crypto && k.cipher() != CipherKind::Ccmp {
                let m = material.as_ref().unwrap();
                seal_in_place(m, k, &mut payload);
            }
        }
        w.write(&payload)?;

        trace!(
            "data frame to {:x?}: {} bytes on the wire, rate {:?}",
            eth.dest.as_bytes(),
            w.position(),
            rate
        );
        self.finish(&mut ctx, rate, eth.dest, fifo_ctl)
    }

    /// Assemble and submit one management MPDU.
    pub fn send_mgmt(&self, pkt: MgmtPacket<'_>) -> Result<()> {
        let mut cursor = pkt.mpdu;
        let hdr = MacHeader::parse(&mut cursor)?;
        let ps_poll = hdr.is_ps_poll();
        let hdr_len = if ps_poll { MAC_HDR_ADDR2_LEN } else { MAC_HDR_LEN };
        if pkt.mpdu.len() < hdr_len {
            return Err(TxError::MalformedInput(
                "management frame shorter than its header".to_string(),
            ));
        }
        let body = &pkt.mpdu[hdr_len..];
        let (rate, phy) = self.basic_rate();

        let need_ack = !hdr.addr1.is_multicast();
        let mut fifo_ctl =
            phy.fifo_bits() | FIFOCTL_TMOEN | FIFOCTL_GENINT | FIFOCTL_ISDMA0;
        if need_ack {
            fifo_ctl |= FIFOCTL_NEEDACK;
        }
        if matches!(
            self.config.mode,
            OperatingMode::AccessPoint | OperatingMode::Adhoc
        ) {
            fifo_ctl |= FIFOCTL_LRETRY;
        }

        let key = if hdr.is_protected() {
            match self.keys.transmit_key(&hdr.addr1, &self.config.bssid) {
                Some(k) => Some(k),
                None => {
                    self.stats.dropped_no_key.fetch_add(1, Ordering::Relaxed);
                    debug!("no key for protected management frame");
                    return Err(TxError::KeyUnavailable);
                }
            }
        } else {
            None
        };
        let (iv_len, icv_len) = match key.as_deref() {
            Some(k) => (k.cipher().iv_len(), k.cipher().icv_len()),
            None => (0, 0),
        };

        let mut frag_ctl = fragctl_hdr_len(hdr_len) | FragKind::None.frag_ctl_bits();
        if let Some(k) = key.as_deref() {
            frag_ctl |= match k.cipher() {
                CipherKind::Wep => FRAGCTL_LEGACY,
                CipherKind::Tkip => FRAGCTL_TKIP,
                CipherKind::Ccmp => FRAGCTL_AES,
            };
        }

        let material = match key.as_deref() {
            Some(k) => Some(self.framer.frame_key(k, &self.config.own_addr)?),
            None => None,
        };

        let padding = if material.is_some() { dword_pad(hdr_len) } else { 0 };
        let frame_size = (hdr_len + padding + iv_len + body.len() + icv_len + FCS_LEN) as u32;

        let builder = HeadBuilder::new(&self.config);
        let data_head =
            builder.data_head(phy, frame_size, rate, need_ack, FallbackMode::None, false);
        let rsv = builder.rsv_time(phy, frame_size, rate, need_ack, false);

        let mut ctx = self.acquire(PacketKind::Mgmt)?;
        let w = &mut ctx.writer;
        w.write_zeros(DESCRIPTOR_LEN)?;

        let fifo = FifoHead {
            tx_key: material.as_ref().map(|m| m.tx_key).unwrap_or_default(),
            fifo_ctl,
            time_stamp: DEFAULT_MGMT_LIFETIME_RES_64US,
            frag_ctl,
            current_rate: rate.index() as u16,
        };
        fifo.serialize(w)?;
        rsv.serialize(w)?;

        let data_head_offset = w.position();
        data_head.serialize(w)?;

        // The MLME's duration and sequence control are overwritten; the
        // hardware fills the NAV from the data head. PS-Poll keeps its
        // association ID in the duration slot instead.
        let mut out_hdr = hdr;
        let seq = self.seq.next();
        out_hdr.seq_ctrl = seq << 4;
        out_hdr.duration = if ps_poll { hdr.duration } else { data_head.duration() };
        write_mac_header(w, &out_hdr, hdr_len)?;

        if ps_poll {
            self.restore_ps_poll_duration(w, &data_head, data_head_offset, hdr.duration)?;
        }

        w.write_zeros(padding)?;
        if let Some(m) = &material {
            w.write(&m.iv)?;
        }

        let mut payload = body.to_vec();
        if let Some(k) = key.as_deref() {
            if self.config.software_crypto && k.cipher() != CipherKind::Ccmp {
                seal_in_place(material.as_ref().unwrap(), k, &mut payload);
            }
        }
        w.write(&payload)?;

        self.finish(&mut ctx, rate, hdr.addr1, fifo_ctl)
    }

    /// Rewrite every duration field of the serialized data head with the
    /// PS-Poll association ID, so the hardware does not replace the AID
    /// with a computed NAV.
    fn restore_ps_poll_duration(
        &self,
        w: &mut crate::wire::WireWriter,
        data_head: &crate::protect::DataHead,
        data_head_offset: usize,
        aid: u16,
    ) -> Result<()> {
        for &off in data_head.duration_offsets() {
            w.patch_u16_le(data_head_offset + off, aid)?;
        }
        Ok(())
    }

    /// Assemble and submit one beacon MPDU.
    pub fn send_beacon(&self, mpdu: &[u8]) -> Result<()> {
        if mpdu.len() < MAC_HDR_LEN {
            return Err(TxError::MalformedInput(
                "beacon shorter than a MAC header".to_string(),
            ));
        }
        let (rate, phy) = self.basic_rate();
        let frame_size = (mpdu.len() + FCS_LEN) as u32;
        let builder = HeadBuilder::new(&self.config);

        let mut fifo_ctl = 0u16;
        if phy == PhyType::B {
            fifo_ctl |= phy.fifo_bits();
        }
        let head = ShortFifoHead {
            fifo_ctl,
            time_stamp: 0,
            phy: phy_field(self.config.preamble, phy, frame_size, rate),
            duration: builder.calc().data_duration(phy, false),
            time_stamp_off: time_stamp_off(self.config.preamble, rate),
        };

        let mut ctx = self.acquire(PacketKind::Beacon)?;
        let w = &mut ctx.writer;
        w.write_zeros(DESCRIPTOR_LEN)?;
        head.serialize(w)?;

        let body_offset = w.position();
        w.write(mpdu)?;
        // Beacons carry no NAV; zero the duration and stamp a fresh
        // sequence number.
        w.patch_u16_le(body_offset + 2, 0)?;
        let seq = self.seq.next();
        w.patch_u16_le(body_offset + 22, seq << 4)?;

        let mut addr1 = [0u8; 6];
        addr1.copy_from_slice(&mpdu[4..10]);
        self.finish(&mut ctx, rate, MacAddr(addr1), fifo_ctl)
    }

    /// Stamp the descriptor prefix, record stats and hand the buffer to
    /// the transport.
    fn finish(
        &self,
        ctx: &mut ContextHandle,
        rate: Rate,
        dest: MacAddr,
        fifo_ctl: u16,
    ) -> Result<()> {
        let kind = ctx.kind();
        let pkt_no = ctx.pkt_no();
        let total = ctx.writer.position();
        let byte_count = (total - DESCRIPTOR_LEN) as u16;
        let pkt_no_byte = ((rate.index() as u8) << 4) | (self.seq.last() as u8 & 0x0f);

        ctx.writer
            .patch(0, &[kind.descriptor_type(), pkt_no_byte])?;
        ctx.writer.patch_u16_le(2, byte_count)?;

        self.stats.record(pkt_no, kind, dest, fifo_ctl, total);
        self.transport
            .submit(kind, ctx.writer.as_slice())
            .map_err(|e| {
                self.stats.transport_errors.fetch_add(1, Ordering::Relaxed);
                e
            })
    }
}

/// A CCMP pseudo-header is reserved for encrypted data frames only.
fn mic_hdr_needed(key: Option<&TransmitKey>) -> bool {
    matches!(key, Some(k) if k.cipher() == CipherKind::Ccmp)
}

fn write_mac_header(
    w: &mut crate::wire::WireWriter,
    hdr: &MacHeader,
    hdr_len: usize,
) -> Result<()> {
    let mut bytes = [0u8; MAC_HDR_LEN];
    hdr.serialize(&mut &mut bytes[..]);
    w.write(&bytes[..hdr_len])
}
