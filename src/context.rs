//! Transmit context pool
//!
//! A fixed set of reusable transmit buffers. A context is owned by
//! exactly one frame at a time: acquisition moves the boxed context out
//! of the pool slot, so only the free-slot scan runs under the lock and
//! serialization happens with no lock held. Dropping the handle returns
//! the context to its slot.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::wire::{WireWriter, TX_BUFFER_SIZE};
use crate::{Result, TxError};

/// What kind of frame a context is carrying, reflected in the descriptor
/// type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Data,
    Mgmt,
    Beacon,
}

impl PacketKind {
    /// Descriptor type byte.
    pub fn descriptor_type(self) -> u8 {
        match self {
            PacketKind::Data | PacketKind::Mgmt => 0,
            PacketKind::Beacon => 1,
        }
    }
}

/// One reusable transmit buffer.
#[derive(Debug)]
pub struct TxContext {
    pkt_no: u8,
    kind: PacketKind,
    pub writer: WireWriter,
}

impl TxContext {
    /// Pool slot index, folded into the descriptor packet-number byte.
    pub fn pkt_no(&self) -> u8 {
        self.pkt_no
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }
}

/// Fixed-capacity pool of transmit contexts.
#[derive(Debug)]
pub struct TxContextPool {
    slots: Mutex<Vec<Option<Box<TxContext>>>>,
    capacity: usize,
}

impl TxContextPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        let slots = (0..capacity)
            .map(|i| {
                Some(Box::new(TxContext {
                    pkt_no: i as u8,
                    kind: PacketKind::Data,
                    writer: WireWriter::new(TX_BUFFER_SIZE),
                }))
            })
            .collect();
        Arc::new(Self {
            slots: Mutex::new(slots),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of contexts currently available.
    pub fn available(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|s| s.is_some()).count()
    }

    /// Take a free context out of the pool.
    pub fn acquire(self: &Arc<Self>, kind: PacketKind) -> Result<ContextHandle> {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            if let Some(mut ctx) = slot.take() {
                ctx.kind = kind;
                ctx.writer.reset();
                trace!("acquired tx context {}", ctx.pkt_no);
                return Ok(ContextHandle {
                    pool: Arc::clone(self),
                    ctx: Some(ctx),
                });
            }
        }
        Err(TxError::ResourceExhaustion)
    }

    fn release(&self, ctx: Box<TxContext>) {
        let mut slots = self.slots.lock().unwrap();
        let idx = ctx.pkt_no as usize;
        debug_assert!(slots[idx].is_none());
        slots[idx] = Some(ctx);
    }
}

/// Owning handle to an acquired context; returns it to the pool on drop.
#[derive(Debug)]
pub struct ContextHandle {
    pool: Arc<TxContextPool>,
    ctx: Option<Box<TxContext>>,
}

impl Deref for ContextHandle {
    type Target = TxContext;

    fn deref(&self) -> &TxContext {
        self.ctx.as_ref().unwrap()
    }
}

impl DerefMut for ContextHandle {
    fn deref_mut(&mut self) -> &mut TxContext {
        self.ctx.as_mut().unwrap()
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}
