//! Per-cell resource grid: a ring of slot allocators tracking used PRBs per
//! symbol range for DL/UL, plus the assembled `sched_result` PDU lists
//! (§3 "Resource grid", §3 "Scheduler slot result").

use crate::error::{Result, SchedulerError};
use common::{Rnti, SlotPoint};

/// OFDM symbols per slot (normal cyclic prefix).
pub const NOF_OFDM_SYMBOLS_PER_SLOT: usize = 14;

/// A contiguous range of OFDM symbols within a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfdmSymbolRange {
    pub start: u8,
    pub stop: u8,
}

impl OfdmSymbolRange {
    pub fn new(start: u8, stop: u8) -> Self {
        Self { start, stop }
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> {
        self.start..self.stop
    }
}

/// Frequency-domain resource-allocation type for a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreqAllocType {
    /// RBG bitmap allocation (type 0).
    Type0,
    /// Start+length riv allocation (type 1).
    Type1,
}

/// One scheduled PDCCH candidate carrying DCI for a UE (DL or UL grant).
#[derive(Debug, Clone)]
pub struct PdcchGrant {
    pub rnti: Rnti,
    pub aggregation_level: u8,
    pub cce_index: u16,
    pub is_dl: bool,
}

/// One scheduled PDSCH for a connected UE.
#[derive(Debug, Clone)]
pub struct PdschGrant {
    pub rnti: Rnti,
    pub harq_id: u8,
    pub rbs: crate::rb::RbInterval,
    pub symbols: OfdmSymbolRange,
    pub mcs: u8,
    pub tbs_bytes: u32,
    pub nof_layers: u8,
    pub new_data: bool,
    pub alloc_type: FreqAllocType,
}

/// One scheduled PUSCH for a connected UE.
#[derive(Debug, Clone)]
pub struct PuschGrant {
    pub rnti: Rnti,
    pub harq_id: u8,
    pub rbs: crate::rb::RbInterval,
    pub symbols: OfdmSymbolRange,
    pub mcs: u8,
    pub tbs_bytes: u32,
    pub new_data: bool,
    /// UCI (HARQ-ACK/CSI/SR) multiplexed onto this PUSCH instead of PUCCH.
    pub uci_multiplexed: bool,
}

/// One scheduled PUCCH occasion.
#[derive(Debug, Clone)]
pub struct PucchGrant {
    pub rnti: Rnti,
    pub resource_indicator: u8,
    pub harq_ack_bits: u8,
    pub sr_bit: bool,
    pub csi_bits: u16,
}

/// One scheduled SRS occasion.
#[derive(Debug, Clone)]
pub struct SrsGrant {
    pub rnti: Rnti,
    pub positioning_report_requested: bool,
}

/// PDSCH broadcast PDU (SIB1/other SI messages) placed by the common-channel
/// sub-schedulers, out of this crate's core scope but carried in the result.
#[derive(Debug, Clone)]
pub struct PdschBroadcast {
    pub ssb_index: u8,
    pub payload_bytes: u32,
}

/// RAR (random-access response) grant.
#[derive(Debug, Clone)]
pub struct RarGrant {
    pub ra_rnti: Rnti,
    pub tc_rnti: Rnti,
    pub rapid: u8,
    pub msg3_rbs: crate::rb::RbInterval,
    pub msg3_symbols: OfdmSymbolRange,
}

/// Everything scheduled for one cell in one slot (§3 "Scheduler slot result",
/// §6 "sched_result"). Owned by the resource grid; the caller of
/// `slot_indication` receives a view valid until the next call for the cell.
#[derive(Debug, Clone, Default)]
pub struct SchedResult {
    pub pdcch_dl: Vec<PdcchGrant>,
    pub pdcch_ul: Vec<PdcchGrant>,
    pub pdsch_ue: Vec<PdschGrant>,
    pub pdsch_bc: Vec<PdschBroadcast>,
    pub pdsch_paging: Vec<PdschBroadcast>,
    pub pusch: Vec<PuschGrant>,
    pub pucch: Vec<PucchGrant>,
    pub srs: Vec<SrsGrant>,
    pub prach: Vec<u8>,
    pub csi_rs: bool,
    pub rar: Vec<RarGrant>,
}

impl SchedResult {
    fn clear(&mut self) {
        self.pdcch_dl.clear();
        self.pdcch_ul.clear();
        self.pdsch_ue.clear();
        self.pdsch_bc.clear();
        self.pdsch_paging.clear();
        self.pusch.clear();
        self.pucch.clear();
        self.srs.clear();
        self.prach.clear();
        self.csi_rs = false;
        self.rar.clear();
    }
}

/// PRB usage bitmap for one direction (DL or UL) of one slot, one word per
/// OFDM symbol. A plain word array rather than a bitset crate.
#[derive(Debug, Clone)]
pub struct PrbBitmap {
    nof_prbs: u16,
    words_per_symbol: usize,
    symbols: [Vec<u64>; NOF_OFDM_SYMBOLS_PER_SLOT],
}

impl PrbBitmap {
    pub fn new(nof_prbs: u16) -> Self {
        let words_per_symbol = (nof_prbs as usize + 63) / 64;
        Self {
            nof_prbs,
            words_per_symbol,
            symbols: std::array::from_fn(|_| vec![0u64; words_per_symbol]),
        }
    }

    fn clear(&mut self) {
        for sym in self.symbols.iter_mut() {
            sym.iter_mut().for_each(|w| *w = 0);
        }
    }

    /// Marks `rbs` as used across `symbols`. Panics (via debug assert) if any
    /// bit was already set -- callers are expected to have checked
    /// `is_free` first; the resource-grid invariant (§3) relies on this.
    pub fn mark_used(&mut self, rbs: crate::rb::RbInterval, symbols: OfdmSymbolRange) {
        for sym in symbols.iter() {
            let bitmap = &mut self.symbols[sym as usize];
            for rb in rbs.start..rbs.stop {
                let (word, bit) = (rb as usize / 64, rb as usize % 64);
                debug_assert_eq!(bitmap[word] & (1 << bit), 0, "PRB {rb} already used in symbol {sym}");
                bitmap[word] |= 1 << bit;
            }
        }
    }

    pub fn is_free(&self, rbs: crate::rb::RbInterval, symbols: OfdmSymbolRange) -> bool {
        for sym in symbols.iter() {
            let bitmap = &self.symbols[sym as usize];
            for rb in rbs.start..rbs.stop {
                let (word, bit) = (rb as usize / 64, rb as usize % 64);
                if bitmap[word] & (1 << bit) != 0 {
                    return false;
                }
            }
        }
        true
    }

    /// Number of free (unused) PRBs in the given symbol.
    pub fn nof_free_prbs(&self, symbol: u8) -> u16 {
        let bitmap = &self.symbols[symbol as usize];
        let mut used = 0u16;
        for rb in 0..self.nof_prbs {
            let (word, bit) = (rb as usize / 64, rb as usize % 64);
            if bitmap[word] & (1 << bit) != 0 {
                used += 1;
            }
        }
        self.nof_prbs - used
    }

    pub fn nof_prbs(&self) -> u16 {
        self.nof_prbs
    }
}

/// One slot's worth of allocation state: PRB bitmaps + the assembled result.
pub struct SlotAllocator {
    pub dl_prbs: PrbBitmap,
    pub ul_prbs: PrbBitmap,
    pub result: SchedResult,
    slot: SlotPoint,
}

impl SlotAllocator {
    fn new(nof_prbs: u16) -> Self {
        Self {
            dl_prbs: PrbBitmap::new(nof_prbs),
            ul_prbs: PrbBitmap::new(nof_prbs),
            result: SchedResult::default(),
            slot: SlotPoint::invalid(),
        }
    }

    fn reset_for(&mut self, slot: SlotPoint) {
        self.dl_prbs.clear();
        self.ul_prbs.clear();
        self.result.clear();
        self.slot = slot;
    }
}

/// Ring of `SlotAllocator`s for one cell. Sized to exceed the largest
/// k1+k2+cell-offset delay so that every in-flight grant/ack still has a
/// live slot when it resolves (§3 "Slot point").
pub struct ResourceGrid {
    ring: Vec<SlotAllocator>,
    head_slot: SlotPoint,
}

impl ResourceGrid {
    pub fn new(nof_prbs: u16, ring_size: usize) -> Self {
        assert!(ring_size > 0, "ring size must be positive");
        Self {
            ring: (0..ring_size).map(|_| SlotAllocator::new(nof_prbs)).collect(),
            head_slot: SlotPoint::invalid(),
        }
    }

    pub fn ring_size(&self) -> usize {
        self.ring.len()
    }

    fn index_of(&self, slot: SlotPoint) -> usize {
        (slot.count() as usize) % self.ring.len()
    }

    /// Advances the ring head to `slot`, zeroing the new head's allocator
    /// (§3 invariant: "once slot_indication advances the ring head, the tail
    /// slot is zeroed").
    pub fn slot_indication(&mut self, slot: SlotPoint) {
        let idx = self.index_of(slot);
        self.ring[idx].reset_for(slot);
        self.head_slot = slot;
    }

    pub fn head_slot(&self) -> SlotPoint {
        self.head_slot
    }

    /// Returns the allocator for `slot` if it is still within the ring;
    /// rejects allocations for slots that have fallen out of the window,
    /// matching the resource-grid invariant.
    pub fn allocator_mut(&mut self, slot: SlotPoint) -> Result<&mut SlotAllocator> {
        if !self.in_ring(slot) {
            return Err(SchedulerError::SlotOutOfRing {
                requested: slot.to_string(),
                head: self.head_slot.to_string(),
            });
        }
        let idx = self.index_of(slot);
        Ok(&mut self.ring[idx])
    }

    pub fn allocator(&self, slot: SlotPoint) -> Result<&SlotAllocator> {
        if !self.in_ring(slot) {
            return Err(SchedulerError::SlotOutOfRing {
                requested: slot.to_string(),
                head: self.head_slot.to_string(),
            });
        }
        let idx = self.index_of(slot);
        Ok(&self.ring[idx])
    }

    /// Direct access to the backing ring, indexed by `slot.count() % ring_size()`.
    /// Used by the cell scheduler to reach the allocator for a slot it has
    /// already validated is in-ring (e.g. a UL candidate's own `pxsch` slot)
    /// without re-running the `in_ring` check on every sub-step.
    pub fn ring_slice(&self) -> &[SlotAllocator] {
        &self.ring
    }

    pub fn ring_slice_mut(&mut self) -> &mut [SlotAllocator] {
        &mut self.ring
    }

    fn in_ring(&self, slot: SlotPoint) -> bool {
        if !self.head_slot.valid() {
            return false;
        }
        let dist = slot.sub(&self.head_slot);
        dist >= 0 && (dist as usize) < self.ring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(n: u32) -> SlotPoint {
        SlotPoint::new(1, n)
    }

    #[test]
    fn slot_indication_zeroes_new_head() {
        let mut grid = ResourceGrid::new(106, 40);
        grid.slot_indication(sp(10));
        {
            let alloc = grid.allocator_mut(sp(10)).unwrap();
            alloc.dl_prbs.mark_used(crate::rb::RbInterval::new(0, 10), OfdmSymbolRange::new(0, 1));
        }
        grid.slot_indication(sp(50)); // 50 - 10 = 40 == ring_size, wraps onto slot 10's bucket
        let alloc = grid.allocator(sp(50)).unwrap();
        assert!(alloc.dl_prbs.is_free(crate::rb::RbInterval::new(0, 10), OfdmSymbolRange::new(0, 1)));
    }

    #[test]
    fn allocation_outside_ring_is_rejected() {
        let mut grid = ResourceGrid::new(106, 10);
        grid.slot_indication(sp(100));
        assert!(grid.allocator_mut(sp(111)).is_err());
        assert!(grid.allocator_mut(sp(100)).is_ok());
        assert!(grid.allocator_mut(sp(109)).is_ok());
    }

    #[test]
    fn prb_bitmap_tracks_usage() {
        let mut bm = PrbBitmap::new(106);
        let rbs = crate::rb::RbInterval::new(0, 20);
        let syms = OfdmSymbolRange::new(2, 14);
        assert!(bm.is_free(rbs, syms));
        bm.mark_used(rbs, syms);
        assert!(!bm.is_free(rbs, syms));
        assert_eq!(bm.nof_free_prbs(2), 86);
    }
}
