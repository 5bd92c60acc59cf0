// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! RISAF, the memory-side resource isolation firewall.
//!
//! A RISAF instance fronts one physical memory (DDR, internal SRAM, the
//! backup RAM) and carves it into base regions, each carrying secure,
//! per-CID privilege and per-CID read/write attributes, plus optional
//! on-the-fly encryption on instances wired to an MCE. Region addresses
//! are expressed relative to the fronted memory and snapped to the
//! granularity the hardware reports.

use crate::error::{Error, Result};
use crate::firewall::{AddressRange, MemoryFirewallController, single_cell};
use crate::mmio::Mmio;
use crate::pm::{PmHint, PowerManaged};
use crate::rif::Cid;
use crate::soc::RisafEncryption;
use arrayvec::ArrayVec;
use log::{debug, error};
use spin::mutex::SpinMutex;

const RISAF_CR: usize = 0x00;
const RISAF_SR: usize = 0x04;
const RISAF_IASR: usize = 0x08;
const RISAF_IACR: usize = 0x0c;
const RISAF_IAESR0: usize = 0x20;
const RISAF_IADDR0: usize = 0x24;
const RISAF_IAESR1: usize = 0x28;
const RISAF_IADDR1: usize = 0x2c;
const RISAF_HWCFGR: usize = 0xff0;
const RISAF_VERR: usize = 0xff4;
const RISAF_IPIDR: usize = 0xff8;
const RISAF_SIDR: usize = 0xffc;

const CR_GLOCK: u32 = 1 << 0;
const SR_ENCDIS: u32 = 1 << 2;

const IASR_CAEF: u32 = 1 << 0;
const IASR_IAEF0: u32 = 1 << 1;
const IASR_IAEF1: u32 = 1 << 2;

const REG_BASE: usize = 0x40;
const REG_STRIDE: usize = 0x40;
const REG_CFGR: usize = 0x0;
const REG_STARTR: usize = 0x4;
const REG_ENDR: usize = 0x8;
const REG_CIDCFGR: usize = 0xc;

const CFGR_BREN: u32 = 1 << 0;
const CFGR_SEC: u32 = 1 << 8;
const CFGR_MCE: u32 = 1 << 14;
const CFGR_ENC: u32 = 1 << 15;
const CFGR_PRIVC_SHIFT: u32 = 16;
const CFGR_PRIVC_MASK: u32 = 0xff << CFGR_PRIVC_SHIFT;
const CFGR_ALL_MASK: u32 = CFGR_BREN | CFGR_SEC | CFGR_MCE | CFGR_ENC | CFGR_PRIVC_MASK;

const CIDCFGR_RDEN_MASK: u32 = 0xff;
const CIDCFGR_WREN_SHIFT: u32 = 16;
const CIDCFGR_WREN_MASK: u32 = 0xff << CIDCFGR_WREN_SHIFT;
const CIDCFGR_ALL_MASK: u32 = CIDCFGR_RDEN_MASK | CIDCFGR_WREN_MASK;

const HWCFGR_NB_REGIONS_MASK: u32 = 0xff;
const HWCFGR_MASK_LSB_SHIFT: u32 = 16;
const HWCFGR_MASK_LSB_MASK: u32 = 0xff;
const HWCFGR_MASK_WIDTH_SHIFT: u32 = 24;

/// Region cell: region index field.
pub const CELL_ID_MASK: u32 = 0xf;
/// Region cell: base region enable.
pub const CELL_BREN: u32 = 1 << 4;
/// Region cell: secure-only access.
pub const CELL_SEC: u32 = 1 << 5;
/// Region cell: MCE mode select, only meaningful on dual-bit variants.
pub const CELL_MCE: u32 = 1 << 6;
/// Region cell: encryption enable.
pub const CELL_ENC: u32 = 1 << 7;
/// Region cell: per-CID privilege mask position.
pub const CELL_PRIVC_SHIFT: u32 = 8;
/// Region cell: per-CID read-enable mask position.
pub const CELL_RDEN_SHIFT: u32 = 16;
/// Region cell: per-CID write-enable mask position.
pub const CELL_WREN_SHIFT: u32 = 24;

/// Largest base-region count any RISAF instance exposes.
const MAX_REGIONS: usize = 15;

/// Decoded form of one 32-bit memory-region cell.
///
/// Cell layout:
///
/// | bits  | field                              |
/// |-------|------------------------------------|
/// | 3:0   | region index, 1-based              |
/// | 4     | base region enable                 |
/// | 5     | secure-only                        |
/// | 6     | MCE mode select (dual-bit variants)|
/// | 7     | encryption enable                  |
/// | 15:8  | per-CID privilege mask             |
/// | 23:16 | per-CID read enable                |
/// | 31:24 | per-CID write enable               |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegionConfig {
    /// Region index, 1-based. Index 0 is the hardware default region and
    /// is never reconfigured.
    pub id: u8,
    /// Base region enable.
    pub enabled: bool,
    /// Region reserved to secure accesses.
    pub secure: bool,
    /// Encrypt the region.
    pub encrypted: bool,
    /// Route the region through the alternate MCE mode. Only legal on
    /// variants with the two-bit encryption field.
    pub mce_mode: bool,
    /// Compartments restricted to privileged accesses, one bit per CID.
    pub priv_cids: u8,
    /// Compartments granted reads, one bit per CID.
    pub read_cids: u8,
    /// Compartments granted writes, one bit per CID.
    pub write_cids: u8,
}

impl RegionConfig {
    /// Decodes a region cell. Field values are taken as-is, validation
    /// happens when the configuration is applied.
    pub fn parse(cell: u32) -> Self {
        Self {
            id: (cell & CELL_ID_MASK) as u8,
            enabled: cell & CELL_BREN != 0,
            secure: cell & CELL_SEC != 0,
            encrypted: cell & CELL_ENC != 0,
            mce_mode: cell & CELL_MCE != 0,
            priv_cids: (cell >> CELL_PRIVC_SHIFT) as u8,
            read_cids: (cell >> CELL_RDEN_SHIFT) as u8,
            write_cids: (cell >> CELL_WREN_SHIFT) as u8,
        }
    }

    /// Re-encodes the configuration as a cell. Inverse of [`parse`].
    ///
    /// [`parse`]: Self::parse
    pub fn to_cell(&self) -> u32 {
        let mut cell = u32::from(self.id);
        if self.enabled {
            cell |= CELL_BREN;
        }
        if self.secure {
            cell |= CELL_SEC;
        }
        if self.mce_mode {
            cell |= CELL_MCE;
        }
        if self.encrypted {
            cell |= CELL_ENC;
        }
        cell |= u32::from(self.priv_cids) << CELL_PRIVC_SHIFT;
        cell |= u32::from(self.read_cids) << CELL_RDEN_SHIFT;
        cell |= u32::from(self.write_cids) << CELL_WREN_SHIFT;
        cell
    }

    fn cfgr(&self) -> u32 {
        let mut word = u32::from(self.priv_cids) << CFGR_PRIVC_SHIFT;
        if self.enabled {
            word |= CFGR_BREN;
        }
        if self.secure {
            word |= CFGR_SEC;
        }
        if self.mce_mode {
            word |= CFGR_MCE;
        }
        if self.encrypted {
            word |= CFGR_ENC;
        }
        word
    }

    fn cidcfgr(&self) -> u32 {
        u32::from(self.read_cids) | (u32::from(self.write_cids) << CIDCFGR_WREN_SHIFT)
    }

    fn from_registers(id: u8, cfgr: u32, cidcfgr: u32) -> Self {
        Self {
            id,
            enabled: cfgr & CFGR_BREN != 0,
            secure: cfgr & CFGR_SEC != 0,
            encrypted: cfgr & CFGR_ENC != 0,
            mce_mode: cfgr & CFGR_MCE != 0,
            priv_cids: (cfgr >> CFGR_PRIVC_SHIFT) as u8,
            read_cids: (cidcfgr & CIDCFGR_RDEN_MASK) as u8,
            write_cids: (cidcfgr >> CIDCFGR_WREN_SHIFT) as u8,
        }
    }
}

struct RegionShadow {
    config: RegionConfig,
    range: AddressRange,
}

struct Inner<M> {
    bank: M,
    regions: ArrayVec<RegionShadow, MAX_REGIONS>,
}

/// One RISAF instance and the memory it fronts.
pub struct Risaf<M: Mmio> {
    inner: SpinMutex<Inner<M>>,
    mem: AddressRange,
    encryption: RisafEncryption,
    enc_supported: bool,
    tdcid: bool,
    granularity: u64,
    addr_mask: u64,
    max_regions: u32,
}

impl<M: Mmio> Risaf<M> {
    /// Creates the engine over a mapped RISAF register bank fronting the
    /// physical range `mem`.
    ///
    /// `enc_supported` states whether this instance is wired to an MCE;
    /// the hardware may still report encryption as fused out. `tdcid`
    /// states whether this compartment is the trusted domain CID.
    pub fn new(
        bank: M,
        mem: AddressRange,
        encryption: RisafEncryption,
        enc_supported: bool,
        tdcid: bool,
    ) -> Result<Self> {
        let hwcfgr = bank.read(RISAF_HWCFGR);
        let max_regions = hwcfgr & HWCFGR_NB_REGIONS_MASK;
        let mask_lsb = (hwcfgr >> HWCFGR_MASK_LSB_SHIFT) & HWCFGR_MASK_LSB_MASK;
        let mask_width = hwcfgr >> HWCFGR_MASK_WIDTH_SHIFT;

        if max_regions == 0 || max_regions as usize > MAX_REGIONS || mask_width == 0 {
            return Err(Error::NotSupported);
        }

        let granularity = 1u64 << mask_lsb;
        let addr_mask = ((1u64 << (mask_lsb + mask_width)) - 1) & !(granularity - 1);
        let enc_supported = enc_supported && bank.read(RISAF_SR) & SR_ENCDIS == 0;

        debug!(
            "RISAF version {:#x}, ID {:#x}/{:#x}: {} regions, {:#x} granularity",
            bank.read(RISAF_VERR),
            bank.read(RISAF_IPIDR),
            bank.read(RISAF_SIDR),
            max_regions,
            granularity,
        );

        Ok(Self {
            inner: SpinMutex::new(Inner {
                bank,
                regions: ArrayVec::new(),
            }),
            mem,
            encryption,
            enc_supported,
            tdcid,
            granularity,
            addr_mask,
            max_regions,
        })
    }

    /// Returns whether the global configuration lock is set.
    pub fn is_locked(&self) -> bool {
        self.inner.lock().bank.read(RISAF_CR) & CR_GLOCK != 0
    }

    /// Sets the global configuration lock, which freezes every region
    /// register until the next reset.
    pub fn lock(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.bank.set_bits(RISAF_CR, CR_GLOCK);
        if inner.bank.read(RISAF_CR) & CR_GLOCK == 0 {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    fn check_boundaries(&self, range: AddressRange) -> Result<()> {
        if range.len == 0
            || self.granularity == 0
            || !self.granularity.is_power_of_two()
        {
            return Err(Error::BadParameters);
        }
        if !self.mem.contains(&range) {
            error!(
                "region {:#x}..={:#x} outside memory {:#x}..={:#x}",
                range.base,
                range.end(),
                self.mem.base,
                self.mem.end()
            );
            return Err(Error::BadParameters);
        }
        if range.base % self.granularity != 0 || range.len % self.granularity != 0 {
            error!("region {:#x} (len {:#x}) breaks granularity", range.base, range.len);
            return Err(Error::BadParameters);
        }
        Ok(())
    }

    fn check_overlap(inner: &Inner<M>, range: AddressRange, skip_id: u8) -> Result<()> {
        for region in &inner.regions {
            if region.config.id == skip_id {
                continue;
            }
            if region.range.intersects(&range) {
                error!(
                    "region {:#x}..={:#x} overlaps region {}",
                    range.base,
                    range.end(),
                    region.config.id
                );
                return Err(Error::BadParameters);
            }
        }
        Ok(())
    }

    fn check_encryption(&self, config: &RegionConfig) -> Result<()> {
        if config.mce_mode {
            if self.encryption != RisafEncryption::DualBit {
                return Err(Error::NotSupported);
            }
            if !config.encrypted {
                return Err(Error::BadParameters);
            }
        }
        if config.encrypted {
            if !self.enc_supported {
                return Err(Error::NotSupported);
            }
            // Exposing ciphertext to non-secure readers defeats the point.
            if !config.secure {
                return Err(Error::BadParameters);
            }
        }
        Ok(())
    }

    fn write_region(&self, inner: &mut Inner<M>, config: &RegionConfig, range: AddressRange) {
        let base = REG_BASE + REG_STRIDE * (config.id as usize - 1);
        let start = ((range.base - self.mem.base) & self.addr_mask) as u32;
        let end = ((range.end() - self.mem.base) & self.addr_mask) as u32;

        // Disable the region while its geometry changes.
        inner.bank.clear_bits(base + REG_CFGR, CFGR_BREN);
        inner
            .bank
            .clear_set_bits(base + REG_STARTR, self.addr_mask as u32, start);
        inner
            .bank
            .clear_set_bits(base + REG_ENDR, self.addr_mask as u32, end);
        inner
            .bank
            .clear_set_bits(base + REG_CIDCFGR, CIDCFGR_ALL_MASK, config.cidcfgr());
        inner
            .bank
            .clear_set_bits(base + REG_CFGR, CFGR_ALL_MASK, config.cfgr());

        if cfg!(debug_assertions) {
            let cfgr = inner.bank.read(base + REG_CFGR);
            let cidcfgr = inner.bank.read(base + REG_CIDCFGR);
            assert!(
                cfgr & CFGR_ALL_MASK == config.cfgr() && cidcfgr == config.cidcfgr(),
                "region {} attributes did not stick",
                config.id
            );
        }
    }

    /// Configures one region over `range`, registering it for overlap
    /// checks and power-management replay. Reconfiguring a known region id
    /// replaces its previous attributes and range.
    pub fn configure_region(&self, range: AddressRange, config: &RegionConfig) -> Result<()> {
        if config.id == 0 || u32::from(config.id) > self.max_regions {
            return Err(Error::BadParameters);
        }
        self.check_boundaries(range)?;
        self.check_encryption(config)?;

        let mut inner = self.inner.lock();
        Self::check_overlap(&inner, range, config.id)?;

        // Under the global lock the only accepted configuration is the one
        // already in place.
        if inner.bank.read(RISAF_CR) & CR_GLOCK != 0 {
            let base = REG_BASE + REG_STRIDE * (config.id as usize - 1);
            let live_cfgr = inner.bank.read(base + REG_CFGR) & CFGR_ALL_MASK;
            let live_cid = inner.bank.read(base + REG_CIDCFGR) & CIDCFGR_ALL_MASK;
            let live_start = inner.bank.read(base + REG_STARTR);
            let live_end = inner.bank.read(base + REG_ENDR);
            let start = ((range.base - self.mem.base) & self.addr_mask) as u32;
            let end = ((range.end() - self.mem.base) & self.addr_mask) as u32;
            if live_cfgr == config.cfgr()
                && live_cid == config.cidcfgr()
                && live_start == start
                && live_end == end
            {
                return Ok(());
            }
            return Err(Error::AccessDenied);
        }

        self.write_region(&mut inner, config, range);

        if let Some(region) = inner
            .regions
            .iter_mut()
            .find(|region| region.config.id == config.id)
        {
            region.config = *config;
            region.range = range;
        } else {
            inner
                .regions
                .try_push(RegionShadow {
                    config: *config,
                    range,
                })
                .map_err(|_| Error::OutOfMemory)?;
        }
        Ok(())
    }

    /// Rearms the illegal-access latches if any fired.
    pub fn clear_illegal_access_flags(&self) {
        let mut inner = self.inner.lock();
        if inner.bank.read(RISAF_IASR) == 0 {
            return;
        }
        inner
            .bank
            .write(RISAF_IACR, IASR_CAEF | IASR_IAEF0 | IASR_IAEF1);
    }

    /// Logs the latched illegal-access records.
    pub fn dump_erroneous_data(&self) {
        let inner = self.inner.lock();
        let iasr = inner.bank.read(RISAF_IASR);
        if iasr & IASR_CAEF != 0 {
            error!("RISAF configuration access error");
        }
        if iasr & IASR_IAEF0 != 0 {
            error!(
                "RISAF illegal access on port 0: IAESR0 {:#x}, IADDR0 {:#x}",
                inner.bank.read(RISAF_IAESR0),
                inner.bank.read(RISAF_IADDR0)
            );
        }
        if iasr & IASR_IAEF1 != 0 {
            error!(
                "RISAF illegal access on port 1: IAESR1 {:#x}, IADDR1 {:#x}",
                inner.bank.read(RISAF_IAESR1),
                inner.bank.read(RISAF_IADDR1)
            );
        }
    }

    /// Finds the configured region fully covering `range`.
    fn covering_region(inner: &Inner<M>, range: AddressRange) -> Result<u8> {
        inner
            .regions
            .iter()
            .find(|region| region.range.contains(&range))
            .map(|region| region.config.id)
            .ok_or(Error::ItemNotFound)
    }

    #[cfg(any(test, feature = "fakes"))]
    /// Runs `f` over the underlying register bank. Test-only escape hatch.
    pub fn with_bank<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.inner.lock().bank)
    }
}

impl<M: Mmio> MemoryFirewallController for Risaf<M> {
    /// Checks that the attributes requested in the cell are a subset of
    /// what the live region covering `range` grants. The cell's region
    /// index is ignored, the covering region is found by address.
    fn check_memory_access(&self, range: AddressRange, args: &[u32]) -> Result<()> {
        let requested = RegionConfig::parse(single_cell(args)?);
        let inner = self.inner.lock();
        let id = Self::covering_region(&inner, range)?;
        let base = REG_BASE + REG_STRIDE * (id as usize - 1);
        let cfgr = inner.bank.read(base + REG_CFGR);
        let cidcfgr = inner.bank.read(base + REG_CIDCFGR);

        // A disabled region falls back to the default region, which only
        // the trusted domain CID can vouch for.
        if cfgr & CFGR_BREN == 0 && !self.tdcid {
            return Err(Error::AccessDenied);
        }
        if requested.secure && cfgr & CFGR_SEC == 0 {
            return Err(Error::AccessDenied);
        }

        let live = RegionConfig::from_registers(id, cfgr, cidcfgr);
        if requested.priv_cids & !live.priv_cids != 0
            || requested.read_cids & !live.read_cids != 0
            || requested.write_cids & !live.write_cids != 0
        {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    /// Verifies the owner compartment can use `range` with the read/write
    /// modes its bits in the cell's enable masks request.
    fn acquire_memory_access(&self, range: AddressRange, args: &[u32]) -> Result<()> {
        let requested = RegionConfig::parse(single_cell(args)?);
        let owner_bit = 1u8 << Cid::OWNER.get();
        let inner = self.inner.lock();
        let id = Self::covering_region(&inner, range)?;
        let base = REG_BASE + REG_STRIDE * (id as usize - 1);
        let cfgr = inner.bank.read(base + REG_CFGR);
        let cidcfgr = inner.bank.read(base + REG_CIDCFGR);

        if cfgr & CFGR_BREN == 0 && !self.tdcid {
            return Err(Error::AccessDenied);
        }
        if cfgr & CFGR_SEC == 0 {
            return Err(Error::AccessDenied);
        }
        if cidcfgr != 0 {
            let live = RegionConfig::from_registers(id, cfgr, cidcfgr);
            if requested.read_cids & owner_bit != 0 && live.read_cids & owner_bit == 0 {
                return Err(Error::AccessDenied);
            }
            if requested.write_cids & owner_bit != 0 && live.write_cids & owner_bit == 0 {
                return Err(Error::AccessDenied);
            }
        }
        Ok(())
    }

    /// Reconfigures the attributes of the already-registered region whose
    /// index the cell names. The query range must match the registered
    /// range exactly.
    fn set_memory_config(&self, range: AddressRange, args: &[u32]) -> Result<()> {
        let config = RegionConfig::parse(single_cell(args)?);
        {
            let inner = self.inner.lock();
            let region = inner
                .regions
                .iter()
                .find(|region| region.config.id == config.id)
                .ok_or(Error::ItemNotFound)?;
            if region.range != range {
                return Err(Error::BadParameters);
            }
        }
        self.configure_region(range, &config)
    }
}

impl<M: Mmio> PowerManaged for Risaf<M> {
    /// Reads every registered region's live registers back into the
    /// shadow, so resume replays what the hardware actually held rather
    /// than what was last requested.
    fn suspend(&self, hint: PmHint) -> Result<()> {
        if !hint.contains(PmHint::CONTEXT_LOST) {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let mem_base = self.mem.base;
        let Inner { bank, regions } = &mut *inner;
        for region in regions.iter_mut() {
            let id = region.config.id;
            let base = REG_BASE + REG_STRIDE * (id as usize - 1);
            let cfgr = bank.read(base + REG_CFGR);
            let cidcfgr = bank.read(base + REG_CIDCFGR);
            let start = u64::from(bank.read(base + REG_STARTR));
            // ENDR keeps only the granule index, the offset bits below the
            // granularity are implicitly ones.
            let end = u64::from(bank.read(base + REG_ENDR)) | (self.granularity - 1);

            region.config = RegionConfig::from_registers(id, cfgr, cidcfgr);
            region.range = AddressRange {
                base: mem_base + start,
                len: end - start + 1,
            };
        }
        Ok(())
    }

    /// Replays the shadow into the hardware.
    ///
    /// Panics if a region cannot be reprogrammed: coming back from low
    /// power with the memory firewall open is not survivable.
    fn resume(&self, hint: PmHint) -> Result<()> {
        if !hint.contains(PmHint::CONTEXT_LOST) {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        for index in 0..inner.regions.len() {
            let (config, range) = {
                let region = &inner.regions[index];
                (region.config, region.range)
            };
            assert!(
                self.check_boundaries(range).is_ok(),
                "region {} shadow is corrupt",
                config.id
            );
            self.write_region(&mut inner, &config, range);
        }
        Ok(())
    }
}
