// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! RIFSC, the peripheral-side resource isolation controller.
//!
//! The RIFSC multiplexes three register banks behind one base address:
//! RISUP slots carrying the per-peripheral secure/privileged/CID filtering
//! attributes, RIMU slots carrying the attributes stamped on bus-master
//! transactions, and (on parts that have them) RISAL address-range filters
//! for peripherals that subdivide their address space.
//!
//! One compartment per chip is the trusted domain CID (TDCID) and is alone
//! allowed to program CID filtering. The engine reads its own compartment's
//! TDCID status once and gates every CID write on it.

use crate::config::ConfigTable;
use crate::error::{Error, Result};
use crate::firewall::{FirewallController, single_cell};
use crate::mmio::Mmio;
use crate::pm::{PmHint, PowerManaged};
use crate::rif::{
    self, CIDCFGR_CFEN, CIDCFGR_SCID_SHIFT, CIDCFGR_SEMEN, CIDCFGR_SEMWL_SHIFT, Cid,
    MAX_CID_SUPPORTED, ResourceConfig,
};
use crate::soc::SocProfile;
use log::{debug, error, trace};
use spin::{Once, mutex::SpinMutex};

const RISC_CR: usize = 0x000;
const RISC_SECCFGR0: usize = 0x010;
const RISC_PRIVCFGR0: usize = 0x030;
const RISC_RCFGLOCKR0: usize = 0x050;
const RISC_PER0_CIDCFGR: usize = 0x100;
const RISC_PER0_SEMCR: usize = 0x104;
const RISAL_CFGR0_A: usize = 0x900;
const RISAL_CFGR0_B: usize = 0x908;
const RISAL_STRIDE: usize = 0x10;
const RIMC_CR: usize = 0xc00;
const RIMC_ATTR0: usize = 0xc10;
const HWCFGR2: usize = 0xfec;
const HWCFGR1: usize = 0xff0;
const VERR: usize = 0xff4;

const RISC_CR_GLOCK: u32 = 1 << 0;
const RIMC_CR_GLOCK: u32 = 1 << 0;
const RIMC_CR_TDCID_MASK: u32 = 0x7 << 4;

const HWCFGR2_NB_RISUP_MASK: u32 = 0xffff;
const HWCFGR2_NB_RIMU_SHIFT: u32 = 16;
const HWCFGR2_NB_RIMU_MASK: u32 = 0xff;
const HWCFGR2_NB_RISAL_SHIFT: u32 = 24;

const VERR_MINREV_MASK: u32 = 0xf;
const VERR_MAJREV_SHIFT: u32 = 4;
const VERR_MAJREV_MASK: u32 = 0xf;

/// RIMC_ATTR: master carries a static CID instead of inheriting one.
pub const RIMC_ATTR_CIDSEL: u32 = 1 << 2;
/// RIMC_ATTR: static master CID field position.
pub const RIMC_ATTR_MCID_SHIFT: u32 = 4;
/// RIMC_ATTR: master issues secure transactions.
pub const RIMC_ATTR_MSEC: u32 = 1 << 8;
/// RIMC_ATTR: master issues privileged transactions.
pub const RIMC_ATTR_MPRIV: u32 = 1 << 9;

/// First resource index reserved for RIMUs in configuration cells.
pub const RIMU_ID_OFFSET: u32 = 128;

const IDS_PER_REG: usize = 32;
const PER_STRIDE: usize = 0x8;
const MAX_RISUP_WORDS: usize = crate::config::MAX_RESOURCES / IDS_PER_REG;

/// Decoded RIMU (bus master) configuration.
///
/// Cell layout: bits 7:0 carry [`RIMU_ID_OFFSET`] plus the RIMU index to
/// keep master cells distinct from peripheral cells; bit 8 is CIDSEL,
/// bits 14:12 the static master CID, bit 29 privileged, bit 30 secure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RimuConfig {
    /// RIMU index.
    pub id: u8,
    /// Use `mcid` rather than inheriting the CID of the paired peripheral.
    pub static_cid: bool,
    /// Master CID when `static_cid` is set.
    pub mcid: Cid,
    /// Master issues secure transactions.
    pub secure: bool,
    /// Master issues privileged transactions.
    pub privileged: bool,
}

impl RimuConfig {
    /// Decodes a master configuration cell.
    pub fn parse(cell: u32) -> Result<Self> {
        let id = cell & rif::CELL_ID_MASK;
        if id < RIMU_ID_OFFSET {
            return Err(Error::BadParameters);
        }
        Ok(Self {
            id: (id - RIMU_ID_OFFSET) as u8,
            static_cid: cell & (1 << 8) != 0,
            mcid: Cid::new((cell >> 12) & 0x7)?,
            secure: cell & rif::CELL_SEC != 0,
            privileged: cell & rif::CELL_PRIV != 0,
        })
    }

    /// The RIMC_ATTR word this configuration programs.
    pub fn attr(&self) -> u32 {
        let mut word = self.mcid.get() << RIMC_ATTR_MCID_SHIFT;
        if self.static_cid {
            word |= RIMC_ATTR_CIDSEL;
        }
        if self.secure {
            word |= RIMC_ATTR_MSEC;
        }
        if self.privileged {
            word |= RIMC_ATTR_MPRIV;
        }
        word
    }
}

/// RISAL register blocks. Each filter exposes two independently configured
/// subregions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RisalBlock {
    /// Subregion A.
    A,
    /// Subregion B.
    B,
}

#[derive(Clone, Copy)]
struct Capabilities {
    rif_en: bool,
    sec_en: bool,
    priv_en: bool,
    risup_count: u32,
    rimu_count: u32,
    risal_count: u32,
}

struct Inner<M> {
    bank: M,
    /// One bit per RISUP whose semaphore the owner held at suspend time.
    sem_taken: [u32; MAX_RISUP_WORDS],
}

/// The RIFSC engine.
pub struct Rifsc<M: Mmio> {
    inner: SpinMutex<Inner<M>>,
    profile: &'static SocProfile,
    caps: Capabilities,
    errata_ahbrisab: bool,
    tdcid: Once<bool>,
}

impl<M: Mmio> Rifsc<M> {
    /// Creates the engine over a mapped RIFSC register bank.
    ///
    /// `errata_ahbrisab` enables the AHB RISAB workaround check that
    /// forbids effective CID0 on inheriting bus masters.
    pub fn new(bank: M, profile: &'static SocProfile, errata_ahbrisab: bool) -> Result<Self> {
        let hwcfgr1 = bank.read(HWCFGR1);
        let hwcfgr2 = bank.read(HWCFGR2);
        let verr = bank.read(VERR);

        let caps = Capabilities {
            rif_en: hwcfgr1 & 0xf != 0,
            sec_en: (hwcfgr1 >> 4) & 0xf != 0,
            priv_en: (hwcfgr1 >> 8) & 0xf != 0,
            risup_count: hwcfgr2 & HWCFGR2_NB_RISUP_MASK,
            rimu_count: (hwcfgr2 >> HWCFGR2_NB_RIMU_SHIFT) & HWCFGR2_NB_RIMU_MASK,
            risal_count: hwcfgr2 >> HWCFGR2_NB_RISAL_SHIFT,
        };

        if caps.risup_count == 0 || caps.risup_count as usize > crate::config::MAX_RESOURCES {
            return Err(Error::NotSupported);
        }

        debug!(
            "RIFSC {} version {}.{}, enabled[rif:sec:priv]:[{}:{}:{}] nb[risup|rimu|risal]:[{},{},{}]",
            profile.name,
            (verr >> VERR_MAJREV_SHIFT) & VERR_MAJREV_MASK,
            verr & VERR_MINREV_MASK,
            caps.rif_en,
            caps.sec_en,
            caps.priv_en,
            caps.risup_count,
            caps.rimu_count,
            caps.risal_count,
        );

        Ok(Self {
            inner: SpinMutex::new(Inner {
                bank,
                sem_taken: [0; MAX_RISUP_WORDS],
            }),
            profile,
            caps,
            errata_ahbrisab,
            tdcid: Once::new(),
        })
    }

    /// Returns whether this compartment is the trusted domain CID.
    ///
    /// The hardware answer cannot change without a reset, so it is read
    /// once and memoized.
    pub fn is_tdcid(&self) -> bool {
        *self.tdcid.call_once(|| {
            let inner = self.inner.lock();
            inner.bank.read(RIMC_CR) & RIMC_CR_TDCID_MASK
                == Cid::OWNER.get() << CIDCFGR_SCID_SHIFT
        })
    }

    /// Number of RISUP slots the hardware reports.
    pub fn risup_count(&self) -> u32 {
        self.caps.risup_count
    }

    /// Applies every RISUP configuration accumulated in `table`.
    pub fn apply_table(&self, table: &ConfigTable) -> Result<()> {
        let tdcid = self.is_tdcid();
        let mut inner = self.inner.lock();
        for id in 0..table.resource_count().min(self.caps.risup_count as usize) {
            if !table.is_configured(id) {
                continue;
            }
            let config = ResourceConfig {
                id: id as u8,
                cid_filtering: table.cidcfgr(id) & CIDCFGR_CFEN != 0,
                semaphore: table.cidcfgr(id) & CIDCFGR_SEMEN != 0,
                scid: Cid::new((table.cidcfgr(id) >> CIDCFGR_SCID_SHIFT) & 0x7)?,
                semwl: (table.cidcfgr(id) >> CIDCFGR_SEMWL_SHIFT) as u8,
                secure: table.secure(id),
                privileged: table.privileged(id),
                lock: table.locked(id),
            };
            self.apply_risup_locked(&mut inner, &config, tdcid)?;
        }
        Ok(())
    }

    /// Applies one RISUP configuration.
    pub fn apply_risup(&self, config: &ResourceConfig) -> Result<()> {
        let tdcid = self.is_tdcid();
        let mut inner = self.inner.lock();
        self.apply_risup_locked(&mut inner, config, tdcid)
    }

    fn apply_risup_locked(
        &self,
        inner: &mut Inner<M>,
        config: &ResourceConfig,
        tdcid: bool,
    ) -> Result<()> {
        let id = config.id as usize;
        if id >= self.caps.risup_count as usize {
            return Err(Error::BadParameters);
        }

        let word = 4 * (id / IDS_PER_REG);
        let bit = 1 << (id % IDS_PER_REG);

        // A locked slot accepts a reconfiguration only as a no-op: the
        // requested attributes must match what is already programmed.
        if inner.bank.read(RISC_RCFGLOCKR0 + word) & bit != 0 {
            let sec = inner.bank.read(RISC_SECCFGR0 + word) & bit != 0;
            let privileged = inner.bank.read(RISC_PRIVCFGR0 + word) & bit != 0;
            let cidcfgr = inner.bank.read(RISC_PER0_CIDCFGR + PER_STRIDE * id);
            if sec == config.secure && privileged == config.privileged && cidcfgr == config.cidcfgr()
            {
                return Ok(());
            }
            debug!("RISUP {id} configuration is locked");
            return Err(Error::AccessDenied);
        }

        if self.caps.sec_en {
            inner.bank.clear_set_bits(
                RISC_SECCFGR0 + word,
                bit,
                if config.secure { bit } else { 0 },
            );
        }
        if self.caps.priv_en {
            inner.bank.clear_set_bits(
                RISC_PRIVCFGR0 + word,
                bit,
                if config.privileged { bit } else { 0 },
            );
        }

        if tdcid {
            if self.caps.rif_en {
                inner
                    .bank
                    .write(RISC_PER0_CIDCFGR + PER_STRIDE * id, config.cidcfgr());
            }
            if config.lock {
                trace!("locking RIF configuration for peripheral {id}");
                inner.bank.set_bits(RISC_RCFGLOCKR0 + word, bit);
            }
        }

        // Hold the semaphore of resources assigned to us and secured,
        // release any other.
        let cidcfgr = inner.bank.read(RISC_PER0_CIDCFGR + PER_STRIDE * id);
        let secured = inner.bank.read(RISC_SECCFGR0 + word) & bit != 0;
        let semcr = RISC_PER0_SEMCR + PER_STRIDE * id;
        if rif::semaphore_mode_incorrect(cidcfgr) || !secured {
            rif::release_semaphore(&mut inner.bank, semcr, MAX_CID_SUPPORTED).map_err(|_| {
                error!("couldn't release semaphore for resource {id}");
                Error::AccessDenied
            })
        } else {
            rif::acquire_semaphore(&mut inner.bank, semcr, MAX_CID_SUPPORTED).map_err(|_| {
                error!("couldn't acquire semaphore for resource {id}");
                Error::AccessDenied
            })
        }
    }

    /// Reprograms the static CID filtering of one RISUP at runtime.
    pub fn reconfigure_risup(
        &self,
        id: u32,
        cid: u32,
        secure: bool,
        privileged: bool,
        filtering: bool,
    ) -> Result<()> {
        if id >= self.caps.risup_count || cid > MAX_CID_SUPPORTED {
            return Err(Error::BadParameters);
        }
        self.apply_risup(&ResourceConfig {
            id: id as u8,
            cid_filtering: filtering,
            semaphore: false,
            scid: Cid::new(cid)?,
            semwl: 0,
            secure,
            privileged,
            lock: false,
        })
    }

    /// Returns whether CID filtering is enabled on a RISUP.
    pub fn cid_is_enabled(&self, id: u32) -> Result<bool> {
        if id >= self.caps.risup_count {
            return Err(Error::BadParameters);
        }
        let inner = self.inner.lock();
        Ok(inner
            .bank
            .read(RISC_PER0_CIDCFGR + PER_STRIDE * id as usize)
            & CIDCFGR_CFEN
            != 0)
    }

    /// Enables CID filtering on a RISUP without touching the rest of its
    /// configuration.
    pub fn cid_enable(&self, id: u32) -> Result<()> {
        if id >= self.caps.risup_count {
            return Err(Error::BadParameters);
        }
        if !self.is_tdcid() {
            return Err(Error::AccessDenied);
        }
        let mut inner = self.inner.lock();
        inner
            .bank
            .set_bits(RISC_PER0_CIDCFGR + PER_STRIDE * id as usize, CIDCFGR_CFEN);
        Ok(())
    }

    /// Disables CID filtering on a RISUP.
    pub fn cid_disable(&self, id: u32) -> Result<()> {
        if id >= self.caps.risup_count {
            return Err(Error::BadParameters);
        }
        if !self.is_tdcid() {
            return Err(Error::AccessDenied);
        }
        let mut inner = self.inner.lock();
        inner
            .bank
            .clear_bits(RISC_PER0_CIDCFGR + PER_STRIDE * id as usize, CIDCFGR_CFEN);
        Ok(())
    }

    /// Applies one RIMU configuration. Only the trusted domain CID may
    /// program bus-master attributes.
    pub fn apply_rimu(&self, config: &RimuConfig) -> Result<()> {
        if !self.is_tdcid() {
            return Err(Error::AccessDenied);
        }
        if u32::from(config.id) >= self.caps.rimu_count {
            return Err(Error::BadParameters);
        }

        let mut inner = self.inner.lock();
        if self.errata_ahbrisab {
            self.check_rimu_inheritance(&inner, config);
        }

        if self.caps.rif_en {
            inner
                .bank
                .write(RIMC_ATTR0 + 4 * config.id as usize, config.attr());
        }
        Ok(())
    }

    /// CID filtering on the AHB RISAB RAMs cannot cope with spurious CID0
    /// transactions, so no bus master may end up issuing CID0: statically
    /// configured RIMUs must carry a non-zero CID, and inheriting RIMUs
    /// must be paired with a RISUP that can never resolve to CID0.
    ///
    /// Panics on violation; letting an effectively unfiltered master
    /// through would defeat the isolation the platform relies on.
    fn check_rimu_inheritance(&self, inner: &Inner<M>, config: &RimuConfig) {
        if config.static_cid {
            assert!(
                config.mcid.get() != 0,
                "a CID should be set for RIMU {}",
                config.id
            );
            return;
        }

        let Some(risup) = self.profile.paired_risup(config.id) else {
            panic!("RIMU {} cannot be set in inheritance mode", config.id);
        };

        let cidcfgr = inner
            .bank
            .read(RISC_PER0_CIDCFGR + PER_STRIDE * risup as usize);
        let filtering_off = cidcfgr & CIDCFGR_CFEN == 0;
        let static_cid0 = cidcfgr & CIDCFGR_SEMEN == 0
            && (cidcfgr >> CIDCFGR_SCID_SHIFT) & 0x7 == 0;
        let cid0_whitelisted =
            cidcfgr & CIDCFGR_SEMEN != 0 && cidcfgr & (1 << CIDCFGR_SEMWL_SHIFT) != 0;
        assert!(
            !(filtering_off || static_cid0 || cid0_whitelisted),
            "RIMU {} in inheritance mode with CID0",
            config.id
        );
    }

    /// Programs one RISAL subregion filter.
    pub fn configure_risal(&self, id: u32, block: RisalBlock, attr: u32) -> Result<()> {
        if self.caps.risal_count == 0 {
            return Err(Error::NotSupported);
        }
        if id == 0 || id > self.caps.risal_count {
            return Err(Error::BadParameters);
        }

        let base = match block {
            RisalBlock::A => RISAL_CFGR0_A,
            RisalBlock::B => RISAL_CFGR0_B,
        };
        let mut inner = self.inner.lock();
        if self.caps.rif_en {
            inner
                .bank
                .write(base + RISAL_STRIDE * (id as usize - 1), attr);
        }
        Ok(())
    }

    /// Sets the global lock on the RISUP configuration registers.
    pub fn lock_risup_config(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.bank.set_bits(RISC_CR, RISC_CR_GLOCK);
        if inner.bank.read(RISC_CR) & RISC_CR_GLOCK == 0 {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    /// Sets the global lock on the RIMU configuration registers.
    pub fn lock_rimu_config(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.bank.set_bits(RIMC_CR, RIMC_CR_GLOCK);
        if inner.bank.read(RIMC_CR) & RIMC_CR_GLOCK == 0 {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    #[cfg(any(test, feature = "fakes"))]
    /// Runs `f` over the underlying register bank. Test-only escape hatch.
    pub fn with_bank<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.inner.lock().bank)
    }
}

impl<M: Mmio> FirewallController for Rifsc<M> {
    fn set_config(&self, args: &[u32]) -> Result<()> {
        let cell = single_cell(args)?;
        let id = cell & rif::CELL_ID_MASK;

        if id < RIMU_ID_OFFSET {
            if id >= self.caps.risup_count {
                return Err(Error::BadParameters);
            }
            let config = ResourceConfig::parse(cell, self.caps.risup_count);
            let tdcid = self.is_tdcid();
            let mut inner = self.inner.lock();

            // Without TDCID rights the CID word cannot be written, so the
            // requested filtering must already be in place.
            if !tdcid {
                let cidcfgr = inner
                    .bank
                    .read(RISC_PER0_CIDCFGR + PER_STRIDE * config.id as usize);
                if cidcfgr != config.cidcfgr() {
                    return Err(Error::BadParameters);
                }
            }

            debug!(
                "setting config for peripheral {}: sec {}, priv {}, cid attr {:#x}, lock {}",
                config.id,
                config.secure,
                config.privileged,
                config.cidcfgr(),
                config.lock
            );
            return self.apply_risup_locked(&mut inner, &config, tdcid);
        }

        self.apply_rimu(&RimuConfig::parse(cell)?)
    }

    fn check_access(&self, args: &[u32]) -> Result<()> {
        let cell = single_cell(args)?;
        let id = (cell & rif::CELL_ID_MASK) as usize;
        if id as u32 >= RIMU_ID_OFFSET {
            return Ok(());
        }
        if id >= self.caps.risup_count as usize {
            return Err(Error::BadParameters);
        }

        let requested = ResourceConfig::parse(cell, self.caps.risup_count);
        let word = 4 * (id / IDS_PER_REG);
        let bit = 1 << (id % IDS_PER_REG);
        let inner = self.inner.lock();
        let seccfgr = inner.bank.read(RISC_SECCFGR0 + word);
        let privcfgr = inner.bank.read(RISC_PRIVCFGR0 + word);
        let cidcfgr = inner.bank.read(RISC_PER0_CIDCFGR + PER_STRIDE * id);

        // A non-secure or unprivileged requester cannot reach a resource
        // restricted to a higher level.
        if !requested.secure && seccfgr & bit != 0 {
            return Err(Error::AccessDenied);
        }
        if !requested.privileged && privcfgr & bit != 0 {
            return Err(Error::AccessDenied);
        }

        if cidcfgr & CIDCFGR_CFEN == 0 {
            return Ok(());
        }

        if cidcfgr & CIDCFGR_SEMEN != 0 {
            if !rif::semaphore_mode_grants(cidcfgr, requested.scid) {
                return Err(Error::AccessDenied);
            }
        } else if !rif::static_cid_grants(cidcfgr, MAX_CID_SUPPORTED, requested.scid) {
            return Err(Error::AccessDenied);
        }

        Ok(())
    }

    fn acquire_access(&self, args: &[u32]) -> Result<()> {
        let cell = single_cell(args)?;
        let id = (cell & rif::CELL_ID_MASK) as usize;
        if id as u32 >= RIMU_ID_OFFSET {
            return Ok(());
        }
        if id >= self.caps.risup_count as usize {
            return Err(Error::BadParameters);
        }

        let word = 4 * (id / IDS_PER_REG);
        let bit = 1 << (id % IDS_PER_REG);
        let mut inner = self.inner.lock();

        if inner.bank.read(RISC_SECCFGR0 + word) & bit == 0 {
            return Err(Error::AccessDenied);
        }

        let cidcfgr = inner.bank.read(RISC_PER0_CIDCFGR + PER_STRIDE * id);
        if cidcfgr & CIDCFGR_CFEN == 0 {
            return Ok(());
        }

        if cidcfgr & CIDCFGR_SEMEN != 0 {
            if !rif::semaphore_mode_grants(cidcfgr, Cid::OWNER) {
                return Err(Error::AccessDenied);
            }
            // Static CID is irrelevant in semaphore mode.
            return rif::acquire_semaphore(
                &mut inner.bank,
                RISC_PER0_SEMCR + PER_STRIDE * id,
                MAX_CID_SUPPORTED,
            );
        }

        if !rif::static_cid_grants(cidcfgr, MAX_CID_SUPPORTED, Cid::OWNER) {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    fn release_access(&self, args: &[u32]) -> Result<()> {
        let cell = single_cell(args)?;
        let id = (cell & rif::CELL_ID_MASK) as usize;
        if id as u32 >= RIMU_ID_OFFSET {
            return Ok(());
        }
        if id >= self.caps.risup_count as usize {
            return Err(Error::BadParameters);
        }

        let mut inner = self.inner.lock();
        let cidcfgr = inner.bank.read(RISC_PER0_CIDCFGR + PER_STRIDE * id);

        // The only thing to undo is a semaphore held by the owner.
        if rif::semaphore_mode_grants(cidcfgr, Cid::OWNER)
            && rif::release_semaphore(
                &mut inner.bank,
                RISC_PER0_SEMCR + PER_STRIDE * id,
                MAX_CID_SUPPORTED,
            )
            .is_err()
        {
            panic!("could not release the RIF semaphore");
        }
        Ok(())
    }
}

impl<M: Mmio> PowerManaged for Rifsc<M> {
    /// Records which RISUP semaphores the owner compartment holds so that
    /// `resume` can claim them again.
    fn suspend(&self, hint: PmHint) -> Result<()> {
        if !hint.contains(PmHint::CONTEXT_LOST) {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        inner.sem_taken = [0; MAX_RISUP_WORDS];
        for id in 0..self.caps.risup_count as usize {
            let semcr = inner.bank.read(RISC_PER0_SEMCR + PER_STRIDE * id);
            let held = semcr & rif::SEMCR_MUTEX != 0
                && (semcr & rif::SEMCR_SEMCID_MASK) >> rif::SEMCR_SEMCID_SHIFT
                    == Cid::OWNER.get();
            if held {
                inner.sem_taken[id / IDS_PER_REG] |= 1 << (id % IDS_PER_REG);
                trace!("RIF semaphore saved for resource {id}");
            }
        }
        Ok(())
    }

    /// Re-acquires the semaphores recorded at suspend time, skipping
    /// resources whose live configuration no longer allows holding them.
    fn resume(&self, hint: PmHint) -> Result<()> {
        if !hint.contains(PmHint::CONTEXT_LOST) {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        for id in 0..self.caps.risup_count as usize {
            if inner.sem_taken[id / IDS_PER_REG] & (1 << (id % IDS_PER_REG)) == 0 {
                continue;
            }
            let cidcfgr = inner.bank.read(RISC_PER0_CIDCFGR + PER_STRIDE * id);
            if rif::semaphore_mode_incorrect(cidcfgr) {
                continue;
            }
            rif::acquire_semaphore(
                &mut inner.bank,
                RISC_PER0_SEMCR + PER_STRIDE * id,
                MAX_CID_SUPPORTED,
            )
            .map_err(|_| {
                error!("could not acquire semaphore for resource {id}");
                Error::AccessDenied
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmio::FakeBank;
    use crate::soc::STM32MP25;

    // 0x1000 bytes of registers.
    type Bank = FakeBank<1024>;

    fn is_semcr(offset: usize) -> bool {
        (RISC_PER0_SEMCR..RISC_PER0_CIDCFGR + PER_STRIDE * 128).contains(&offset)
            && (offset - RISC_PER0_SEMCR) % PER_STRIDE == 0
    }

    fn make_bank(tdcid: bool) -> Bank {
        let mut bank = Bank::new(is_semcr);
        // rif, sec and priv features present.
        bank.poke(HWCFGR1, 0x111);
        // 128 RISUPs, 16 RIMUs, 2 RISALs.
        bank.poke(HWCFGR2, (2 << 24) | (16 << 16) | 128);
        bank.poke(VERR, 0x10);
        if tdcid {
            bank.poke(RIMC_CR, 1 << 4);
        }
        bank
    }

    fn make_rifsc(tdcid: bool) -> Rifsc<Bank> {
        Rifsc::new(make_bank(tdcid), &STM32MP25, false).unwrap()
    }

    fn static_secure_cell(id: u32, scid: u32) -> u32 {
        rif::CELL_SEC | rif::CELL_CFEN | (scid << rif::CELL_SCID_SHIFT) | id
    }

    fn sem_secure_cell(id: u32, whitelist: u32) -> u32 {
        rif::CELL_SEC
            | rif::CELL_CFEN
            | rif::CELL_SEMEN
            | (whitelist << rif::CELL_SEMWL_SHIFT)
            | id
    }

    #[test]
    fn detects_tdcid() {
        assert!(make_rifsc(true).is_tdcid());
        assert!(!make_rifsc(false).is_tdcid());
    }

    #[test]
    fn rejects_empty_controller() {
        let mut bank = Bank::new(is_semcr);
        bank.poke(HWCFGR1, 0x111);
        assert_eq!(
            Rifsc::new(bank, &STM32MP25, false).err(),
            Some(Error::NotSupported)
        );
    }

    #[test]
    fn set_config_programs_attribute_registers() {
        let rifsc = make_rifsc(true);
        rifsc
            .set_config(&[static_secure_cell(33, 1) | rif::CELL_PRIV])
            .unwrap();

        rifsc.with_bank(|bank| {
            assert_eq!(bank.read(RISC_SECCFGR0 + 4), 1 << 1);
            assert_eq!(bank.read(RISC_PRIVCFGR0 + 4), 1 << 1);
            assert_eq!(
                bank.read(RISC_PER0_CIDCFGR + PER_STRIDE * 33),
                CIDCFGR_CFEN | (1 << CIDCFGR_SCID_SHIFT)
            );
        });
    }

    #[test]
    fn locked_slot_accepts_identical_config_only() {
        let rifsc = make_rifsc(true);
        let cell = static_secure_cell(5, 1) | rif::CELL_LOCK;
        rifsc.set_config(&[cell]).unwrap();

        // Same attributes again: no-op success.
        assert_eq!(rifsc.set_config(&[cell]), Ok(()));

        // Different CID: denied.
        assert_eq!(
            rifsc.set_config(&[static_secure_cell(5, 2) | rif::CELL_LOCK]),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn non_tdcid_cannot_introduce_filtering() {
        let rifsc = make_rifsc(false);
        assert_eq!(
            rifsc.set_config(&[static_secure_cell(7, 1)]),
            Err(Error::BadParameters)
        );

        // A cell matching the live CID configuration is fine.
        assert_eq!(rifsc.set_config(&[rif::CELL_SEC | 7]), Ok(()));
    }

    #[test]
    fn non_tdcid_semaphore_config_settles_and_filters() {
        let rifsc = make_rifsc(false);
        // Filtering already programmed by the trusted domain: semaphore
        // mode with compartments 1 and 2 whitelisted.
        rifsc.with_bank(|bank| {
            bank.poke(
                RISC_PER0_CIDCFGR + PER_STRIDE * 3,
                CIDCFGR_CFEN | CIDCFGR_SEMEN | (0x06 << CIDCFGR_SEMWL_SHIFT),
            );
        });

        rifsc.set_config(&[sem_secure_cell(3, 0x06)]).unwrap();

        // The settle pass claimed the semaphore for the owner.
        rifsc.with_bank(|bank| {
            assert_eq!(
                bank.read(RISC_PER0_SEMCR + PER_STRIDE * 3),
                rif::SEMCR_MUTEX | (Cid::OWNER.get() << rif::SEMCR_SEMCID_SHIFT)
            );
        });

        let query = |cid: u32| rif::CELL_SEC | (cid << rif::CELL_SCID_SHIFT) | 3;
        assert_eq!(rifsc.check_access(&[query(1)]), Ok(()));
        assert_eq!(rifsc.check_access(&[query(3)]), Err(Error::AccessDenied));
    }

    #[test]
    fn ids_beyond_the_hardware_count_are_rejected() {
        let mut bank = make_bank(true);
        // Only 64 RISUPs on this instance.
        bank.poke(HWCFGR2, (2 << 24) | (16 << 16) | 64);
        let rifsc = Rifsc::new(bank, &STM32MP25, false).unwrap();

        assert_eq!(rifsc.set_config(&[70]), Err(Error::BadParameters));
        assert_eq!(rifsc.check_access(&[70]), Err(Error::BadParameters));
        assert_eq!(rifsc.acquire_access(&[70]), Err(Error::BadParameters));
        assert_eq!(rifsc.release_access(&[70]), Err(Error::BadParameters));
        assert_eq!(rifsc.cid_is_enabled(70), Err(Error::BadParameters));
        assert_eq!(rifsc.cid_enable(70), Err(Error::BadParameters));
        assert_eq!(rifsc.cid_disable(70), Err(Error::BadParameters));
        assert_eq!(rifsc.cid_is_enabled(5), Ok(false));
    }

    #[test]
    fn semaphore_config_takes_the_semaphore() {
        let rifsc = make_rifsc(true);
        rifsc.set_config(&[sem_secure_cell(10, 0x02)]).unwrap();

        rifsc.with_bank(|bank| {
            assert_eq!(
                bank.read(RISC_PER0_SEMCR + PER_STRIDE * 10),
                rif::SEMCR_MUTEX | (Cid::OWNER.get() << rif::SEMCR_SEMCID_SHIFT)
            );
        });
    }

    #[test]
    fn acquire_access_loses_the_race_to_another_compartment() {
        let rifsc = make_rifsc(true);
        // Whitelist compartments 1 and 2, semaphore free: setup acquires it.
        rifsc.set_config(&[sem_secure_cell(12, 0x06)]).unwrap();
        rifsc.release_access(&[12]).unwrap();

        // Compartment 2 grabs it first.
        rifsc.with_bank(|bank| {
            bank.set_master_cid(2);
            bank.write(RISC_PER0_SEMCR + PER_STRIDE * 12, rif::SEMCR_MUTEX);
            bank.set_master_cid(1);
        });

        assert_eq!(rifsc.acquire_access(&[12]), Err(Error::AccessDenied));

        // Once compartment 2 lets go, the owner can take it.
        rifsc.with_bank(|bank| {
            bank.set_master_cid(2);
            bank.write(RISC_PER0_SEMCR + PER_STRIDE * 12, 0);
            bank.set_master_cid(1);
        });
        assert_eq!(rifsc.acquire_access(&[12]), Ok(()));
    }

    #[test]
    fn acquire_access_requires_secure_resource() {
        let rifsc = make_rifsc(true);
        rifsc.set_config(&[7]).unwrap();
        assert_eq!(rifsc.acquire_access(&[7]), Err(Error::AccessDenied));
    }

    #[test]
    fn check_access_compares_requested_attributes() {
        let rifsc = make_rifsc(true);
        rifsc.set_config(&[static_secure_cell(20, 1)]).unwrap();

        // Secure request for the matching CID.
        assert_eq!(rifsc.check_access(&[static_secure_cell(20, 1)]), Ok(()));
        // Non-secure request against a secure resource.
        assert_eq!(
            rifsc.check_access(&[rif::CELL_CFEN | (1 << rif::CELL_SCID_SHIFT) | 20]),
            Err(Error::AccessDenied)
        );
        // Wrong CID.
        assert_eq!(
            rifsc.check_access(&[static_secure_cell(20, 3)]),
            Err(Error::AccessDenied)
        );
        // Master cells are not checkable here.
        assert_eq!(rifsc.check_access(&[200]), Ok(()));
    }

    #[test]
    fn rimu_requires_tdcid() {
        let rifsc = make_rifsc(false);
        assert_eq!(
            rifsc.apply_rimu(&RimuConfig {
                id: 1,
                static_cid: true,
                mcid: Cid::new(2).unwrap(),
                secure: true,
                privileged: true,
            }),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn rimu_cell_round_trip_through_set_config() {
        let rifsc = make_rifsc(true);
        let cell = rif::CELL_SEC | (2 << 12) | (1 << 8) | (RIMU_ID_OFFSET + 3);
        rifsc.set_config(&[cell]).unwrap();
        rifsc.with_bank(|bank| {
            assert_eq!(
                bank.read(RIMC_ATTR0 + 4 * 3),
                RIMC_ATTR_CIDSEL | (2 << RIMC_ATTR_MCID_SHIFT) | RIMC_ATTR_MSEC
            );
        });
    }

    #[test]
    #[should_panic(expected = "a CID should be set")]
    fn erratum_rejects_static_cid0_master() {
        let rifsc = Rifsc::new(make_bank(true), &STM32MP25, true).unwrap();
        let _ = rifsc.apply_rimu(&RimuConfig {
            id: 1,
            static_cid: true,
            mcid: Cid::new(0).unwrap(),
            secure: false,
            privileged: false,
        });
    }

    #[test]
    #[should_panic(expected = "inheritance mode with CID0")]
    fn erratum_rejects_inheriting_from_unfiltered_risup() {
        let rifsc = Rifsc::new(make_bank(true), &STM32MP25, true).unwrap();
        // RISUP 76 (SDMMC1) left unfiltered.
        let _ = rifsc.apply_rimu(&RimuConfig {
            id: 1,
            static_cid: false,
            mcid: Cid::OWNER,
            secure: false,
            privileged: false,
        });
    }

    #[test]
    fn erratum_accepts_inheriting_from_filtered_risup() {
        let rifsc = Rifsc::new(make_bank(true), &STM32MP25, true).unwrap();
        rifsc.set_config(&[static_secure_cell(76, 1)]).unwrap();
        assert_eq!(
            rifsc.apply_rimu(&RimuConfig {
                id: 1,
                static_cid: false,
                mcid: Cid::OWNER,
                secure: true,
                privileged: false,
            }),
            Ok(())
        );
    }

    #[test]
    fn global_locks_stick() {
        let rifsc = make_rifsc(true);
        rifsc.lock_risup_config().unwrap();
        rifsc.lock_rimu_config().unwrap();
        rifsc.with_bank(|bank| {
            assert_eq!(bank.read(RISC_CR) & RISC_CR_GLOCK, RISC_CR_GLOCK);
            assert_eq!(bank.read(RIMC_CR) & RIMC_CR_GLOCK, RIMC_CR_GLOCK);
        });
    }

    #[test]
    fn risal_bounds_and_write() {
        let rifsc = make_rifsc(true);
        assert_eq!(
            rifsc.configure_risal(0, RisalBlock::A, 1),
            Err(Error::BadParameters)
        );
        assert_eq!(
            rifsc.configure_risal(3, RisalBlock::A, 1),
            Err(Error::BadParameters)
        );
        rifsc.configure_risal(2, RisalBlock::B, 0x103).unwrap();
        rifsc.with_bank(|bank| {
            assert_eq!(bank.read(RISAL_CFGR0_B + RISAL_STRIDE), 0x103);
        });
    }

    #[test]
    fn suspend_resume_reacquires_held_semaphores() {
        let rifsc = make_rifsc(true);
        rifsc.set_config(&[sem_secure_cell(40, 0x02)]).unwrap();
        rifsc.set_config(&[sem_secure_cell(41, 0x06)]).unwrap();
        // Drop 41 so only 40 is held at suspend.
        rifsc.release_access(&[41]).unwrap();

        rifsc.suspend(PmHint::CONTEXT_LOST).unwrap();

        // Power loss clears both semaphores.
        rifsc.with_bank(|bank| {
            bank.write(RISC_PER0_SEMCR + PER_STRIDE * 40, 0);
        });

        rifsc.resume(PmHint::CONTEXT_LOST).unwrap();
        rifsc.with_bank(|bank| {
            assert_eq!(
                bank.read(RISC_PER0_SEMCR + PER_STRIDE * 40),
                rif::SEMCR_MUTEX | (Cid::OWNER.get() << rif::SEMCR_SEMCID_SHIFT)
            );
            assert!(bank.read(RISC_PER0_SEMCR + PER_STRIDE * 41) & rif::SEMCR_MUTEX == 0);
        });
    }

    #[test]
    fn pm_is_a_noop_when_context_is_retained() {
        let rifsc = make_rifsc(true);
        rifsc.set_config(&[sem_secure_cell(40, 0x02)]).unwrap();
        rifsc.suspend(PmHint::empty()).unwrap();
        rifsc.resume(PmHint::empty()).unwrap();
    }
}
