// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! RIF filtering of the PWR block's internal resources.
//!
//! The PWR peripheral applies the RIF pattern to a split register space:
//! seven non-shareable resources (voltage regulators and monitors) share
//! flat bit-indexed secure/privilege registers and carry plain static CID
//! filtering, while six shareable wake-up IO resources get a full
//! CIDCFGR/SEMCR pair each and can be arbitrated between compartments at
//! runtime.

use crate::config::ConfigTable;
use crate::error::{Error, Result};
use crate::firewall::{FirewallController, single_cell};
use crate::mmio::Mmio;
use crate::rif::{
    self, CIDCFGR_CFEN, CIDCFGR_SEMEN, Cid, MAX_CID_SUPPORTED, ResourceConfig,
};
use log::error;
use spin::mutex::SpinMutex;

const PWR_RSECCFGR: usize = 0x100;
const PWR_RPRIVCFGR: usize = 0x104;
const PWR_R_CIDCFGR0: usize = 0x108;
const PWR_WIOSECCFGR: usize = 0x180;
const PWR_WIOPRIVCFGR: usize = 0x184;
const PWR_WIO_CIDCFGR1: usize = 0x188;
const PWR_WIO_SEMCR1: usize = 0x18c;
const WIO_STRIDE: usize = 0x8;

/// Number of RIF-filterable PWR resources.
pub const RESOURCE_COUNT: usize = 13;
/// Index of the first shareable wake-up IO resource.
pub const FIRST_WIO: usize = 7;

const R_MASK: u32 = (1 << FIRST_WIO as u32) - 1;
const WIO_MASK: u32 = (1 << (RESOURCE_COUNT - FIRST_WIO) as u32) - 1;

const SCID_MASK: u32 = 0x7 << rif::CIDCFGR_SCID_SHIFT;
const SEMWL_MASK: u32 = 0xff << rif::CIDCFGR_SEMWL_SHIFT;
const R_CONF_MASK: u32 = CIDCFGR_CFEN | SCID_MASK;
const WIO_CONF_MASK: u32 = CIDCFGR_CFEN | CIDCFGR_SEMEN | SCID_MASK | SEMWL_MASK;

fn r_cidcfgr(id: usize) -> usize {
    PWR_R_CIDCFGR0 + 4 * id
}

fn wio_cidcfgr(id: usize) -> usize {
    PWR_WIO_CIDCFGR1 + WIO_STRIDE * (id - FIRST_WIO)
}

fn wio_semcr(id: usize) -> usize {
    PWR_WIO_SEMCR1 + WIO_STRIDE * (id - FIRST_WIO)
}

struct Inner<M> {
    bank: M,
}

/// The PWR RIF engine.
pub struct PwrRif<M: Mmio> {
    inner: SpinMutex<Inner<M>>,
    tdcid: bool,
}

impl<M: Mmio> PwrRif<M> {
    /// Creates the engine over a mapped PWR register bank. `tdcid` states
    /// whether this compartment is the trusted domain CID, as reported by
    /// the RIFSC.
    pub fn new(bank: M, tdcid: bool) -> Self {
        Self {
            inner: SpinMutex::new(Inner { bank }),
            tdcid,
        }
    }

    /// Applies a full PWR resource configuration.
    ///
    /// Shareable resources the owner could hold are claimed before their
    /// filtering changes, the flat secure/privilege words are split
    /// between the two register pairs, and the semaphores are settled
    /// against the new whitelists.
    pub fn apply(&self, table: &ConfigTable) -> Result<()> {
        if table.resource_count() != RESOURCE_COUNT {
            return Err(Error::BadParameters);
        }

        let mut inner = self.inner.lock();
        let mask = table.access_mask_word(0);
        let sec = table.sec_word(0);
        let privilege = table.priv_word(0);

        // Hold the semaphore of every shareable resource about to change,
        // so no other compartment reconfigures it mid-sequence.
        for id in 0..RESOURCE_COUNT {
            if mask & (1 << id) == 0 {
                continue;
            }
            if id < FIRST_WIO {
                if self.tdcid {
                    inner.bank.clear_bits(r_cidcfgr(id), R_CONF_MASK);
                }
                continue;
            }
            if self.tdcid {
                inner.bank.clear_bits(wio_cidcfgr(id), WIO_CONF_MASK);
            }
            let cidcfgr = inner.bank.read(wio_cidcfgr(id));
            if !rif::semaphore_mode_incorrect(cidcfgr) {
                rif::acquire_semaphore(&mut inner.bank, wio_semcr(id), MAX_CID_SUPPORTED)
                    .map_err(|_| {
                        error!("couldn't acquire semaphore for WIO resource {id}");
                        Error::AccessDenied
                    })?;
            }
        }

        inner
            .bank
            .clear_set_bits(PWR_RPRIVCFGR, mask & R_MASK, privilege);
        inner.bank.clear_set_bits(PWR_RSECCFGR, mask & R_MASK, sec);
        inner.bank.clear_set_bits(
            PWR_WIOPRIVCFGR,
            (mask >> FIRST_WIO) & WIO_MASK,
            privilege >> FIRST_WIO,
        );
        inner.bank.clear_set_bits(
            PWR_WIOSECCFGR,
            (mask >> FIRST_WIO) & WIO_MASK,
            sec >> FIRST_WIO,
        );

        for id in 0..RESOURCE_COUNT {
            if mask & (1 << id) == 0 {
                continue;
            }
            if id < FIRST_WIO {
                if self.tdcid {
                    inner
                        .bank
                        .clear_set_bits(r_cidcfgr(id), R_CONF_MASK, table.cidcfgr(id));
                }
                continue;
            }
            if self.tdcid {
                inner
                    .bank
                    .clear_set_bits(wio_cidcfgr(id), WIO_CONF_MASK, table.cidcfgr(id));
            }
            let cidcfgr = inner.bank.read(wio_cidcfgr(id));
            if rif::semaphore_mode_incorrect(cidcfgr) {
                rif::release_semaphore(&mut inner.bank, wio_semcr(id), MAX_CID_SUPPORTED)
                    .map_err(|_| {
                        error!("couldn't release semaphore for WIO resource {id}");
                        Error::AccessDenied
                    })?;
            } else {
                rif::acquire_semaphore(&mut inner.bank, wio_semcr(id), MAX_CID_SUPPORTED)
                    .map_err(|_| {
                        error!("couldn't acquire semaphore for WIO resource {id}");
                        Error::AccessDenied
                    })?;
            }
        }

        if cfg!(debug_assertions) {
            let r_mask = mask & R_MASK;
            let wio_mask = (mask >> FIRST_WIO) & WIO_MASK;
            assert!(
                inner.bank.read(PWR_RSECCFGR) & r_mask == sec & r_mask
                    && inner.bank.read(PWR_RPRIVCFGR) & r_mask == privilege & r_mask
                    && inner.bank.read(PWR_WIOSECCFGR) & wio_mask
                        == (sec >> FIRST_WIO) & wio_mask
                    && inner.bank.read(PWR_WIOPRIVCFGR) & wio_mask
                        == (privilege >> FIRST_WIO) & wio_mask,
                "PWR access attributes did not stick"
            );
        }

        Ok(())
    }

    fn cidcfgr_offset(id: usize) -> usize {
        if id < FIRST_WIO {
            r_cidcfgr(id)
        } else {
            wio_cidcfgr(id)
        }
    }

    #[cfg(any(test, feature = "fakes"))]
    /// Runs `f` over the underlying register bank. Test-only escape hatch.
    pub fn with_bank<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.inner.lock().bank)
    }
}

impl<M: Mmio> FirewallController for PwrRif<M> {
    fn set_config(&self, args: &[u32]) -> Result<()> {
        let cell = single_cell(args)?;
        if cell & rif::CELL_ID_MASK >= RESOURCE_COUNT as u32 {
            return Err(Error::BadParameters);
        }
        let mut table = ConfigTable::new(RESOURCE_COUNT)?;
        table.add(&ResourceConfig::parse(cell, RESOURCE_COUNT as u32));
        self.apply(&table)
    }

    fn check_access(&self, args: &[u32]) -> Result<()> {
        let cell = single_cell(args)?;
        let id = (cell & rif::CELL_ID_MASK) as usize;
        if id >= RESOURCE_COUNT {
            return Err(Error::BadParameters);
        }
        let requested = ResourceConfig::parse(cell, RESOURCE_COUNT as u32);

        let inner = self.inner.lock();
        let (sec, privilege, bit) = if id < FIRST_WIO {
            (
                inner.bank.read(PWR_RSECCFGR),
                inner.bank.read(PWR_RPRIVCFGR),
                1 << id,
            )
        } else {
            (
                inner.bank.read(PWR_WIOSECCFGR),
                inner.bank.read(PWR_WIOPRIVCFGR),
                1 << (id - FIRST_WIO),
            )
        };
        if !requested.secure && sec & bit != 0 {
            return Err(Error::AccessDenied);
        }
        if !requested.privileged && privilege & bit != 0 {
            return Err(Error::AccessDenied);
        }

        let cidcfgr = inner.bank.read(Self::cidcfgr_offset(id));
        let semcr = if id < FIRST_WIO {
            0
        } else {
            inner.bank.read(wio_semcr(id))
        };
        rif::check_access(cidcfgr, semcr, MAX_CID_SUPPORTED, requested.scid)
    }

    fn acquire_access(&self, args: &[u32]) -> Result<()> {
        let cell = single_cell(args)?;
        let id = (cell & rif::CELL_ID_MASK) as usize;
        if id >= RESOURCE_COUNT {
            return Err(Error::BadParameters);
        }

        let mut inner = self.inner.lock();
        let cidcfgr = inner.bank.read(Self::cidcfgr_offset(id));
        if cidcfgr & CIDCFGR_CFEN == 0 {
            return Ok(());
        }

        if id >= FIRST_WIO && cidcfgr & CIDCFGR_SEMEN != 0 {
            if !rif::semaphore_mode_grants(cidcfgr, Cid::OWNER) {
                return Err(Error::AccessDenied);
            }
            return rif::acquire_semaphore(&mut inner.bank, wio_semcr(id), MAX_CID_SUPPORTED);
        }

        if !rif::static_cid_grants(cidcfgr, MAX_CID_SUPPORTED, Cid::OWNER) {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    fn release_access(&self, args: &[u32]) -> Result<()> {
        let cell = single_cell(args)?;
        let id = (cell & rif::CELL_ID_MASK) as usize;
        if id >= RESOURCE_COUNT {
            return Err(Error::BadParameters);
        }
        if id < FIRST_WIO {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let cidcfgr = inner.bank.read(wio_cidcfgr(id));
        if rif::semaphore_mode_grants(cidcfgr, Cid::OWNER) {
            rif::release_semaphore(&mut inner.bank, wio_semcr(id), MAX_CID_SUPPORTED)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmio::FakeBank;
    use crate::rif::{CELL_CFEN, CELL_SCID_SHIFT, CELL_SEC, CELL_SEMEN, CELL_SEMWL_SHIFT};

    type Bank = FakeBank<128>;

    fn is_semcr(offset: usize) -> bool {
        (PWR_WIO_SEMCR1..PWR_WIO_SEMCR1 + 6 * WIO_STRIDE).contains(&offset)
            && (offset - PWR_WIO_SEMCR1) % WIO_STRIDE == 0
    }

    fn make_pwr(tdcid: bool) -> PwrRif<Bank> {
        PwrRif::new(Bank::new(is_semcr), tdcid)
    }

    fn wio_sem_cell(id: u32, whitelist: u32) -> u32 {
        CELL_SEC | CELL_CFEN | CELL_SEMEN | (whitelist << CELL_SEMWL_SHIFT) | id
    }

    #[test]
    fn apply_splits_the_attribute_words() {
        let pwr = make_pwr(true);
        let mut table = ConfigTable::new(RESOURCE_COUNT).unwrap();
        table
            .accumulate(&[
                CELL_SEC | CELL_CFEN | (1 << CELL_SCID_SHIFT) | 3,
                wio_sem_cell(8, 0x02),
            ])
            .unwrap();
        pwr.apply(&table).unwrap();

        pwr.with_bank(|bank| {
            assert_eq!(bank.read(PWR_RSECCFGR), 1 << 3);
            assert_eq!(bank.read(PWR_WIOSECCFGR), 1 << 1);
            assert_eq!(
                bank.read(r_cidcfgr(3)),
                CIDCFGR_CFEN | (1 << rif::CIDCFGR_SCID_SHIFT)
            );
            assert_eq!(
                bank.read(wio_cidcfgr(8)),
                CIDCFGR_CFEN | CIDCFGR_SEMEN | (0x02 << rif::CIDCFGR_SEMWL_SHIFT)
            );
            // The owner holds the freshly whitelisted semaphore.
            assert_eq!(
                bank.read(wio_semcr(8)),
                rif::SEMCR_MUTEX | (Cid::OWNER.get() << rif::SEMCR_SEMCID_SHIFT)
            );
        });
    }

    #[test]
    fn apply_releases_semaphores_the_owner_loses() {
        let pwr = make_pwr(true);
        let mut table = ConfigTable::new(RESOURCE_COUNT).unwrap();
        table.accumulate(&[wio_sem_cell(9, 0x02)]).unwrap();
        pwr.apply(&table).unwrap();
        pwr.with_bank(|bank| {
            assert!(bank.read(wio_semcr(9)) & rif::SEMCR_MUTEX != 0);
        });

        // Whitelist compartment 2 only: the settle pass must let go.
        let mut table = ConfigTable::new(RESOURCE_COUNT).unwrap();
        table.accumulate(&[wio_sem_cell(9, 0x04)]).unwrap();
        pwr.apply(&table).unwrap();
        pwr.with_bank(|bank| {
            assert_eq!(bank.read(wio_semcr(9)) & rif::SEMCR_MUTEX, 0);
        });
    }

    #[test]
    fn non_tdcid_apply_leaves_cid_filtering_alone() {
        let pwr = make_pwr(false);
        let mut table = ConfigTable::new(RESOURCE_COUNT).unwrap();
        table
            .accumulate(&[CELL_SEC | CELL_CFEN | (2 << CELL_SCID_SHIFT) | 2])
            .unwrap();
        pwr.apply(&table).unwrap();

        pwr.with_bank(|bank| {
            assert_eq!(bank.read(r_cidcfgr(2)), 0);
            assert_eq!(bank.read(PWR_RSECCFGR), 1 << 2);
        });
    }

    #[test]
    fn acquire_follows_static_and_semaphore_modes() {
        let pwr = make_pwr(true);
        let mut table = ConfigTable::new(RESOURCE_COUNT).unwrap();
        table
            .accumulate(&[
                CELL_CFEN | (1 << CELL_SCID_SHIFT) | 1,
                CELL_CFEN | (2 << CELL_SCID_SHIFT) | 2,
                wio_sem_cell(10, 0x06),
            ])
            .unwrap();
        pwr.apply(&table).unwrap();

        // Static CID matches the owner.
        assert_eq!(pwr.acquire_access(&[1]), Ok(()));
        // Static CID names another compartment.
        assert_eq!(pwr.acquire_access(&[2]), Err(Error::AccessDenied));

        // Semaphore mode, currently held by the owner from apply's settle.
        assert_eq!(pwr.acquire_access(&[10]), Ok(()));
        pwr.release_access(&[10]).unwrap();

        // Compartment 2 wins the race.
        pwr.with_bank(|bank| {
            bank.set_master_cid(2);
            bank.write(wio_semcr(10), rif::SEMCR_MUTEX);
            bank.set_master_cid(1);
        });
        assert_eq!(pwr.acquire_access(&[10]), Err(Error::AccessDenied));
    }

    #[test]
    fn check_access_consults_semcr_for_wio() {
        let pwr = make_pwr(true);
        let mut table = ConfigTable::new(RESOURCE_COUNT).unwrap();
        table.accumulate(&[wio_sem_cell(11, 0x06)]).unwrap();
        pwr.apply(&table).unwrap();

        // Held by the owner after apply: CID 1 passes, CID 2 is blocked.
        let query = |cid: u32| CELL_SEC | (cid << CELL_SCID_SHIFT) | 11;
        assert_eq!(pwr.check_access(&[query(1)]), Ok(()));
        assert_eq!(pwr.check_access(&[query(2)]), Err(Error::AccessDenied));

        // A non-secure query against a secured resource.
        assert_eq!(
            pwr.check_access(&[(1 << CELL_SCID_SHIFT) | 11]),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn set_config_routes_through_apply() {
        let pwr = make_pwr(true);
        pwr.set_config(&[CELL_SEC | CELL_CFEN | (1 << CELL_SCID_SHIFT) | 5])
            .unwrap();
        pwr.with_bank(|bank| {
            assert_eq!(bank.read(PWR_RSECCFGR), 1 << 5);
            assert_eq!(
                bank.read(r_cidcfgr(5)),
                CIDCFGR_CFEN | (1 << rif::CIDCFGR_SCID_SHIFT)
            );
        });
        assert_eq!(pwr.set_config(&[13]), Err(Error::BadParameters));
        assert_eq!(pwr.set_config(&[1, 2]), Err(Error::BadParameters));
    }

    #[test]
    fn rejects_tables_of_the_wrong_shape() {
        let pwr = make_pwr(true);
        let table = ConfigTable::new(7).unwrap();
        assert_eq!(pwr.apply(&table), Err(Error::BadParameters));
    }
}
