// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! RIF primitives shared by every CID-filtering hardware block.
//!
//! All RIF-aware IPs expose the same two registers per filterable resource:
//! CIDCFGR selects the filtering mode (off, static CID, or semaphore with a
//! whitelist) and SEMCR arbitrates shared resources. The helpers here
//! implement the access decision table and the semaphore handshake once, on
//! top of [`Mmio`], so the per-controller engines only deal with their own
//! register layout.

use crate::error::{Error, Result};
use crate::mmio::Mmio;

/// Highest compartment ID the RIF architecture defines.
pub const MAX_CID_SUPPORTED: u32 = 7;

/// CIDCFGR: CID filtering enable.
pub const CIDCFGR_CFEN: u32 = 1 << 0;
/// CIDCFGR: semaphore mode enable.
pub const CIDCFGR_SEMEN: u32 = 1 << 1;
/// CIDCFGR: static CID field position.
pub const CIDCFGR_SCID_SHIFT: u32 = 4;
/// CIDCFGR: first bit of the semaphore whitelist.
pub const CIDCFGR_SEMWL_SHIFT: u32 = 16;

/// SEMCR: semaphore mutex bit.
pub const SEMCR_MUTEX: u32 = 1 << 0;
/// SEMCR: holder CID field position.
pub const SEMCR_SEMCID_SHIFT: u32 = 4;
/// SEMCR: holder CID field mask.
pub const SEMCR_SEMCID_MASK: u32 = 0x7 << SEMCR_SEMCID_SHIFT;

/// A RIF compartment ID.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Cid(u8);

impl Cid {
    /// The compartment this firmware executes in, by convention the secure
    /// application processor.
    pub const OWNER: Cid = Cid(1);

    /// Creates a CID, rejecting values outside the architectural range.
    pub const fn new(cid: u32) -> Result<Self> {
        if cid <= MAX_CID_SUPPORTED {
            Ok(Self(cid as u8))
        } else {
            Err(Error::BadParameters)
        }
    }

    /// The raw CID value.
    pub const fn get(self) -> u32 {
        self.0 as u32
    }

    /// This CID's bit in a CIDCFGR semaphore whitelist.
    pub const fn semwl_bit(self) -> u32 {
        1 << (CIDCFGR_SEMWL_SHIFT + self.0 as u32)
    }
}

/// SCID field mask for an IP supporting `cid_count` compartments.
///
/// The field is only as wide as needed for the IP's compartment count, so
/// comparisons must not look at bits above it.
pub(crate) const fn scid_mask(cid_count: u32) -> u32 {
    let msb = 31 - (cid_count | 1).leading_zeros();
    assert!(msb < 3);
    ((1 << (msb + 1)) - 1) << CIDCFGR_SCID_SHIFT
}

fn semcid(semcr: u32, cid_count: u32) -> u32 {
    (semcr & scid_mask(cid_count)) >> CIDCFGR_SCID_SHIFT
}

/// Returns whether static CID filtering in `cidcfgr` selects `cid`.
pub fn static_cid_grants(cidcfgr: u32, cid_count: u32, cid: Cid) -> bool {
    (cidcfgr & scid_mask(cid_count)) == (cid.get() << CIDCFGR_SCID_SHIFT)
        && cidcfgr & CIDCFGR_SEMEN == 0
}

/// Returns whether `cidcfgr` is in semaphore mode with `cid` whitelisted.
pub fn semaphore_mode_grants(cidcfgr: u32, cid: Cid) -> bool {
    cidcfgr & CIDCFGR_CFEN != 0
        && cidcfgr & CIDCFGR_SEMEN != 0
        && cidcfgr & cid.semwl_bit() != 0
}

/// Returns whether `cidcfgr` describes a semaphore the owner compartment can
/// never hold: filtering or semaphore mode off, or the owner not whitelisted.
pub fn semaphore_mode_incorrect(cidcfgr: u32) -> bool {
    cidcfgr & CIDCFGR_CFEN == 0
        || cidcfgr & CIDCFGR_SEMEN == 0
        || cidcfgr & Cid::OWNER.semwl_bit() == 0
}

/// Decides whether compartment `cid` may access a resource whose filtering
/// registers read `cidcfgr` and `semcr`.
///
/// Access is granted when filtering is disabled, when static filtering
/// selects `cid`, or when semaphore mode whitelists `cid` and the semaphore
/// is free or already held by `cid`.
pub fn check_access(cidcfgr: u32, semcr: u32, cid_count: u32, cid: Cid) -> Result<()> {
    if cidcfgr & CIDCFGR_CFEN == 0 {
        return Ok(());
    }

    if static_cid_grants(cidcfgr, cid_count, cid) {
        return Ok(());
    }

    if semaphore_mode_grants(cidcfgr, cid)
        && (semcr & SEMCR_MUTEX == 0 || semcid(semcr, cid_count) == cid.get())
    {
        return Ok(());
    }

    Err(Error::AccessDenied)
}

/// Returns whether the semaphore at `offset` is not currently taken.
pub fn is_semaphore_available(bank: &impl Mmio, offset: usize) -> bool {
    bank.read(offset) & SEMCR_MUTEX == 0
}

/// Takes the semaphore at `offset` for the owner compartment.
///
/// The hardware arbitrates concurrent take attempts, so the register is read
/// back after the write; the claim only stands if the semaphore is now taken
/// and held by the owner.
pub fn acquire_semaphore(bank: &mut impl Mmio, offset: usize, cid_count: u32) -> Result<()> {
    bank.set_bits(offset, SEMCR_MUTEX);

    let semcr = bank.read(offset);
    if semcr & SEMCR_MUTEX == 0 || semcid(semcr, cid_count) != Cid::OWNER.get() {
        return Err(Error::AccessDenied);
    }

    Ok(())
}

/// Releases the semaphore at `offset` if the owner compartment holds it.
///
/// Releasing a free semaphore is a no-op. After the clearing write the
/// register is read back: another compartment re-taking the semaphore
/// immediately is a legitimate race, only the owner still appearing as
/// holder means the release failed.
pub fn release_semaphore(bank: &mut impl Mmio, offset: usize, cid_count: u32) -> Result<()> {
    if is_semaphore_available(bank, offset) {
        return Ok(());
    }

    bank.clear_bits(offset, SEMCR_MUTEX);

    let semcr = bank.read(offset);
    if semcr & SEMCR_MUTEX != 0 && semcid(semcr, cid_count) == Cid::OWNER.get() {
        return Err(Error::AccessDenied);
    }

    Ok(())
}

/// Resource cell: resource index.
pub const CELL_ID_MASK: u32 = 0xff;
/// Resource cell: CID filtering enable.
pub const CELL_CFEN: u32 = 1 << 8;
/// Resource cell: semaphore mode enable.
pub const CELL_SEMEN: u32 = 1 << 9;
/// Resource cell: static CID field position.
pub const CELL_SCID_SHIFT: u32 = 12;
/// Resource cell: static CID field mask.
pub const CELL_SCID_MASK: u32 = 0x7 << CELL_SCID_SHIFT;
/// Resource cell: semaphore whitelist field position.
pub const CELL_SEMWL_SHIFT: u32 = 16;
/// Resource cell: semaphore whitelist field mask.
pub const CELL_SEMWL_MASK: u32 = 0xff << CELL_SEMWL_SHIFT;
/// Resource cell: privileged-only access.
pub const CELL_PRIV: u32 = 1 << 29;
/// Resource cell: secure-only access.
pub const CELL_SEC: u32 = 1 << 30;
/// Resource cell: lock the configuration.
pub const CELL_LOCK: u32 = 1 << 31;

/// Decoded form of one 32-bit resource-configuration cell.
///
/// Cell layout, shared by every peripheral-class controller:
///
/// | bits  | field                               |
/// |-------|-------------------------------------|
/// | 7:0   | resource index                      |
/// | 8     | CID filtering enable                |
/// | 9     | semaphore mode enable               |
/// | 14:12 | static CID                          |
/// | 23:16 | semaphore whitelist, one bit per CID|
/// | 29    | privileged-only                     |
/// | 30    | secure-only                         |
/// | 31    | lock the configuration              |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResourceConfig {
    /// Resource index within the controller.
    pub id: u8,
    /// CID filtering enabled.
    pub cid_filtering: bool,
    /// Semaphore mode enabled.
    pub semaphore: bool,
    /// Static compartment granted access when semaphore mode is off.
    pub scid: Cid,
    /// Semaphore whitelist, one bit per CID.
    pub semwl: u8,
    /// Resource reserved to secure accesses.
    pub secure: bool,
    /// Resource reserved to privileged accesses.
    pub privileged: bool,
    /// Lock the configuration until the next reset.
    pub lock: bool,
}

impl ResourceConfig {
    /// Decodes a configuration cell.
    ///
    /// Panics if the resource index is not below `resource_count`: a bad
    /// index in a static configuration table is a build defect, not a
    /// runtime condition.
    pub fn parse(cell: u32, resource_count: u32) -> Self {
        let id = cell & CELL_ID_MASK;
        assert!(
            id < resource_count,
            "resource index {id} out of range (max {resource_count})"
        );

        let scid = (cell & CELL_SCID_MASK) >> CELL_SCID_SHIFT;
        Self {
            id: id as u8,
            cid_filtering: cell & CELL_CFEN != 0,
            semaphore: cell & CELL_SEMEN != 0,
            // The field cannot exceed MAX_CID_SUPPORTED, it is 3 bits wide.
            scid: Cid(scid as u8),
            semwl: ((cell & CELL_SEMWL_MASK) >> CELL_SEMWL_SHIFT) as u8,
            secure: cell & CELL_SEC != 0,
            privileged: cell & CELL_PRIV != 0,
            lock: cell & CELL_LOCK != 0,
        }
    }

    /// Re-encodes the configuration as a cell. Inverse of [`parse`].
    ///
    /// [`parse`]: Self::parse
    pub fn to_cell(&self) -> u32 {
        let mut cell = self.id as u32;
        if self.cid_filtering {
            cell |= CELL_CFEN;
        }
        if self.semaphore {
            cell |= CELL_SEMEN;
        }
        cell |= self.scid.get() << CELL_SCID_SHIFT;
        cell |= (self.semwl as u32) << CELL_SEMWL_SHIFT;
        if self.privileged {
            cell |= CELL_PRIV;
        }
        if self.secure {
            cell |= CELL_SEC;
        }
        if self.lock {
            cell |= CELL_LOCK;
        }
        cell
    }

    /// The CIDCFGR word this configuration programs into the hardware.
    pub fn cidcfgr(&self) -> u32 {
        let mut word = 0;
        if self.cid_filtering {
            word |= CIDCFGR_CFEN;
        }
        if self.semaphore {
            word |= CIDCFGR_SEMEN;
        }
        word |= self.scid.get() << CIDCFGR_SCID_SHIFT;
        word |= (self.semwl as u32) << CIDCFGR_SEMWL_SHIFT;
        word
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmio::FakeBank;

    const SEM: usize = 0x0;

    fn sem_bank() -> FakeBank<4> {
        FakeBank::new(|offset| offset == SEM)
    }

    #[test]
    fn filtering_disabled_grants_all() {
        for cid in 0..=MAX_CID_SUPPORTED {
            let cid = Cid::new(cid).unwrap();
            assert_eq!(check_access(0, 0, MAX_CID_SUPPORTED, cid), Ok(()));
        }
    }

    #[test]
    fn static_mode_grants_only_selected_cid() {
        let cidcfgr = CIDCFGR_CFEN | (2 << CIDCFGR_SCID_SHIFT);
        assert_eq!(
            check_access(cidcfgr, 0, MAX_CID_SUPPORTED, Cid::new(2).unwrap()),
            Ok(())
        );
        assert_eq!(
            check_access(cidcfgr, 0, MAX_CID_SUPPORTED, Cid::OWNER),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn static_match_with_semaphore_mode_does_not_grant() {
        let cidcfgr = CIDCFGR_CFEN | CIDCFGR_SEMEN | (2 << CIDCFGR_SCID_SHIFT);
        assert_eq!(
            check_access(cidcfgr, 0, MAX_CID_SUPPORTED, Cid::new(2).unwrap()),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn semaphore_mode_respects_whitelist_and_holder() {
        let cidcfgr = CIDCFGR_CFEN | CIDCFGR_SEMEN | Cid::OWNER.semwl_bit();

        // Free semaphore, whitelisted.
        assert_eq!(
            check_access(cidcfgr, 0, MAX_CID_SUPPORTED, Cid::OWNER),
            Ok(())
        );

        // Held by the queried CID.
        let semcr = SEMCR_MUTEX | (1 << SEMCR_SEMCID_SHIFT);
        assert_eq!(
            check_access(cidcfgr, semcr, MAX_CID_SUPPORTED, Cid::OWNER),
            Ok(())
        );

        // Held by another compartment.
        let semcr = SEMCR_MUTEX | (2 << SEMCR_SEMCID_SHIFT);
        assert_eq!(
            check_access(cidcfgr, semcr, MAX_CID_SUPPORTED, Cid::OWNER),
            Err(Error::AccessDenied)
        );

        // Not whitelisted at all.
        let cidcfgr = CIDCFGR_CFEN | CIDCFGR_SEMEN | (1 << (CIDCFGR_SEMWL_SHIFT + 2));
        assert_eq!(
            check_access(cidcfgr, 0, MAX_CID_SUPPORTED, Cid::OWNER),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn acquire_succeeds_when_free() {
        let mut bank = sem_bank();
        assert!(is_semaphore_available(&bank, SEM));
        assert_eq!(acquire_semaphore(&mut bank, SEM, MAX_CID_SUPPORTED), Ok(()));
        assert!(!is_semaphore_available(&bank, SEM));
        assert_eq!(
            bank.read(SEM),
            SEMCR_MUTEX | (Cid::OWNER.get() << SEMCR_SEMCID_SHIFT)
        );
    }

    #[test]
    fn acquire_fails_when_another_compartment_wins() {
        let mut bank = sem_bank();

        // Compartment 2 takes the semaphore first.
        bank.set_master_cid(2);
        bank.write(SEM, SEMCR_MUTEX);

        bank.set_master_cid(Cid::OWNER.get());
        assert_eq!(
            acquire_semaphore(&mut bank, SEM, MAX_CID_SUPPORTED),
            Err(Error::AccessDenied)
        );
        // The loser must not have disturbed the holder.
        assert_eq!(bank.read(SEM), SEMCR_MUTEX | (2 << SEMCR_SEMCID_SHIFT));
    }

    #[test]
    fn release_of_free_semaphore_is_a_noop() {
        let mut bank = sem_bank();
        assert_eq!(release_semaphore(&mut bank, SEM, MAX_CID_SUPPORTED), Ok(()));
    }

    #[test]
    fn release_after_acquire_frees_the_semaphore() {
        let mut bank = sem_bank();
        acquire_semaphore(&mut bank, SEM, MAX_CID_SUPPORTED).unwrap();
        assert_eq!(release_semaphore(&mut bank, SEM, MAX_CID_SUPPORTED), Ok(()));
        assert!(is_semaphore_available(&bank, SEM));
    }

    #[test]
    fn release_tolerates_a_foreign_holder() {
        let mut bank = sem_bank();
        bank.set_master_cid(4);
        bank.write(SEM, SEMCR_MUTEX);

        // The owner's clear is ignored by the hardware, the semaphore stays
        // with compartment 4. That is not a failed release.
        bank.set_master_cid(Cid::OWNER.get());
        assert_eq!(release_semaphore(&mut bank, SEM, MAX_CID_SUPPORTED), Ok(()));
        assert_eq!(bank.read(SEM), SEMCR_MUTEX | (4 << SEMCR_SEMCID_SHIFT));
    }

    #[test]
    fn cell_round_trip() {
        let cell = 0x4007_3205;
        let config = ResourceConfig::parse(cell, 128);
        assert_eq!(config.id, 5);
        assert!(!config.cid_filtering);
        assert!(config.semaphore);
        assert_eq!(config.scid.get(), 3);
        assert_eq!(config.semwl, 0x07);
        assert!(config.secure);
        assert!(!config.privileged);
        assert!(!config.lock);
        assert_eq!(config.to_cell(), cell);
    }

    #[test]
    fn cell_cidcfgr_word() {
        let cell = (1 << 8) | (1 << 9) | (2 << 12) | (0x06 << 16) | 7;
        let config = ResourceConfig::parse(cell, 128);
        assert_eq!(
            config.cidcfgr(),
            CIDCFGR_CFEN | CIDCFGR_SEMEN | (2 << CIDCFGR_SCID_SHIFT) | (0x06 << CIDCFGR_SEMWL_SHIFT)
        );
    }

    #[test]
    #[should_panic]
    fn out_of_range_resource_index_panics() {
        ResourceConfig::parse(130, 128);
    }

    #[test]
    fn scid_mask_tracks_cid_count() {
        assert_eq!(scid_mask(7), 0x7 << CIDCFGR_SCID_SHIFT);
        assert_eq!(scid_mask(3), 0x3 << CIDCFGR_SCID_SHIFT);
        assert_eq!(scid_mask(1), 0x1 << CIDCFGR_SCID_SHIFT);
    }
}
