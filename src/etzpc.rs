// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! ETZPC, the legacy TrustZone peripheral controller.
//!
//! Earlier STM32MP parts isolate peripherals with a two-bit DECPROT
//! attribute per peripheral plus an independent lock bit, and protect the
//! head of ROM and SYSRAM with up to two TZMA range filters measured in
//! small pages. There is no compartment or semaphore concept, the model is
//! purely secure versus non-secure versus a coprocessor carve-out.

use crate::error::{Error, Result};
use crate::firewall::{AddressRange, FirewallController, MemoryFirewallController, single_cell};
use crate::mmio::Mmio;
use crate::pm::{PmHint, PowerManaged};
use crate::soc::SocProfile;
use log::debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use spin::mutex::SpinMutex;

const ETZPC_TZMA0_SIZE: usize = 0x000;
const ETZPC_DECPROT0: usize = 0x010;
const ETZPC_DECPROT_LOCK0: usize = 0x030;
const ETZPC_HWCFGR: usize = 0x3f0;
const ETZPC_VERR: usize = 0x3f4;

const TZMA_SIZE_LOCK: u32 = 1 << 31;
const TZMA_SIZE_MASK: u32 = 0x3ff;

const DECPROT_PER_REG: usize = 16;
const DECPROT_ATTR_MASK: u32 = 0x3;
const DECPROT_LOCK_PER_REG: usize = 32;

const HWCFGR_NUM_TZMA_MASK: u32 = 0xff;
const HWCFGR_NUM_PER_SEC_SHIFT: u32 = 8;
const HWCFGR_NUM_AHB_SEC_SHIFT: u32 = 16;

const MAX_DECPROT: usize = 128;
const MAX_TZMA: usize = 4;

/// Query cell: peripheral (or TZMA) index.
pub const CELL_ID_MASK: u32 = 0xff;
/// Query cell: DECPROT attribute field position.
pub const CELL_ATTR_SHIFT: u32 = 8;
/// Query cell: lock the configuration.
pub const CELL_LOCK: u32 = 1 << 10;

/// DECPROT protection attribute of one peripheral.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum DecprotAttr {
    /// Secure read/write only.
    SecureRw = 0,
    /// Non-secure reads, secure writes.
    NonSecureReadSecureWrite = 1,
    /// Carved out for the coprocessor, no application-processor access.
    McuIsolation = 2,
    /// Non-secure read/write.
    NonSecureRw = 3,
}

impl DecprotAttr {
    /// Whether a requester holding `self` as its requested attribute may
    /// use a peripheral currently configured as `current`.
    ///
    /// An MCU-isolated peripheral refuses everything, including matching
    /// secure requests, so that all traffic to it goes through the
    /// coprocessor. Otherwise secure requests are always compatible and
    /// non-secure ones additionally require the peripheral not to be
    /// secure-only.
    fn granted_by(self, current: DecprotAttr) -> bool {
        if current == self {
            return true;
        }
        match self {
            DecprotAttr::SecureRw | DecprotAttr::NonSecureReadSecureWrite => {
                current != DecprotAttr::McuIsolation
            }
            DecprotAttr::NonSecureRw => {
                current != DecprotAttr::McuIsolation && current != DecprotAttr::SecureRw
            }
            DecprotAttr::McuIsolation => false,
        }
    }
}

/// Decoded form of one ETZPC query cell: bits 7:0 index, bits 9:8 DECPROT
/// attribute, bit 10 lock.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QueryCell {
    /// Peripheral index, or TZMA index for memory queries.
    pub id: u8,
    /// Requested or configured attribute.
    pub attr: DecprotAttr,
    /// Lock the configuration after applying it.
    pub lock: bool,
}

impl QueryCell {
    /// Decodes a query cell.
    pub fn parse(cell: u32) -> Result<Self> {
        Ok(Self {
            id: (cell & CELL_ID_MASK) as u8,
            attr: DecprotAttr::try_from(((cell >> CELL_ATTR_SHIFT) & DECPROT_ATTR_MASK) as u8)
                .map_err(|_| Error::BadParameters)?,
            lock: cell & CELL_LOCK != 0,
        })
    }

    /// Re-encodes the query as a cell. Inverse of [`parse`].
    ///
    /// [`parse`]: Self::parse
    pub fn to_cell(&self) -> u32 {
        let mut cell = u32::from(self.id);
        cell |= u32::from(u8::from(self.attr)) << CELL_ATTR_SHIFT;
        if self.lock {
            cell |= CELL_LOCK;
        }
        cell
    }
}

struct Inner<M> {
    bank: M,
    /// PM shadow, one byte per DECPROT: attribute in bits 1:0, lock in
    /// bit 7.
    decprot_shadow: [u8; MAX_DECPROT],
    /// PM shadow, one halfword per TZMA: page count in bits 9:0, lock in
    /// bit 15.
    tzma_shadow: [u16; MAX_TZMA],
}

/// The ETZPC engine.
pub struct Etzpc<M: Mmio> {
    inner: SpinMutex<Inner<M>>,
    profile: &'static SocProfile,
    num_tzma: u32,
    num_decprot: u32,
}

impl<M: Mmio> Etzpc<M> {
    /// Creates the engine over a mapped ETZPC register bank.
    pub fn new(bank: M, profile: &'static SocProfile) -> Result<Self> {
        let hwcfgr = bank.read(ETZPC_HWCFGR);
        let num_tzma = (hwcfgr & HWCFGR_NUM_TZMA_MASK).min(profile.tzma_regions.len() as u32);
        let num_decprot = (hwcfgr >> HWCFGR_NUM_PER_SEC_SHIFT) & 0xff;
        let num_ahb = (hwcfgr >> HWCFGR_NUM_AHB_SEC_SHIFT) & 0xff;
        let verr = bank.read(ETZPC_VERR);

        if num_decprot == 0 || num_decprot as usize > MAX_DECPROT || num_tzma as usize > MAX_TZMA {
            return Err(Error::NotSupported);
        }

        debug!(
            "ETZPC {} version {}.{}: {} peripherals, {} AHB masters, {} TZMA",
            profile.name,
            (verr >> 4) & 0xf,
            verr & 0xf,
            num_decprot,
            num_ahb,
            num_tzma,
        );

        Ok(Self {
            inner: SpinMutex::new(Inner {
                bank,
                decprot_shadow: [0; MAX_DECPROT],
                tzma_shadow: [0; MAX_TZMA],
            }),
            profile,
            num_tzma,
            num_decprot,
        })
    }

    fn decprot_offset(id: usize) -> (usize, u32) {
        let shift = 2 * (id % DECPROT_PER_REG) as u32;
        (ETZPC_DECPROT0 + 4 * (id / DECPROT_PER_REG), shift)
    }

    fn read_decprot(inner: &Inner<M>, id: usize) -> DecprotAttr {
        let (offset, shift) = Self::decprot_offset(id);
        let raw = (inner.bank.read(offset) >> shift) & DECPROT_ATTR_MASK;
        // The field is two bits wide, every value is a valid attribute.
        DecprotAttr::try_from(raw as u8).unwrap()
    }

    fn write_decprot(inner: &mut Inner<M>, id: usize, attr: DecprotAttr) {
        let (offset, shift) = Self::decprot_offset(id);
        inner.bank.clear_set_bits(
            offset,
            DECPROT_ATTR_MASK << shift,
            u32::from(u8::from(attr)) << shift,
        );
    }

    fn decprot_locked(inner: &Inner<M>, id: usize) -> bool {
        let offset = ETZPC_DECPROT_LOCK0 + 4 * (id / DECPROT_LOCK_PER_REG);
        inner.bank.read(offset) & (1 << (id % DECPROT_LOCK_PER_REG)) != 0
    }

    fn check_id(&self, id: u32) -> Result<()> {
        if id >= self.num_decprot {
            return Err(Error::BadParameters);
        }
        Ok(())
    }

    /// Reads the current DECPROT attribute of peripheral `id`.
    pub fn decprot(&self, id: u32) -> Result<DecprotAttr> {
        self.check_id(id)?;
        Ok(Self::read_decprot(&self.inner.lock(), id as usize))
    }

    /// Sets the DECPROT attribute of peripheral `id`.
    ///
    /// A locked peripheral accepts its current attribute as a no-op and
    /// denies anything else.
    pub fn configure_decprot(&self, id: u32, attr: DecprotAttr) -> Result<()> {
        self.check_id(id)?;
        let mut inner = self.inner.lock();
        if Self::decprot_locked(&inner, id as usize) {
            if Self::read_decprot(&inner, id as usize) == attr {
                return Ok(());
            }
            return Err(Error::AccessDenied);
        }
        Self::write_decprot(&mut inner, id as usize, attr);
        Ok(())
    }

    /// Locks the DECPROT attribute of peripheral `id` until reset.
    pub fn lock_decprot(&self, id: u32) -> Result<()> {
        self.check_id(id)?;
        let mut inner = self.inner.lock();
        let offset = ETZPC_DECPROT_LOCK0 + 4 * (id as usize / DECPROT_LOCK_PER_REG);
        inner
            .bank
            .set_bits(offset, 1 << (id as usize % DECPROT_LOCK_PER_REG));
        Ok(())
    }

    /// Returns whether peripheral `id` has its lock bit set.
    pub fn is_decprot_locked(&self, id: u32) -> Result<bool> {
        self.check_id(id)?;
        Ok(Self::decprot_locked(&self.inner.lock(), id as usize))
    }

    /// Returns whether the non-secure world may use peripheral `id`.
    pub fn check_ns_access(&self, id: u32) -> Result<()> {
        self.check_id(id)?;
        let current = Self::read_decprot(&self.inner.lock(), id as usize);
        if DecprotAttr::NonSecureRw.granted_by(current) {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }

    fn check_tzma_id(&self, id: u32) -> Result<&'static crate::soc::TzmaRegion> {
        if id >= self.num_tzma {
            return Err(Error::BadParameters);
        }
        Ok(&self.profile.tzma_regions[id as usize])
    }

    fn tzma_offset(id: u32) -> usize {
        ETZPC_TZMA0_SIZE + 4 * id as usize
    }

    /// Sets the secure page count of TZMA `id`, protecting the first
    /// `page_count` pages of its backing memory.
    ///
    /// Like DECPROT, a locked TZMA accepts its current page count as a
    /// no-op and denies anything else.
    pub fn configure_tzma(&self, id: u32, page_count: u32) -> Result<()> {
        let region = self.check_tzma_id(id)?;
        if u64::from(page_count) * region.page_size > region.backing.len
            || page_count & !TZMA_SIZE_MASK != 0
        {
            return Err(Error::BadParameters);
        }

        let mut inner = self.inner.lock();
        let offset = Self::tzma_offset(id);
        let current = inner.bank.read(offset);
        if current & TZMA_SIZE_LOCK != 0 {
            if current & TZMA_SIZE_MASK == page_count {
                return Ok(());
            }
            return Err(Error::AccessDenied);
        }
        inner
            .bank
            .clear_set_bits(offset, TZMA_SIZE_MASK, page_count);
        Ok(())
    }

    /// Locks the page count of TZMA `id` until reset.
    pub fn lock_tzma(&self, id: u32) -> Result<()> {
        self.check_tzma_id(id)?;
        let mut inner = self.inner.lock();
        inner.bank.set_bits(Self::tzma_offset(id), TZMA_SIZE_LOCK);
        Ok(())
    }

    /// Returns whether TZMA `id` has its lock bit set.
    pub fn is_tzma_locked(&self, id: u32) -> Result<bool> {
        self.check_tzma_id(id)?;
        Ok(self.inner.lock().bank.read(Self::tzma_offset(id)) & TZMA_SIZE_LOCK != 0)
    }

    /// The range TZMA `id` currently protects.
    fn tzma_secure_prefix(&self, id: u32) -> Result<Option<AddressRange>> {
        let region = self.check_tzma_id(id)?;
        let pages = self.inner.lock().bank.read(Self::tzma_offset(id)) & TZMA_SIZE_MASK;
        if pages == 0 {
            return Ok(None);
        }
        Ok(Some(AddressRange {
            base: region.backing.base,
            len: u64::from(pages) * region.page_size,
        }))
    }

    fn tzma_for_range(&self, range: AddressRange) -> Result<u32> {
        for id in 0..self.num_tzma {
            if self.profile.tzma_regions[id as usize].backing.contains(&range) {
                return Ok(id);
            }
        }
        Err(Error::ItemNotFound)
    }

    #[cfg(any(test, feature = "fakes"))]
    /// Runs `f` over the underlying register bank. Test-only escape hatch.
    pub fn with_bank<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.inner.lock().bank)
    }
}

impl<M: Mmio> FirewallController for Etzpc<M> {
    fn set_config(&self, args: &[u32]) -> Result<()> {
        let query = QueryCell::parse(single_cell(args)?)?;
        self.configure_decprot(u32::from(query.id), query.attr)?;
        if query.lock {
            self.lock_decprot(u32::from(query.id))?;
        }
        Ok(())
    }

    fn check_access(&self, args: &[u32]) -> Result<()> {
        let query = QueryCell::parse(single_cell(args)?)?;
        self.check_id(u32::from(query.id))?;
        let current = Self::read_decprot(&self.inner.lock(), query.id as usize);
        if query.attr.granted_by(current) {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }

    /// The secure world can claim a peripheral it may write to, so only
    /// secure-writable attributes qualify.
    fn acquire_access(&self, args: &[u32]) -> Result<()> {
        let query = QueryCell::parse(single_cell(args)?)?;
        self.check_id(u32::from(query.id))?;
        match Self::read_decprot(&self.inner.lock(), query.id as usize) {
            DecprotAttr::SecureRw | DecprotAttr::NonSecureReadSecureWrite => Ok(()),
            _ => Err(Error::AccessDenied),
        }
    }

    /// There is nothing to give back, the ETZPC has no arbitration.
    fn release_access(&self, _args: &[u32]) -> Result<()> {
        Ok(())
    }
}

impl<M: Mmio> MemoryFirewallController for Etzpc<M> {
    /// Checks that `range` lies inside a TZMA's currently secured prefix.
    fn check_memory_access(&self, range: AddressRange, args: &[u32]) -> Result<()> {
        single_cell(args)?;
        let id = self.tzma_for_range(range)?;
        match self.tzma_secure_prefix(id)? {
            Some(prefix) if prefix.contains(&range) => Ok(()),
            _ => Err(Error::AccessDenied),
        }
    }

    fn acquire_memory_access(&self, range: AddressRange, args: &[u32]) -> Result<()> {
        self.check_memory_access(range, args)
    }

    /// Reprograms the secured prefix of the TZMA backing `range`. The
    /// range must start at the TZMA's base and span whole pages.
    fn set_memory_config(&self, range: AddressRange, args: &[u32]) -> Result<()> {
        single_cell(args)?;
        let id = self.tzma_for_range(range)?;
        let region = self.check_tzma_id(id)?;
        if range.base != region.backing.base || range.len % region.page_size != 0 {
            return Err(Error::BadParameters);
        }
        self.configure_tzma(id, (range.len / region.page_size) as u32)
    }
}

impl<M: Mmio> PowerManaged for Etzpc<M> {
    /// Packs every DECPROT attribute-plus-lock and TZMA size-plus-lock
    /// into the compact shadow words.
    fn suspend(&self, hint: PmHint) -> Result<()> {
        if !hint.contains(PmHint::CONTEXT_LOST) {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        for id in 0..self.num_decprot as usize {
            let mut word = u8::from(Self::read_decprot(&inner, id));
            if Self::decprot_locked(&inner, id) {
                word |= 1 << 7;
            }
            inner.decprot_shadow[id] = word;
        }
        for id in 0..self.num_tzma {
            let size = inner.bank.read(Self::tzma_offset(id));
            let mut word = (size & TZMA_SIZE_MASK) as u16;
            if size & TZMA_SIZE_LOCK != 0 {
                word |= 1 << 15;
            }
            inner.tzma_shadow[id as usize] = word;
        }
        Ok(())
    }

    /// Replays the shadow, attributes first and lock bits last since the
    /// hardware lock state was lost with the rest of the context.
    fn resume(&self, hint: PmHint) -> Result<()> {
        if !hint.contains(PmHint::CONTEXT_LOST) {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        for id in 0..self.num_decprot as usize {
            let word = inner.decprot_shadow[id];
            let attr = DecprotAttr::try_from(word & DECPROT_ATTR_MASK as u8)
                .map_err(|_| Error::BadParameters)?;
            Self::write_decprot(&mut inner, id, attr);
            if word & (1 << 7) != 0 {
                let offset = ETZPC_DECPROT_LOCK0 + 4 * (id / DECPROT_LOCK_PER_REG);
                inner.bank.set_bits(offset, 1 << (id % DECPROT_LOCK_PER_REG));
            }
        }
        for id in 0..self.num_tzma {
            let word = inner.tzma_shadow[id as usize];
            let offset = Self::tzma_offset(id);
            inner
                .bank
                .clear_set_bits(offset, TZMA_SIZE_MASK, u32::from(word) & TZMA_SIZE_MASK);
            if word & (1 << 15) != 0 {
                inner.bank.set_bits(offset, TZMA_SIZE_LOCK);
            }
        }
        Ok(())
    }
}
