// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Accumulation of resource cells into a register-shaped configuration image.

use crate::error::{Error, Result};
use crate::rif::ResourceConfig;
use arrayvec::ArrayVec;

/// Resources covered by one sec/priv/lock configuration register.
pub const RESOURCES_PER_WORD: usize = 32;

/// Largest resource count any supported controller exposes.
pub const MAX_RESOURCES: usize = 192;

const MAX_MASK_WORDS: usize = MAX_RESOURCES / RESOURCES_PER_WORD;

/// Register image of a controller's per-resource configuration.
///
/// Controllers pack the secure, privileged and lock attributes as one bit
/// per resource in 32-bit registers, while the CID filtering word is per
/// resource. The table mirrors that layout so engines can write whole
/// registers, and tracks in `access_mask` which resources the caller
/// actually configured.
#[derive(Debug)]
pub struct ConfigTable {
    resource_count: usize,
    access_mask: ArrayVec<u32, MAX_MASK_WORDS>,
    sec: ArrayVec<u32, MAX_MASK_WORDS>,
    privilege: ArrayVec<u32, MAX_MASK_WORDS>,
    lock: ArrayVec<u32, MAX_MASK_WORDS>,
    cid: ArrayVec<u32, MAX_RESOURCES>,
}

impl ConfigTable {
    /// Creates an empty table for a controller with `resource_count`
    /// resources.
    pub fn new(resource_count: usize) -> Result<Self> {
        if resource_count == 0 || resource_count > MAX_RESOURCES {
            return Err(Error::OutOfMemory);
        }

        let words = resource_count.div_ceil(RESOURCES_PER_WORD);
        let mut table = Self {
            resource_count,
            access_mask: ArrayVec::new(),
            sec: ArrayVec::new(),
            privilege: ArrayVec::new(),
            lock: ArrayVec::new(),
            cid: ArrayVec::new(),
        };
        for _ in 0..words {
            table.access_mask.push(0);
            table.sec.push(0);
            table.privilege.push(0);
            table.lock.push(0);
        }
        for _ in 0..resource_count {
            table.cid.push(0);
        }
        Ok(table)
    }

    /// Number of resources the table describes.
    pub fn resource_count(&self) -> usize {
        self.resource_count
    }

    /// Number of 32-bit mask words backing the one-bit-per-resource fields.
    pub fn mask_words(&self) -> usize {
        self.access_mask.len()
    }

    /// Decodes `cells` and merges them into the table.
    pub fn accumulate(&mut self, cells: &[u32]) -> Result<()> {
        for &cell in cells {
            let config = ResourceConfig::parse(cell, self.resource_count as u32);
            self.add(&config);
        }
        Ok(())
    }

    /// Merges one decoded resource configuration into the table.
    pub fn add(&mut self, config: &ResourceConfig) {
        let id = config.id as usize;
        let word = id / RESOURCES_PER_WORD;
        let bit = 1 << (id % RESOURCES_PER_WORD);

        set_bit(&mut self.sec[word], bit, config.secure);
        set_bit(&mut self.privilege[word], bit, config.privileged);
        set_bit(&mut self.lock[word], bit, config.lock);
        self.cid[id] = config.cidcfgr();
        self.access_mask[word] |= bit;
    }

    /// Returns whether resource `id` was configured by the caller.
    pub fn is_configured(&self, id: usize) -> bool {
        self.bit(&self.access_mask, id)
    }

    /// Secure attribute of resource `id`.
    pub fn secure(&self, id: usize) -> bool {
        self.bit(&self.sec, id)
    }

    /// Privileged attribute of resource `id`.
    pub fn privileged(&self, id: usize) -> bool {
        self.bit(&self.privilege, id)
    }

    /// Lock attribute of resource `id`.
    pub fn locked(&self, id: usize) -> bool {
        self.bit(&self.lock, id)
    }

    /// CIDCFGR word to program for resource `id`.
    pub fn cidcfgr(&self, id: usize) -> u32 {
        self.cid[id]
    }

    /// Mask word `index` of the configured-resource bits.
    pub fn access_mask_word(&self, index: usize) -> u32 {
        self.access_mask[index]
    }

    /// Mask word `index` of the secure bits.
    pub fn sec_word(&self, index: usize) -> u32 {
        self.sec[index]
    }

    /// Mask word `index` of the privileged bits.
    pub fn priv_word(&self, index: usize) -> u32 {
        self.privilege[index]
    }

    fn bit(&self, words: &ArrayVec<u32, MAX_MASK_WORDS>, id: usize) -> bool {
        assert!(id < self.resource_count);
        words[id / RESOURCES_PER_WORD] & (1 << (id % RESOURCES_PER_WORD)) != 0
    }
}

fn set_bit(word: &mut u32, bit: u32, value: bool) {
    if value {
        *word |= bit;
    } else {
        *word &= !bit;
    }
}
