// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Controller-facing firewall interfaces.
//!
//! Consumers of protected peripherals and memory do not talk to the engine
//! types directly: they carry opaque 32-bit query cells (usually lifted
//! from firmware configuration) and hand them to whichever controller
//! guards the resource through these traits.

use crate::error::Result;

/// A physical address range, as `{base, len}` with `len > 0`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressRange {
    /// First byte of the range.
    pub base: u64,
    /// Length in bytes.
    pub len: u64,
}

impl AddressRange {
    /// Last byte of the range.
    pub const fn end(&self) -> u64 {
        self.base + (self.len - 1)
    }

    /// Returns whether `other` lies entirely inside this range.
    pub const fn contains(&self, other: &AddressRange) -> bool {
        other.base >= self.base && other.end() <= self.end()
    }

    /// Returns whether the two ranges share at least one byte.
    pub const fn intersects(&self, other: &AddressRange) -> bool {
        self.base <= other.end() && other.base <= self.end()
    }
}

/// A firewall guarding peripherals addressed by resource index.
///
/// Queries are slices of raw configuration cells; every operation here
/// expects exactly one cell and fails with
/// [`BadParameters`](crate::Error::BadParameters) otherwise. The cell
/// layouts are controller specific ([`rif::ResourceConfig`] for RIF
/// controllers, [`etzpc::QueryCell`] for the ETZPC).
///
/// [`rif::ResourceConfig`]: crate::rif::ResourceConfig
/// [`etzpc::QueryCell`]: crate::etzpc::QueryCell
pub trait FirewallController {
    /// Applies the configuration described by `args` to the resource it
    /// names.
    fn set_config(&self, args: &[u32]) -> Result<()>;

    /// Checks that an access with the attributes in `args` would be granted,
    /// without touching hardware state.
    fn check_access(&self, args: &[u32]) -> Result<()>;

    /// Claims the resource named by `args` for the owner compartment,
    /// taking its semaphore when it is arbitrated.
    fn acquire_access(&self, args: &[u32]) -> Result<()>;

    /// Returns a previously acquired resource.
    fn release_access(&self, args: &[u32]) -> Result<()>;
}

/// A firewall guarding memory addressed by physical range.
pub trait MemoryFirewallController {
    /// Checks that the protection described by `args` holds over `range`.
    fn check_memory_access(&self, range: AddressRange, args: &[u32]) -> Result<()>;

    /// Verifies the owner compartment can use `range` with the access modes
    /// requested in `args`.
    fn acquire_memory_access(&self, range: AddressRange, args: &[u32]) -> Result<()>;

    /// Reconfigures the protection of `range` as described by `args`.
    fn set_memory_config(&self, range: AddressRange, args: &[u32]) -> Result<()>;
}

/// Fails unless a query carries exactly one cell.
pub(crate) fn single_cell(args: &[u32]) -> Result<u32> {
    match args {
        [cell] => Ok(*cell),
        _ => Err(crate::Error::BadParameters),
    }
}
