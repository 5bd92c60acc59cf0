// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Power-transition hooks for the isolation engines.

use crate::error::Result;
use bitflags::bitflags;

bitflags! {
    /// What the upcoming or completed power transition costs.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct PmHint: u32 {
        /// Register context is lost across the transition.
        const CONTEXT_LOST = 1 << 0;
        /// Clocks are gated during the transition.
        const CLOCKS_GATED = 1 << 1;
    }
}

/// Drivers whose hardware state must survive power transitions.
///
/// Implementations only act when [`PmHint::CONTEXT_LOST`] is set: when the
/// registers retain their contents there is nothing to save or replay.
pub trait PowerManaged {
    /// Captures hardware state before the transition.
    fn suspend(&self, hint: PmHint) -> Result<()>;

    /// Restores hardware state after the transition.
    fn resume(&self, hint: PmHint) -> Result<()>;
}
