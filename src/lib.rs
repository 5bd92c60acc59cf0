// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Resource isolation and access arbitration for STM32MP platforms.
//!
//! The crate drives the hardware blocks that partition an STM32MP SoC into
//! compartments identified by a CID (compartment ID):
//!
//! - RIFSC, the peripheral isolation controller (RISUP peripheral slots,
//!   RIMU bus-master attributes, RISAL address-range filters);
//! - RISAF, the memory firewall guarding DDR and similar address spaces;
//! - ETZPC, the legacy peripheral firewall of older parts;
//! - the RIF-aware part of the PWR block (wake-up IO arbitration).
//!
//! Shared resources are arbitrated through hardware semaphores: a
//! compartment claims a resource by setting the semaphore mutex, and the
//! hardware latches the winner's CID. This crate always acts as CID 1, the
//! secure application processor compartment.
//!
//! Device-tree decoding is out of scope. Callers hand in the raw 32-bit
//! configuration cells (see [`rif::ResourceConfig`] for the layout) and the
//! mapped register banks.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod etzpc;
pub mod firewall;
pub mod mmio;
pub mod pm;
pub mod pwr;
pub mod rif;
pub mod rifsc;
pub mod risaf;
pub mod soc;

pub use error::{Error, Result};
