// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Error type shared by all isolation engines.

use core::fmt::{self, Display, Formatter};

/// Errors returned by the isolation engines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// An argument is malformed or out of range.
    BadParameters,
    /// The requested access or reconfiguration is not permitted.
    AccessDenied,
    /// The hardware did not accept a write it should have accepted.
    /// The engines panic in place on fatal read-back mismatches; this
    /// variant lets the embedding firmware report the same condition
    /// where a panic is not an option.
    HardwareFault,
    /// A bounded configuration table is full.
    OutOfMemory,
    /// The referenced resource or region does not exist.
    ItemNotFound,
    /// The operation depends on a controller that is not probed yet.
    /// Produced by the embedding firmware's probe ordering, not by the
    /// engines themselves.
    DeferInit,
    /// The hardware instance does not implement the requested feature.
    NotSupported,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::BadParameters => write!(f, "bad parameters"),
            Self::AccessDenied => write!(f, "access denied"),
            Self::HardwareFault => write!(f, "hardware fault"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::ItemNotFound => write!(f, "item not found"),
            Self::DeferInit => write!(f, "controller not probed yet"),
            Self::NotSupported => write!(f, "not supported"),
        }
    }
}

impl core::error::Error for Error {}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, Error>;
