// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Per-SoC capability data.
//!
//! The isolation hardware differs between STM32MP parts in counts and
//! feature sets rather than in behavior, so the differences are expressed
//! as data selected at startup instead of compile-time variants.

use crate::firewall::AddressRange;

/// RISAF region-encryption field layouts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RisafEncryption {
    /// Single enable bit (bit 15 of the region CFGR).
    SingleBit,
    /// Two-bit field (bits 15:14) that additionally selects MCE mode.
    DualBit,
}

/// A RIMU paired with the RISUP whose CID it inherits in CIDSEL mode.
///
/// A `risup` of zero means the RIMU has no pairing and must carry a static
/// master CID.
#[derive(Clone, Copy, Debug)]
pub struct RimuPairing {
    /// RIMU index.
    pub rimu: u8,
    /// Paired RISUP index, 0 when unpaired.
    pub risup: u8,
}

/// A TZMA instance's fixed backing memory and page size.
#[derive(Clone, Copy, Debug)]
pub struct TzmaRegion {
    /// Physical range the TZMA carves its secure prefix out of.
    pub backing: AddressRange,
    /// Protection granule in bytes.
    pub page_size: u64,
}

/// Capability description of one SoC variant.
pub struct SocProfile {
    /// Marketing name, for logs.
    pub name: &'static str,
    /// Number of RISUP peripheral slots behind the RIFSC.
    pub risup_count: u32,
    /// Number of RIMU bus-master slots behind the RIFSC.
    pub rimu_count: u32,
    /// Number of RISAL address-range filters, 0 when absent.
    pub risal_count: u32,
    /// Encoding of the RISAF region encryption field.
    pub risaf_encryption: RisafEncryption,
    /// RIMU to RISUP inheritance pairings, used by the AHB RISAB erratum
    /// check. Empty when the erratum does not apply.
    pub rimu_pairings: &'static [RimuPairing],
    /// TZMA backing regions, empty on parts without an ETZPC.
    pub tzma_regions: &'static [TzmaRegion],
}

/// STM32MP25 family profile.
pub const STM32MP25: SocProfile = SocProfile {
    name: "STM32MP25",
    risup_count: 128,
    rimu_count: 16,
    risal_count: 2,
    risaf_encryption: RisafEncryption::SingleBit,
    rimu_pairings: &[
        RimuPairing { rimu: 1, risup: 76 },  // SDMMC1
        RimuPairing { rimu: 2, risup: 77 },  // SDMMC2
        RimuPairing { rimu: 3, risup: 78 },  // SDMMC3
        RimuPairing { rimu: 4, risup: 66 },  // USB3DR
        RimuPairing { rimu: 5, risup: 63 },  // USBH
        RimuPairing { rimu: 6, risup: 60 },  // ETH1
        RimuPairing { rimu: 7, risup: 61 },  // ETH2
        RimuPairing { rimu: 8, risup: 68 },  // PCIE
        RimuPairing { rimu: 9, risup: 79 },  // GPU
        RimuPairing { rimu: 10, risup: 87 }, // DCMIPP
        RimuPairing { rimu: 11, risup: 0 },
        RimuPairing { rimu: 12, risup: 0 },
        RimuPairing { rimu: 13, risup: 0 },
        RimuPairing { rimu: 14, risup: 89 }, // VDEC
        RimuPairing { rimu: 15, risup: 90 }, // VENC
    ],
    tzma_regions: &[],
};

/// STM32MP21 family profile.
pub const STM32MP21: SocProfile = SocProfile {
    name: "STM32MP21",
    risup_count: 128,
    rimu_count: 16,
    risal_count: 0,
    risaf_encryption: RisafEncryption::DualBit,
    rimu_pairings: &[
        RimuPairing { rimu: 1, risup: 76 },  // SDMMC1
        RimuPairing { rimu: 2, risup: 77 },  // SDMMC2
        RimuPairing { rimu: 3, risup: 78 },  // SDMMC3
        RimuPairing { rimu: 4, risup: 66 },  // OTG_HS
        RimuPairing { rimu: 5, risup: 63 },  // USBH
        RimuPairing { rimu: 6, risup: 60 },  // ETH1
        RimuPairing { rimu: 7, risup: 61 },  // ETH2
        RimuPairing { rimu: 10, risup: 87 }, // DCMIPP
        RimuPairing { rimu: 11, risup: 0 },
        RimuPairing { rimu: 12, risup: 0 },
    ],
    tzma_regions: &[],
};

/// STM32MP15 family profile: no RIF hardware, peripheral isolation goes
/// through the ETZPC instead.
pub const STM32MP15: SocProfile = SocProfile {
    name: "STM32MP15",
    risup_count: 0,
    rimu_count: 0,
    risal_count: 0,
    risaf_encryption: RisafEncryption::SingleBit,
    rimu_pairings: &[],
    tzma_regions: &[
        // TZMA0: boot ROM.
        TzmaRegion {
            backing: AddressRange {
                base: 0x0000_0000,
                len: 0x0002_0000,
            },
            page_size: 0x1000,
        },
        // TZMA1: SYSRAM.
        TzmaRegion {
            backing: AddressRange {
                base: 0x2ffc_0000,
                len: 0x0004_0000,
            },
            page_size: 0x1000,
        },
    ],
};

impl SocProfile {
    /// Looks a profile up by the part number read from the boot ROM or the
    /// debug identification register.
    pub fn from_part_number(part_number: u32) -> Option<&'static SocProfile> {
        match part_number {
            0x500 => Some(&STM32MP15),
            0x505 => Some(&STM32MP25),
            0x506 => Some(&STM32MP21),
            _ => None,
        }
    }

    /// RISUP paired with `rimu` for CID inheritance, if any.
    pub fn paired_risup(&self, rimu: u8) -> Option<u8> {
        self.rimu_pairings
            .iter()
            .find(|pairing| pairing.rimu == rimu)
            .and_then(|pairing| (pairing.risup != 0).then_some(pairing.risup))
    }
}
