// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! 32-bit MMIO access to device register banks.

/// Word-granular access to a device register bank.
///
/// Offsets are in bytes from the bank base and must be 4-byte aligned.
pub trait Mmio {
    /// Reads the 32-bit register at `offset`.
    fn read(&self, offset: usize) -> u32;

    /// Writes the 32-bit register at `offset`.
    fn write(&mut self, offset: usize, value: u32);

    /// Sets `bits` in the register at `offset`.
    fn set_bits(&mut self, offset: usize, bits: u32) {
        let value = self.read(offset);
        self.write(offset, value | bits);
    }

    /// Clears `bits` in the register at `offset`.
    fn clear_bits(&mut self, offset: usize, bits: u32) {
        let value = self.read(offset);
        self.write(offset, value & !bits);
    }

    /// Replaces the bits selected by `mask` with `value & mask`.
    fn clear_set_bits(&mut self, offset: usize, mask: u32, value: u32) {
        let old = self.read(offset);
        self.write(offset, (old & !mask) | (value & mask));
    }
}

/// A live register bank at a fixed mapped address.
pub struct DeviceBank {
    base: *mut u32,
    len: usize,
}

// SAFETY: The handle is the unique owner of the registers it maps, per the
// contract of `DeviceBank::new`.
unsafe impl Send for DeviceBank {}

impl DeviceBank {
    /// Creates a handle to the register bank at `base` spanning `len` bytes.
    ///
    /// # Safety
    ///
    /// `base` must be the mapped base address of the device's registers,
    /// valid for volatile reads and writes over `len` bytes, and no other
    /// code may access that range while the handle exists.
    pub const unsafe fn new(base: *mut u32, len: usize) -> Self {
        Self { base, len }
    }

    fn check_offset(&self, offset: usize) {
        assert!(offset % 4 == 0 && offset + 4 <= self.len);
    }
}

impl Mmio for DeviceBank {
    fn read(&self, offset: usize) -> u32 {
        self.check_offset(offset);
        // SAFETY: The offset is in bounds and the mapping is valid for
        // volatile reads per the contract of `new`.
        unsafe { self.base.byte_add(offset).read_volatile() }
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.check_offset(offset);
        // SAFETY: The offset is in bounds and the mapping is valid for
        // volatile writes per the contract of `new`.
        unsafe { self.base.byte_add(offset).write_volatile(value) }
    }
}

#[cfg(any(test, feature = "fakes"))]
pub use fake::FakeBank;

#[cfg(any(test, feature = "fakes"))]
mod fake {
    use super::Mmio;
    use crate::rif::{SEMCR_MUTEX, SEMCR_SEMCID_MASK, SEMCR_SEMCID_SHIFT};
    use zerocopy::FromZeros;

    /// In-memory register bank for tests.
    ///
    /// Offsets matched by the `is_semaphore` predicate behave like RIF
    /// semaphore registers: setting MUTEX on a free semaphore latches the
    /// simulated bus master's CID into SEMCID, further take attempts are
    /// ignored, and only the holder can clear MUTEX. Switching the master
    /// CID lets a test model another compartment racing for the resource.
    pub struct FakeBank<const WORDS: usize> {
        regs: [u32; WORDS],
        is_semaphore: fn(usize) -> bool,
        master_cid: u32,
    }

    impl<const WORDS: usize> FakeBank<WORDS> {
        /// Creates a zeroed bank whose semaphore registers are the offsets
        /// matched by `is_semaphore`.
        pub fn new(is_semaphore: fn(usize) -> bool) -> Self {
            Self {
                regs: FromZeros::new_zeroed(),
                is_semaphore,
                master_cid: crate::rif::Cid::OWNER.get(),
            }
        }

        /// Changes the CID the simulated bus master issues transactions with.
        pub fn set_master_cid(&mut self, cid: u32) {
            self.master_cid = cid;
        }

        /// Writes a register directly, bypassing semaphore arbitration.
        pub fn poke(&mut self, offset: usize, value: u32) {
            self.regs[offset / 4] = value;
        }

        fn write_semaphore(&mut self, offset: usize, value: u32) {
            let current = self.regs[offset / 4];
            let taken = current & SEMCR_MUTEX != 0;
            let holder = (current & SEMCR_SEMCID_MASK) >> SEMCR_SEMCID_SHIFT;

            if value & SEMCR_MUTEX != 0 {
                if !taken {
                    self.regs[offset / 4] =
                        SEMCR_MUTEX | (self.master_cid << SEMCR_SEMCID_SHIFT);
                }
            } else if taken && holder == self.master_cid {
                self.regs[offset / 4] = 0;
            }
        }
    }

    impl<const WORDS: usize> Mmio for FakeBank<WORDS> {
        fn read(&self, offset: usize) -> u32 {
            assert!(offset % 4 == 0);
            self.regs[offset / 4]
        }

        fn write(&mut self, offset: usize, value: u32) {
            assert!(offset % 4 == 0);
            if (self.is_semaphore)(offset) {
                self.write_semaphore(offset, value);
            } else {
                self.regs[offset / 4] = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rif::SEMCR_MUTEX;

    #[test]
    fn plain_registers_hold_writes() {
        let mut bank = FakeBank::<8>::new(|_| false);
        bank.write(0x10, 0xdead_beef);
        assert_eq!(bank.read(0x10), 0xdead_beef);
        bank.clear_set_bits(0x10, 0xff, 0x42);
        assert_eq!(bank.read(0x10), 0xdead_be42);
    }

    #[test]
    fn semaphore_latches_master_cid() {
        let mut bank = FakeBank::<8>::new(|offset| offset == 0x4);
        bank.set_master_cid(3);
        bank.write(0x4, SEMCR_MUTEX);
        assert_eq!(bank.read(0x4), SEMCR_MUTEX | (3 << 4));

        // A different master can neither steal nor release it.
        bank.set_master_cid(1);
        bank.write(0x4, SEMCR_MUTEX);
        assert_eq!(bank.read(0x4), SEMCR_MUTEX | (3 << 4));
        bank.write(0x4, 0);
        assert_eq!(bank.read(0x4), SEMCR_MUTEX | (3 << 4));

        // The holder can.
        bank.set_master_cid(3);
        bank.write(0x4, 0);
        assert_eq!(bank.read(0x4), 0);
    }
}
