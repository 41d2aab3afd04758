//! In-memory target device for testing
//!
//! [DummyDevice] emulates a medium-density STM32F1 class controller behind a
//! debug probe. Flash, read protection and the unique id registers are kept
//! in memory, every operation is recorded and any operation can be made to
//! fail. It's useful for testing and development without real hardware.

use std::ops::Range;

use log::debug;

use super::{select_variant, DeviceHandle, DeviceSession, TargetInfo, VariantResolver};
use crate::{
    error::SessionError,
    image_format::{FLASH_BASE_ADDR, UID_LEN, UID_REGISTER_ADDR},
    targets::McuVariant,
};

/// Configuration for the dummy device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Unique device id, in the order it is read by the probe
    pub uid: [u8; UID_LEN],
    /// Device id reported by the debug unit
    pub dev_id: u16,
    /// Flash size in KiB
    pub flash_size_kib: u32,
    /// Whether the flash size can be told apart by the debug unit. If not,
    /// every known variant with a matching device id is a candidate.
    pub report_flash_size: bool,
    /// Whether the flash starts out read protected
    pub read_protected: bool,
    /// Value returned by a successful read protection removal
    pub protection_removal_result: bool,
    /// Flip a bit of every written image, to provoke verification failures
    pub corrupt_writes: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            uid: [
                0x36, 0x31, 0x33, 0x31, 0x35, 0x4e, 0x41, 0x4d, 0x00, 0x2a, 0x00, 0x3f,
            ],
            dev_id: 0x410,
            flash_size_kib: 128,
            report_flash_size: true,
            read_protected: true,
            protection_removal_result: true,
            corrupt_writes: false,
        }
    }
}

/// Operations of a [DeviceSession]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Attach,
    Reset,
    RemoveReadProtection,
    ReadMemory,
    WriteFlash,
    DetectTarget,
    Detach,
}

/// A recorded call on the dummy device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Attach,
    Reset { halt: bool },
    RemoveReadProtection,
    ReadMemory { address: u32, length: u32 },
    WriteFlash { base_address: u32, length: usize },
    DetectTarget,
    Detach,
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::Attach => Operation::Attach,
            Call::Reset { .. } => Operation::Reset,
            Call::RemoveReadProtection => Operation::RemoveReadProtection,
            Call::ReadMemory { .. } => Operation::ReadMemory,
            Call::WriteFlash { .. } => Operation::WriteFlash,
            Call::DetectTarget => Operation::DetectTarget,
            Call::Detach => Operation::Detach,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    operation: Operation,
    /// 1-based call number of the operation to fail, every call if `None`
    occurrence: Option<usize>,
}

/// In-memory target device
#[derive(Debug)]
pub struct DummyDevice {
    config: DummyConfig,
    flash: Vec<u8>,
    attached: Option<DeviceHandle>,
    halted: bool,
    read_protected: bool,
    failures: Vec<Failure>,
    calls: Vec<Call>,
}

impl DummyDevice {
    pub fn new(config: DummyConfig) -> Self {
        let flash = vec![0xff; config.flash_size_kib as usize * 1024];
        let read_protected = config.read_protected;

        Self {
            config,
            flash,
            attached: None,
            halted: false,
            read_protected,
            failures: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// Make every call of `operation` fail
    pub fn fail(mut self, operation: Operation) -> Self {
        self.failures.push(Failure {
            operation,
            occurrence: None,
        });
        self
    }

    /// Make the `occurrence`-th call (starting at 1) of `operation` fail
    pub fn fail_nth(mut self, operation: Operation, occurrence: usize) -> Self {
        self.failures.push(Failure {
            operation,
            occurrence: Some(occurrence),
        });
        self
    }

    /// Content of the emulated flash
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Number of calls made to `operation`
    pub fn count(&self, operation: Operation) -> usize {
        self.calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_read_protected(&self) -> bool {
        self.read_protected
    }

    fn record(&mut self, call: Call) -> Result<(), SessionError> {
        let operation = call.operation();
        self.calls.push(call);
        let count = self.count(operation);

        let fails = self.failures.iter().any(|failure| {
            failure.operation == operation
                && failure.occurrence.map_or(true, |nth| nth == count)
        });

        if fails {
            debug!("Injected failure of {operation:?} (call {count})");
            return Err(SessionError::Transfer(format!(
                "injected failure of {operation:?}"
            )));
        }

        Ok(())
    }

    fn ensure_attached(&self) -> Result<(), SessionError> {
        if self.attached.is_none() {
            return Err(SessionError::NotAttached);
        }

        Ok(())
    }

    fn flash_range(&self, address: u32, length: usize) -> Result<Range<usize>, SessionError> {
        let start = address.wrapping_sub(FLASH_BASE_ADDR) as usize;

        if address < FLASH_BASE_ADDR || start + length > self.flash.len() {
            return Err(SessionError::OutOfBounds { address, length });
        }

        Ok(start..start + length)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new(DummyConfig::default())
    }
}

impl DeviceSession for DummyDevice {
    fn attach(&mut self, handle: &DeviceHandle) -> Result<(), SessionError> {
        self.record(Call::Attach)?;

        if self.attached.is_some() {
            return Err(SessionError::ClaimFailed("probe is already claimed".into()));
        }

        debug!("Attached to dummy device through {handle}");
        self.attached = Some(handle.clone());

        Ok(())
    }

    fn reset(&mut self, halt: bool) -> Result<(), SessionError> {
        self.record(Call::Reset { halt })?;
        self.ensure_attached()?;

        self.halted = halt;

        Ok(())
    }

    fn remove_read_protection(&mut self) -> Result<bool, SessionError> {
        self.record(Call::RemoveReadProtection)?;
        self.ensure_attached()?;

        // Removing the protection mass erases the flash
        if self.read_protected {
            self.flash.fill(0xff);
            self.read_protected = false;
        }

        Ok(self.config.protection_removal_result)
    }

    fn read_memory(&mut self, address: u32, length: u32) -> Result<Vec<u8>, SessionError> {
        self.record(Call::ReadMemory { address, length })?;
        self.ensure_attached()?;

        let uid_end = UID_REGISTER_ADDR + UID_LEN as u32;
        if address >= UID_REGISTER_ADDR && address.saturating_add(length) <= uid_end {
            let start = (address - UID_REGISTER_ADDR) as usize;
            return Ok(self.config.uid[start..start + length as usize].to_vec());
        }

        let range = self.flash_range(address, length as usize)?;
        if self.read_protected {
            return Err(SessionError::ReadProtected);
        }

        Ok(self.flash[range].to_vec())
    }

    fn write_flash(&mut self, base_address: u32, image: &[u8]) -> Result<(), SessionError> {
        self.record(Call::WriteFlash {
            base_address,
            length: image.len(),
        })?;
        self.ensure_attached()?;

        if self.read_protected {
            return Err(SessionError::ReadProtected);
        }

        let range = self.flash_range(base_address, image.len())?;
        let start = range.start;
        self.flash[range].copy_from_slice(image);

        if self.config.corrupt_writes && !image.is_empty() {
            self.flash[start] ^= 0x01;
        }

        debug!(
            "Wrote {:#x} bytes to dummy flash at {:#010x}",
            image.len(),
            base_address
        );

        Ok(())
    }

    fn detect_target(
        &mut self,
        known_variants: &[McuVariant],
        resolver: &mut dyn VariantResolver,
    ) -> Result<TargetInfo, SessionError> {
        self.record(Call::DetectTarget)?;
        self.ensure_attached()?;

        let dev_id = self.config.dev_id;
        let candidates = known_variants
            .iter()
            .filter(|v| v.dev_id == dev_id)
            .filter(|v| {
                !self.config.report_flash_size || v.flash_size_kib == self.config.flash_size_kib
            })
            .copied()
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            return Err(SessionError::UnknownTarget(dev_id));
        }

        let (variant, resolved) = select_variant(&candidates, resolver)?;

        Ok(TargetInfo { variant, resolved })
    }

    fn detach(&mut self) -> Result<(), SessionError> {
        self.record(Call::Detach)?;

        self.attached = None;
        self.halted = false;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::PreselectedResolver,
        targets::{known_variants, SubstituteChip},
    };

    fn attached(config: DummyConfig) -> DummyDevice {
        let mut device = DummyDevice::new(config);
        device.attach(&DeviceHandle::default()).unwrap();
        device
    }

    #[test]
    fn protected_flash_cannot_be_written() {
        let mut device = attached(DummyConfig::default());

        let err = device.write_flash(FLASH_BASE_ADDR, &[0; 4]).unwrap_err();
        assert!(matches!(err, SessionError::ReadProtected));

        assert!(device.remove_read_protection().unwrap());
        device.write_flash(FLASH_BASE_ADDR, &[1, 2, 3, 4]).unwrap();

        assert_eq!(
            device.read_memory(FLASH_BASE_ADDR, 6).unwrap(),
            vec![1, 2, 3, 4, 0xff, 0xff]
        );
    }

    #[test]
    fn uid_registers_are_readable_while_protected() {
        let mut device = attached(DummyConfig::default());

        let uid = device.read_memory(UID_REGISTER_ADDR, UID_LEN as u32).unwrap();
        assert_eq!(uid, DummyConfig::default().uid.to_vec());
    }

    #[test]
    fn out_of_bounds_write() {
        let mut device = attached(DummyConfig {
            flash_size_kib: 64,
            read_protected: false,
            ..DummyConfig::default()
        });

        let err = device
            .write_flash(FLASH_BASE_ADDR + 0xfff0, &[0; 0x20])
            .unwrap_err();
        assert!(matches!(err, SessionError::OutOfBounds { .. }));
    }

    #[test]
    fn operations_require_attachment() {
        let mut device = DummyDevice::default();

        assert!(matches!(
            device.reset(true).unwrap_err(),
            SessionError::NotAttached
        ));
        assert!(device.detach().is_ok());
    }

    #[test]
    fn nth_failure_is_injected_once() {
        let mut device = DummyDevice::default().fail_nth(Operation::Reset, 2);
        device.attach(&DeviceHandle::default()).unwrap();

        assert!(device.reset(true).is_ok());
        assert!(device.reset(true).is_err());
        assert!(device.reset(false).is_ok());
        assert_eq!(device.count(Operation::Reset), 3);
    }

    #[test]
    fn ambiguous_detection_uses_resolver() {
        let mut device = attached(DummyConfig {
            report_flash_size: false,
            ..DummyConfig::default()
        });

        let info = device
            .detect_target(
                known_variants(SubstituteChip::Gd32),
                &mut PreselectedResolver::new("GD32F103xB"),
            )
            .unwrap();
        assert_eq!(info.variant.type_id, "GD32F103xB");
        assert!(info.resolved);

        let err = device
            .detect_target(
                known_variants(SubstituteChip::Gd32),
                &mut PreselectedResolver::cancelling(),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::ResolutionCancelled));
    }

    #[test]
    fn unknown_device_id() {
        let mut device = attached(DummyConfig {
            dev_id: 0x414,
            ..DummyConfig::default()
        });

        let err = device
            .detect_target(
                known_variants(SubstituteChip::None),
                &mut PreselectedResolver::cancelling(),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownTarget(0x414)));
    }
}
