//! Sessions with a target device
//!
//! The [DeviceSession] trait abstracts over a debug probe attached to a
//! scooter controller. The probe transport itself (USB enumeration, protocol
//! framing and register access) lives outside of this crate; implementors
//! only have to provide the handful of operations the flashing sequence
//! needs. An in-memory implementation is provided by [dummy::DummyDevice].

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::variant::{select_variant, PreselectedResolver, Resolution, VariantResolver};
use crate::{error::SessionError, targets::McuVariant};

pub mod dummy;
mod variant;

/// A previously selected debug probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Serial number of the probe, if it reports one
    pub serial_number: Option<String>,
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)?;
        if let Some(serial) = &self.serial_number {
            write!(f, ":{serial}")?;
        }

        Ok(())
    }
}

/// Information about an identified target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    /// The memory layout variant the target was identified as
    pub variant: McuVariant,
    /// Whether the variant was chosen among several candidates
    pub resolved: bool,
}

/// Operations on a target device attached through a debug probe
///
/// A session is owned by exactly one flashing attempt at a time.
pub trait DeviceSession {
    /// Claim the probe and enter debug mode
    fn attach(&mut self, handle: &DeviceHandle) -> Result<(), SessionError>;

    /// Hard-reset the target, optionally halting the core on the reset vector
    fn reset(&mut self, halt: bool) -> Result<(), SessionError>;

    /// Remove the flash read protection
    ///
    /// Returns `false` when the flash controller reported a failure. The
    /// controller may nevertheless have been unlocked.
    fn remove_read_protection(&mut self) -> Result<bool, SessionError>;

    /// Read `length` bytes of target memory starting at `address`
    fn read_memory(&mut self, address: u32, length: u32) -> Result<Vec<u8>, SessionError>;

    /// Erase and program the flash starting at `base_address`
    fn write_flash(&mut self, base_address: u32, image: &[u8]) -> Result<(), SessionError>;

    /// Identify the target among `known_variants`
    ///
    /// When more than one variant matches the target, `resolver` is asked to
    /// pick one. A cancelled resolution is reported as
    /// [SessionError::ResolutionCancelled].
    fn detect_target(
        &mut self,
        known_variants: &[McuVariant],
        resolver: &mut dyn VariantResolver,
    ) -> Result<TargetInfo, SessionError>;

    /// Leave debug mode and release the probe
    fn detach(&mut self) -> Result<(), SessionError>;
}

impl<T: DeviceSession + ?Sized> DeviceSession for &mut T {
    fn attach(&mut self, handle: &DeviceHandle) -> Result<(), SessionError> {
        (**self).attach(handle)
    }

    fn reset(&mut self, halt: bool) -> Result<(), SessionError> {
        (**self).reset(halt)
    }

    fn remove_read_protection(&mut self) -> Result<bool, SessionError> {
        (**self).remove_read_protection()
    }

    fn read_memory(&mut self, address: u32, length: u32) -> Result<Vec<u8>, SessionError> {
        (**self).read_memory(address, length)
    }

    fn write_flash(&mut self, base_address: u32, image: &[u8]) -> Result<(), SessionError> {
        (**self).write_flash(base_address, image)
    }

    fn detect_target(
        &mut self,
        known_variants: &[McuVariant],
        resolver: &mut dyn VariantResolver,
    ) -> Result<TargetInfo, SessionError> {
        (**self).detect_target(known_variants, resolver)
    }

    fn detach(&mut self) -> Result<(), SessionError> {
        (**self).detach()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_display() {
        let mut handle = DeviceHandle {
            vid: 0x0483,
            pid: 0x3748,
            serial_number: None,
        };
        assert_eq!(handle.to_string(), "0483:3748");

        handle.serial_number = Some("066DFF".into());
        assert_eq!(handle.to_string(), "0483:3748:066DFF");
    }
}
