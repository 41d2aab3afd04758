//! Library and application errors

use std::io;

use miette::Diagnostic;
use strum::{Display, VariantNames};
use thiserror::Error;

use crate::targets::Model;

/// All possible errors returned by scootflash
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to attach to the target device")]
    #[diagnostic(
        code(scootflash::attach),
        help("Check the SWD wiring between the debug probe and the controller, and make sure no other program is using the probe")
    )]
    Attach(#[source] SessionError),

    #[error("Operation was cancelled by the user")]
    #[diagnostic(code(scootflash::cancelled))]
    UserCancelled,

    #[error("Failed to fetch the {asset} from '{location}'")]
    #[diagnostic(code(scootflash::fetch))]
    Fetch {
        asset: Asset,
        location: String,
        #[source]
        source: FetchError,
    },

    #[error("Failed to encode the identity segment")]
    #[diagnostic(transparent)]
    Encoding(#[from] EncodingError),

    #[error("Failed to read the identity of the target device")]
    #[diagnostic(
        code(scootflash::identify),
        help("Nothing has been written to flash yet, re-run the flashing procedure")
    )]
    Identify(#[source] SessionError),

    #[error("The flash image layout is invalid")]
    #[diagnostic(transparent)]
    Layout(#[from] LayoutError),

    #[error("Communication error while writing the flash image")]
    #[diagnostic(
        code(scootflash::flash),
        help("The device was left halted and its flash content is indeterminate, re-run the flashing procedure")
    )]
    Flash(#[source] SessionError),

    #[error("Verification of flash content failed at offset {offset:#x}")]
    #[diagnostic(
        code(scootflash::verify_failed),
        help("The device was left halted, re-run the flashing procedure")
    )]
    VerifyFailed { offset: usize },

    #[error("Unknown scooter model '{0}'")]
    #[diagnostic(
        code(scootflash::unknown_model),
        help("Supported models are: {}", Model::VARIANTS.join(", "))
    )]
    UnknownModel(String),

    #[error("'{0}' is not a valid device UID")]
    #[diagnostic(
        code(scootflash::invalid_uid),
        help("A device UID consists of 24 hexadecimal digits, e.g. 04030201-08070605-0c0b0a09")
    )]
    InvalidUid(String),

    #[error("The firmware URL '{0}' is not valid")]
    #[diagnostic(
        code(scootflash::invalid_firmware_url),
        help("Only http and https URLs are accepted")
    )]
    InvalidFirmwareUrl(String),

    #[error("The debug probe backend '{0}' is not available")]
    #[diagnostic(
        code(scootflash::probe_unavailable),
        help("This build only ships the `dummy` backend, other backends are provided by the embedding application")
    )]
    ProbeUnavailable(String),

    #[error("Failed to open file: {0}")]
    FileOpenError(String, #[source] io::Error),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    #[diagnostic(code(scootflash::dialoguer_error))]
    DialoguerError(#[from] dialoguer::Error),
}

impl Error {
    /// Classify the error into the terminal failure reason of a flashing
    /// attempt, if it can be produced by one
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Error::Attach(_) => Some(FailureKind::Attach),
            Error::UserCancelled => Some(FailureKind::UserCancelled),
            Error::Fetch { .. } | Error::Encoding(_) | Error::Identify(_) => {
                Some(FailureKind::Assembly)
            }
            Error::Layout(_) => Some(FailureKind::Layout),
            Error::Flash(_) | Error::VerifyFailed { .. } => Some(FailureKind::Flash),
            _ => None,
        }
    }
}

/// Terminal failure reason of a flashing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FailureKind {
    /// Device claim or communication failure before any target access
    #[strum(serialize = "AttachError")]
    Attach,
    /// Interactive variant resolution was aborted
    #[strum(serialize = "UserCancelled")]
    UserCancelled,
    /// Fetch or encoding failure before any flash write
    #[strum(serialize = "AssemblyError")]
    Assembly,
    /// Profile offsets violate the non-overlap invariant
    #[strum(serialize = "LayoutError")]
    Layout,
    /// The flash write failed after the device was unlocked
    #[strum(serialize = "FlashError")]
    Flash,
}

/// Binary assets fetched while assembling the flash image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Asset {
    #[strum(serialize = "bootloader")]
    Bootloader,
    #[strum(serialize = "driver firmware")]
    Driver,
    #[strum(serialize = "identity template")]
    IdentityTemplate,
}

/// Non-fatal conditions recorded while the flashing sequence continues
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Warning {
    #[error("Read protection removal reported failure")]
    #[diagnostic(
        code(scootflash::protection_removal),
        help("If flashing completes successfully there is no need to worry, the flash controller may already have been unlocked")
    )]
    ProtectionRemovalRefused,

    #[error("Read protection removal failed")]
    #[diagnostic(code(scootflash::protection_removal))]
    ProtectionRemoval(#[source] SessionError),

    #[error("Failed to reset the device after flashing")]
    #[diagnostic(
        code(scootflash::post_flash),
        help("The firmware was written, power-cycle the controller to start it")
    )]
    PostFlashReset(#[source] SessionError),

    #[error("Failed to detach from the device")]
    #[diagnostic(code(scootflash::detach))]
    Detach(#[source] SessionError),
}

/// Errors reported by a device session
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("Failed to claim the debug probe interface: {0}")]
    #[diagnostic(
        code(scootflash::session::claim_failed),
        help("Make sure the probe is connected and not in use by another program")
    )]
    ClaimFailed(String),

    #[error("No session is attached to the device")]
    #[diagnostic(code(scootflash::session::not_attached))]
    NotAttached,

    #[error("No target responded on the debug port")]
    #[diagnostic(
        code(scootflash::session::target_not_found),
        help("Check that the controller is powered and the SWDIO/SWCLK lines are connected")
    )]
    TargetNotFound,

    #[error("Unrecognized target device id: {0:#05x}")]
    #[diagnostic(code(scootflash::session::unknown_target))]
    UnknownTarget(u16),

    #[error("Selection of the target variant was cancelled")]
    #[diagnostic(code(scootflash::session::resolution_cancelled))]
    ResolutionCancelled,

    #[error("Selected variant '{0}' is not one of the detected candidates")]
    #[diagnostic(code(scootflash::session::unknown_variant))]
    UnknownVariant(String),

    #[error("Access of {length:#x} bytes at {address:#010x} is outside of the target's memory")]
    #[diagnostic(code(scootflash::session::out_of_bounds))]
    OutOfBounds { address: u32, length: usize },

    #[error("Flash is read protected")]
    #[diagnostic(
        code(scootflash::session::read_protected),
        help("Read protection must be removed before the flash can be written")
    )]
    ReadProtected,

    #[error("USB transfer failed: {0}")]
    #[diagnostic(code(scootflash::session::transfer))]
    Transfer(String),
}

/// Errors originating from a binary source
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("Asset not found")]
    #[diagnostic(code(scootflash::fetch::not_found))]
    NotFound,

    #[error("Unexpected response from server (HTTP {0})")]
    #[diagnostic(code(scootflash::fetch::status))]
    Status(u16),

    #[error("Transport error: {0}")]
    #[diagnostic(code(scootflash::fetch::transport))]
    Transport(String),

    #[error("Unsupported URL scheme '{0}'")]
    #[diagnostic(
        code(scootflash::fetch::unsupported_scheme),
        help("Build with the `http` feature to fetch http and https URLs")
    )]
    UnsupportedScheme(String),

    #[error("The fetched asset is empty")]
    #[diagnostic(code(scootflash::fetch::empty))]
    Empty,

    #[error(transparent)]
    #[diagnostic(code(scootflash::fetch::io))]
    Io(#[from] io::Error),
}

/// Identity segment encoding errors
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum EncodingError {
    #[error("Odometer value {0} km is not a valid distance")]
    #[diagnostic(
        code(scootflash::encoding::invalid_odometer),
        help("The odometer must be a finite, non-negative number of kilometers")
    )]
    InvalidOdometer(f64),

    #[error("Odometer value {0} km does not fit into the identity segment")]
    #[diagnostic(code(scootflash::encoding::odometer_overflow))]
    OdometerOverflow(f64),

    #[error("Serial number of {len} bytes exceeds the {capacity} bytes available")]
    #[diagnostic(code(scootflash::encoding::serial_too_long))]
    SerialTooLong { len: usize, capacity: usize },

    #[error("Identity template of {len} bytes is too small, at least {required} bytes are required")]
    #[diagnostic(
        code(scootflash::encoding::template_too_small),
        help("The identity template does not match the selected model")
    )]
    TemplateTooSmall { len: usize, required: usize },
}

/// Violations of the composite image layout
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum LayoutError {
    #[error("Bootloader of {len:#x} bytes overlaps the driver region at {driver_offset:#x}")]
    #[diagnostic(
        code(scootflash::layout::bootloader_too_large),
        help("The bootloader asset does not belong to a supported model")
    )]
    BootloaderTooLarge { len: usize, driver_offset: u32 },

    #[error("Driver ending at {driver_end:#x} overlaps the identity segment at {data_offset:#x}")]
    #[diagnostic(
        code(scootflash::layout::driver_overlaps_identity),
        help("The driver firmware is too large for the selected model")
    )]
    DriverOverlapsIdentity { driver_end: usize, data_offset: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failure_kinds() {
        assert_eq!(
            Error::Attach(SessionError::TargetNotFound).kind(),
            Some(FailureKind::Attach)
        );
        assert_eq!(
            Error::Identify(SessionError::ReadProtected).kind(),
            Some(FailureKind::Assembly)
        );
        assert_eq!(
            Error::VerifyFailed { offset: 4 }.kind(),
            Some(FailureKind::Flash)
        );
        assert_eq!(Error::UnknownModel("m365".into()).kind(), None);
    }

    #[test]
    fn failure_kind_names() {
        assert_eq!(FailureKind::Attach.to_string(), "AttachError");
        assert_eq!(FailureKind::UserCancelled.to_string(), "UserCancelled");
        assert_eq!(FailureKind::Flash.to_string(), "FlashError");
    }
}
