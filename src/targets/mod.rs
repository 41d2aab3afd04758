//! Supported scooter models
//!
//! Every supported model resolves to a static [ScooterProfile] describing
//! where the per-unit identity data lives in the composite flash image, which
//! bootloader variant to use and where the stock driver firmware is fetched
//! from. Models are split into two bootloader families, the legacy Ninebot
//! ("NB") family and the Xiaomi ("Mi") family, which differ in the offset of
//! the identity segment.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, VariantNames};

pub use self::mcu::{known_variants, McuVariant};
use crate::Error;

mod mcu;
mod ninebot;
mod xiaomi;

/// Offsets of the identity template every model starts from
const DEFAULT_SERIAL_OFFSET: usize = 0x20;
const ODOMETER_OFFSET: usize = 0x52;
const UID_OFFSETS: [usize; 3] = [0x1b4, 0x1b8, 0x1bc];

const DEFAULT_IDENTITY_TEMPLATE: &str = "/bin/data/default";

/// All supported scooter models
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[non_exhaustive]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Ninebot Max G30
    Max,
    /// Ninebot G2
    G2,
    /// Ninebot F series
    F,
    /// Ninebot F2 series
    F2,
    /// Xiaomi 4 Pro, uses the Ninebot bootloader
    #[strum(serialize = "4pro")]
    #[serde(rename = "4pro")]
    #[cfg_attr(feature = "cli", value(name = "4pro"))]
    Pro4,
    /// Xiaomi M365 Pro
    Pro,
    /// Xiaomi 1S
    #[strum(serialize = "1s")]
    #[serde(rename = "1s")]
    #[cfg_attr(feature = "cli", value(name = "1s"))]
    Mi1s,
    /// Xiaomi Lite
    Lite,
    /// Xiaomi Pro 2
    Pro2,
    /// Xiaomi Mi 3
    Mi3,
}

impl Model {
    /// Bootloader family the model belongs to
    pub fn family(&self) -> BootloaderFamily {
        match self {
            Model::Max | Model::G2 | Model::F | Model::F2 | Model::Pro4 => {
                BootloaderFamily::Ninebot
            }
            Model::Pro | Model::Mi1s | Model::Lite | Model::Pro2 | Model::Mi3 => {
                BootloaderFamily::Xiaomi
            }
        }
    }

    /// Static layout parameters of the model
    pub fn profile(&self) -> ScooterProfile {
        let family = self.family();

        let (serial_offset, identity_template) = match self {
            Model::Pro4 => (0xa8, "/bin/data/4pro"),
            _ => (DEFAULT_SERIAL_OFFSET, DEFAULT_IDENTITY_TEMPLATE),
        };

        ScooterProfile {
            model: *self,
            family,
            data_segment_offset: family.data_segment_offset(),
            identity_offsets: IdentityOffsets {
                serial: serial_offset,
                odometer: ODOMETER_OFFSET,
                uid: UID_OFFSETS,
            },
            substitute_chip: family.substitute_chip(),
            identity_template,
            default_driver_url: self.default_driver_url(),
        }
    }

    /// Location of the stock driver firmware
    pub fn default_driver_url(&self) -> &'static str {
        match self {
            Model::Max => ninebot::MAX_DRIVER,
            Model::G2 => ninebot::G2_DRIVER,
            Model::F => ninebot::F_DRIVER,
            Model::F2 => ninebot::F2_DRIVER,
            Model::Pro4 => ninebot::PRO4_DRIVER,
            Model::Pro => xiaomi::PRO_DRIVER,
            Model::Mi1s => xiaomi::MI1S_DRIVER,
            Model::Lite => xiaomi::LITE_DRIVER,
            Model::Pro2 => xiaomi::PRO2_DRIVER,
            Model::Mi3 => xiaomi::MI3_DRIVER,
        }
    }

    /// Whether the model is usually fitted with a substitute microcontroller
    pub fn prefers_substitute_chip(&self) -> bool {
        matches!(self, Model::G2)
    }
}

/// Resolve the profile of a model from its identifier
pub fn resolve_profile(model_id: &str) -> Result<ScooterProfile, Error> {
    Model::from_str(model_id)
        .map(|model| model.profile())
        .map_err(|_| Error::UnknownModel(model_id.to_owned()))
}

/// Profiles of every supported model
pub fn profiles() -> impl Iterator<Item = ScooterProfile> {
    Model::iter().map(|model| model.profile())
}

/// Bootloader families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum BootloaderFamily {
    /// Legacy Ninebot bootloader
    #[strum(serialize = "NB")]
    Ninebot,
    /// Xiaomi bootloader
    #[strum(serialize = "Mi")]
    Xiaomi,
}

impl BootloaderFamily {
    /// Offset of the identity segment within the composite image
    pub const fn data_segment_offset(&self) -> u32 {
        match self {
            BootloaderFamily::Ninebot => ninebot::DATA_SEGMENT_OFFSET,
            BootloaderFamily::Xiaomi => xiaomi::DATA_SEGMENT_OFFSET,
        }
    }

    /// Microcontroller family used when the board carries a substitute part
    pub const fn substitute_chip(&self) -> SubstituteChip {
        match self {
            BootloaderFamily::Ninebot => SubstituteChip::At32,
            BootloaderFamily::Xiaomi => SubstituteChip::Gd32,
        }
    }

    /// Location of the bootloader binary for the given chip
    pub const fn bootloader(&self, chip: SubstituteChip) -> &'static str {
        match (self, chip) {
            (BootloaderFamily::Ninebot, SubstituteChip::None) => ninebot::BOOTLOADER,
            (BootloaderFamily::Ninebot, _) => ninebot::BOOTLOADER_AT32,
            (BootloaderFamily::Xiaomi, SubstituteChip::None) => xiaomi::BOOTLOADER,
            (BootloaderFamily::Xiaomi, _) => xiaomi::BOOTLOADER_GD32,
        }
    }
}

/// Microcontroller families a controller board may be fitted with instead of
/// the original STM32 part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum SubstituteChip {
    /// Original STM32 part
    #[default]
    #[strum(serialize = "STM32")]
    None,
    /// Artery AT32
    #[strum(serialize = "AT32")]
    At32,
    /// GigaDevice GD32
    #[strum(serialize = "GD32")]
    Gd32,
}

/// Offsets of the identity fields within the identity segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityOffsets {
    pub serial: usize,
    pub odometer: usize,
    pub uid: [usize; 3],
}

impl IdentityOffsets {
    /// Number of bytes available to the serial number, up to the next field
    /// placed after it
    pub fn serial_capacity(&self, segment_len: usize) -> usize {
        let next_field = self
            .uid
            .iter()
            .chain([self.odometer].iter())
            .copied()
            .filter(|&offset| offset > self.serial)
            .min()
            .unwrap_or(segment_len)
            .min(segment_len);

        next_field.saturating_sub(self.serial)
    }

    /// Smallest identity segment all fields fit into
    pub fn required_len(&self) -> usize {
        self.uid
            .iter()
            .map(|offset| offset + 4)
            .chain([self.odometer + 4, self.serial])
            .max()
            .unwrap_or_default()
    }
}

/// Layout parameters of a scooter model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScooterProfile {
    pub model: Model,
    pub family: BootloaderFamily,
    pub data_segment_offset: u32,
    pub identity_offsets: IdentityOffsets,
    /// Microcontroller family used when substitution is requested
    pub substitute_chip: SubstituteChip,
    /// Location of the identity template the identity segment starts from
    pub identity_template: &'static str,
    /// Location of the stock driver firmware
    pub default_driver_url: &'static str,
}

impl ScooterProfile {
    pub fn is_legacy_family(&self) -> bool {
        self.family == BootloaderFamily::Ninebot
    }

    /// Chip family to flash for, given whether substitution was requested
    pub fn chip(&self, substitute: bool) -> SubstituteChip {
        if substitute {
            self.substitute_chip
        } else {
            SubstituteChip::None
        }
    }

    /// Location of the bootloader binary, given whether substitution was
    /// requested
    pub fn bootloader(&self, substitute: bool) -> &'static str {
        self.family.bootloader(self.chip(substitute))
    }
}
