//! Composite flash image format
//!
//! The image written to a scooter controller is assembled from three
//! independently sourced segments:
//!
//! | Offset                | Content                                   |
//! |-----------------------|-------------------------------------------|
//! | `0x0`                 | bootloader, at most `0x1000` bytes        |
//! | `0x1000`              | driver firmware                           |
//! | `data_segment_offset` | identity segment (UID, serial, odometer)  |
//!
//! Bytes between the segments are zero. The data segment offset depends on
//! the model's bootloader family, see [crate::targets::BootloaderFamily].

use std::{fmt, str::FromStr};

use sha2::{Digest, Sha256};

use crate::error::Error;

pub use self::{
    composite::{build_composite_image, CompositeImage},
    identity::{build_identity_segment, encode_odometer, IdentitySegment},
};

mod composite;
mod identity;

/// Base address of the target's flash memory
pub const FLASH_BASE_ADDR: u32 = 0x0800_0000;
/// Offset of the bootloader within the composite image
pub const BOOTLOADER_OFFSET: u32 = 0x0;
/// Offset of the driver firmware within the composite image
pub const DRIVER_OFFSET: u32 = 0x1000;

/// Address of the factory programmed unique device id registers
pub const UID_REGISTER_ADDR: u32 = 0x1fff_f7e8;
/// Length of the unique device id in bytes
pub const UID_LEN: usize = 12;

/// Hardware unique identifier of a target, three words in the byte order
/// they are stored in the identity segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceUid([[u8; 4]; 3]);

impl DeviceUid {
    pub const fn new(words: [[u8; 4]; 3]) -> Self {
        Self(words)
    }

    /// Create the identifier from the bytes read by the debug probe, every
    /// word is stored byte-reversed relative to the probe's read order
    pub fn from_probe_bytes(bytes: [u8; UID_LEN]) -> Self {
        let mut words = [[0u8; 4]; 3];

        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            word.copy_from_slice(chunk);
            word.reverse();
        }

        Self(words)
    }

    pub fn words(&self) -> &[[u8; 4]; 3] {
        &self.0
    }
}

impl fmt::Display for DeviceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = &self.0;
        write!(f, "{}-{}-{}", encode_hex(a), encode_hex(b), encode_hex(c))
    }
}

/// Parses the format produced by [DeviceUid]'s `Display` implementation, the
/// dashes are optional
impl FromStr for DeviceUid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidUid(s.to_owned());

        let digits = s.trim().replace('-', "");
        if digits.len() != UID_LEN * 2 || !digits.is_ascii() {
            return Err(invalid());
        }

        let mut words = [[0u8; 4]; 3];
        for (i, byte) in words.iter_mut().flatten().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }

        Ok(Self(words))
    }
}

/// SHA-256 digest of some data, as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    encode_hex(Sha256::digest(data))
}

fn encode_hex<T>(data: T) -> String
where
    T: AsRef<[u8]>,
{
    const HEX_CHARS: &[u8] = b"0123456789abcdef";

    let mut s = String::new();
    for byte in data.as_ref() {
        s.push(HEX_CHARS[(byte >> 4) as usize] as char);
        s.push(HEX_CHARS[(byte & 0xF) as usize] as char);
    }

    s
}
