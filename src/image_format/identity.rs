//! Per-unit identity segment

use log::debug;

use super::DeviceUid;
use crate::{error::EncodingError, targets::ScooterProfile};

/// Per-unit identity data placed at the model's data segment offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySegment(Vec<u8>);

impl IdentitySegment {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for IdentitySegment {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

/// Build the identity segment of a unit
///
/// The segment starts as a copy of the model's identity `template`. The UID
/// words, the serial number bytes and the odometer are then written at the
/// offsets of the `profile`. The serial number is written verbatim without a
/// terminator and must fit before the next identity field.
pub fn build_identity_segment(
    profile: &ScooterProfile,
    template: &[u8],
    uid: &DeviceUid,
    serial: &[u8],
    odometer_km: f64,
) -> Result<IdentitySegment, EncodingError> {
    let offsets = &profile.identity_offsets;

    let required = offsets.required_len();
    if template.len() < required {
        return Err(EncodingError::TemplateTooSmall {
            len: template.len(),
            required,
        });
    }

    let capacity = offsets.serial_capacity(template.len());
    if serial.len() > capacity {
        return Err(EncodingError::SerialTooLong {
            len: serial.len(),
            capacity,
        });
    }

    let odometer = encode_odometer(odometer_km)?;

    let mut data = template.to_vec();
    data[offsets.serial..][..serial.len()].copy_from_slice(serial);
    for (offset, word) in offsets.uid.iter().zip(uid.words()) {
        data[*offset..][..4].copy_from_slice(word);
    }
    data[offsets.odometer..][..4].copy_from_slice(&odometer);

    debug!(
        "Identity segment: {} bytes, uid {}, {} serial bytes",
        data.len(),
        uid,
        serial.len()
    );

    Ok(IdentitySegment(data))
}

/// Encode an odometer reading in kilometers as little-endian metres
pub fn encode_odometer(km: f64) -> Result<[u8; 4], EncodingError> {
    if !km.is_finite() || km < 0.0 {
        return Err(EncodingError::InvalidOdometer(km));
    }

    // Decimal inputs such as 12.7 are not exact in binary, round to
    // micrometres before truncating to whole metres.
    let metres = ((km * 1000.0 * 1000.0).round() / 1000.0).floor();
    if metres > u32::MAX as f64 {
        return Err(EncodingError::OdometerOverflow(km));
    }

    Ok((metres as u32).to_le_bytes())
}
