use std::ops::Range;

use log::debug;

use super::{IdentitySegment, BOOTLOADER_OFFSET, DRIVER_OFFSET};
use crate::error::LayoutError;

/// A complete flash image, written to the target in a single operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeImage {
    data: Vec<u8>,
    bootloader: Range<usize>,
    driver: Range<usize>,
    identity: Range<usize>,
}

impl CompositeImage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The bootloader region of the image
    pub fn bootloader(&self) -> &[u8] {
        &self.data[self.bootloader.clone()]
    }

    /// The driver firmware region of the image
    pub fn driver(&self) -> &[u8] {
        &self.data[self.driver.clone()]
    }

    /// The identity segment region of the image
    pub fn identity(&self) -> &[u8] {
        &self.data[self.identity.clone()]
    }

    /// SHA-256 digest of the whole image
    pub fn digest(&self) -> String {
        super::sha256_hex(&self.data)
    }
}

/// Combine the segments into a composite image
///
/// The bootloader is placed at offset `0x0`, the driver at `0x1000` and the
/// identity segment at `data_segment_offset`. The resulting image is exactly
/// `data_segment_offset + identity.len()` bytes long, bytes not covered by a
/// segment are zero.
pub fn build_composite_image(
    bootloader: &[u8],
    driver: &[u8],
    identity: &IdentitySegment,
    data_segment_offset: u32,
) -> Result<CompositeImage, LayoutError> {
    let bootloader_start = BOOTLOADER_OFFSET as usize;
    let driver_start = DRIVER_OFFSET as usize;
    let identity_start = data_segment_offset as usize;

    if bootloader_start + bootloader.len() > driver_start {
        return Err(LayoutError::BootloaderTooLarge {
            len: bootloader.len(),
            driver_offset: DRIVER_OFFSET,
        });
    }

    let driver_end = driver_start + driver.len();
    if driver_end > identity_start {
        return Err(LayoutError::DriverOverlapsIdentity {
            driver_end,
            data_offset: data_segment_offset,
        });
    }

    let bootloader_range = bootloader_start..bootloader_start + bootloader.len();
    let driver_range = driver_start..driver_end;
    let identity_range = identity_start..identity_start + identity.len();

    let mut data = vec![0u8; identity_range.end];
    data[bootloader_range.clone()].copy_from_slice(bootloader);
    data[driver_range.clone()].copy_from_slice(driver);
    data[identity_range.clone()].copy_from_slice(identity.as_bytes());

    debug!(
        "Composite image: {:#x} bytes (bootloader {:#x}, driver {:#x}, identity {:#x} at {:#x})",
        data.len(),
        bootloader.len(),
        driver.len(),
        identity.len(),
        identity_start
    );

    Ok(CompositeImage {
        data,
        bootloader: bootloader_range,
        driver: driver_range,
        identity: identity_range,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn identity(len: usize) -> IdentitySegment {
        IdentitySegment::from(vec![0xa5; len])
    }

    #[test]
    fn segments_round_trip_at_their_offsets() {
        let cases = [
            (0x10, 0x100, 0x20, 0xf800),
            (0x1000, 0xe800, 0x200, 0xf800),
            (0x0, 0x0, 0x0, 0x1000),
            (0x800, 0x1b000, 0x200, 0x1c000),
        ];

        for (bootloader_len, driver_len, identity_len, offset) in cases {
            let bootloader = vec![0x11; bootloader_len];
            let driver = vec![0x22; driver_len];
            let identity = identity(identity_len);

            let image = build_composite_image(&bootloader, &driver, &identity, offset).unwrap();

            assert_eq!(image.len(), offset as usize + identity_len);
            assert_eq!(&image.as_bytes()[..bootloader_len], bootloader.as_slice());
            assert_eq!(
                &image.as_bytes()[0x1000..0x1000 + driver_len],
                driver.as_slice()
            );
            assert_eq!(&image.as_bytes()[offset as usize..], identity.as_bytes());
            assert_eq!(image.bootloader(), bootloader.as_slice());
            assert_eq!(image.driver(), driver.as_slice());
            assert_eq!(image.identity(), identity.as_bytes());
        }
    }

    #[test]
    fn gaps_are_zero_filled() {
        let image = build_composite_image(&[0xff; 4], &[0xff; 4], &identity(4), 0x2000).unwrap();
        let data = image.as_bytes();

        assert!(data[4..0x1000].iter().all(|&b| b == 0));
        assert!(data[0x1004..0x2000].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_bootloader_is_rejected() {
        for (driver_len, offset) in [(0, 0x1000), (0x100, 0xf800), (0xe800, 0xf800), (0, 0x1c000)] {
            let err = build_composite_image(&[0; 0x1001], &vec![0; driver_len], &identity(8), offset)
                .unwrap_err();

            assert!(matches!(
                err,
                LayoutError::BootloaderTooLarge { len: 0x1001, .. }
            ));
        }
    }

    #[test]
    fn driver_overlapping_identity_is_rejected() {
        let err = build_composite_image(&[0; 0x100], &[0; 0xe801], &identity(8), 0xf800)
            .unwrap_err();

        assert!(matches!(
            err,
            LayoutError::DriverOverlapsIdentity {
                driver_end: 0xf801,
                data_offset: 0xf800
            }
        ));
    }

    #[test]
    fn image_is_deterministic() {
        let a = build_composite_image(&[1; 8], &[2; 8], &identity(8), 0xf800).unwrap();
        let b = build_composite_image(&[1; 8], &[2; 8], &identity(8), 0xf800).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }
}
