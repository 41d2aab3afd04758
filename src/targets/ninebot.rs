/// The identity segment sits right after the 112 KiB reserved for the
/// bootloader and driver
pub(super) const DATA_SEGMENT_OFFSET: u32 = 0x1c000;

pub(super) const BOOTLOADER: &str = "/bin/bootloader/nb_DRV.bin";
pub(super) const BOOTLOADER_AT32: &str = "/bin/bootloader/nb_DRV_AT32.bin";

/// Stock driver firmware, the compat builds work with both the original and
/// the substitute microcontroller
pub(super) const MAX_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/master/max/DRV/1.6.13%20(Compat).bin";
pub(super) const G2_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/master/g2/DRV/1.7.0%20(Compat).bin";
pub(super) const F_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/master/f/DRV/5.4.9.bin";
pub(super) const F2_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/64956bb2752a2d965a958706f996c6a4a9d75612/f2/DRV/1.4.15.bin";
pub(super) const PRO4_DRIVER: &str = "https://raw.githubusercontent.com/CamiAlfa/m365-Electric-Scooter-4-Pro-stlink/refs/heads/main/EC_ESC_Driver_V0.2.2_mod.bin";
