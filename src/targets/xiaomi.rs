pub(super) const DATA_SEGMENT_OFFSET: u32 = 0xf800;

pub(super) const BOOTLOADER: &str = "/bin/bootloader/mi_DRV.bin";
pub(super) const BOOTLOADER_GD32: &str = "/bin/bootloader/mi_DRV_GD32.bin";

pub(super) const PRO_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/master/pro/DRV/1.7.1.bin";
pub(super) const MI1S_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/master/1s/DRV/3.1.9%20(Downgrade).bin";
pub(super) const LITE_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/master/lite/DRV/2.4.5%20(Downgrade).bin";
pub(super) const PRO2_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/master/pro2/DRV/2.5.2.bin";
pub(super) const MI3_DRIVER: &str = "https://raw.githubusercontent.com/scooterhacking/firmware/master/mi3/DRV/0.1.7.bin";
