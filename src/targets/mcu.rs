use super::SubstituteChip;

/// DBGMCU_IDCODE device id of the STM32F1 medium-density line
const MEDIUM_DENSITY_DEV_ID: u16 = 0x410;

/// A memory layout variant of a microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McuVariant {
    /// Identifier the variant is selected by
    pub type_id: &'static str,
    /// Device id reported by the debug unit
    pub dev_id: u16,
    pub freq_mhz: u32,
    pub flash_size_kib: u32,
    pub sram_size_kib: u32,
    pub eeprom_size_kib: u32,
}

impl McuVariant {
    const fn new(type_id: &'static str, freq_mhz: u32, flash_size_kib: u32, sram_size_kib: u32) -> Self {
        Self {
            type_id,
            dev_id: MEDIUM_DENSITY_DEV_ID,
            freq_mhz,
            flash_size_kib,
            sram_size_kib,
            eeprom_size_kib: 0,
        }
    }
}

const STM32_VARIANTS: &[McuVariant] = &[
    McuVariant::new("STM32F103x8", 72, 64, 20),
    McuVariant::new("STM32F103xB", 72, 128, 20),
];

// The substitutes report the STM32 device id they are pin compatible with
const GD32_VARIANTS: &[McuVariant] = &[
    McuVariant::new("GD32F103x8", 108, 64, 20),
    McuVariant::new("GD32F103xB", 108, 128, 20),
];

const AT32_VARIANTS: &[McuVariant] = &[
    McuVariant::new("AT32F415x8", 150, 64, 32),
    McuVariant::new("AT32F415xB", 150, 128, 32),
];

/// Memory layout variants a controller board may carry for the given chip
/// family
pub fn known_variants(chip: SubstituteChip) -> &'static [McuVariant] {
    match chip {
        SubstituteChip::None => STM32_VARIANTS,
        SubstituteChip::At32 => AT32_VARIANTS,
        SubstituteChip::Gd32 => GD32_VARIANTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_share_a_device_id() {
        for chip in [SubstituteChip::None, SubstituteChip::At32, SubstituteChip::Gd32] {
            let variants = known_variants(chip);
            assert!(variants.len() > 1);
            assert!(variants.iter().all(|v| v.dev_id == MEDIUM_DENSITY_DEV_ID));
            assert!(variants
                .iter()
                .all(|v| v.type_id.starts_with(&chip.to_string())));
        }
    }
}
