//! Types and functions for the command-line interface
//!
//! The contents of this module are intended for use with the [scootflash]
//! command-line application, and are likely not of much use otherwise.
//!
//! No stability guaranties apply
//!
//! [scootflash]: https://crates.io/crates/scootflash

use std::{fs, path::PathBuf, str::FromStr, thread::sleep, time::Duration};

use clap::Args;
use comfy_table::{modifiers, presets::UTF8_FULL, Attribute, Cell, Color, Table};
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use miette::{IntoDiagnostic, Result, WrapErr};
use strum::IntoEnumIterator;

use self::config::Config;
use crate::{
    assets::{validate_firmware_url, AssetSource},
    connection::{
        dummy::DummyDevice, DeviceHandle, PreselectedResolver, Resolution, VariantResolver,
    },
    error::Error,
    flasher::{assemble_image, DriverOverride, FlashRequest, FlashSettings, FlashState, Flasher},
    image_format::DeviceUid,
    progress::ProgressCallbacks,
    targets::{profiles, McuVariant, Model, ScooterProfile},
};

pub mod config;

/// Debug probe selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSelector {
    /// In-memory emulated target
    Dummy,
    /// USB debug probe, `VID:PID[:SERIAL]` in hexadecimal
    Usb(DeviceHandle),
}

impl FromStr for ProbeSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("dummy") {
            return Ok(ProbeSelector::Dummy);
        }

        let mut parts = s.splitn(3, ':');
        let mut id = |name: &str| {
            let part = parts
                .next()
                .filter(|part| !part.is_empty())
                .ok_or_else(|| format!("missing {name} in '{s}', expected VID:PID[:SERIAL]"))?;

            u16::from_str_radix(part.trim_start_matches("0x"), 16)
                .map_err(|err| format!("invalid {name} '{part}': {err}"))
        };

        let vid = id("vendor id")?;
        let pid = id("product id")?;
        let serial_number = parts.next().map(str::to_owned);

        Ok(ProbeSelector::Usb(DeviceHandle {
            vid,
            pid,
            serial_number,
        }))
    }
}

/// Identity of the unit to personalise
#[derive(Debug, Args)]
#[non_exhaustive]
pub struct UnitArgs {
    /// Scooter model
    #[arg(short = 'm', long, value_enum)]
    pub model: Option<Model>,
    /// The controller carries a substitute (AT32/GD32) microcontroller,
    /// assumed by default for models usually fitted with one
    #[arg(long, overrides_with = "no_clone_chip")]
    pub clone_chip: bool,
    /// The controller carries the original STM32 microcontroller
    #[arg(long, overrides_with = "clone_chip")]
    pub no_clone_chip: bool,
    /// Serial number to write, the template's serial number is kept if omitted
    #[arg(short = 's', long)]
    pub serial: Option<String>,
    /// Odometer reading in kilometers
    #[arg(short = 'o', long, default_value_t = 0.0)]
    pub odometer: f64,
    /// Driver firmware file to use instead of the model's stock driver
    #[arg(long, conflicts_with = "driver_url")]
    pub driver: Option<PathBuf>,
    /// URL of a third-party driver firmware to use instead of the model's
    /// stock driver
    #[arg(long)]
    pub driver_url: Option<String>,
    /// Do not ask for confirmation before using third-party firmware
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Flash a personalised firmware image to a controller
#[derive(Debug, Args)]
#[non_exhaustive]
pub struct FlashArgs {
    #[clap(flatten)]
    pub unit: UnitArgs,
    /// Debug probe to use, `dummy` or `VID:PID[:SERIAL]`
    #[arg(short = 'p', long)]
    pub probe: Option<ProbeSelector>,
    /// Memory layout variant to select if the target is ambiguous
    #[arg(long)]
    pub variant: Option<String>,
    /// Read the image back after writing and compare it
    #[arg(long)]
    pub verify: bool,
    /// Wait before flashing, to get the controller powered up
    #[arg(long, value_name = "SECONDS", num_args = 0..=1, default_missing_value = "15")]
    pub countdown: Option<u64>,
}

/// Save the personalised firmware image of a controller to a file
#[derive(Debug, Args)]
#[non_exhaustive]
pub struct SaveImageArgs {
    #[clap(flatten)]
    pub unit: UnitArgs,
    /// Unique device id of the controller, as printed when flashing
    #[arg(long)]
    pub uid: DeviceUid,
    /// File name to save the generated image to
    pub file: PathBuf,
}

/// Print the supported models
pub fn list_models() -> Result<()> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Model")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
            Cell::new("Bootloader")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
            Cell::new("Data offset")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
            Cell::new("Serial offset")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
            Cell::new("Substitute chip")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
            Cell::new("Identity template")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
        ]);

    for profile in profiles() {
        table.add_row(vec![
            Cell::new(profile.model),
            Cell::new(profile.family),
            Cell::new(format!("{:#x}", profile.data_segment_offset)),
            Cell::new(format!("{:#x}", profile.identity_offsets.serial)),
            Cell::new(profile.substitute_chip),
            Cell::new(profile.identity_template),
        ]);
    }

    println!("{table}");

    Ok(())
}

/// Build the image of a unit without a device attached and save it
pub fn save_image(args: SaveImageArgs, config: &Config) -> Result<()> {
    let source = asset_source(config);
    let request = flash_request(&args.unit, config, &source)?;

    info!("Assembling image for {} with UID {}", request.profile.model, args.uid);
    let image = assemble_image(&source, &request, &args.uid)?;

    fs::write(&args.file, image.as_bytes())
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to write image to {}", args.file.display()))?;

    info!(
        "Image of {} bytes saved to {} (sha256 {})",
        image.len(),
        args.file.display(),
        image.digest()
    );

    Ok(())
}

/// Run a flashing attempt
pub fn flash(args: FlashArgs, config: &Config) -> Result<()> {
    let source = asset_source(config);
    let request = flash_request(&args.unit, config, &source)?;
    let settings = FlashSettings::new(args.verify || config.verify);

    let probe = match (&args.probe, &config.probe) {
        (Some(probe), _) => probe.clone(),
        (None, Some(device)) => ProbeSelector::Usb(device.into()),
        (None, None) => {
            miette::bail!(
                help = "Select one with --probe, or configure one in scootflash.toml",
                "No debug probe was selected"
            );
        }
    };

    let (session, handle) = match probe {
        ProbeSelector::Dummy => {
            warn!("Flashing an emulated target, no hardware will be touched");
            (DummyDevice::default(), DeviceHandle::default())
        }
        ProbeSelector::Usb(handle) => {
            return Err(Error::ProbeUnavailable(handle.to_string()).into());
        }
    };

    if let Some(seconds) = args.countdown {
        countdown(seconds);
    }

    let mut resolver = CliResolver::new(args.variant);
    let mut progress = ScootflashProgress::default();

    let mut flasher = Flasher::new(session, source, settings);
    let report = flasher.flash(&handle, &request, &mut resolver, Some(&mut progress));

    if !report.outcome.is_success() && report.states.iter().any(FlashState::is_destructive) {
        warn!("The flash content of the controller may have been modified");
    }

    let uid = report.uid;
    let warnings = report.into_result()?;

    if let Some(uid) = uid {
        info!("Flashed unit with UID {uid}");
    }
    if !warnings.is_empty() {
        warn!("Flashing succeeded with {} warning(s)", warnings.len());
    }

    Ok(())
}

fn flash_request(args: &UnitArgs, config: &Config, source: &AssetSource) -> Result<FlashRequest> {
    let model = match args.model.or(config.model) {
        Some(model) => model,
        None => select_model()?,
    };
    let profile = model.profile();

    let mut request = FlashRequest::new(profile)
        .with_substitute_chip(substitute_chip(args, model))
        .with_odometer(args.odometer);

    if let Some(serial) = &args.serial {
        request = request.with_serial(serial.as_bytes());
    }

    if let Some(path) = &args.driver {
        let data = fs::read(path).map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;
        request = request.with_driver(DriverOverride::Data(data));
    } else if let Some(url) = &args.driver_url {
        validate_firmware_url(url)?;

        if !args.yes && !confirm_third_party(url)? {
            return Err(Error::UserCancelled.into());
        }

        info!("Fetching third-party driver firmware from {url}");
        request = request
            .with_driver(DriverOverride::Url(url.clone()))
            .load_driver(source)?;
    }

    Ok(request)
}

fn substitute_chip(args: &UnitArgs, model: Model) -> bool {
    match (args.clone_chip, args.no_clone_chip) {
        (true, _) => true,
        (_, true) => false,
        _ => model.prefers_substitute_chip(),
    }
}

fn asset_source(config: &Config) -> AssetSource {
    AssetSource::new(&config.asset_dir, config.asset_base_url.clone())
}

fn select_model() -> Result<Model> {
    let models = Model::iter().collect::<Vec<_>>();

    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Scooter model")
        .items(&models)
        .default(0)
        .interact()
        .map_err(Error::from)?;

    Ok(models[index])
}

fn confirm_third_party(url: &str) -> Result<bool> {
    warn!("The driver firmware at {url} is provided by a third party and has not been reviewed");

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Flash it anyway?")
        .default(false)
        .interact()
        .map_err(|e| Error::from(e).into())
}

/// Wait for `seconds`, logging the time remaining once per second
fn countdown(seconds: u64) {
    for remaining in (1..=seconds).rev() {
        info!("Starting flashing in {remaining} seconds...");
        sleep(Duration::from_secs(1));
    }
}

/// Resolves ambiguous targets with a preselected variant, or else by asking
/// the operator
#[derive(Debug, Default)]
pub struct CliResolver {
    preselected: Option<PreselectedResolver>,
}

impl CliResolver {
    pub fn new(variant: Option<String>) -> Self {
        Self {
            preselected: variant.map(PreselectedResolver::new),
        }
    }
}

impl VariantResolver for CliResolver {
    fn resolve(&mut self, candidates: &[McuVariant]) -> Resolution {
        if let Some(preselected) = &mut self.preselected {
            match preselected.resolve(candidates) {
                Resolution::Cancelled => warn!("The selected variant does not match the target"),
                selected => return selected,
            }
        }

        let items = candidates
            .iter()
            .map(|v| {
                format!(
                    "{:<12} {:>4} MHz  {:>4} KiB flash  {:>3} KiB SRAM  {:>2} KiB EEPROM",
                    v.type_id, v.freq_mhz, v.flash_size_kib, v.sram_size_kib, v.eeprom_size_kib
                )
            })
            .collect::<Vec<_>>();

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Several memory layouts match the target, select one (Esc to cancel)")
            .items(&items)
            .default(0)
            .interact_opt();

        match selection {
            Ok(Some(index)) => Resolution::Selected(candidates[index].type_id.to_owned()),
            Ok(None) => Resolution::Cancelled,
            Err(err) => {
                warn!("Variant selection failed: {err}");
                Resolution::Cancelled
            }
        }
    }
}

/// Progress reporting on the terminal
#[derive(Debug, Default)]
pub struct ScootflashProgress {
    pb: Option<ProgressBar>,
}

impl ProgressCallbacks for ScootflashProgress {
    fn init(&mut self, profile: &ScooterProfile) {
        let pb = ProgressBar::new_spinner()
            .with_style(
                ProgressStyle::default_spinner()
                    .template("{spinner} [{elapsed_precise}] {prefix}: {msg}")
                    .unwrap(),
            )
            .with_prefix(profile.model.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        self.pb = Some(pb);
    }

    fn update(&mut self, state: &FlashState) {
        if let Some(ref pb) = self.pb {
            pb.set_message(state.to_string());
        }
    }

    fn finish(&mut self, succeeded: bool) {
        if let Some(ref pb) = self.pb {
            if succeeded {
                pb.finish_with_message("Succeeded");
            } else {
                pb.abandon();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_selectors() {
        assert_eq!("dummy".parse::<ProbeSelector>(), Ok(ProbeSelector::Dummy));
        assert_eq!(
            "0483:3748".parse::<ProbeSelector>(),
            Ok(ProbeSelector::Usb(DeviceHandle {
                vid: 0x0483,
                pid: 0x3748,
                serial_number: None
            }))
        );
        assert_eq!(
            "0x0483:374b:066DFF".parse::<ProbeSelector>(),
            Ok(ProbeSelector::Usb(DeviceHandle {
                vid: 0x0483,
                pid: 0x374b,
                serial_number: Some("066DFF".into())
            }))
        );
        assert!("0483".parse::<ProbeSelector>().is_err());
        assert!("stlink".parse::<ProbeSelector>().is_err());
    }

    #[test]
    fn clone_chip_defaults_follow_model() {
        use clap::Parser;

        #[derive(Parser)]
        struct Cli {
            #[clap(flatten)]
            unit: UnitArgs,
        }

        let unit = |args: &[&str]| {
            Cli::parse_from(std::iter::once("scootflash").chain(args.iter().copied())).unit
        };

        assert!(substitute_chip(&unit(&[]), Model::G2));
        assert!(!substitute_chip(&unit(&["--no-clone-chip"]), Model::G2));
        assert!(!substitute_chip(&unit(&[]), Model::Pro2));
        assert!(substitute_chip(&unit(&["--clone-chip"]), Model::Pro2));
        assert!(!substitute_chip(
            &unit(&["--clone-chip", "--no-clone-chip"]),
            Model::Pro2
        ));
    }

    #[test]
    fn preselected_variant_skips_prompt() {
        let mut resolver = CliResolver::new(Some("STM32F103xB".into()));
        let candidates = crate::targets::known_variants(crate::targets::SubstituteChip::None);

        assert_eq!(
            resolver.resolve(candidates),
            Resolution::Selected("STM32F103xB".into())
        );
    }
}
