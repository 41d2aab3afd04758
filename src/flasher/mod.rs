//! Write a personalised firmware image to a target device
//!
//! The [Flasher] owns a [DeviceSession] and runs one flashing attempt at a
//! time through the states of [FlashState]. Every attempt ends in a
//! [FlashReport] carrying the terminal [Outcome], the non-fatal warnings that
//! were raised along the way and the progress log.
//!
//! Nothing is written to the target before read protection is removed, and
//! cancellation is only possible up to the variant resolution. Once a
//! terminal outcome has been determined the session is detached, exactly
//! once, whatever the outcome.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

pub use self::state::FlashState;
use crate::{
    assets::BinarySource,
    connection::{DeviceHandle, DeviceSession, Resolution, TargetInfo, VariantResolver},
    error::{Asset, Error, FailureKind, SessionError, Warning},
    image_format::{
        build_composite_image, build_identity_segment, CompositeImage, DeviceUid,
        FLASH_BASE_ADDR, UID_LEN, UID_REGISTER_ADDR,
    },
    progress::{DefaultProgressCallback, ProgressCallbacks},
    targets::{known_variants, McuVariant, ScooterProfile},
};

mod state;

/// Flash settings to use when flashing a device
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct FlashSettings {
    /// Read the image back after writing and compare it
    #[serde(default)]
    pub verify: bool,
}

impl FlashSettings {
    pub const fn new(verify: bool) -> Self {
        FlashSettings { verify }
    }
}

/// Driver firmware supplied by the operator instead of the model's stock
/// driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOverride {
    /// Driver firmware already loaded into memory
    Data(Vec<u8>),
    /// Location of a third-party driver firmware
    Url(String),
}

/// Everything needed to personalise and flash one unit
#[derive(Debug, Clone, PartialEq)]
pub struct FlashRequest {
    pub profile: ScooterProfile,
    /// Flash the bootloader of the model's substitute chip family
    pub substitute_chip: bool,
    /// Serial number, written verbatim
    pub serial: Vec<u8>,
    pub odometer_km: f64,
    pub driver: Option<DriverOverride>,
}

impl FlashRequest {
    pub fn new(profile: ScooterProfile) -> Self {
        Self {
            substitute_chip: profile.model.prefers_substitute_chip(),
            profile,
            serial: Vec::new(),
            odometer_km: 0.0,
            driver: None,
        }
    }

    pub fn with_substitute_chip(mut self, substitute_chip: bool) -> Self {
        self.substitute_chip = substitute_chip;
        self
    }

    pub fn with_serial(mut self, serial: impl Into<Vec<u8>>) -> Self {
        self.serial = serial.into();
        self
    }

    pub fn with_odometer(mut self, odometer_km: f64) -> Self {
        self.odometer_km = odometer_km;
        self
    }

    pub fn with_driver(mut self, driver: DriverOverride) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Fetch a driver override given by URL into memory
    ///
    /// Done before flashing, an unreachable driver is then reported while the
    /// target is still untouched.
    pub fn load_driver<B>(mut self, source: &B) -> Result<Self, Error>
    where
        B: BinarySource + ?Sized,
    {
        if let Some(DriverOverride::Url(url)) = &self.driver {
            let data = fetch(source, Asset::Driver, url)?;
            self.driver = Some(DriverOverride::Data(data));
        }

        Ok(self)
    }

    /// Memory layout variants the target may be identified as
    pub fn known_variants(&self) -> &'static [McuVariant] {
        known_variants(self.profile.chip(self.substitute_chip))
    }
}

/// Terminal outcome of a flashing attempt
#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Failed(Error),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    /// Reason of the failure, if the attempt failed
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Succeeded => None,
            Outcome::Failed(err) => Some(failure_kind(err)),
        }
    }
}

/// Result of a flashing attempt
#[derive(Debug)]
#[non_exhaustive]
pub struct FlashReport {
    pub outcome: Outcome,
    /// Every state the attempt went through, in order
    pub states: Vec<FlashState>,
    /// Non-fatal conditions raised along the way
    pub warnings: Vec<Warning>,
    /// Human readable progress lines
    pub log: Vec<String>,
    pub target: Option<TargetInfo>,
    pub uid: Option<DeviceUid>,
    /// SHA-256 digest of the image handed to the device
    pub image_digest: Option<String>,
}

impl FlashReport {
    /// The state the attempt ended in
    pub fn final_state(&self) -> FlashState {
        self.states.last().copied().unwrap_or(FlashState::Idle)
    }

    pub fn into_result(self) -> Result<Vec<Warning>, Error> {
        match self.outcome {
            Outcome::Succeeded => Ok(self.warnings),
            Outcome::Failed(err) => Err(err),
        }
    }
}

/// State of a single flashing attempt
///
/// Created when an attempt starts and consumed into its [FlashReport], a
/// retry starts over with a new one.
struct FlashSession<'a> {
    request: &'a FlashRequest,
    progress: &'a mut dyn ProgressCallbacks,
    state: FlashState,
    states: Vec<FlashState>,
    warnings: Vec<Warning>,
    log: Vec<String>,
    target: Option<TargetInfo>,
    uid: Option<DeviceUid>,
    image_digest: Option<String>,
}

impl<'a> FlashSession<'a> {
    fn new(request: &'a FlashRequest, progress: &'a mut dyn ProgressCallbacks) -> Self {
        progress.init(&request.profile);

        Self {
            request,
            progress,
            state: FlashState::Idle,
            states: vec![FlashState::Idle],
            warnings: Vec::new(),
            log: Vec::new(),
            target: None,
            uid: None,
            image_digest: None,
        }
    }

    fn transition(&mut self, state: FlashState) {
        debug!("{} -> {}", self.state, state);

        self.state = state;
        self.states.push(state);
        self.progress.update(&state);
    }

    fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");

        self.progress.message(&line);
        self.log.push(line);
    }

    fn warn(&mut self, warning: Warning) {
        let line = match std::error::Error::source(&warning) {
            Some(source) => format!("{warning}: {source}"),
            None => warning.to_string(),
        };
        warn!("{line}");

        self.progress.message(&line);
        self.log.push(line);
        self.warnings.push(warning);
    }

    fn finish(mut self, result: Result<(), Error>) -> FlashReport {
        let outcome = match result {
            Ok(()) => {
                self.transition(FlashState::Succeeded);
                self.log("Flashing completed successfully");
                Outcome::Succeeded
            }
            Err(err) => {
                let kind = failure_kind(&err);
                error!("Flashing failed: {err}");

                self.transition(FlashState::Failed(kind));
                self.log.push(format!("Flashing failed ({kind}): {err}"));
                Outcome::Failed(err)
            }
        };

        self.progress.finish(outcome.is_success());

        FlashReport {
            outcome,
            states: self.states,
            warnings: self.warnings,
            log: self.log,
            target: self.target,
            uid: self.uid,
            image_digest: self.image_digest,
        }
    }
}

/// Forwards resolution requests, recording the suspension in the attempt's
/// state history
struct ObservedResolver<'r, 's, 'a> {
    inner: &'r mut dyn VariantResolver,
    flash: &'s mut FlashSession<'a>,
}

impl VariantResolver for ObservedResolver<'_, '_, '_> {
    fn resolve(&mut self, candidates: &[McuVariant]) -> Resolution {
        self.flash.transition(FlashState::Resolving);

        let ids = candidates.iter().map(|v| v.type_id).collect::<Vec<_>>();
        self.flash
            .log(format!("Target matches several variants: {}", ids.join(", ")));

        self.inner.resolve(candidates)
    }
}

/// Assemble and write personalised firmware images through a device session
#[derive(Debug)]
pub struct Flasher<S, B> {
    /// Session with the target, owned by one attempt at a time
    session: S,
    /// Source of the bootloader, identity template and driver binaries
    source: B,
    settings: FlashSettings,
}

impl<S, B> Flasher<S, B>
where
    S: DeviceSession,
    B: BinarySource,
{
    pub fn new(session: S, source: B, settings: FlashSettings) -> Self {
        Self {
            session,
            source,
            settings,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn settings(&self) -> FlashSettings {
        self.settings
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Run one flashing attempt against the device behind `handle`
    ///
    /// Ambiguous target identification is resolved through `resolver`. The
    /// attempt always runs to a terminal state; the returned report tells
    /// which one.
    pub fn flash(
        &mut self,
        handle: &DeviceHandle,
        request: &FlashRequest,
        resolver: &mut dyn VariantResolver,
        progress: Option<&mut dyn ProgressCallbacks>,
    ) -> FlashReport {
        let mut default_progress = DefaultProgressCallback;
        let progress: &mut dyn ProgressCallbacks = match progress {
            Some(progress) => progress,
            None => &mut default_progress,
        };

        let mut flash = FlashSession::new(request, progress);
        flash.log(format!(
            "Flashing {} ({} bootloader, {})",
            request.profile.model,
            request.profile.family,
            request.profile.chip(request.substitute_chip)
        ));

        flash.transition(FlashState::RequestingDevice);
        let result = self.run(&mut flash, handle, resolver);

        // The device is released whatever the outcome
        match self.session.detach() {
            Ok(()) => flash.log("Detached from the device"),
            Err(err) => flash.warn(Warning::Detach(err)),
        }
        if result.is_ok() {
            flash.transition(FlashState::Detached);
        }

        flash.finish(result)
    }

    fn run(
        &mut self,
        flash: &mut FlashSession<'_>,
        handle: &DeviceHandle,
        resolver: &mut dyn VariantResolver,
    ) -> Result<(), Error> {
        self.attach(flash, handle)?;
        self.identify(flash, resolver)?;
        self.remove_protection(flash);

        let image = self.assemble(flash)?;
        self.write(flash, &image)?;

        flash.transition(FlashState::ResettingPost);
        match self.session.reset(false) {
            Ok(()) => flash.log("Device reset, running the new firmware"),
            Err(err) => flash.warn(Warning::PostFlashReset(err)),
        }

        Ok(())
    }

    fn attach(&mut self, flash: &mut FlashSession<'_>, handle: &DeviceHandle) -> Result<(), Error> {
        flash.transition(FlashState::Attaching);
        flash.log(format!("Attaching to the device through probe {handle}"));

        self.session.attach(handle).map_err(Error::Attach)?;

        // Halt the core in a known state before touching memory
        self.session.reset(true).map_err(Error::Attach)?;

        Ok(())
    }

    fn identify(
        &mut self,
        flash: &mut FlashSession<'_>,
        resolver: &mut dyn VariantResolver,
    ) -> Result<(), Error> {
        flash.transition(FlashState::DetectingTarget);

        let known = flash.request.known_variants();
        let mut observed = ObservedResolver {
            inner: resolver,
            flash: &mut *flash,
        };

        let target = self
            .session
            .detect_target(known, &mut observed)
            .map_err(|err| match err {
                SessionError::ResolutionCancelled => Error::UserCancelled,
                err => Error::Attach(err),
            })?;

        flash.transition(FlashState::Identified);
        flash.log(format!(
            "Target identified as {} ({} KiB flash, {} KiB SRAM)",
            target.variant.type_id, target.variant.flash_size_kib, target.variant.sram_size_kib
        ));
        flash.target = Some(target);

        Ok(())
    }

    /// Failures of the removal are not fatal, the flash controller may have
    /// been unlocked regardless
    fn remove_protection(&mut self, flash: &mut FlashSession<'_>) {
        flash.transition(FlashState::RemovingProtection);

        match self.session.remove_read_protection() {
            Ok(true) => flash.log("Read protection removed"),
            Ok(false) => flash.warn(Warning::ProtectionRemovalRefused),
            Err(err) => flash.warn(Warning::ProtectionRemoval(err)),
        }
    }

    fn assemble(&mut self, flash: &mut FlashSession<'_>) -> Result<CompositeImage, Error> {
        flash.transition(FlashState::AssemblingImage);

        // Unlocking may reset peripheral state
        self.session.reset(true).map_err(Error::Identify)?;

        let uid = self.read_uid()?;
        flash.log(format!("Device UID: {uid}"));
        flash.uid = Some(uid);

        let request = flash.request;
        match &request.driver {
            Some(DriverOverride::Data(_)) => flash.log("Using the supplied driver firmware"),
            Some(DriverOverride::Url(url)) => {
                flash.log(format!("Using third-party driver firmware from {url}"))
            }
            None => {}
        }

        let image = assemble_image(&self.source, request, &uid)?;

        let digest = image.digest();
        flash.log(format!(
            "Composite image assembled: {} bytes, sha256 {digest}",
            image.len()
        ));
        flash.image_digest = Some(digest);

        Ok(image)
    }

    fn write(&mut self, flash: &mut FlashSession<'_>, image: &CompositeImage) -> Result<(), Error> {
        flash.transition(FlashState::Writing);
        flash.log(format!(
            "Writing {} bytes to {:#010x}",
            image.len(),
            FLASH_BASE_ADDR
        ));

        self.session
            .write_flash(FLASH_BASE_ADDR, image.as_bytes())
            .map_err(Error::Flash)?;

        if self.settings.verify {
            flash.transition(FlashState::Verifying);

            let written = self
                .session
                .read_memory(FLASH_BASE_ADDR, image.len() as u32)
                .map_err(Error::Flash)?;

            if let Some(offset) = mismatch(image.as_bytes(), &written) {
                return Err(Error::VerifyFailed { offset });
            }

            flash.log("Flash content verified");
        }

        Ok(())
    }

    fn read_uid(&mut self) -> Result<DeviceUid, Error> {
        let bytes = self
            .session
            .read_memory(UID_REGISTER_ADDR, UID_LEN as u32)
            .map_err(Error::Identify)?;

        let bytes = <[u8; UID_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
            Error::Identify(SessionError::Transfer(format!(
                "expected {UID_LEN} bytes of device id, received {}",
                bytes.len()
            )))
        })?;

        Ok(DeviceUid::from_probe_bytes(bytes))
    }
}

/// Fetch the segments of a request and assemble its composite image for the
/// device with the given `uid`
pub fn assemble_image<B>(
    source: &B,
    request: &FlashRequest,
    uid: &DeviceUid,
) -> Result<CompositeImage, Error>
where
    B: BinarySource + ?Sized,
{
    let profile = &request.profile;

    let bootloader = fetch(
        source,
        Asset::Bootloader,
        profile.bootloader(request.substitute_chip),
    )?;
    let template = fetch(source, Asset::IdentityTemplate, profile.identity_template)?;
    let driver = match &request.driver {
        Some(DriverOverride::Data(data)) => data.clone(),
        Some(DriverOverride::Url(url)) => fetch(source, Asset::Driver, url)?,
        None => fetch(source, Asset::Driver, profile.default_driver_url)?,
    };

    let identity = build_identity_segment(
        profile,
        &template,
        uid,
        &request.serial,
        request.odometer_km,
    )?;
    let image = build_composite_image(&bootloader, &driver, &identity, profile.data_segment_offset)?;

    Ok(image)
}

fn fetch<B>(source: &B, asset: Asset, location: &str) -> Result<Vec<u8>, Error>
where
    B: BinarySource + ?Sized,
{
    debug!("Fetching {asset} from {location}");

    source.fetch(location).map_err(|source| Error::Fetch {
        asset,
        location: location.to_owned(),
        source,
    })
}

fn failure_kind(err: &Error) -> FailureKind {
    err.kind().unwrap_or(FailureKind::Assembly)
}

/// Offset of the first byte that differs, including a length difference
fn mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a != b)
        .or_else(|| (expected.len() != actual.len()).then(|| expected.len().min(actual.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::Model;

    #[test]
    fn mismatch_offsets() {
        assert_eq!(mismatch(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(mismatch(&[1, 2, 3], &[1, 0, 3]), Some(1));
        assert_eq!(mismatch(&[1, 2, 3], &[1, 2]), Some(2));
    }

    #[test]
    fn request_defaults_follow_model() {
        let request = FlashRequest::new(Model::G2.profile());
        assert!(request.substitute_chip);
        assert_eq!(request.known_variants()[0].type_id, "AT32F415x8");

        let request = FlashRequest::new(Model::Pro2.profile());
        assert!(!request.substitute_chip);
        assert_eq!(request.known_variants()[0].type_id, "STM32F103x8");
    }
}
