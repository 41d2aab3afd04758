//! Personalised firmware images for electric scooter controllers
//!
//! `scootflash` assembles the composite flash image of a scooter controller,
//! made up of a bootloader, the driver firmware and a per-unit identity
//! segment, and writes it to the controller through a debug probe.
//!
//! ## As an application
//!
//! [scootflash] can be installed using `cargo install`:
//!
//! ```bash
//! $ cargo install scootflash
//! ```
//!
//! ## As a library
//!
//! `scootflash` can be used as a library in other applications:
//!
//! ```toml
//! scootflash = { version = "0.1", default-features = false }
//! ```
//!
//! We add `default-features` here to disable the `cli` feature, which is
//! enabled by default. It's important to note that the cli module does not
//! provide SemVer guarantees. The debug probe transport is provided by the
//! embedding application through the [connection::DeviceSession] trait.
//!
//! [scootflash]: https://crates.io/crates/scootflash

pub use self::error::Error;

pub mod assets;
#[cfg(feature = "cli")]
pub mod cli;
pub mod connection;
pub mod error;
pub mod flasher;
pub mod image_format;
#[cfg(feature = "cli")]
pub mod logging;
pub mod progress;
pub mod targets;
