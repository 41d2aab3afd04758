use clap::{Parser, Subcommand};
use log::{debug, LevelFilter};
use miette::Result;
use scootflash::{
    cli::{self, config::Config, FlashArgs, SaveImageArgs},
    logging::initialize_logger,
};

#[derive(Debug, Parser)]
#[command(about, max_term_width = 100, propagate_version = true, version)]
pub struct Cli {
    #[command(subcommand)]
    subcommand: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the supported scooter models
    ListModels,
    /// Assemble and flash a personalised firmware image
    ///
    /// The controller is attached through the debug probe, its unique device
    /// id is read and the image is assembled from the bootloader, the driver
    /// firmware and the identity segment before being written in one go.
    Flash(FlashArgs),
    /// Assemble a personalised firmware image and save it to a file
    SaveImage(SaveImageArgs),
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    initialize_logger(LevelFilter::Info);

    // Attempt to parse any provided command-line arguments, or print the help
    // message and terminate if the invocation is not correct.
    let args = Cli::parse().subcommand;
    debug!("{:#?}", args);

    // Load any user configuration, if present.
    let config = Config::load()?;

    match args {
        Commands::ListModels => cli::list_models(),
        Commands::Flash(args) => cli::flash(args, &config),
        Commands::SaveImage(args) => cli::save_image(args, &config),
    }
}
