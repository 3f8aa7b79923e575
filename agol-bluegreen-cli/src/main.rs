use std::path::PathBuf;
use std::process;

use agol_bluegreen::{
    BlueGreen, Config, Error, HttpPortal, PendingOperation, Session, SwapOptions, SwapOutcome,
};
use clap::{Parser, Subcommand};
use eyre::Result;

#[derive(Parser, Debug)]
#[clap(name = "agol-bluegreen", about, version)]
struct Args {
    /// Increase output logging verbosity.
    #[clap(short, long)]
    verbose: bool,

    /// Path to the configuration file (YAML or JSON).
    #[clap(short, long, default_value = "bluegreen.yml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show which backing service is live and which is staging.
    Status,
    /// Point the view at the staging service. Run again to roll back.
    Swap {
        /// Block until an asynchronous swap has finished.
        #[clap(long)]
        wait: bool,
    },
    /// Delete all rows from the staging service.
    Truncate {
        #[clap(long)]
        wait: bool,
    },
    /// Append the rows of an uploaded portal item to the staging service.
    Append {
        /// ID of the uploaded item (e.g. a file geodatabase or CSV).
        #[clap(long)]
        item: String,
        /// Upload format of the item, e.g. "filegdb", "csv" or "geojson".
        #[clap(long)]
        format: String,
        #[clap(long)]
        wait: bool,
    },
    /// Truncate the staging service and reload it from a local dataset.
    Upsert { path: PathBuf },
}

fn main() {
    let args = Args::parse();
    simple_logger::init_with_level(if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    })
    .unwrap();

    match run(&args) {
        Ok(_) => log::info!("Success!"),
        Err(e) => {
            log::error!("Failed: {:?}", e);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load_from_file(&args.config)?.with_env_overrides();
    let anonymous = HttpPortal::new(Session::anonymous(&config.portal_url))?;
    let portal = HttpPortal::new(Session::from_config(&anonymous, &config)?)?;
    let mut bg = BlueGreen::load(&portal, portal.session(), &config)?;
    let wait = |pending: Option<PendingOperation>, should_wait: bool| -> Result<()> {
        match pending {
            Some(pending) if should_wait => {
                pending.wait(&portal, config.poll_interval(), config.poll_timeout())
            }
            Some(pending) => {
                log::info!("Operation is running asynchronously: {}", pending);
                Ok(())
            }
            None => Ok(()),
        }
    };

    match &args.command {
        Command::Status => {
            let live = bg.live().ok_or(Error::SplitUnknown)?;
            let staging = bg.staging().ok_or(Error::SplitUnknown)?;
            log::info!("Live:    {} ({})", live.color(), live.service().url());
            log::info!("Staging: {} ({})", staging.color(), staging.service().url());
            Ok(())
        }
        Command::Swap { wait: should_wait } => {
            let opts = SwapOptions {
                run_async: config.run_async,
                poll_interval: config.poll_interval(),
                poll_timeout: config.poll_timeout(),
            };
            match bg.swap(&portal, &opts)? {
                SwapOutcome::Completed => Ok(()),
                SwapOutcome::Pending(pending) => {
                    wait(Some(pending), *should_wait)?;
                    if *should_wait {
                        let split = bg.determine_split(&portal)?;
                        log::info!("Swap finished, {} is now live", split.live);
                    }
                    Ok(())
                }
            }
        }
        Command::Truncate { wait: should_wait } => {
            wait(bg.truncate_staging(&portal, config.run_async)?, *should_wait)
        }
        Command::Append {
            item,
            format,
            wait: should_wait,
        } => wait(
            bg.append_to_staging(&portal, item, format, config.run_async)?,
            *should_wait,
        ),
        Command::Upsert { path } => bg.upsert_staging(path),
    }
}
