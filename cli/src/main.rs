use std::{path::PathBuf, process::ExitCode};

use ai_draw::{VERBOSE_LOG_FILTERS, cli::Cli, load_settings, save_settings};
use clap::Parser;
use color_eyre::Result;
use engine::GenerationOrchestrator;
use log::{LevelFilter, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    color_eyre::install().ok();

    match run(cli).await {
        Ok(path) => {
            println!("Saved image to {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    if verbose {
        let mut builder = pretty_env_logger::formatted_builder();
        builder.filter_level(LevelFilter::Info);
        for (module, level) in VERBOSE_LOG_FILTERS {
            builder.filter_module(module, *level);
        }
        builder.init();
    } else {
        pretty_env_logger::init();
    }
}

async fn run(cli: Cli) -> Result<PathBuf> {
    let mut settings = load_settings()?;
    settings.apply(&cli);
    if cli.save_config {
        let path = save_settings(&settings)?;
        info!("saved settings to {}", path.display());
    }

    let config = settings.generation_config(cli.api_key.as_deref())?;
    let request = settings.generation_request(&cli);
    let orchestrator = GenerationOrchestrator::new(config)?;

    let mut handle = orchestrator.spawn(request);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = handle.status.recv() => match event {
                Some(event) if cli.verbose => println!("Status: {event}"),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("interrupted, canceling");
                interrupted = true;
                handle.cancel();
            }
        }
    }

    Ok(handle.join().await?)
}
