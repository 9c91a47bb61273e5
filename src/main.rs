use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use ratatui::DefaultTerminal;
use tracing::{debug, error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod controller;
mod domain;
mod inputter;
mod model;
mod pipeline;
mod record;
mod source;
mod table;
mod ui;

use config::{Args, UTConfig};
use controller::Controller;
use domain::UTError;
use model::{Model, Status};
use source::RecordSource;
use ui::TableUI;

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Err(e) => {
            error!("Terminating: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(args: &Args) -> Result<(), UTError> {
    let config = UTConfig::load(args)?;
    init_logging(&config, args.verbose)?;
    info!("Starting ut!");
    debug!("Resolved config: {config:?}");

    // A single worker is enough for the one request per load
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    let source = RecordSource::from_config(&config)?;
    let mut model = Model::init(&config)?.with_source(source, runtime.handle().clone());
    model.start_fetch();

    let mut ui = TableUI::new();
    let controller = Controller::new(&config);

    let mut terminal = ratatui::init();
    let result = main_loop(&mut terminal, &mut model, &mut ui, &controller);
    ratatui::restore();

    info!("Bye!");
    result
}

fn main_loop(
    terminal: &mut DefaultTerminal,
    model: &mut Model,
    ui: &mut TableUI,
    controller: &Controller,
) -> Result<(), UTError> {
    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(model)?;
        model.update(message)?;
    }
    Ok(())
}

fn init_logging(config: &UTConfig, verbose: u8) -> Result<(), UTError> {
    let filter = match verbose {
        0 => "ut=info",
        1 => "ut=debug",
        _ => "ut=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // The terminal belongs to the table, logs go to a file
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}
