use std::io::{self, Write};
use std::process;

use fetchbind::{
    application::{batch::BatchFetcher, error::AppError},
    config::{self, Command, FetchArgs},
    infra::{error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Fetch(args) => run_fetch(settings, args).await,
    }
}

async fn run_fetch(settings: config::Settings, args: FetchArgs) -> Result<(), AppError> {
    let batch = BatchFetcher::from_settings(&settings)?;
    let reports = batch.run(&args.keys).await;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for report in &reports {
        let line = serde_json::to_string(report).map_err(InfraError::from)?;
        writeln!(out, "{line}").map_err(InfraError::from)?;
    }
    out.flush().map_err(InfraError::from)?;

    let failed = reports.iter().filter(|report| report.failed()).count();
    if failed > 0 {
        return Err(AppError::FetchFailed {
            failed,
            total: reports.len(),
        });
    }
    Ok(())
}
