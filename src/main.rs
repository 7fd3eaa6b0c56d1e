use std::process::ExitCode;

use clap::Parser;
use ledger_service::application::AppError;
use ledger_service::cli::Cli;
use ledger_service::telemetry;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            // Caller mistakes exit with 2, environmental failures with 1.
            match err.downcast_ref::<AppError>() {
                Some(app_err) if app_err.is_client_error() => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
