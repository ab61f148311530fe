use std::process::ExitCode;

use tracing::error;

mod app;
mod entities;

fn main() -> ExitCode {
    match app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "game_exited_with_error");
            ExitCode::FAILURE
        }
    }
}
