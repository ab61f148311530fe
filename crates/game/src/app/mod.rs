mod bootstrap;
mod save_store;
mod session;

use engine::run_app;

pub(crate) use bootstrap::BootstrapError;

/// Builds the session for the selected level and hands it to the window loop
/// until the player quits.
pub(crate) fn run() -> Result<(), BootstrapError> {
    let wiring = bootstrap::build_app()?;
    run_app(wiring.config, wiring.scene)?;
    Ok(())
}
