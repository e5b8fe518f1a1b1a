#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod scheduled_task;
pub mod store;

use config::{ConfigFairing, DatabaseFairing};
use engine::ElectionCloserFairing;
use logging::LoggerFairing;

/// The server, configured from `Rocket.toml` and `ROCKET_*` environment variables.
///
/// Fairings run in attach order: the config must be loaded before the store
/// is chosen, and the engine must exist before closers are scheduled.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(ElectionCloserFairing)
}

/// A server on an existing engine, with default configuration.
#[cfg(test)]
pub(crate) fn rocket_for_engine(engine: engine::Engine) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .manage(config::Config::default())
        .manage(engine)
        .attach(ElectionCloserFairing)
}
