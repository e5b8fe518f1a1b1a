use std::time::Duration;

use log::{error, info, warn};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::engine::Engine;
use crate::model::mongodb::MongoStore;
use crate::store::MemoryStore;

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_auto_close() -> bool {
    true
}

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_lock_timeout_ms")]
    lock_timeout_ms: u64,
    #[serde(default = "default_auto_close")]
    pub auto_close: bool,
}

impl Config {
    /// How long a transaction waits for its locks before giving up with a conflict.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            auto_close: default_auto_close(),
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        Ok(rocket.manage(config))
    }
}

fn default_db_name() -> String {
    "coop_election".to_string()
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    #[serde(default)]
    db_uri: Option<String>,
    #[serde(default = "default_db_name")]
    db_name: String,
}

/// A fairing that picks the storage collaborator and places an [`Engine`]
/// on it into managed state.
///
/// With `db_uri` set it connects to MongoDB and prepares the database;
/// otherwise it falls back to an in-process store that forgets everything on
/// shutdown. Must be attached after [`ConfigFairing`].
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "Storage",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let lock_timeout = match rocket.state::<Config>() {
            Some(config) => config.lock_timeout(),
            None => {
                error!("Config was not available when connecting to the database");
                return Err(rocket);
            }
        };
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let engine = match config.db_uri {
            Some(db_uri) => {
                info!("Loaded database config, connecting...");
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let store = match MongoStore::prepare(client, &config.db_name).await {
                    Ok(store) => store,
                    Err(e) => {
                        error!("Failed to prepare database '{}': {e}", config.db_name);
                        return Err(rocket);
                    }
                };
                info!("...database connection online!");
                Engine::new(store.with_max_commit_time(lock_timeout))
            }
            None => {
                warn!("No `db_uri` configured; using an in-memory store, nothing will be persisted");
                Engine::new(MemoryStore::with_lock_timeout(lock_timeout))
            }
        };
        Ok(rocket.manage(engine))
    }
}
