use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, error, info, trace, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        common::{actor::Actor, election::ElectionId, election::ElectionStatus},
        db::Election,
    },
    scheduled_task::ScheduledTask,
};

use super::Engine;

/// How long a closer waits before retrying after a storage failure.
const RETRY_INTERVAL_SECONDS: i64 = 300;

type TaskMap = HashMap<ElectionId, ScheduledTask<Result<()>>>;

/// Scheduled tasks that close started elections at their end time.
///
/// Closing goes through the ordinary transition, so a closer that fires after
/// the election was closed or cancelled by hand does nothing.
#[derive(Clone)]
pub struct ElectionClosers {
    engine: Engine,
    enabled: bool,
    tasks: Arc<Mutex<TaskMap>>,
}

impl ElectionClosers {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            enabled: true,
            tasks: Default::default(),
        }
    }

    /// Closers that never schedule anything.
    pub fn disabled(engine: Engine) -> Self {
        Self {
            enabled: false,
            ..Self::new(engine)
        }
    }

    /// Is a closer scheduled for the given election?
    pub async fn has_closer(&self, election_id: ElectionId) -> bool {
        self.tasks.lock().await.contains_key(&election_id)
    }

    /// Schedule a closer for every started election with an end time.
    pub async fn schedule_elections(&self) -> Result<()> {
        for election in self.engine.elections().await? {
            self.schedule_election(&election).await;
        }
        Ok(())
    }

    /// Schedule a closer for the given election, replacing any existing one.
    ///
    /// Elections that are not started or have no end time are skipped.
    pub async fn schedule_election(&self, election: &Election) {
        if !self.enabled || election.status != ElectionStatus::Started {
            return;
        }
        let Some(end_time) = election.end_time else {
            return;
        };
        self.cancel_election(election.id).await;

        let closer = Self::closer(self.engine.clone(), election.id, self.tasks.clone());
        self.tasks
            .lock()
            .await
            .insert(election.id, ScheduledTask::at(closer, end_time));
        debug!("Election {} will close at {end_time}", election.id);
    }

    /// Drop the closer for the given election, if there is one.
    pub async fn cancel_election(&self, election_id: ElectionId) {
        let task = self.tasks.lock().await.remove(&election_id);
        if let Some(task) = task {
            if task.cancel().await {
                warn!("Closer for election {election_id} had already finished when cancelled");
            } else {
                trace!("Cancelled closer for election {election_id}");
            }
        }
    }

    /// Close the election, retrying later if storage fails.
    fn closer(
        engine: Engine,
        election_id: ElectionId,
        tasks: Arc<Mutex<TaskMap>>,
    ) -> BoxFuture<'static, Result<()>> {
        async move {
            let result = engine.close_election(election_id, &Actor::system()).await;
            match result {
                Ok(_) => {
                    tasks.lock().await.remove(&election_id);
                    info!("Election {election_id} closed at its end time");
                    Ok(())
                }
                Err(err @ (Error::Conflict(_) | Error::System(_))) => {
                    error!("Closing election {election_id} failed: {err}");
                    let retry = Self::closer(engine, election_id, tasks.clone());
                    let retry_at = Utc::now() + Duration::seconds(RETRY_INTERVAL_SECONDS);
                    tasks
                        .lock()
                        .await
                        .insert(election_id, ScheduledTask::at(retry, retry_at));
                    warn!("Closing election {election_id} will be retried in {RETRY_INTERVAL_SECONDS} seconds");
                    Err(err)
                }
                Err(err) => {
                    // Closed or cancelled by hand in the meantime.
                    tasks.lock().await.remove(&election_id);
                    debug!("Closer for election {election_id} had nothing to do: {err}");
                    Ok(())
                }
            }
        }
        .boxed()
    }
}

/// Places an [`ElectionClosers`] into managed state during ignition, with a
/// closer for every started election. Must be attached after the fairings
/// that manage [`Config`] and [`Engine`].
pub struct ElectionCloserFairing;

#[rocket::async_trait]
impl Fairing for ElectionCloserFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Closers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let auto_close = match rocket.state::<Config>() {
            Some(config) => config.auto_close,
            None => {
                error!("Config was not available when scheduling election closers");
                return Err(rocket);
            }
        };
        let engine = match rocket.state::<Engine>() {
            Some(engine) => engine,
            None => {
                error!("Engine was not available when scheduling election closers");
                return Err(rocket);
            }
        };

        info!("Scheduling election closers...");
        let closers = if auto_close {
            ElectionClosers::new(engine.clone())
        } else {
            info!("Automatic closing is disabled");
            ElectionClosers::disabled(engine.clone())
        };
        if let Err(err) = closers.schedule_elections().await {
            error!("Failed to schedule election closers: {err}");
            return Err(rocket);
        }
        info!("...election closers scheduled!");
        Ok(rocket.manage(closers))
    }
}
