use std::fmt::{Display, Formatter};

use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use serde::{Deserialize, Serialize};

/// Header carrying the already-authenticated user, set by the auth layer in
/// front of this service.
pub const ACTOR_HEADER: &str = "X-Actor";

/// Name recorded for changes the server makes on its own, e.g. automatic closing.
pub const SYSTEM_ACTOR: &str = "system";

/// The user on whose behalf an operation runs. Recorded in audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn system() -> Self {
        Self::new(SYSTEM_ACTOR)
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub enum ActorError {
    Missing,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Actor {
    type Error = ActorError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.headers().get_one(ACTOR_HEADER).map(str::trim) {
            Some(name) if !name.is_empty() => Outcome::Success(Actor::new(name)),
            _ => Outcome::Error((Status::Unauthorized, ActorError::Missing)),
        }
    }
}
