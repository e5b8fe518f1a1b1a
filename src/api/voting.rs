use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::Engine,
    error::Result,
    model::{
        api::{
            ballot::{BallotLookup, BallotPosition, BallotSubmission},
            receipt::Receipt,
        },
        common::actor::Actor,
    },
};

pub fn routes() -> Vec<Route> {
    routes![get_ballot_candidates, cast_ballot, reprint_ballot]
}

/// The active election's ballot: every position with its candidates.
#[get("/ballot/candidates")]
async fn get_ballot_candidates(engine: &State<Engine>) -> Result<Json<Vec<BallotPosition>>> {
    Ok(Json(engine.ballot_candidates().await?))
}

#[post("/ballot/cast", data = "<submission>", format = "json")]
async fn cast_ballot(
    actor: Actor,
    submission: Json<BallotSubmission>,
    engine: &State<Engine>,
) -> Result<Json<Receipt>> {
    let receipt = engine.cast_vote(submission.into_inner(), &actor).await?;
    Ok(Json(receipt))
}

#[post("/ballot/reprint", data = "<lookup>", format = "json")]
async fn reprint_ballot(
    lookup: Json<BallotLookup>,
    engine: &State<Engine>,
) -> Result<Json<Receipt>> {
    Ok(Json(engine.reprint_ballot(&lookup.control_number).await?))
}
