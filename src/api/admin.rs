use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::{ElectionClosers, Engine},
    error::Result,
    model::{
        api::{
            ballot::{BallotDescription, BallotLookup, BallotPosition},
            election::{
                CandidateDescription, CandidateSpec, DelegateDescription, DelegateSpec,
                ElectionDescription, ElectionSpec, PositionDescription, PositionSpec,
            },
        },
        common::{actor::Actor, election::ElectionId},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        get_elections,
        get_election,
        modify_election,
        add_position,
        get_positions,
        add_candidate,
        enroll_delegate,
        start_election,
        close_election,
        cancel_election,
        get_active_election,
        set_active_election,
        reset_active_election,
        void_ballot,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    actor: Actor,
    spec: Json<ElectionSpec>,
    engine: &State<Engine>,
) -> Result<Json<ElectionDescription>> {
    let election = engine.create_election(spec.into_inner(), &actor).await?;
    Ok(Json(election.into()))
}

#[get("/elections")]
async fn get_elections(engine: &State<Engine>) -> Result<Json<Vec<ElectionDescription>>> {
    let elections = engine.elections().await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/elections/<election_id>")]
async fn get_election(
    election_id: ElectionId,
    engine: &State<Engine>,
) -> Result<Json<ElectionDescription>> {
    Ok(Json(engine.election(election_id).await?.into()))
}

#[put("/elections/<election_id>", data = "<spec>", format = "json")]
async fn modify_election(
    actor: Actor,
    election_id: ElectionId,
    spec: Json<ElectionSpec>,
    engine: &State<Engine>,
) -> Result<Json<ElectionDescription>> {
    let election = engine
        .update_election(election_id, spec.into_inner(), &actor)
        .await?;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/positions", data = "<spec>", format = "json")]
async fn add_position(
    actor: Actor,
    election_id: ElectionId,
    spec: Json<PositionSpec>,
    engine: &State<Engine>,
) -> Result<Json<PositionDescription>> {
    let position = engine
        .add_position(election_id, spec.into_inner(), &actor)
        .await?;
    Ok(Json(position.into()))
}

/// Positions with their candidates, for any election.
#[get("/elections/<election_id>/positions")]
async fn get_positions(
    election_id: ElectionId,
    engine: &State<Engine>,
) -> Result<Json<Vec<BallotPosition>>> {
    let positions = engine.positions(election_id).await?;
    let candidates = engine.candidates(election_id).await?;
    Ok(Json(BallotPosition::group(&positions, &candidates)))
}

#[post("/elections/<election_id>/candidates", data = "<spec>", format = "json")]
async fn add_candidate(
    actor: Actor,
    election_id: ElectionId,
    spec: Json<CandidateSpec>,
    engine: &State<Engine>,
) -> Result<Json<CandidateDescription>> {
    let candidate = engine
        .add_candidate(election_id, spec.into_inner(), &actor)
        .await?;
    Ok(Json(candidate.into()))
}

#[post("/elections/<election_id>/delegates", data = "<spec>", format = "json")]
async fn enroll_delegate(
    actor: Actor,
    election_id: ElectionId,
    spec: Json<DelegateSpec>,
    engine: &State<Engine>,
) -> Result<Json<DelegateDescription>> {
    let delegate = engine
        .enroll_delegate(election_id, spec.into_inner(), &actor)
        .await?;
    Ok(Json(delegate.into()))
}

#[post("/elections/<election_id>/start")]
async fn start_election(
    actor: Actor,
    election_id: ElectionId,
    engine: &State<Engine>,
    closers: &State<ElectionClosers>,
) -> Result<Json<ElectionDescription>> {
    let election = engine.start_election(election_id, &actor).await?;
    closers.schedule_election(&election).await;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/close")]
async fn close_election(
    actor: Actor,
    election_id: ElectionId,
    engine: &State<Engine>,
    closers: &State<ElectionClosers>,
) -> Result<Json<ElectionDescription>> {
    let election = engine.close_election(election_id, &actor).await?;
    closers.cancel_election(election_id).await;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/cancel")]
async fn cancel_election(
    actor: Actor,
    election_id: ElectionId,
    engine: &State<Engine>,
    closers: &State<ElectionClosers>,
) -> Result<Json<ElectionDescription>> {
    let election = engine.cancel_election(election_id, &actor).await?;
    closers.cancel_election(election_id).await;
    Ok(Json(election.into()))
}

#[get("/active-election")]
async fn get_active_election(engine: &State<Engine>) -> Result<Json<ElectionDescription>> {
    Ok(Json(engine.active_election().await?.into()))
}

#[put("/active-election/<election_id>")]
async fn set_active_election(
    actor: Actor,
    election_id: ElectionId,
    engine: &State<Engine>,
) -> Result<Json<ElectionDescription>> {
    let election = engine.set_active_election(election_id, &actor).await?;
    Ok(Json(election.into()))
}

#[delete("/active-election")]
async fn reset_active_election(actor: Actor, engine: &State<Engine>) -> Result<()> {
    engine.reset_active_election(&actor).await
}

#[post("/ballots/void", data = "<lookup>", format = "json")]
async fn void_ballot(
    actor: Actor,
    lookup: Json<BallotLookup>,
    engine: &State<Engine>,
) -> Result<Json<BallotDescription>> {
    let ballot = engine.void_ballot(&lookup.control_number, &actor).await?;
    Ok(Json(ballot.into()))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::http::{uri::Origin, Status};
    use rocket::local::asynchronous::Client;

    use super::*;
    use crate::api::testing::{coordinator, error_code};
    use crate::engine::fixtures::Seeded;
    use crate::model::common::{ballot::BallotStatus, election::ElectionStatus, now};

    async fn create(client: &Client, spec: &ElectionSpec) -> ElectionDescription {
        let response = client
            .post(uri!(create_election))
            .header(coordinator())
            .json(spec)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        response.into_json().await.unwrap()
    }

    async fn transition(client: &Client, uri: Origin<'_>) -> (Status, Option<String>) {
        let response = client.post(uri).header(coordinator()).dispatch().await;
        let status = response.status();
        if status == Status::Ok {
            (status, None)
        } else {
            (status, Some(error_code(response).await))
        }
    }

    #[backend_test]
    async fn create_get_and_list(client: Client) {
        let created = create(&client, &ElectionSpec::example()).await;
        assert_eq!(created.status, ElectionStatus::Scheduled);
        assert_eq!(created.name, ElectionSpec::example().name);

        let response = client.get(uri!(get_election(created.id))).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_json::<ElectionDescription>().await.unwrap(), created);

        let response = client.get(uri!(get_elections)).dispatch().await;
        let all: Vec<ElectionDescription> = response.into_json().await.unwrap();
        assert_eq!(all, vec![created]);

        let response = client.get(uri!(get_election(99))).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(error_code(response).await, "NOT_FOUND");
    }

    #[backend_test]
    async fn mutations_need_an_actor(client: Client, engine: Engine) {
        let response = client
            .post(uri!(create_election))
            .json(&ElectionSpec::example())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert!(engine.elections().await.unwrap().is_empty());
    }

    #[backend_test]
    async fn invalid_specs_are_bad_requests(client: Client) {
        let mut spec = ElectionSpec::example();
        spec.max_attendees = Some(0);
        let response = client
            .post(uri!(create_election))
            .header(coordinator())
            .json(&spec)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(error_code(response).await, "INVALID_ARGUMENT");
    }

    #[backend_test]
    async fn setup_then_start(client: Client) {
        let election = create(&client, &ElectionSpec::example()).await;
        let id = election.id;

        let (status, code) = transition(&client, uri!(start_election(id))).await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(code.as_deref(), Some("NO_DELEGATES"));

        let response = client
            .post(uri!(add_position(id)))
            .header(coordinator())
            .json(&PositionSpec::example("Chair", 1))
            .dispatch()
            .await;
        let position: PositionDescription = response.into_json().await.unwrap();
        assert_eq!(position.election_id, id);

        let response = client
            .post(uri!(add_candidate(id)))
            .header(coordinator())
            .json(&CandidateSpec::example(position.id, "Maria Santos"))
            .dispatch()
            .await;
        let candidate: CandidateDescription = response.into_json().await.unwrap();
        assert_eq!(candidate.position_id, position.id);

        let response = client
            .post(uri!(enroll_delegate(id)))
            .header(coordinator())
            .json(&DelegateSpec {
                name: "Ana Cruz".to_string(),
                control_number: None,
            })
            .dispatch()
            .await;
        let delegate: DelegateDescription = response.into_json().await.unwrap();
        assert!(delegate.control_number.starts_with("CN-"));
        assert_eq!(delegate.voted_at, None);

        let response = client.get(uri!(get_positions(id))).dispatch().await;
        let ballot: Vec<BallotPosition> = response.into_json().await.unwrap();
        assert_eq!(ballot.len(), 1);
        assert_eq!(ballot[0].candidates[0].id, candidate.id);

        let (status, _) = transition(&client, uri!(start_election(id))).await;
        assert_eq!(status, Status::Ok);

        // Locked from now on.
        let response = client
            .post(uri!(add_position(id)))
            .header(coordinator())
            .json(&PositionSpec::example("Auditor", 1))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_code(response).await, "ELECTION_LOCKED");
    }

    #[backend_test(scheduled)]
    async fn transitions_follow_the_state_machine(client: Client, seeded: Seeded) {
        let id = seeded.election.id;
        let (status, code) = transition(&client, uri!(close_election(id))).await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(code.as_deref(), Some("INVALID_TRANSITION"));

        assert_eq!(transition(&client, uri!(start_election(id))).await.0, Status::Ok);
        assert_eq!(transition(&client, uri!(close_election(id))).await.0, Status::Ok);
        let (status, code) = transition(&client, uri!(cancel_election(id))).await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(code.as_deref(), Some("INVALID_TRANSITION"));
    }

    #[backend_test(scheduled)]
    async fn start_schedules_closing_and_close_cancels_it(client: Client, seeded: Seeded) {
        let id = seeded.election.id;
        let mut spec = ElectionSpec::example();
        spec.start_time = Some(now());
        spec.end_time = Some(now() + Duration::hours(2));
        let response = client
            .put(uri!(modify_election(id)))
            .header(coordinator())
            .json(&spec)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let closers = client.rocket().state::<ElectionClosers>().unwrap();
        transition(&client, uri!(start_election(id))).await;
        assert!(closers.has_closer(id).await);

        transition(&client, uri!(close_election(id))).await;
        assert!(!closers.has_closer(id).await);
    }

    #[backend_test(scheduled)]
    async fn active_election_pointer(client: Client, seeded: Seeded) {
        let response = client.get(uri!(get_active_election)).dispatch().await;
        let active: ElectionDescription = response.into_json().await.unwrap();
        assert_eq!(active.id, seeded.election.id);

        let response = client
            .delete(uri!(reset_active_election))
            .header(coordinator())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let response = client.get(uri!(get_active_election)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(error_code(response).await, "NO_ACTIVE_ELECTION");

        let response = client
            .put(uri!(set_active_election(0)))
            .header(coordinator())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .put(uri!(set_active_election(seeded.election.id)))
            .header(coordinator())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[backend_test(started)]
    async fn void_ballot_lets_the_delegate_vote_again(
        client: Client,
        engine: Engine,
        seeded: Seeded,
    ) {
        engine
            .cast_vote(seeded.full_submission(0), &Actor::example())
            .await
            .unwrap();

        let lookup = BallotLookup {
            control_number: seeded.control_number(0).to_string(),
        };
        let response = client
            .post(uri!(void_ballot))
            .header(coordinator())
            .json(&lookup)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let ballot: BallotDescription = response.into_json().await.unwrap();
        assert_eq!(ballot.status, BallotStatus::Void);
        assert!(ballot.voided_at.is_some());

        let response = client
            .post(uri!(void_ballot))
            .header(coordinator())
            .json(&lookup)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(error_code(response).await, "NOT_VOTED");

        engine
            .cast_vote(seeded.full_submission(0), &Actor::example())
            .await
            .unwrap();
    }
}
