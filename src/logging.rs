use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    request::{FromRequest, Outcome},
    Data, Orbit, Request, Response, Rocket,
};

use crate::model::common::actor::ACTOR_HEADER;

/// A unique identifier for a particular request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// Atomically get the next ID. Wraps around to zero after `usize::MAX`.
    pub fn next() -> RequestId {
        static REQUEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestId(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The ID is available to handlers as a request guard.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r RequestId {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(req.local_cache(RequestId::next))
    }
}

/// The line logged for an incoming request.
fn request_line(id: RequestId, req: &Request<'_>) -> String {
    let method = req.method();
    let uri = req.uri();
    match req.headers().get_one(ACTOR_HEADER) {
        Some(actor) => format!("->req{id} {method} {uri} as {actor}"),
        None => format!("->req{id} {method} {uri}"),
    }
}

/// When the request arrived, cached on first use.
#[derive(Debug, Copy, Clone)]
struct Received(Instant);

fn received(req: &Request<'_>) -> Instant {
    req.local_cache(|| Received(Instant::now())).0
}

/// The matched route's name and URI, for response lines.
fn route_label(req: &Request<'_>) -> String {
    let Some(route) = req.route() else {
        return "UNKNOWN ROUTE".to_string();
    };
    match &route.name {
        Some(name) => format!("{name} ({})", route.uri),
        None => route.uri.to_string(),
    }
}

/// Logs every request and response, tagged with the request's ID.
///
/// Response lines carry the time spent serving the request. Server errors are
/// logged at `error` and client errors at `warn`.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let scheme = if config.tls_enabled() { "https" } else { "http" };
        info!("Serving elections on {scheme}://{}:{}", config.address, config.port);
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        received(req);
        let id = *req.local_cache(RequestId::next);
        info!("{}", request_line(id, req));
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let id = req.local_cache(RequestId::next);
        let status = res.status();
        let elapsed = received(req).elapsed().as_millis();
        let line = format!("<-rsp{id} {status} {} in {elapsed}ms", route_label(req));
        match status.class() {
            StatusClass::ServerError => error!("{line}"),
            StatusClass::ClientError => warn!("{line}"),
            _ => info!("{line}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, finishing in-flight requests...");
    }
}
