use crate::routes::imports::IDEMPOTENCY_HEADER;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

/// Fairing to log one line per HTTP request with timing.
///
/// The idempotency key is included when present so request lines can be
/// matched with the import job log lines for the same token.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let duration = request.local_cache(Instant::now).elapsed();
        let method = request.method();
        let uri = request.uri();
        let status = response.status();
        let millis = duration.as_secs_f64() * 1000.0;

        let level = match status.code {
            500..=599 => log::Level::Error,
            400..=499 => log::Level::Warn,
            _ => log::Level::Info,
        };

        match request.headers().get_one(IDEMPOTENCY_HEADER) {
            Some(key) => log::log!(
                level,
                "{} {} [key={}] -> {} ({:.2}ms)",
                method,
                uri,
                key,
                status.code,
                millis
            ),
            None => log::log!(
                level,
                "{} {} -> {} ({:.2}ms)",
                method,
                uri,
                status.code,
                millis
            ),
        }
    }
}
