//! HTTP front end: one dashboard page and one JSON endpoint.
//!
//! Handlers only read the health store; a sensor being down never turns
//! into a failed request.

use std::io::Cursor;
use std::sync::Arc;

use askama::Template;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use klimat::health::{HealthStore, SensorId};

use crate::page::{Dashboard, Limits, Snapshot};

type Body = Response<Cursor<Vec<u8>>>;

pub struct App {
    pub store: Arc<HealthStore>,
    pub limits: Limits,
    pub refresh: u32,
}

impl App {
    fn route(&self, method: &Method, url: &str) -> Body {
        let path = url.split('?').next().unwrap_or(url);
        match (method, path) {
            (Method::Get, "/") => self.index(),
            (Method::Get, "/api/sensors") => self.api(),
            _ => Response::from_string("not found").with_status_code(StatusCode(404)),
        }
    }

    fn index(&self) -> Body {
        let particulate = self.store.view(SensorId::Particulate);
        let atmospheric = self.store.view(SensorId::Atmospheric);
        match Dashboard::new(self.limits, self.refresh, &particulate, &atmospheric).render() {
            Ok(html) => with_type(Response::from_string(html), "text/html; charset=utf-8"),
            Err(e) => internal_error(&e),
        }
    }

    fn api(&self) -> Body {
        let particulate = self.store.view(SensorId::Particulate);
        let atmospheric = self.store.view(SensorId::Atmospheric);
        let snapshot = Snapshot {
            particulate: &particulate,
            atmospheric: &atmospheric,
        };
        match snapshot.to_json() {
            Ok(json) => with_type(Response::from_data(json), "application/json"),
            Err(e) => internal_error(&e),
        }
    }
}

fn with_type(response: Body, content_type: &str) -> Body {
    match Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn internal_error(e: &dyn std::fmt::Display) -> Body {
    log::error!("Render failed: {}", e);
    Response::from_string("internal error").with_status_code(StatusCode(500))
}

fn handle(app: &App, request: Request) {
    let response = app.route(request.method(), request.url());
    log::debug!("{} {} -> {}", request.method(), request.url(), response.status_code().0);
    if let Err(e) = request.respond(response) {
        log::debug!("Client went away: {}", e);
    }
}

/// Serve requests until [`Server::unblock`] wakes this thread.
pub fn http_thread(server: Arc<Server>, app: Arc<App>) {
    while let Ok(request) = server.recv() {
        handle(&app, request);
    }
    log::debug!("HTTP thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use klimat::frame::PmTriple;
    use klimat::health::{Outcome, Reading};
    use std::io::Read;

    fn app() -> App {
        App {
            store: Arc::new(HealthStore::new()),
            limits: Limits { pm25: 25.0, pm10: 50.0 },
            refresh: 5,
        }
    }

    fn body(response: Body) -> String {
        let mut out = String::new();
        response.into_reader().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn unknown_paths_are_404() {
        let app = app();
        assert_eq!(app.route(&Method::Get, "/nope").status_code(), StatusCode(404));
        assert_eq!(app.route(&Method::Post, "/").status_code(), StatusCode(404));
    }

    #[test]
    fn index_renders_with_no_data() {
        let response = app().route(&Method::Get, "/");
        assert_eq!(response.status_code(), StatusCode(200));
        assert!(body(response).contains("<title>Klimat</title>"));
    }

    #[test]
    fn query_string_is_ignored() {
        let response = app().route(&Method::Get, "/api/sensors?x=1");
        assert_eq!(response.status_code(), StatusCode(200));
    }

    #[test]
    fn api_reflects_store() {
        let app = app();
        app.store.update(
            SensorId::Particulate,
            Outcome::Success(Reading::Particulate(PmTriple { pm1: 1, pm25: 2, pm10: 3 })),
        );
        app.store.update(SensorId::Atmospheric, Outcome::Failure("no sensor".into()));

        let json = body(app.route(&Method::Get, "/api/sensors"));
        assert!(json.contains(r#""particulate":{"status":"OK","reading":{"pm1":1,"pm25":2,"pm10":3}"#));
        assert!(json.contains(r#""atmospheric":{"status":"ERR""#));
    }

    #[test]
    fn api_survives_oversized_error_text() {
        let app = app();
        let long = "x".repeat(2100);
        app.store.update(SensorId::Atmospheric, Outcome::Failure(long.clone()));
        let response = app.route(&Method::Get, "/api/sensors");
        assert_eq!(response.status_code(), StatusCode(200));
        assert!(body(response).contains(&long));

        // Control characters expand to six bytes each when escaped.
        app.store.update(SensorId::Particulate, Outcome::Failure("\u{1}".repeat(400)));
        let response = app.route(&Method::Get, "/api/sensors");
        assert_eq!(response.status_code(), StatusCode(200));
        let json = body(response);
        assert!(json.starts_with(r#"{"particulate":{"status":"ERR""#));
        assert!(json.ends_with("}}"));
    }
}
