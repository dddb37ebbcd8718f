//! HTTP front end for the license proxy.
//!
//! Endpoints:
//! - `GET /` ping.
//! - `POST /license` relays a raw client request and answers with the
//!   decoded license bytes.
//! - `POST /parse` sends a raw license request parse-only and answers with
//!   the service's JSON response.
//!
//! When `serve.users` is configured every POST must carry a known
//! `X-Secret-Key` header.
use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::json;

use crate::config::{ProxyConfig, ServeUser};
use crate::error::{Error, Result};
use crate::proxy::Proxy;
use crate::response::LicenseResponse;

#[derive(Clone)]
struct ServeState {
    proxy: Proxy,
    users: HashMap<String, ServeUser>,
}

/// Start the HTTP front end.
pub async fn run(config: ProxyConfig, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // The blocking client owns a runtime of its own and must be built off
    // the async workers.
    let users = config.serve.users.clone();
    let proxy = tokio::task::spawn_blocking(move || Proxy::from_config(&config))
        .await
        .map_err(|e| Error::Config(format!("proxy setup failed: {}", e)))??;
    let state = ServeState { proxy, users };
    if state.users.is_empty() {
        warn!("No users configured, authentication is disabled");
    }

    let app = axum::Router::new()
        .route("/", get(ping))
        .route("/license", post(license))
        .route("/parse", post(parse))
        .with_state(state);

    info!("Listening on http://{}", addr);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn ping() -> Response {
    json_response(
        StatusCode::OK,
        Json(json!({
            "status": 200,
            "message": "Pong!"
        })),
    )
}

async fn license(State(state): State<ServeState>, headers: HeaderMap, body: Bytes) -> Response {
    let user = match authorize(&state.users, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Request body is empty.");
    }
    info!("[{}] License request ({} bytes)", user, body.len());

    let proxy = state.proxy.clone();
    let result = tokio::task::spawn_blocking(move || {
        let response = proxy.get_license(&body)?;
        // Certificate responses come back whatever their status.
        if !response.is_ok() {
            return Err(Error::AuthorityRejected(response.status));
        }
        response.license_bytes()
    })
    .await;

    match result {
        Ok(Ok(license)) => {
            let mut response = license.into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            json_response(StatusCode::OK, response)
        }
        Ok(Err(e)) => proxy_error_response(&user, e),
        Err(e) => {
            error!("[{}] License task failed: {}", user, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error.")
        }
    }
}

async fn parse(State(state): State<ServeState>, headers: HeaderMap, body: Bytes) -> Response {
    let user = match authorize(&state.users, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Request body is empty.");
    }

    let proxy = state.proxy.clone();
    let result: std::result::Result<Result<LicenseResponse>, _> =
        tokio::task::spawn_blocking(move || proxy.parse_license(&body)).await;

    match result {
        Ok(Ok(response)) => json_response(StatusCode::OK, Json(response)),
        Ok(Err(e)) => proxy_error_response(&user, e),
        Err(e) => {
            error!("[{}] Parse task failed: {}", user, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error.")
        }
    }
}

/// Resolve the caller's display name, or the error response to send.
fn authorize(
    users: &HashMap<String, ServeUser>,
    headers: &HeaderMap,
) -> std::result::Result<String, Response> {
    if users.is_empty() {
        return Ok("anonymous".to_string());
    }

    let Some(secret) = headers.get("X-Secret-Key").and_then(|v| v.to_str().ok()) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Secret Key is Empty.",
        ));
    };

    match users.get(secret) {
        Some(user) => Ok(user
            .username
            .clone()
            .unwrap_or_else(|| "unnamed".to_string())),
        None => Err(error_response(
            StatusCode::FORBIDDEN,
            "Secret Key is Invalid, the Key is case-sensitive.",
        )),
    }
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::AuthorityRejected(_)
        | Error::Authority(_)
        | Error::TransportFailure(_)
        | Error::DecodeFailure(_)
        | Error::Base64DecodeError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn proxy_error_response(user: &str, err: Error) -> Response {
    let status = error_status(&err);
    warn!("[{}] Request failed ({}): {}", user, status.as_u16(), err);
    error_response(status, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(
        status,
        Json(json!({
            "status": status.as_u16(),
            "message": message
        })),
    )
}

fn json_response(status: StatusCode, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    *response.status_mut() = status;
    response.headers_mut().insert(
        "Server",
        HeaderValue::from_static(concat!("widevine-proxy serve v", env!("CARGO_PKG_VERSION"))),
    );
    response
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
    use mockito::Server;

    use super::{authorize, error_status, json_response, license, run, ServeState};
    use crate::config::{ProxyConfig, ServeUser};
    use crate::error::Error;
    use crate::proxy::Proxy;

    fn state_for(server: &Server) -> ServeState {
        let yaml = format!(
            "
license_server_url: {}
provider: widevine_test
signing_key: 1ae8ccd0e7985cc0b6203a55855a1034afc252980e970ca90e5202689f947ab9
signing_iv: d58ce954203b7c9a9a9d467f59839249
",
            server.url()
        );
        let config = ProxyConfig::from_yaml_str(&yaml).expect("config");
        ServeState {
            proxy: Proxy::from_config(&config).expect("proxy"),
            users: HashMap::new(),
        }
    }

    // The proxy's blocking client must not be built or dropped on an async
    // worker, so the caller keeps its own copy of the state alive.
    fn relay_license(state: &ServeState, body: &'static [u8]) -> (StatusCode, HeaderMap, Vec<u8>) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let response = license(
                State(state.clone()),
                HeaderMap::new(),
                Bytes::from_static(body),
            )
            .await;
            let (parts, body) = response.into_parts();
            let bytes = axum::body::to_bytes(body, usize::MAX)
                .await
                .expect("body")
                .to_vec();
            (parts.status, parts.headers, bytes)
        })
    }

    fn users() -> HashMap<String, ServeUser> {
        let mut users = HashMap::new();
        users.insert(
            "s3cret".to_string(),
            ServeUser {
                username: Some("player".to_string()),
            },
        );
        users
    }

    #[test]
    fn no_users_means_no_authentication() {
        assert_eq!(
            authorize(&HashMap::new(), &HeaderMap::new()).unwrap(),
            "anonymous"
        );
    }

    #[test]
    fn secret_key_is_required() {
        let resp = authorize(&users(), &HeaderMap::new()).expect_err("missing key");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert("X-Secret-Key", HeaderValue::from_static("S3CRET"));
        let resp = authorize(&users(), &headers).expect_err("wrong key");
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        headers.insert("X-Secret-Key", HeaderValue::from_static("s3cret"));
        assert_eq!(authorize(&users(), &headers).unwrap(), "player");
    }

    #[test]
    fn upstream_failures_map_to_bad_gateway() {
        assert_eq!(
            error_status(&Error::AuthorityRejected("SIGNATURE_FAILED".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&Error::Authority("no keys".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&Error::InvalidKeyLength(3)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn responses_carry_server_header() {
        let resp = json_response(StatusCode::OK, "ok");
        assert!(resp
            .headers()
            .get("Server")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .starts_with("widevine-proxy serve v"));
    }

    #[test]
    fn rejected_certificate_request_is_bad_gateway() {
        let mut server = Server::new();
        let state = state_for(&server);
        let mock = server
            .mock("POST", "/")
            .with_body(r#"{"status":"INVALID_CERTIFICATE_REQUEST"}"#)
            .expect(1)
            .create();

        let (status, _, body) = relay_license(&state, b"\x08\x04");
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json error body");
        assert_eq!(json["status"], 502);
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("INVALID_CERTIFICATE_REQUEST"));
        mock.assert();
    }

    #[test]
    fn granted_certificate_is_returned_as_bytes() {
        let mut server = Server::new();
        let state = state_for(&server);
        let mock = server
            .mock("POST", "/")
            .with_body(r#"{"status":"OK","license":"CAIS"}"#)
            .expect(1)
            .create();

        let (status, headers, body) = relay_license(&state, b"\x08\x04");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, vec![0x08, 0x02, 0x12]);
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        mock.assert();
    }

    #[test]
    fn port_in_use_fails_before_proxy_setup() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = taken.local_addr().unwrap().port();
        let config = ProxyConfig::from_yaml_str(
            "
license_server_url: http://127.0.0.1:1/
provider: widevine_test
signing_key: 1ae8ccd0e7985cc0b6203a55855a1034afc252980e970ca90e5202689f947ab9
signing_iv: d58ce954203b7c9a9a9d467f59839249
",
        )
        .expect("config");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let result = runtime.block_on(run(config, "127.0.0.1", port));
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
