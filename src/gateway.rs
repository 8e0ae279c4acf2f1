//! HTTP/JSON bridge (§6): `/domain-api` turns REST-ish GET/POST traffic into an
//! operation dispatched through a [`ModelController`], rendering the same
//! [`Envelope`] the wire protocol renders rather than inventing a second response
//! shape. An external collaborator, not the primary interface — but it still carries
//! the same tracing and error taxonomy as the rest of the crate.

use std::collections::HashMap;
use std::io;

use axum::body::Bytes;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::Engine as _;
use tracing::{instrument, warn};

use crate::address::{PathAddress, PathElement};
use crate::controller::{Envelope, ModelController, set_address};
use crate::value::Value;
use crate::wire::codec::{read_value, write_value};

const BASE_PATH: &str = "/domain-api";
const DMR_CONTENT_TYPE: &str = "application/dmr-encoded";

/// Shared state behind the gateway's router: just the controller every request is
/// dispatched against.
#[derive(Clone)]
pub struct GatewayState {
    controller: ModelController,
}

impl GatewayState {
    #[must_use]
    pub fn new(controller: ModelController) -> Self {
        Self { controller }
    }
}

/// Builds the `/domain-api` router. GET and POST are the only methods wired up;
/// axum answers everything else on these routes with 405 on its own. CORS is
/// permissive (`Access-Control-Allow-Origin: *`) on every response, matching an
/// externally-facing management API meant to be driven from a browser console.
#[must_use]
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route(BASE_PATH, get(get_root).post(post_operation))
        .route(&format!("{BASE_PATH}/*path"), get(get_resource).post(post_operation))
        .with_state(state)
        .layer(middleware::from_fn(allow_any_origin))
}

async fn allow_any_origin(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

#[instrument(skip(state, headers))]
async fn get_root(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    handle_get(&state, "", params, &headers).await
}

#[instrument(skip(state, headers), fields(path = %path))]
async fn get_resource(
    State(state): State<GatewayState>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    handle_get(&state, &path, params, &headers).await
}

async fn handle_get(
    state: &GatewayState,
    path: &str,
    mut params: HashMap<String, String>,
    headers: &HeaderMap,
) -> Response {
    let address = match parse_path_address(path) {
        Ok(address) => address,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    let operation_name = params.remove("operation").unwrap_or_else(|| "read-resource".to_string());
    let recursive = params
        .remove("recursive")
        .map(|raw| raw.eq_ignore_ascii_case("true") || raw == "1");
    let mut operation = Value::object();
    set_address(&mut operation, &address);
    {
        let fields = operation.as_object_mut().expect("just normalized to object");
        fields.set("operation", Value::from(operation_name.as_str()));
        if operation_name == "read-resource" {
            fields.set("recursive", Value::Bool(recursive.unwrap_or(false)));
        }
        for (key, value) in params {
            fields.set(key, Value::from(value));
        }
    }

    let envelope = state.controller.execute(operation).await;
    render_envelope(envelope, wants_binary(headers)).await
}

#[instrument(skip(state, headers, body))]
async fn post_operation(State(state): State<GatewayState>, headers: HeaderMap, body: Bytes) -> Response {
    let operation = match parse_operation_body(&headers, &body).await {
        Ok(operation) => operation,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };
    let envelope = state.controller.execute(operation).await;
    render_envelope(envelope, wants_binary(&headers)).await
}

/// Splits `/type/name/type/name…` into `(type,name)` address pairs. An odd number
/// of segments has no well-formed pairing and is rejected.
fn parse_path_address(path: &str) -> Result<PathAddress, String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() % 2 != 0 {
        return Err("address path must contain type/name pairs (an even segment count)".to_string());
    }
    let elements = segments
        .chunks(2)
        .map(|pair| PathElement::new(pair[0], pair[1]))
        .collect::<Vec<_>>();
    Ok(PathAddress::from_elements(elements))
}

/// A POST body is either JSON, or base64-encoded binary when
/// `Content-Type: application/dmr-encoded` selects the wire codec.
async fn parse_operation_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, String> {
    let is_binary = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.eq_ignore_ascii_case(DMR_CONTENT_TYPE));

    if is_binary {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|err| format!("invalid base64 body: {err}"))?;
        let mut cursor = io::Cursor::new(decoded);
        read_value(&mut cursor)
            .await
            .map_err(|err| format!("invalid binary-encoded operation: {err}"))
    } else {
        serde_json::from_slice(body).map_err(|err| format!("invalid JSON operation: {err}"))
    }
}

/// `Accept: application/dmr-encoded` selects binary encoding on the response.
fn wants_binary(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.eq_ignore_ascii_case(DMR_CONTENT_TYPE))
}

async fn render_envelope(envelope: Envelope, binary: bool) -> Response {
    let status = match &envelope {
        Envelope::Complete { .. } | Envelope::Cancelled => StatusCode::OK,
        Envelope::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = match &envelope {
        Envelope::Complete { result, .. } => result.clone(),
        Envelope::Failed { .. } | Envelope::Cancelled => envelope.to_value(),
    };
    encode_response(status, &body, binary).await
}

async fn encode_response(status: StatusCode, value: &Value, binary: bool) -> Response {
    if binary {
        let mut buf = Vec::new();
        if let Err(err) = write_value(&mut buf, value).await {
            warn!(error = %err, "failed to binary-encode gateway response");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode response body");
        }
        let mut response = (status, buf).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(DMR_CONTENT_TYPE));
        response
    } else {
        let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        let mut response = (status, json).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let mut envelope = Value::object();
    {
        let fields = envelope.as_object_mut().expect("just constructed");
        fields.set("outcome", Value::from("failed"));
        fields.set("failure-description", Value::from(message));
    }
    let json = serde_json::to_string(&envelope).unwrap_or_else(|_| "null".to_string());
    let mut response = (status, json).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_address_pairs_segments() {
        let address = parse_path_address("subsystem/web/connector/http").unwrap();
        let elements = address.elements();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].key, "subsystem");
        assert_eq!(elements[0].value, "web");
        assert_eq!(elements[1].key, "connector");
        assert_eq!(elements[1].value, "http");
    }

    #[test]
    fn path_address_rejects_odd_segment_count() {
        assert!(parse_path_address("subsystem/web/connector").is_err());
    }

    #[test]
    fn empty_path_is_root() {
        let address = parse_path_address("").unwrap();
        assert!(address.is_root());
    }
}
