//! Newline-delimited JSON responses

use crate::codec::{self, StreamEvent, CONTENT_TYPE};
use crate::runtime::TurnStream;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::convert::Infallible;

/// Stream a turn's records as they are produced
pub fn ndjson_stream(stream: TurnStream) -> Response {
    let body = Body::from_stream(stream.map(|event| Ok::<_, Infallible>(codec::encode(&event))));
    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

/// A complete response holding exactly one record
pub fn ndjson_record(status: StatusCode, event: &StreamEvent) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        codec::encode(event),
    )
        .into_response()
}
