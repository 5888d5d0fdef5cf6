//! Type-safe HTTP response builders for status codes the thin REST surface
//! needs beyond axum's default 200: `201 Created`, `202 Accepted` (async
//! trigger endpoints per spec §6), and `204 No Content`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// `201 Created`, optionally with a `Location` header.
#[derive(Debug)]
pub struct Created<T> {
    data: T,
    location: Option<String>,
}

impl<T> Created<T> {
    pub fn new(data: T) -> Self {
        Self { data, location: None }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::CREATED, Json(&self.data)).into_response();
        if let Some(location) = self.location {
            if let Ok(value) = HeaderValue::from_str(&location) {
                response.headers_mut().insert(header::LOCATION, value);
            }
        }
        response
    }
}

/// `202 Accepted` — used by async trigger endpoints (`/scheduler/tasks/{id}/trigger`,
/// `/recordings/cleanup/trigger`) that return immediately with an id to poll.
#[derive(Debug, Serialize)]
pub struct Accepted<T> {
    #[serde(flatten)]
    data: T,
}

impl<T> Accepted<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for Accepted<T> {
    fn into_response(self) -> Response {
        (StatusCode::ACCEPTED, Json(self)).into_response()
    }
}

/// `204 No Content`.
#[derive(Debug, Clone, Copy)]
pub struct NoContent;

impl IntoResponse for NoContent {
    fn into_response(self) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_sets_location_header() {
        let resp = Created::new(serde_json::json!({"id": 1})).with_location("/x/1").into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/x/1");
    }

    #[test]
    fn accepted_is_202() {
        let resp = Accepted::new(serde_json::json!({"execution_uid": "exe_x"})).into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }
}
