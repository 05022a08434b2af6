//! RapidAPI video download-resolution adapter.

use crate::client::http::{header_map, secret_header};
use crate::client::HttpClient;
use crate::error::CallError;
use std::collections::HashMap;

/// Pool provider id
pub const PROVIDER: &str = "RAPIDAPI";

/// One lookup of `video_id` with `key`. The answer is passed through as-is.
pub async fn resolve_video(
    http: &HttpClient,
    base_url: &str,
    path: &str,
    extra_headers: &HashMap<String, String>,
    key: &str,
    video_id: &str,
) -> Result<serde_json::Value, CallError> {
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    let mut headers = header_map(extra_headers);
    headers.insert("x-rapidapi-key", secret_header(key)?);

    http.get_json(&url, &[("videoId", video_id)], headers).await
}
