use http::{Method, Request, Response, StatusCode};

use crate::failpoints;

const FAILAT_PREFIX: &str = "/_admin/debug/failat";

/// The debug surface: arm and clear fail points over HTTP.
///
/// - `DELETE /_admin/debug/failat` clears all fail points
/// - `DELETE /_admin/debug/failat/<name>` clears one
/// - `PUT /_admin/debug/failat/<name>` arms one
///
/// Success answers `200` with body `true`; any other verb or suffix
/// answers `501 Not Implemented`.
pub struct DebugHttp;

impl DebugHttp {
    pub fn handle(req: &Request<Vec<u8>>) -> Response<Vec<u8>> {
        let path = req.uri().path();
        let Some(suffix) = path.strip_prefix(FAILAT_PREFIX) else {
            return not_implemented();
        };
        // Exactly zero or one trailing segment.
        let name = match suffix.strip_prefix('/') {
            Some(name) => name,
            None if suffix.is_empty() => "",
            None => return not_implemented(),
        };
        if name.contains('/') {
            return not_implemented();
        }

        match (req.method(), name.is_empty()) {
            (&Method::DELETE, true) => {
                failpoints::clear_all();
                ok_true()
            }
            (&Method::DELETE, false) => {
                failpoints::clear(name);
                ok_true()
            }
            (&Method::PUT, false) => {
                failpoints::arm(name);
                ok_true()
            }
            _ => not_implemented(),
        }
    }
}

fn ok_true() -> Response<Vec<u8>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(b"true".to_vec())
        .unwrap()
}

fn not_implemented() -> Response<Vec<u8>> {
    Response::builder()
        .status(StatusCode::NOT_IMPLEMENTED)
        .body(Vec::new())
        .unwrap()
}
