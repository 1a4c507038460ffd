//! Request routing: method + path to operation resolution.
//!
//! Four route families exist: `/objects/...` for blob lifecycle,
//! `/pre-signed...` for capability tokens, `/events` for the notification
//! stream, and `/publish/{id}` for re-emitting creation events. Unknown
//! paths are 404s; known paths with the wrong method are 405s.

use http::Method;

/// A resolved operation, carrying any id or token path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /objects/` -- list all records.
    ListObjects,
    /// `GET /objects/{id}` -- stream blob bytes.
    GetObject(String),
    /// `POST /objects/` -- multipart create.
    CreateObject,
    /// `POST /objects/{id}/copy` -- duplicate an object.
    CopyObject(String),
    /// `PUT /objects/{id}` -- overwrite content.
    OverwriteObject(String),
    /// `PATCH /objects/{id}` -- append content.
    AppendObject(String),
    /// `DELETE /objects/{id}` -- delete an object.
    DeleteObject(String),
    /// `POST /pre-signed` -- mint a capability token.
    CreatePresigned,
    /// `PUT /pre-signed/{token}` -- token-scoped upsert.
    PresignedWrite(String),
    /// `GET /pre-signed/{token}` -- token-scoped read.
    PresignedRead(String),
    /// `GET /events` -- server-sent-event subscription.
    Events,
    /// `POST /publish/{id}` -- re-emit a creation event.
    PublishCreated(String),
}

/// Why a request could not be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// No route family owns the path.
    NotFound,
    /// The path is known but the method is not supported on it.
    MethodNotAllowed,
}

/// Resolve a request to an operation.
///
/// # Errors
///
/// [`RouteError::NotFound`] for unknown paths, [`RouteError::MethodNotAllowed`]
/// for known paths with an unsupported method.
pub fn resolve(method: &Method, path: &str) -> Result<Route, RouteError> {
    if let Some(rest) = strip_route(path, "/objects") {
        return resolve_objects(method, rest);
    }
    if let Some(rest) = strip_route(path, "/pre-signed") {
        return resolve_presigned(method, rest);
    }
    if path == "/events" {
        return match *method {
            Method::GET => Ok(Route::Events),
            _ => Err(RouteError::MethodNotAllowed),
        };
    }
    if let Some(id) = strip_route(path, "/publish") {
        if id.is_empty() {
            return Err(RouteError::NotFound);
        }
        return match *method {
            Method::POST => Ok(Route::PublishCreated(id.to_owned())),
            _ => Err(RouteError::MethodNotAllowed),
        };
    }

    Err(RouteError::NotFound)
}

/// Strip a route prefix, returning the remainder without its leading slash.
///
/// Matches both `/objects` and `/objects/...`; anything else is `None`.
fn strip_route<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix('/')
}

fn resolve_objects(method: &Method, rest: &str) -> Result<Route, RouteError> {
    match *method {
        Method::GET => {
            if rest.is_empty() {
                Ok(Route::ListObjects)
            } else {
                Ok(Route::GetObject(rest.to_owned()))
            }
        }
        Method::POST => {
            if rest.is_empty() {
                Ok(Route::CreateObject)
            } else if let Some(id) = rest.strip_suffix("/copy") {
                if id.is_empty() {
                    Err(RouteError::NotFound)
                } else {
                    Ok(Route::CopyObject(id.to_owned()))
                }
            } else {
                Err(RouteError::MethodNotAllowed)
            }
        }
        Method::PUT => {
            if rest.is_empty() {
                Err(RouteError::MethodNotAllowed)
            } else {
                Ok(Route::OverwriteObject(rest.to_owned()))
            }
        }
        Method::PATCH => {
            if rest.is_empty() {
                Err(RouteError::MethodNotAllowed)
            } else {
                Ok(Route::AppendObject(rest.to_owned()))
            }
        }
        Method::DELETE => {
            if rest.is_empty() {
                Err(RouteError::MethodNotAllowed)
            } else {
                Ok(Route::DeleteObject(rest.to_owned()))
            }
        }
        _ => Err(RouteError::MethodNotAllowed),
    }
}

fn resolve_presigned(method: &Method, rest: &str) -> Result<Route, RouteError> {
    match *method {
        // Minting only lives at the bare collection path.
        Method::POST => {
            if rest.is_empty() {
                Ok(Route::CreatePresigned)
            } else {
                Err(RouteError::MethodNotAllowed)
            }
        }
        Method::PUT => Ok(Route::PresignedWrite(rest.to_owned())),
        Method::GET => Ok(Route::PresignedRead(rest.to_owned())),
        _ => Err(RouteError::MethodNotAllowed),
    }
}
