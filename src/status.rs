//! HTTP status codes as a typed enum.
//!
//! Use [`Status`] anywhere a status code is accepted: `Response::status()`,
//! `Reply::status()`, or as a bare handler return value.
//!
//! ```rust
//! use handoff::{Response, Status};
//!
//! Response::status(Status::NoContent);
//!
//! // codes without a named variant
//! Response::status(Status::Code(299));
//! ```

/// The status codes a hook pipeline commonly answers with, plus an escape hatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    SwitchingProtocols,  // 101

    Ok,                  // 200
    Created,             // 201
    Accepted,            // 202
    NoContent,           // 204

    MovedPermanently,    // 301
    Found,               // 302
    NotModified,         // 304

    BadRequest,          // 400
    Unauthorized,        // 401
    Forbidden,           // 403
    NotFound,            // 404
    MethodNotAllowed,    // 405
    RequestTimeout,      // 408
    Conflict,            // 409
    PayloadTooLarge,     // 413
    UpgradeRequired,     // 426
    TooManyRequests,     // 429

    InternalServerError, // 500
    NotImplemented,      // 501
    BadGateway,          // 502
    ServiceUnavailable,  // 503

    /// Any other code.
    Code(u16),
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::SwitchingProtocols  => 101,
            Status::Ok                  => 200,
            Status::Created             => 201,
            Status::Accepted            => 202,
            Status::NoContent           => 204,
            Status::MovedPermanently    => 301,
            Status::Found               => 302,
            Status::NotModified         => 304,
            Status::BadRequest          => 400,
            Status::Unauthorized        => 401,
            Status::Forbidden           => 403,
            Status::NotFound            => 404,
            Status::MethodNotAllowed    => 405,
            Status::RequestTimeout      => 408,
            Status::Conflict            => 409,
            Status::PayloadTooLarge     => 413,
            Status::UpgradeRequired     => 426,
            Status::TooManyRequests     => 429,
            Status::InternalServerError => 500,
            Status::NotImplemented      => 501,
            Status::BadGateway          => 502,
            Status::ServiceUnavailable  => 503,
            Status::Code(code)          => code,
        }
    }
}

/// Canonical reason phrase, or `""` for unregistered codes.
pub(crate) fn reason(code: u16) -> &'static str {
    http::StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}
