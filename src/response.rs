//! Outgoing HTTP response types and the [`IntoResponse`] conversion trait.
//!
//! A handler returns a [`Response`]. Hooks see the in-flight reply as a
//! [`Reply`], which they can reshape or finalize themselves.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http_body_util::Full;
use tracing::warn;

use crate::error::HookError;
use crate::status::{self, Status};

const TEXT: &str = "text/plain; charset=utf-8";
const JSON: &str = "application/json";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use handoff::{Response, Status};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(Status::NoContent);
///
/// Response::builder()
///     .status(Status::Created)
///     .header("location", "/rooms/42")
///     .text("created");
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: u16,
}

impl Response {
    /// `200 OK` with an `application/json` body.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::with_type(JSON, body.into())
    }

    /// `200 OK` with a `text/plain; charset=utf-8` body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_type(TEXT, Bytes::from(body.into()))
    }

    /// Response with no body.
    pub fn status(code: Status) -> Self {
        Self { body: Bytes::new(), headers: Vec::new(), status: code.into() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: Status::Ok.into() }
    }

    /// The generic reply the error and timeout paths fall back to: the
    /// status code and its reason phrase, nothing from the error itself.
    pub(crate) fn from_code(code: u16) -> Self {
        let mut res = Self::with_type(TEXT, Bytes::from_static(status::reason(code).as_bytes()));
        res.status = code;
        res
    }

    fn with_type(content_type: &str, body: Bytes) -> Self {
        Self {
            body,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            status: Status::Ok.into(),
        }
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value.to_owned(),
            None => self.headers.push((name.to_owned(), value.to_owned())),
        }
    }

    /// Converts into the hyper representation. Headers that are not valid
    /// HTTP are dropped with a warning rather than failing the reply.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = http::StatusCode::from_u16(self.status)
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        let headers = res.headers_mut();
        for (name, value) in &self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(n), Ok(v)) => {
                    headers.append(n, v);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `Status::Ok` (200).
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: u16,
}

impl ResponseBuilder {
    pub fn status(mut self, code: Status) -> Self {
        self.status = code.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(JSON, body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT, Bytes::from(body.into()))
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: &str, body: Bytes) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// The per-request reply capability handed to hooks.
///
/// Present on the [`Context`](crate::Context) until the request is hijacked.
/// [`send`](Reply::send) finalizes it: once sent, the pipeline stops running
/// phases and writes this reply as the request's terminal action.
#[derive(Debug)]
pub struct Reply {
    response: Response,
    sent: bool,
}

impl Reply {
    pub(crate) fn new() -> Self {
        Self { response: Response::status(Status::Ok), sent: false }
    }

    pub fn status(&mut self, code: Status) -> &mut Self {
        self.response.status = code.into();
        self
    }

    /// Sets a header, replacing an existing one of the same name.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.response.set_header(name, value);
        self
    }

    /// Finalizes the reply with `body`, keeping the current status and headers.
    pub fn send(&mut self, body: impl Into<Bytes>) {
        self.response.body = body.into();
        self.sent = true;
    }

    /// Finalizes with a `text/plain` body.
    pub fn text(&mut self, body: impl Into<String>) {
        self.response.set_header("content-type", TEXT);
        self.send(body.into());
    }

    /// Finalizes with an `application/json` body.
    pub fn json(&mut self, body: impl Into<Bytes>) {
        self.response.set_header("content-type", JSON);
        self.send(body);
    }

    /// Finalizes with a whole [`Response`], replacing status, headers and body.
    pub fn send_response(&mut self, response: Response) {
        self.response = response;
        self.sent = true;
    }

    pub fn is_sent(&self) -> bool { self.sent }
    pub fn status_code(&self) -> u16 { self.response.status }
    pub fn body(&self) -> &[u8] { &self.response.body }
    pub fn response(&self) -> &Response { &self.response }

    /// Replaces the body without changing the finalized state. This is what
    /// `preSerialization` hooks use to transform a handler's payload.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.response.body = body.into();
    }

    pub(crate) fn into_response(self) -> Response {
        self.response
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
/// Returning `Result<R, HookError>` routes the `Err` arm through the
/// `onError` phase instead of turning it into a response on the spot.
pub trait IntoResponse {
    fn into_response(self) -> Response;

    #[doc(hidden)]
    fn into_result(self) -> Result<Response, HookError>
    where
        Self: Sized,
    {
        Ok(self.into_response())
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a [`Status`] directly from a handler: `return Status::NotFound`
impl IntoResponse for Status {
    fn into_response(self) -> Response { Response::status(self) }
}

impl<R: IntoResponse> IntoResponse for Result<R, HookError> {
    fn into_response(self) -> Response {
        match self {
            Ok(r) => r.into_response(),
            Err(e) => Response::from_code(e.status().unwrap_or(500)),
        }
    }

    fn into_result(self) -> Result<Response, HookError> {
        self.map(IntoResponse::into_response)
    }
}
