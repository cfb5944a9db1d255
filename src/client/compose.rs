//! Request composition.

use futures::TryStreamExt;
use http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Request};
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use tokio_util::io::ReaderStream;
use url::Url;

use super::options::ClientSettings;
use crate::config::USER_AGENT as USER_AGENT_VALUE;
use crate::error_handling::TransportError;
use crate::transport::ComposedBody;

/// Whether an empty body should still be announced with `content-length: 0`.
fn expects_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::Body(format!("invalid {name} header {value:?}: {e}")))
}

/// Builds the request sent to `url`.
///
/// Headers are set in this order: `user-agent`, `accept`, `content-type`,
/// `content-length`, then the user headers, appended so that they can repeat
/// a generated header but never replace it. The body is the literal content
/// when set, else the body resource, else nothing. It is taken out of
/// `settings` so that it is read at most once.
///
/// # Errors
///
/// Returns `TransportError::Request` if the request cannot be assembled.
pub fn compose_request(url: &Url, settings: &mut ClientSettings) -> Result<Request<ComposedBody>, TransportError> {
    let (body, size): (ComposedBody, Option<u64>) = match (settings.body_content.take(), settings.body.take()) {
        (Some(content), ignored) => {
            if let Some(ignored) = ignored {
                log::debug!("Literal body content set, ignoring body from {}", ignored.origin());
            }
            let size = content.len() as u64;
            (Full::new(content).map_err(|never| match never {}).boxed_unsync(), Some(size))
        }
        (None, Some(source)) => {
            let size = source.size();
            let stream = ReaderStream::new(source.into_reader()).map_ok(Frame::data);
            (StreamBody::new(stream).boxed_unsync(), size)
        }
        (None, None) => {
            let size = expects_body(&settings.method).then_some(0);
            (Empty::new().map_err(|never| match never {}).boxed_unsync(), size)
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    if let Some(accept) = &settings.accept {
        headers.insert(ACCEPT, header_value("accept", accept)?);
    }
    if let Some(content_type) = &settings.content_type {
        headers.insert(CONTENT_TYPE, header_value("content-type", content_type)?);
    }
    if let Some(size) = size {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    }
    for (name, value) in &settings.headers {
        headers.append(name.clone(), value.clone());
    }

    let mut request = Request::builder()
        .method(settings.method.clone())
        .uri(url.as_str())
        .body(body)?;
    *request.headers_mut() = headers;
    Ok(request)
}
