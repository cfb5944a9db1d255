//! Diagnostic HTTP client.
//!
//! A [`ClientConfig`] is built once from a target and an ordered list of
//! [`ClientOption`]s, then consumed by [`ClientConfig::run`], which:
//! - composes the request
//! - sends it through an instrumented [`Transport`]
//! - traces the response status and headers
//! - hands the body to the [`Renderer`]
//!
//! The whole run is bound to the caller [`Deadline`].

mod compose;
mod options;
mod url;

use std::io::{self, Write};
use std::sync::Arc;

use futures::TryStreamExt;
use hickory_resolver::TokioAsyncResolver;
use http::header::CONTENT_TYPE;
use http::response::Parts;
use http::{Method, StatusCode, Version};
use http_body_util::BodyExt;
use tokio_util::io::StreamReader;

use crate::error_handling::{ConfigError, TransportError};
use crate::initialization::init_resource_client;
use crate::render::{RenderDecision, Renderer};
use crate::resource::BodySource;
use crate::trace::{ConnectionObserver, NoTrace, TraceLog, Tracer};
use crate::transport::{Deadline, ProtocolPin, Transport};

pub use compose::compose_request;
pub use options::{
    with_accept, with_body, with_body_content, with_body_resource, with_content_type, with_force_http1, with_force_http2,
    with_force_type, with_header, with_header_line, with_insecure, with_jq, with_log, with_method, with_out,
    with_raw, with_style, with_terminal, with_trace, ClientOption, ClientSettings,
};
pub use self::url::normalize_url;

/// A validated diagnostic request, ready to run.
#[derive(Debug)]
pub struct ClientConfig {
    url: ::url::Url,
    settings: ClientSettings,
}

/// Collects the options of a [`ClientConfig`].
pub struct ClientConfigBuilder {
    target: String,
    options: Vec<ClientOption>,
}

/// What a finished run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Response status
    pub status: StatusCode,
    /// HTTP version of the response
    pub version: Version,
    /// How the body was rendered
    pub decision: RenderDecision,
}

impl ClientConfigBuilder {
    /// Adds an option, applied after the ones already added.
    pub fn option(mut self, option: ClientOption) -> Self {
        self.options.push(option);
        self
    }

    /// Adds several options, in order.
    pub fn options(mut self, options: impl IntoIterator<Item = ClientOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Applies the options and validates the target.
    ///
    /// Nothing touches the network here, so every configuration error is
    /// reported before any I/O.
    ///
    /// # Errors
    ///
    /// Returns the `ConfigError` of the first failing option, or of the target
    /// URL, or `ConfigError::Http2RequiresTls` when HTTP/2 is pinned on a
    /// plain `http` URL.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let mut settings = ClientSettings::default();
        for option in self.options {
            option(&mut settings)?;
        }
        let url = normalize_url(&self.target)?;
        if settings.pin == ProtocolPin::Http2 && url.scheme() != "https" {
            return Err(ConfigError::Http2RequiresTls);
        }
        Ok(ClientConfig { url, settings })
    }
}

impl ClientConfig {
    /// Starts a configuration for `target`, a URL or a bare `host[:port]`.
    pub fn builder(target: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            target: target.into(),
            options: Vec::new(),
        }
    }

    /// Normalized target URL.
    pub fn url(&self) -> &::url::Url {
        &self.url
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.settings.method
    }

    /// Protocol pin.
    pub fn pin(&self) -> ProtocolPin {
        self.settings.pin
    }

    /// Whether the request timeline is traced.
    pub fn trace(&self) -> bool {
        self.settings.trace
    }

    /// Performs the request and renders its response.
    ///
    /// # Arguments
    ///
    /// * `resolver` - DNS resolver used for the target host
    /// * `deadline` - Bound of the whole operation, response body included
    ///
    /// # Returns
    ///
    /// The response status and how its body was rendered. Rendering failures
    /// are not errors: the body is then written raw.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the request could not be sent, the
    /// response could not be read or written, or the deadline expired.
    pub async fn run(self, resolver: Arc<TokioAsyncResolver>, deadline: Deadline) -> Result<RunOutcome, TransportError> {
        let ClientConfig { url, mut settings } = self;
        let sink = std::mem::replace(&mut settings.log, Box::new(io::sink()));
        let log = Arc::new(TraceLog::new(settings.trace, sink));

        let result = if settings.trace {
            let tracer = Arc::new(Tracer::new(log.clone(), url.clone(), settings.insecure));
            deadline
                .run(execute(tracer, &url, &mut settings, &log, resolver, deadline))
                .await
        } else {
            deadline
                .run(execute(Arc::new(NoTrace), &url, &mut settings, &log, resolver, deadline))
                .await
        };
        log.flush();
        if let Err(e) = settings.out.flush() {
            log::debug!("Failed to flush output: {e}");
        }
        result?
    }
}

async fn execute<O: ConnectionObserver>(
    observer: Arc<O>,
    url: &::url::Url,
    settings: &mut ClientSettings,
    log: &TraceLog,
    resolver: Arc<TokioAsyncResolver>,
    deadline: Deadline,
) -> Result<RunOutcome, TransportError> {
    if settings.body_content.is_none() && settings.body.is_none() {
        if let Some(location) = settings.body_location.take() {
            settings.body = Some(open_body(&location).await?);
        }
    }
    let transport = Transport::new(observer, resolver, settings.insecure, settings.pin, deadline);
    let request = compose_request(url, settings)?;
    log::debug!("Sending {} {}", request.method(), url);

    let response = transport.round_trip(url, request).await?;
    let (parts, body) = response.into_parts();
    trace_response(log, &parts, settings.render.force_type.as_deref());

    let data = TryStreamExt::map_err(body.into_data_stream(), io::Error::other);
    let mut reader = StreamReader::new(Box::pin(data));
    let decision = Renderer::new(&settings.render, log, settings.out.as_mut())
        .render(&parts.headers, &mut reader)
        .await?;
    Ok(RunOutcome {
        status: parts.status,
        version: parts.version,
        decision,
    })
}

async fn open_body(location: &str) -> Result<BodySource, TransportError> {
    log::debug!("Opening request body {location}");
    let client = init_resource_client().map_err(|e| TransportError::Body(e.to_string()))?;
    BodySource::open(location, &client).await
}

/// Writes the status line and the response headers on the trace log.
fn trace_response(log: &TraceLog, parts: &Parts, force_type: Option<&str>) {
    if !log.enabled() {
        return;
    }
    let status = match parts.status.canonical_reason() {
        Some(reason) => format!("{} {reason}", parts.status.as_str()),
        None => parts.status.as_str().to_string(),
    };
    log.info("Response status code is ");
    if parts.status.as_u16() >= 400 {
        log.errorln(status);
    } else {
        log.valueln(status);
    }

    for name in parts.headers.keys() {
        let values: Vec<String> = parts
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        log.info("Response header ");
        log.value(format!("{:?}", name.as_str()));
        log.info(" : ");
        match values.as_slice() {
            [single] => log.valueln(format!("{single:?}")),
            many => log.valueln(format!("{many:?}")),
        }
        if let Some(forced) = force_type.filter(|_| name == CONTENT_TYPE) {
            log.info("Forcing Content-Type to ");
            log.valueln(forced);
        }
    }
    log.infoln("");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MemorySink;
    use http::Response;

    fn parts(status: u16, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_http2_pin_on_plain_url() {
        let err = ClientConfig::builder("example.com")
            .option(with_force_http2())
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::Http2RequiresTls);

        let config = ClientConfig::builder("https://example.com")
            .option(with_force_http2())
            .build()
            .unwrap();
        assert_eq!(config.pin(), ProtocolPin::Http2);
    }

    #[test]
    fn test_options_fail_before_url() {
        let err = ClientConfig::builder("::not a url::")
            .options([with_method("GET"), with_force_http1(), with_force_http2()])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ConflictingProtocols);
    }

    #[test]
    fn test_bare_host_is_normalized() {
        let config = ClientConfig::builder("localhost:8080/health")
            .option(with_method("head"))
            .build()
            .unwrap();
        assert_eq!(config.url().as_str(), "http://localhost:8080/health");
        assert_eq!(config.method(), Method::HEAD);
        assert!(!config.trace());
    }

    #[test]
    fn test_response_trace() {
        colored::control::set_override(false);
        let sink = MemorySink::new();
        let log = TraceLog::new(true, Box::new(sink.clone()));
        let parts = parts(
            404,
            &[("content-type", "text/plain"), ("x-seen", "a"), ("x-seen", "b")],
        );
        trace_response(&log, &parts, Some("application/json"));
        assert_eq!(
            sink.text(),
            "Response status code is 404 Not Found\n\
             Response header \"content-type\" : \"text/plain\"\n\
             Forcing Content-Type to application/json\n\
             Response header \"x-seen\" : [\"a\", \"b\"]\n\
             \n"
        );
    }

    #[test]
    fn test_response_trace_disabled() {
        let sink = MemorySink::new();
        let log = TraceLog::new(false, Box::new(sink.clone()));
        trace_response(&log, &parts(200, &[("content-type", "text/plain")]), None);
        assert!(sink.text().is_empty());
    }
}
