//! Client option functions.
//!
//! Every option is a small function applied in order to [`ClientSettings`];
//! the first one failing aborts the construction of the client.

use std::fmt;
use std::io::{self, IsTerminal, Write};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::Method;

use crate::error_handling::ConfigError;
use crate::render::{validate_style, Query, RenderOptions};
use crate::resource::BodySource;
use crate::transport::ProtocolPin;

/// A configuration step of a client.
pub type ClientOption = Box<dyn FnOnce(&mut ClientSettings) -> Result<(), ConfigError> + Send>;

/// Everything configurable on a client except its target.
pub struct ClientSettings {
    pub(crate) method: Method,
    pub(crate) accept: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) body: Option<BodySource>,
    pub(crate) body_location: Option<String>,
    pub(crate) body_content: Option<Bytes>,
    pub(crate) insecure: bool,
    pub(crate) pin: ProtocolPin,
    pub(crate) trace: bool,
    pub(crate) render: RenderOptions,
    pub(crate) out: Box<dyn Write + Send>,
    pub(crate) log: Box<dyn Write + Send>,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("method", &self.method)
            .field("accept", &self.accept)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("body_location", &self.body_location)
            .field("body_content", &self.body_content.as_ref().map(Bytes::len))
            .field("insecure", &self.insecure)
            .field("pin", &self.pin)
            .field("trace", &self.trace)
            .field("render", &self.render)
            .finish_non_exhaustive()
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            method: Method::GET,
            accept: None,
            content_type: None,
            headers: Vec::new(),
            body: None,
            body_location: None,
            body_content: None,
            insecure: false,
            pin: ProtocolPin::Auto,
            trace: false,
            render: RenderOptions {
                terminal: io::stdout().is_terminal(),
                ..RenderOptions::default()
            },
            out: Box::new(io::stdout()),
            log: Box::new(io::stderr()),
        }
    }
}

/// Sets the request method, letters only, uppercased.
pub fn with_method(method: impl Into<String>) -> ClientOption {
    let method = method.into();
    Box::new(move |s: &mut ClientSettings| {
        if method.is_empty() {
            return Err(ConfigError::EmptyMethod);
        }
        if !method.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidMethod(method));
        }
        s.method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ConfigError::InvalidMethod(method))?;
        Ok(())
    })
}

/// Sets the `accept` request header.
pub fn with_accept(value: impl Into<String>) -> ClientOption {
    let value = value.into();
    Box::new(move |s: &mut ClientSettings| {
        HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidHeader(format!("accept: {value}")))?;
        s.accept = Some(value);
        Ok(())
    })
}

/// Sets the `content-type` request header.
pub fn with_content_type(value: impl Into<String>) -> ClientOption {
    let value = value.into();
    Box::new(move |s: &mut ClientSettings| {
        HeaderValue::from_str(&value)
            .map_err(|_| ConfigError::InvalidHeader(format!("content-type: {value}")))?;
        s.content_type = Some(value);
        Ok(())
    })
}

/// Appends a request header, sent after the generated ones.
pub fn with_header(name: impl Into<String>, value: impl Into<String>) -> ClientOption {
    let (name, value) = (name.into(), value.into());
    Box::new(move |s: &mut ClientSettings| {
        let invalid = || ConfigError::InvalidHeader(format!("{name}: {value}"));
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(&value).map_err(|_| invalid())?;
        s.headers.push((header_name, header_value));
        Ok(())
    })
}

/// Appends a request header given as a `name: value` line.
///
/// The line is split on its first `:`, both sides are trimmed.
pub fn with_header_line(line: impl Into<String>) -> ClientOption {
    let line = line.into();
    if let Some((name, value)) = line.split_once(':') {
        return with_header(name.trim(), value.trim());
    }
    Box::new(move |_: &mut ClientSettings| Err(ConfigError::InvalidHeader(line)))
}

/// Uses a resource as request body.
pub fn with_body(body: BodySource) -> ClientOption {
    Box::new(move |s: &mut ClientSettings| {
        s.body = Some(body);
        Ok(())
    })
}

/// Uses the resource at `location` as request body (`-` for stdin, a path or
/// an URL). It is opened when the client runs, after every other check passed.
pub fn with_body_resource(location: impl Into<String>) -> ClientOption {
    let location = location.into();
    Box::new(move |s: &mut ClientSettings| {
        s.body_location = Some(location);
        Ok(())
    })
}

/// Uses a literal request body, it takes precedence over [`with_body`] and
/// [`with_body_resource`].
pub fn with_body_content(content: impl Into<Bytes>) -> ClientOption {
    let content = content.into();
    Box::new(move |s: &mut ClientSettings| {
        s.body_content = Some(content);
        Ok(())
    })
}

/// Disables TLS verification.
pub fn with_insecure() -> ClientOption {
    Box::new(|s: &mut ClientSettings| {
        s.insecure = true;
        Ok(())
    })
}

/// Pins the connection to HTTP/1.1.
pub fn with_force_http1() -> ClientOption {
    Box::new(|s: &mut ClientSettings| {
        if s.pin == ProtocolPin::Http2 {
            return Err(ConfigError::ConflictingProtocols);
        }
        s.pin = ProtocolPin::Http1;
        Ok(())
    })
}

/// Pins the connection to HTTP/2.
pub fn with_force_http2() -> ClientOption {
    Box::new(|s: &mut ClientSettings| {
        if s.pin == ProtocolPin::Http1 {
            return Err(ConfigError::ConflictingProtocols);
        }
        s.pin = ProtocolPin::Http2;
        Ok(())
    })
}

/// Prints the request timeline and the response headers on the log sink.
pub fn with_trace() -> ClientOption {
    Box::new(|s: &mut ClientSettings| {
        s.trace = true;
        Ok(())
    })
}

/// Renders the response as if it had this content type.
pub fn with_force_type(mime: impl Into<String>) -> ClientOption {
    let mime = mime.into();
    Box::new(move |s: &mut ClientSettings| {
        s.render.force_type = Some(mime.trim().to_ascii_lowercase());
        Ok(())
    })
}

/// Applies a structured query to the JSON response.
pub fn with_jq(filter: impl Into<String>) -> ClientOption {
    let filter = filter.into();
    Box::new(move |s: &mut ClientSettings| {
        s.render.query = Some(Query::parse(&filter)?);
        Ok(())
    })
}

/// Writes the response body as-is.
pub fn with_raw() -> ClientOption {
    Box::new(|s: &mut ClientSettings| {
        s.render.raw = true;
        Ok(())
    })
}

/// Sets the highlighting style, one of [`crate::render::available_styles`].
pub fn with_style(style: impl Into<String>) -> ClientOption {
    let style = style.into();
    Box::new(move |s: &mut ClientSettings| {
        validate_style(&style)?;
        s.render.style = style;
        Ok(())
    })
}

/// Sets the output sink, which is then not treated as a terminal.
pub fn with_out(out: impl Write + Send + 'static) -> ClientOption {
    Box::new(move |s: &mut ClientSettings| {
        s.out = Box::new(out);
        s.render.terminal = false;
        Ok(())
    })
}

/// Sets the trace sink.
pub fn with_log(log: impl Write + Send + 'static) -> ClientOption {
    Box::new(move |s: &mut ClientSettings| {
        s.log = Box::new(log);
        Ok(())
    })
}

/// Declares whether the output sink is an interactive terminal.
pub fn with_terminal(terminal: bool) -> ClientOption {
    Box::new(move |s: &mut ClientSettings| {
        s.render.terminal = terminal;
        Ok(())
    })
}
