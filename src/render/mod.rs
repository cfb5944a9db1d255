//! Response rendering.
//!
//! The presenter is chosen in this order:
//! 1. raw streaming when raw output is requested or the output is not a terminal
//! 2. the structured query when a filter is configured
//! 3. the effective MIME type, the forced type winning over `content-type`:
//!    JSON, XML and HTML are highlighted, PNG/JPEG/GIF are drawn inline,
//!    audio and video are probed, anything else is streamed raw
//!
//! A presenter failure is never fatal: the body is streamed raw instead, behind
//! the binary guard when the output is an interactive terminal.

mod graphics;
mod highlight;
mod image;
mod media;
mod query;
mod raw;

use std::io::Write;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderMap;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::MEDIA_READ_LIMIT;
use crate::error_handling::RenderError;
use crate::trace::TraceLog;

pub use graphics::{encode_sixel, is_paletted_source, write_image, GraphicsProtocol};
pub use highlight::{available_styles, highlight, validate_style, Language};
pub use self::image::{render_image, DecodedImage};
pub use media::{describe, frame_args, render_media, select_frame, MediaTools, ProbeReport};
pub use query::Query;
pub use raw::{is_printable, stream};

/// Presenter chosen for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presenter {
    /// Body copied as-is, behind the binary guard on a terminal
    Raw,
    /// Structured query results, pretty-printed and highlighted
    Query,
    /// Pretty-printed and highlighted JSON
    Json,
    /// Highlighted XML
    Xml,
    /// Highlighted HTML
    Html,
    /// Image drawn with a terminal graphics protocol
    Image,
    /// Media summary and representative frame
    Media,
}

/// Outcome of the content-type dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDecision {
    /// Effective MIME type, empty when neither forced nor declared
    pub mime: String,
    /// Presenter to use
    pub presenter: Presenter,
}

/// Rendering settings of a client.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Copy the body as-is
    pub raw: bool,
    /// Whether the output is an interactive terminal
    pub terminal: bool,
    /// MIME type overriding the `content-type` header
    pub force_type: Option<String>,
    /// Structured query applied to JSON bodies
    pub query: Option<Query>,
    /// Highlighting style
    pub style: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            raw: false,
            terminal: false,
            force_type: None,
            query: None,
            style: crate::config::DEFAULT_STYLE.to_string(),
        }
    }
}

impl RenderOptions {
    /// Whether raw output must be checked for binary content first.
    fn guarded(&self) -> bool {
        self.terminal && !self.raw
    }
}

/// Type part of a `content-type` value, lowercased, parameters stripped.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Picks the presenter for a response.
///
/// # Arguments
///
/// * `options` - Rendering settings
/// * `content_type` - Declared `content-type` header, if any
pub fn decide(options: &RenderOptions, content_type: Option<&str>) -> RenderDecision {
    let mime = match &options.force_type {
        Some(forced) => forced.clone(),
        None => content_type.map(media_type).unwrap_or_default(),
    };
    let presenter = if options.raw || !options.terminal {
        Presenter::Raw
    } else if options.query.is_some() {
        Presenter::Query
    } else {
        match mime.as_str() {
            "application/json" => Presenter::Json,
            "application/xml" | "text/xml" => Presenter::Xml,
            "text/html" => Presenter::Html,
            "image/png" | "image/jpeg" | "image/gif" => Presenter::Image,
            other => match other.split('/').next() {
                Some("audio" | "video") => Presenter::Media,
                _ => Presenter::Raw,
            },
        }
    };
    RenderDecision { mime, presenter }
}

/// Serializes `value` with tab indentation.
pub fn pretty_json(value: &Value) -> Result<String, RenderError> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|e| RenderError::Highlight(e.to_string()))
}

/// Writes a response body to the output sink.
pub struct Renderer<'a> {
    options: &'a RenderOptions,
    log: &'a TraceLog,
    out: &'a mut dyn Write,
    graphics: Option<GraphicsProtocol>,
    media: Option<MediaTools>,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer, detecting the terminal graphics protocol and the
    /// installed media tools.
    pub fn new(options: &'a RenderOptions, log: &'a TraceLog, out: &'a mut dyn Write) -> Self {
        let (graphics, media) = if options.terminal && !options.raw {
            (GraphicsProtocol::detect(), MediaTools::detect())
        } else {
            (None, None)
        };
        Self {
            options,
            log,
            out,
            graphics,
            media,
        }
    }

    /// Overrides the detected graphics protocol.
    pub fn with_graphics(mut self, graphics: Option<GraphicsProtocol>) -> Self {
        self.graphics = graphics;
        self
    }

    /// Overrides the detected media tools.
    pub fn with_media_tools(mut self, media: Option<MediaTools>) -> Self {
        self.media = media;
        self
    }

    /// Renders `body` according to the response `headers`.
    ///
    /// # Returns
    ///
    /// The decision that was applied. A presenter failure is logged and the
    /// body is streamed raw instead.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Read` if the body cannot be read or the output
    /// cannot be written.
    pub async fn render<R>(&mut self, headers: &HeaderMap, body: &mut R) -> Result<RenderDecision, RenderError>
    where
        R: AsyncRead + Unpin,
    {
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let decision = decide(self.options, content_type);
        log::debug!("Rendering {:?} body as {:?}", decision.mime, decision.presenter);

        match decision.presenter {
            Presenter::Raw => {
                stream(&[], body, self.out, self.options.guarded()).await?;
            }
            Presenter::Media => self.present_media(body).await?,
            presenter => {
                let mut buf = Vec::new();
                body.read_to_end(&mut buf).await?;
                let content_length = headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());
                let result = self.present(presenter, &buf, content_type.unwrap_or_default(), content_length);
                if let Err(e) = result {
                    log::warn!("Error while rendering response: {e}");
                    stream(&buf, &mut tokio::io::empty(), self.out, self.options.guarded()).await?;
                }
            }
        }
        Ok(decision)
    }

    fn present(
        &mut self,
        presenter: Presenter,
        body: &[u8],
        content_type: &str,
        content_length: Option<u64>,
    ) -> Result<(), RenderError> {
        let style = self.options.style.as_str();
        match presenter {
            Presenter::Json => {
                let value: Value = serde_json::from_slice(body)?;
                highlight(&pretty_json(&value)?, Language::Json, style, self.out)
            }
            Presenter::Query => {
                let value: Value = serde_json::from_slice(body)?;
                let Some(query) = &self.options.query else {
                    return Ok(());
                };
                // Evaluate first so a failing filter does not leave partial output
                let results = query.run(&value)?;
                for result in results {
                    highlight(&pretty_json(&result)?, Language::Json, style, self.out)?;
                }
                Ok(())
            }
            Presenter::Xml => highlight(&String::from_utf8_lossy(body), Language::Xml, style, self.out),
            Presenter::Html => highlight(&String::from_utf8_lossy(body), Language::Html, style, self.out),
            Presenter::Image => render_image(body, content_type, content_length, self.log, self.graphics, self.out),
            Presenter::Raw | Presenter::Media => Ok(()),
        }
    }

    async fn present_media<R>(&mut self, body: &mut R) -> Result<(), RenderError>
    where
        R: AsyncRead + Unpin,
    {
        let Some(tools) = self.media.clone() else {
            log::debug!("No media tool installed, streaming body");
            stream(&[], body, self.out, self.options.guarded()).await?;
            return Ok(());
        };
        let mut data = Vec::new();
        (&mut *body).take(MEDIA_READ_LIMIT as u64).read_to_end(&mut data).await?;
        if let Err(e) = render_media(&data, &tools, self.log, self.graphics, self.out).await {
            log::warn!("Error while rendering response: {e}");
            stream(&data, body, self.out, self.options.guarded()).await?;
        }
        Ok(())
    }
}
