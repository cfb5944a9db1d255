//! Terminal graphics protocols.
//!
//! Exactly one protocol is used per image, picked from the environment in this
//! order: kitty, iTerm2 (also spoken by WezTerm), then sixel. Sixel only
//! accepts palette-indexed images of at most 256 colors.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error_handling::RenderError;

const KITTY_CHUNK: usize = 4096;
const SIXEL_MAX_COLORS: usize = 256;
/// Alpha under which a pixel is left to the terminal background.
const SIXEL_ALPHA_THRESHOLD: u8 = 128;

/// Graphics protocol understood by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsProtocol {
    /// Kitty graphics protocol
    Kitty,
    /// iTerm2 inline images
    Iterm,
    /// DEC sixel bitmaps
    Sixel,
}

impl GraphicsProtocol {
    /// Detects the protocol from the environment.
    pub fn detect() -> Option<Self> {
        Self::detect_with(|name| std::env::var(name).ok())
    }

    /// Detects the protocol using `var` to read environment variables.
    pub fn detect_with(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let term = var("TERM").unwrap_or_default();
        if term == "xterm-kitty" || var("KITTY_WINDOW_ID").is_some() {
            return Some(Self::Kitty);
        }
        let program = var("TERM_PROGRAM").unwrap_or_default();
        if program == "iTerm.app"
            || program == "WezTerm"
            || var("LC_TERMINAL").as_deref() == Some("iTerm2")
        {
            return Some(Self::Iterm);
        }
        if term.contains("sixel") || term.starts_with("mlterm") || term.starts_with("foot") {
            return Some(Self::Sixel);
        }
        None
    }
}

/// Whether the encoded image stores palette indexes.
///
/// GIF always does. PNG does when its IHDR colour type is 3.
pub fn is_paletted_source(encoded: &[u8]) -> bool {
    match image::guess_format(encoded) {
        Ok(ImageFormat::Gif) => true,
        // Signature (8) + chunk length (4) + "IHDR" (4) + width, height (8) + bit depth (1)
        Ok(ImageFormat::Png) => encoded.get(25) == Some(&3),
        _ => false,
    }
}

fn png_bytes(image: &DynamicImage) -> Result<Vec<u8>, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Writes an image with the kitty protocol, as base64 PNG chunks.
pub fn write_kitty(image: &DynamicImage, out: &mut dyn Write) -> Result<(), RenderError> {
    let encoded = STANDARD.encode(png_bytes(image)?);
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(KITTY_CHUNK).collect();
    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.iter().enumerate() {
        let more = u8::from(i != last);
        if i == 0 {
            write!(out, "\x1b_Gf=100,a=T,m={more};")?;
        } else {
            write!(out, "\x1b_Gm={more};")?;
        }
        out.write_all(chunk)?;
        out.write_all(b"\x1b\\")?;
    }
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Writes an image with the iTerm2 inline image protocol.
pub fn write_iterm(image: &DynamicImage, out: &mut dyn Write) -> Result<(), RenderError> {
    let png = png_bytes(image)?;
    write!(
        out,
        "\x1b]1337;File=inline=1;size={};preserveAspectRatio=1:{}\x07\n",
        png.len(),
        STANDARD.encode(&png)
    )?;
    out.flush()?;
    Ok(())
}

/// Builds the palette of an image, `None` above [`SIXEL_MAX_COLORS`].
fn palette(rgba: &RgbaImage) -> Option<(Vec<[u8; 3]>, Vec<Option<usize>>)> {
    let mut colors: Vec<[u8; 3]> = Vec::new();
    let mut lookup: HashMap<[u8; 3], usize> = HashMap::new();
    let mut indexes = Vec::with_capacity(rgba.len() / 4);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a < SIXEL_ALPHA_THRESHOLD {
            indexes.push(None);
            continue;
        }
        let color = [r, g, b];
        let index = match lookup.get(&color) {
            Some(index) => *index,
            None => {
                if colors.len() == SIXEL_MAX_COLORS {
                    return None;
                }
                colors.push(color);
                lookup.insert(color, colors.len() - 1);
                colors.len() - 1
            }
        };
        indexes.push(Some(index));
    }
    Some((colors, indexes))
}

fn write_run(out: &mut Vec<u8>, sixel: u8, count: usize) {
    let ch = 63 + sixel;
    if count > 3 {
        out.extend_from_slice(format!("!{count}").as_bytes());
        out.push(ch);
    } else {
        out.extend(std::iter::repeat(ch).take(count));
    }
}

/// Encodes a palette-indexed image as a sixel sequence.
///
/// # Errors
///
/// Returns `RenderError::NotPaletted` if the source is not palette-indexed or
/// uses more than 256 colors.
pub fn encode_sixel(image: &DynamicImage, paletted_source: bool) -> Result<Vec<u8>, RenderError> {
    if !paletted_source {
        return Err(RenderError::NotPaletted);
    }
    let rgba = image.to_rgba8();
    let (colors, indexes) = palette(&rgba).ok_or(RenderError::NotPaletted)?;
    let (width, height) = (rgba.width() as usize, rgba.height() as usize);

    let mut out = Vec::new();
    out.extend_from_slice(format!("\x1bP0;1q\"1;1;{width};{height}").as_bytes());
    for (i, [r, g, b]) in colors.iter().enumerate() {
        let pct = |v: u8| u32::from(v) * 100 / 255;
        out.extend_from_slice(format!("#{i};2;{};{};{}", pct(*r), pct(*g), pct(*b)).as_bytes());
    }

    for band in (0..height).step_by(6) {
        let rows = (height - band).min(6);
        let mut first_color = true;
        for color in 0..colors.len() {
            let mut line = Vec::with_capacity(width);
            let mut used = false;
            for x in 0..width {
                let mut sixel = 0u8;
                for dy in 0..rows {
                    if indexes[(band + dy) * width + x] == Some(color) {
                        sixel |= 1 << dy;
                    }
                }
                used |= sixel != 0;
                line.push(sixel);
            }
            if !used {
                continue;
            }
            if !first_color {
                out.push(b'$');
            }
            first_color = false;
            out.extend_from_slice(format!("#{color}").as_bytes());
            let end = line.iter().rposition(|&s| s != 0).map_or(0, |i| i + 1);
            let mut x = 0;
            while x < end {
                let run = line[x..end].iter().take_while(|&&s| s == line[x]).count();
                write_run(&mut out, line[x], run);
                x += run;
            }
        }
        out.push(b'-');
    }
    out.extend_from_slice(b"\x1b\\");
    Ok(out)
}

/// Writes `image` with the detected protocol.
///
/// # Arguments
///
/// * `image` - Decoded image
/// * `paletted_source` - Whether the encoded source was palette-indexed
/// * `protocol` - Detected protocol, `None` when the terminal supports none
/// * `out` - Output sink
///
/// # Errors
///
/// Returns `RenderError::UnsupportedTerminal` without a protocol,
/// `RenderError::NotPaletted` for sixel on a true-color image.
pub fn write_image(
    image: &DynamicImage,
    paletted_source: bool,
    protocol: Option<GraphicsProtocol>,
    out: &mut dyn Write,
) -> Result<(), RenderError> {
    match protocol {
        Some(GraphicsProtocol::Kitty) => write_kitty(image, out),
        Some(GraphicsProtocol::Iterm) => write_iterm(image, out),
        Some(GraphicsProtocol::Sixel) => {
            let sixel = encode_sixel(image, paletted_source)?;
            out.write_all(&sixel)?;
            out.write_all(b"\n")?;
            out.flush()?;
            Ok(())
        }
        None => Err(RenderError::UnsupportedTerminal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn env<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_detection_priority() {
        assert_eq!(
            GraphicsProtocol::detect_with(env(&[("TERM", "xterm-kitty"), ("TERM_PROGRAM", "iTerm.app")])),
            Some(GraphicsProtocol::Kitty)
        );
        assert_eq!(
            GraphicsProtocol::detect_with(env(&[("TERM_PROGRAM", "WezTerm"), ("TERM", "xterm-sixel")])),
            Some(GraphicsProtocol::Iterm)
        );
        assert_eq!(
            GraphicsProtocol::detect_with(env(&[("TERM", "xterm-sixel")])),
            Some(GraphicsProtocol::Sixel)
        );
        assert_eq!(GraphicsProtocol::detect_with(env(&[("TERM", "xterm-256color")])), None);
    }

    fn two_color_image() -> DynamicImage {
        let mut img = RgbaImage::new(4, 7);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = if x < 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            };
        }
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_sixel_encoding() {
        let sixel = encode_sixel(&two_color_image(), true).unwrap();
        let text = String::from_utf8(sixel).unwrap();
        assert!(text.starts_with("\x1bP0;1q\"1;1;4;7#0;2;100;0;0#1;2;0;0;100"));
        // First band: all six rows set (63 + 63 = '~'), second band: one row ('@')
        assert!(text.contains("#0~~$#1??~~-"));
        assert!(text.contains("#0@@$#1??@@-"));
        assert!(text.ends_with("\x1b\\"));
    }

    #[test]
    fn test_sixel_rejects_non_paletted() {
        assert!(matches!(
            encode_sixel(&two_color_image(), false),
            Err(RenderError::NotPaletted)
        ));
        let mut many = RgbaImage::new(300, 1);
        for (x, _, pixel) in many.enumerate_pixels_mut() {
            *pixel = Rgba([(x % 256) as u8, (x / 256) as u8, 0, 255]);
        }
        assert!(matches!(
            encode_sixel(&DynamicImage::ImageRgba8(many), true),
            Err(RenderError::NotPaletted)
        ));
    }

    #[test]
    fn test_run_length() {
        let mut out = Vec::new();
        write_run(&mut out, 0, 5);
        write_run(&mut out, 63, 2);
        assert_eq!(out, b"!5?~~");
    }

    #[test]
    fn test_kitty_framing() {
        let mut out = Vec::new();
        write_kitty(&two_color_image(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("\x1b_Gf=100,a=T,m=0;"));
        assert!(text.ends_with("\x1b\\\n"));
    }

    #[test]
    fn test_paletted_source_detection() {
        let mut png = Cursor::new(Vec::new());
        two_color_image().write_to(&mut png, ImageFormat::Png).unwrap();
        assert!(!is_paletted_source(png.get_ref()));
        let mut gif = Cursor::new(Vec::new());
        two_color_image().write_to(&mut gif, ImageFormat::Gif).unwrap();
        assert!(is_paletted_source(gif.get_ref()));
    }

    #[test]
    fn test_no_protocol_is_an_error() {
        let mut out = Vec::new();
        assert!(matches!(
            write_image(&two_color_image(), true, None, &mut out),
            Err(RenderError::UnsupportedTerminal)
        ));
    }
}
