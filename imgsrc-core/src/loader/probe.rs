//! Natural-size probing. Only headers are read; pixels are never decoded.

use image::ImageReader;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;

static SVG_ROOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<svg\b([^>]*)>").expect("static svg root pattern")
});
static SVG_WIDTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\swidth\s*=\s*["']\s*([0-9]*\.?[0-9]+)\s*(px)?\s*["']"#)
        .expect("static svg width pattern")
});
static SVG_HEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\sheight\s*=\s*["']\s*([0-9]*\.?[0-9]+)\s*(px)?\s*["']"#)
        .expect("static svg height pattern")
});
static SVG_VIEW_BOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\sviewBox\s*=\s*["']([^"']+)["']"#)
        .expect("static svg viewBox pattern")
});

/// Whether a payload is an image at all, even one whose size cannot be read.
/// Either the server says so or the bytes carry an `<svg>` root.
pub(crate) fn is_image(content_type: Option<&str>, bytes: &[u8]) -> bool {
    let declared = content_type.is_some_and(|mime| {
        mime.trim_start()
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
    });
    declared
        || std::str::from_utf8(bytes).is_ok_and(|text| SVG_ROOT.is_match(text))
}

pub(crate) fn natural_size(bytes: &[u8]) -> Option<(u32, u32)> {
    raster_size(bytes).or_else(|| svg_size(bytes))
}

fn raster_size(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn svg_size(bytes: &[u8]) -> Option<(u32, u32)> {
    let text = std::str::from_utf8(bytes).ok()?;
    let attributes = SVG_ROOT.captures(text)?.get(1)?.as_str();

    let length = |pattern: &Regex| -> Option<f64> {
        pattern.captures(attributes)?.get(1)?.as_str().parse().ok()
    };
    if let (Some(width), Some(height)) =
        (length(&SVG_WIDTH), length(&SVG_HEIGHT))
    {
        return Some((width.round() as u32, height.round() as u32));
    }

    let view_box = SVG_VIEW_BOX.captures(attributes)?.get(1)?.as_str();
    let numbers: Vec<f64> = view_box
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match numbers.as_slice() {
        [_, _, width, height] => {
            Some((width.round() as u32, height.round() as u32))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};

    #[test]
    fn reads_png_dimensions() {
        let mut bytes = Vec::new();
        RgbaImage::new(7, 3)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        assert_eq!(natural_size(&bytes), Some((7, 3)));
    }

    #[test]
    fn reads_svg_attributes_then_view_box() {
        let sized = br#"<svg xmlns="http://www.w3.org/2000/svg" width="24px" height="12"></svg>"#;
        assert_eq!(natural_size(sized), Some((24, 12)));

        let boxed = br#"<?xml version="1.0"?><svg viewBox="0 0 48 16"><rect/></svg>"#;
        assert_eq!(natural_size(boxed), Some((48, 16)));
    }

    #[test]
    fn unknown_payloads_have_no_size() {
        assert_eq!(natural_size(b"not an image"), None);
    }

    #[test]
    fn images_are_recognised_by_type_or_svg_root() {
        assert!(is_image(Some("image/webp"), b"truncated"));
        assert!(is_image(Some("IMAGE/PNG"), b""));
        assert!(is_image(None, b"<svg><path d=''/></svg>"));
        assert!(!is_image(Some("text/html"), b"<html>not an image</html>"));
        assert!(!is_image(None, b"plain text"));
    }
}
