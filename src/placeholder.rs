use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;

const DATA_URI_PREFIX: &str = "data:image/svg+xml;utf8,";

/// Characters that would break out of an HTML attribute or a data URI.
const SVG_DATA_URI: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'#')
    .add(b'%')
    .add(b'&');

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderSizing {
    #[default]
    Natural,
    MaxWidth,
}

pub fn placeholder_dimensions(
    natural: Option<(u32, u32)>,
    sizing: PlaceholderSizing,
    maxwidth: Option<u32>,
) -> Option<(u32, u32)> {
    let (width, height) = natural?;
    match (sizing, maxwidth) {
        (PlaceholderSizing::MaxWidth, Some(max)) if max > 0 && width > max => {
            let scaled = (height as f64 * max as f64 / width as f64).round().max(1.0);
            Some((max, scaled as u32))
        }
        _ => Some((width, height)),
    }
}

pub fn empty_svg(dimensions: Option<(u32, u32)>) -> String {
    match dimensions {
        Some((w, h)) => format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"></svg>"#
        ),
        None => r#"<svg xmlns="http://www.w3.org/2000/svg"></svg>"#.to_string(),
    }
}

pub fn placeholder_data_uri(dimensions: Option<(u32, u32)>) -> String {
    let svg = empty_svg(dimensions);
    format!(
        "{}{}",
        DATA_URI_PREFIX,
        utf8_percent_encode(&svg, SVG_DATA_URI)
    )
}
