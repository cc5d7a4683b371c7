use regex::{Captures, Regex};
use std::ops::Range;

lazy_static! {
    // Tag and attribute names are case-insensitive, the pluginfile.php marker is not.
    pub static ref IMG_SRC_REGEX: Regex = Regex::new(concat!(
        r#"<(?i:img)\s(?:[^>]*?\s)?(?i:src)\s*=\s*"#,
        r#"(?:"(?P<dq>[^"<>\s]*pluginfile\.php/\d+/\w+/\w+/[^"<>\s]+)""#,
        r#"|'(?P<sq>[^'<>\s]*pluginfile\.php/\d+/\w+/\w+/[^'<>\s]+)')"#,
        r#"[^>]*>"#
    ))
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTag<'h> {
    pub range: Range<usize>,
    pub tag: &'h str,
    pub quote: char,
    pub src: &'h str,
    src_range: Range<usize>,
}

impl<'h> ImageTag<'h> {
    fn from_captures(caps: Captures<'h>) -> Option<Self> {
        let whole = caps.get(0)?;
        let (src, quote) = match (caps.name("dq"), caps.name("sq")) {
            (Some(m), _) => (m, '"'),
            (None, Some(m)) => (m, '\''),
            (None, None) => return None,
        };
        let start = whole.start();
        Some(Self {
            range: whole.range(),
            tag: whole.as_str(),
            quote,
            src: src.as_str(),
            src_range: (src.start() - start)..(src.end() - start),
        })
    }

    pub fn src_range(&self) -> Range<usize> {
        self.src_range.clone()
    }

    pub fn name_end(&self) -> usize {
        "<img".len()
    }
}

pub fn find_image_tags(html: &str) -> impl Iterator<Item = ImageTag<'_>> {
    IMG_SRC_REGEX
        .captures_iter(html)
        .filter_map(ImageTag::from_captures)
}
