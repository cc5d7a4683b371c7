use percent_encoding::percent_decode_str;
use std::fmt;

pub const FILE_SERVING_MARKER: &str = "pluginfile.php";

pub const DEFAULT_VIRTUAL_COMPONENT: &str = "filter_imageopt";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileAddress {
    pub context_id: u64,
    pub component: String,
    pub file_area: String,
    pub item_id: u64,
    /// Always starts and ends with `/`.
    pub file_path: String,
    pub file_name: String,
}

impl FileAddress {
    pub fn new(
        context_id: u64,
        component: &str,
        file_area: &str,
        item_id: u64,
        file_path: &str,
        file_name: &str,
    ) -> Self {
        Self {
            context_id,
            component: component.to_string(),
            file_area: file_area.to_string(),
            item_id,
            file_path: file_path.to_string(),
            file_name: file_name.to_string(),
        }
    }
}

impl fmt::Display for FileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}{}{}",
            self.context_id,
            self.component,
            self.file_area,
            self.item_id,
            self.file_path,
            self.file_name
        )
    }
}

/// Segments are kept exactly as they appeared in the source URL (still
/// percent-encoded) so that re-encoding reproduces the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUrl {
    pub base: String,
    pub context_id: u64,
    pub component: String,
    pub file_area: String,
    pub item_id: u64,
    pub file_path: String,
    pub file_name: String,
    pub suffix: String,
}

impl FileUrl {
    /// The item id is optional in the input: when the segment after the file
    /// area is not numeric, or is the file name itself, it defaults to `0`.
    pub fn decode(url: &str) -> Option<Self> {
        let marker = format!("{}/", FILE_SERVING_MARKER);
        let start = url.find(&marker)?;
        let base = &url[..start];
        let rest = &url[start + marker.len()..];

        let split_at = rest.find(['?', '#']).unwrap_or(rest.len());
        let (path, suffix) = rest.split_at(split_at);

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 4 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        if !is_digits(segments[0]) || !is_identifier(segments[1]) || !is_identifier(segments[2]) {
            return None;
        }
        let context_id = segments[0].parse().ok()?;

        let mut tail = &segments[3..];
        let mut item_id = 0;
        if tail.len() >= 2 && is_digits(tail[0]) {
            item_id = tail[0].parse().ok()?;
            tail = &tail[1..];
        }
        let (file_name, dirs) = tail.split_last()?;

        Some(Self {
            base: base.to_string(),
            context_id,
            component: segments[1].to_string(),
            file_area: segments[2].to_string(),
            item_id,
            file_path: join_file_path(dirs),
            file_name: file_name.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn encode_original(&self) -> String {
        format!(
            "{}{}/{}/{}/{}/{}{}{}{}",
            self.base,
            FILE_SERVING_MARKER,
            self.context_id,
            self.component,
            self.file_area,
            self.item_id,
            self.file_path,
            self.file_name,
            self.suffix
        )
    }

    /// Optimiser form: `<ctx>/<virtual>/<area>/<item>/<component><path><name>`.
    pub fn encode_optimised(&self, virtual_component: &str) -> String {
        format!(
            "{}{}/{}/{}/{}/{}/{}{}{}{}",
            self.base,
            FILE_SERVING_MARKER,
            self.context_id,
            virtual_component,
            self.file_area,
            self.item_id,
            self.component,
            self.file_path,
            self.file_name,
            self.suffix
        )
    }

    pub fn from_optimised(url: &str, virtual_component: &str) -> Option<Self> {
        let decoded = Self::decode(url)?;
        if decoded.component != virtual_component {
            return None;
        }
        let relocated = decoded.file_path.strip_prefix('/')?;
        let (component, rest) = relocated.split_once('/')?;
        if !is_identifier(component) {
            return None;
        }
        let component = component.to_string();
        let file_path = format!("/{}", rest);
        Some(Self {
            component,
            file_path,
            ..decoded
        })
    }

    pub fn address(&self) -> FileAddress {
        FileAddress {
            context_id: self.context_id,
            component: self.component.clone(),
            file_area: self.file_area.clone(),
            item_id: self.item_id,
            file_path: percent_decode_str(&self.file_path)
                .decode_utf8_lossy()
                .into_owned(),
            file_name: percent_decode_str(&self.file_name)
                .decode_utf8_lossy()
                .into_owned(),
        }
    }
}

fn join_file_path(dirs: &[&str]) -> String {
    if dirs.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", dirs.join("/"))
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(base: &str, ctx: u64, component: &str, area: &str, item: u64, path: &str, name: &str) -> FileUrl {
        FileUrl {
            base: base.into(),
            context_id: ctx,
            component: component.into(),
            file_area: area.into(),
            item_id: item,
            file_path: path.into(),
            file_name: name.into(),
            suffix: String::new(),
        }
    }

    #[test]
    fn decodes_full_url() {
        let decoded =
            FileUrl::decode("http://host/pluginfile.php/5/mod_label/intro/0/pic.png").expect("decode");
        assert_eq!(decoded, url("http://host/", 5, "mod_label", "intro", 0, "/", "pic.png"));
    }

    #[test]
    fn optimised_url_relocates_component() {
        let decoded =
            FileUrl::decode("http://host/pluginfile.php/5/mod_label/intro/0/pic.png").expect("decode");
        assert_eq!(
            decoded.encode_optimised(DEFAULT_VIRTUAL_COMPONENT),
            "http://host/pluginfile.php/5/filter_imageopt/intro/0/mod_label/pic.png"
        );
    }

    #[test]
    fn canonical_form_round_trips() {
        let refs = [
            url("http://host/", 5, "mod_label", "intro", 0, "/", "pic.png"),
            url("https://lms.example.org/moodle/", 236001, "mod_page", "content", 7, "/a/b/", "x.y.jpg"),
            url("/", 1, "course", "overviewfiles", 0, "/sub/", "Big%20Pic.PNG"),
            url("", 42, "user", "draft", 123456789, "/", "a"),
        ];
        for r in refs {
            let encoded = r.encode_original();
            assert_eq!(FileUrl::decode(&encoded).as_ref(), Some(&r), "{}", encoded);
        }
    }

    #[test]
    fn missing_item_id_defaults_and_is_emitted() {
        let decoded = FileUrl::decode("pluginfile.php/12/mod_label/intro/pic.png").expect("decode");
        assert_eq!(decoded.item_id, 0);
        assert_eq!(decoded.file_path, "/");
        assert_eq!(decoded.encode_original(), "pluginfile.php/12/mod_label/intro/0/pic.png");
        assert_eq!(
            decoded.encode_optimised("filter_imageopt"),
            "pluginfile.php/12/filter_imageopt/intro/0/mod_label/pic.png"
        );
    }

    #[test]
    fn sub_path_lands_between_component_and_name() {
        let decoded =
            FileUrl::decode("/pluginfile.php/3/mod_page/content/4/img/2020/p.jpg").expect("decode");
        assert_eq!(decoded.item_id, 4);
        assert_eq!(decoded.file_path, "/img/2020/");
        assert_eq!(
            decoded.encode_optimised("filter_imageopt"),
            "/pluginfile.php/3/filter_imageopt/content/4/mod_page/img/2020/p.jpg"
        );
    }

    #[test]
    fn query_is_kept_out_of_the_file_name() {
        let decoded =
            FileUrl::decode("/pluginfile.php/3/mod_page/content/0/p.jpg?time=1700000000").expect("decode");
        assert_eq!(decoded.file_name, "p.jpg");
        assert_eq!(decoded.suffix, "?time=1700000000");
        assert!(decoded
            .encode_optimised("filter_imageopt")
            .ends_with("/mod_page/p.jpg?time=1700000000"));
    }

    #[test]
    fn rejects_other_shapes() {
        for bad in [
            "http://host/image.png",
            "http://host/pluginfile.php/abc/mod_label/intro/0/pic.png",
            "http://host/pluginfile.php/5/mod_label/intro/",
            "http://host/pluginfile.php/5/mod_label//0/pic.png",
            "http://host/pluginfile.php/5/mod-label/intro/0/pic.png",
            "http://host/pluginfile.php/5/mod_label",
            "http://host/pluginfile.php/+5/mod_label/intro/0/pic.png",
        ] {
            assert!(FileUrl::decode(bad).is_none(), "{}", bad);
        }
    }

    #[test]
    fn optimised_url_decodes_under_the_virtual_component() {
        let original = url("http://host/", 5, "mod_label", "intro", 0, "/", "pic.png");
        let optimised = original.encode_optimised("filter_imageopt");
        let decoded = FileUrl::decode(&optimised).expect("decode");
        assert_eq!(decoded.component, "filter_imageopt");
        assert_ne!(decoded, original);
    }

    #[test]
    fn original_is_recoverable_from_optimised_url() {
        let original = url("http://host/", 9, "mod_book", "chapter", 11, "/figs/", "f.png");
        let optimised = original.encode_optimised("filter_imageopt");
        assert_eq!(
            FileUrl::from_optimised(&optimised, "filter_imageopt"),
            Some(original)
        );
        assert_eq!(FileUrl::from_optimised(&optimised, "other_namespace"), None);
    }

    #[test]
    fn address_is_percent_decoded() {
        let decoded =
            FileUrl::decode("/pluginfile.php/1/mod_label/intro/0/my%20dir/Big%20Pic.png").expect("decode");
        let address = decoded.address();
        assert_eq!(address.file_path, "/my dir/");
        assert_eq!(address.file_name, "Big Pic.png");
        assert_eq!(address.to_string(), "1/mod_label/intro/0/my dir/Big Pic.png");
    }
}
