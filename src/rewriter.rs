use crate::config::FilterConfig;
use crate::matcher::{find_image_tags, ImageTag};
use crate::path_codec::FileUrl;
use crate::placeholder::{placeholder_data_uri, placeholder_dimensions};
use crate::store::{FileMetadata, FileStore, StoreError};
use crate::visibility::{EagerThreshold, VisibilityPolicy};
use std::borrow::Cow;
use tracing::{debug, warn};

pub const LOAD_ON_VISIBLE_ATTR: &str = "data-loadonvisible";

pub struct TagRewriter<'a> {
    config: FilterConfig,
    store: &'a dyn FileStore,
    visibility: Box<dyn VisibilityPolicy>,
}

impl<'a> TagRewriter<'a> {
    pub fn new(config: &FilterConfig, store: &'a dyn FileStore) -> Self {
        Self {
            config: config.clone(),
            store,
            visibility: Box::new(EagerThreshold),
        }
    }

    pub fn with_visibility(mut self, policy: impl VisibilityPolicy + 'static) -> Self {
        self.visibility = Box::new(policy);
        self
    }

    /// Only a fatal store error aborts the call; anything wrong with a single
    /// image leaves that tag as it was.
    pub fn transform<'h>(&self, html: &'h str) -> Result<Cow<'h, str>, StoreError> {
        if !self.config.redirect_enabled() {
            return Ok(Cow::Borrowed(html));
        }

        let mut out: Option<String> = None;
        let mut last = 0;
        for (index, tag) in find_image_tags(html).enumerate() {
            let Some(replacement) = self.rewrite_tag(&tag, index + 1)? else {
                continue;
            };
            let buf = out.get_or_insert_with(|| String::with_capacity(html.len() + 256));
            buf.push_str(&html[last..tag.range.start]);
            buf.push_str(&replacement);
            last = tag.range.end;
        }

        match out {
            Some(mut buf) => {
                buf.push_str(&html[last..]);
                Ok(Cow::Owned(buf))
            }
            None => Ok(Cow::Borrowed(html)),
        }
    }

    fn rewrite_tag(&self, tag: &ImageTag<'_>, ordinal: usize) -> Result<Option<String>, StoreError> {
        let Some(url) = FileUrl::decode(tag.src) else {
            debug!(src = tag.src, "src is not a file-serving url");
            return Ok(None);
        };
        let address = url.address();
        let metadata = match self.store.resolve(&address) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                debug!(%address, "file not found");
                return Ok(None);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(%address, error = %e, "failed to resolve file");
                return Ok(None);
            }
        };
        if !self.store.is_servable(&address, &metadata) {
            debug!(%address, mime = %metadata.mime_type, "file is not servable");
            return Ok(None);
        }

        let optimised = url.encode_optimised(&self.config.virtual_component);
        let lazy = self
            .visibility
            .should_lazy_load(ordinal, &self.config.lazy_load());
        Ok(Some(if lazy {
            self.lazy_tag(tag, &optimised, &metadata)
        } else {
            replace_src(tag, &optimised)
        }))
    }

    fn lazy_tag(&self, tag: &ImageTag<'_>, optimised: &str, metadata: &FileMetadata) -> String {
        let dimensions = placeholder_dimensions(
            metadata.dimensions(),
            self.config.placeholder_sizing,
            self.config.maxwidth,
        );
        let placeholder = placeholder_data_uri(dimensions);
        let src = tag.src_range();
        let name_end = tag.name_end();
        let q = tag.quote;

        let mut out = String::with_capacity(tag.tag.len() + optimised.len() + placeholder.len() + 32);
        out.push_str(&tag.tag[..name_end]);
        out.push_str(&format!(" {LOAD_ON_VISIBLE_ATTR}={q}{optimised}{q}"));
        out.push_str(&tag.tag[name_end..src.start]);
        out.push_str(&placeholder);
        out.push_str(&tag.tag[src.end..]);
        out
    }
}

fn replace_src(tag: &ImageTag<'_>, new_src: &str) -> String {
    let src = tag.src_range();
    format!("{}{}{}", &tag.tag[..src.start], new_src, &tag.tag[src.end..])
}
