//! Report preview.
//!
//! [`layout`] turns a [`ReportState`](crate::state::ReportState) into pages of blocks. Two
//! backends draw those pages: [`html`] for on-screen preview and [`svg`] for raster export.

pub mod html;
pub mod layout;
pub mod svg;

pub use html::{render_document, RenderedDocument, RenderedPage};
pub use layout::{layout_document, layout_page, DocumentLayout, PageKind, PageLayout};

/// Escapes text for use in HTML or XML content and attribute values.
pub fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Only inline image URIs may be embedded in a page.
pub(crate) fn embeddable_image(uri: &laudo_types::DataUri) -> Option<&str> {
    uri.as_str()
        .starts_with("data:image/")
        .then_some(uri.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use laudo_types::DataUri;

    #[test]
    fn test_escape_markup() {
        assert_eq!(
            escape_markup(r#"<b onclick="x">Tom & 'Jerry'</b>"#),
            "&lt;b onclick=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(escape_markup("São Rafael"), "São Rafael");
    }

    #[test]
    fn test_only_image_uris_are_embeddable() {
        let png = DataUri::parse("data:image/png;base64,AAAA").unwrap();
        assert!(embeddable_image(&png).is_some());
        let html = DataUri::parse("data:text/html,<script>").unwrap();
        assert!(embeddable_image(&html).is_none());
        assert!(embeddable_image(&DataUri::default()).is_none());
    }
}
