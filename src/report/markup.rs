//! Escaped markup construction.
//!
//! All cell markup is produced through `Markup`, which escapes every text
//! node and attribute value and only emits tags and attributes from
//! `ALLOWED_HTML`. Anything else is dropped, keeping the inner content.

use tracing::debug;

/// Tags and the attributes each may carry.
pub const ALLOWED_HTML: &[(&str, &[&str])] = &[
    ("br", &[]),
    ("span", &["class", "style"]),
    ("ul", &["class", "id", "style"]),
    ("li", &["class", "title"]),
    ("a", &["href", "onclick", "title"]),
    ("p", &["data-toggle-id", "onclick", "style"]),
];

const VOID_TAGS: &[&str] = &["br"];

fn allowed_attributes(tag: &str) -> Option<&'static [&'static str]> {
    ALLOWED_HTML
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, attrs)| *attrs)
}

/// Escape text for use between tags.
pub fn esc_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape text for use inside a double-quoted attribute.
pub fn esc_attr(text: &str) -> String {
    esc_html(text)
}

/// Clean a URL for an `href`. Only `http` and `https` URLs survive;
/// anything else yields an empty string.
pub fn esc_url(url: &str) -> String {
    let cleaned: String = url
        .trim()
        .chars()
        .filter(|c| !c.is_control() && !c.is_whitespace())
        .collect();

    let lower = cleaned.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        cleaned
    } else {
        String::new()
    }
}

/// Keep only characters valid in a class name.
pub fn sanitize_html_class(class: &str) -> String {
    class
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Lowercase a request key and drop everything outside `[a-z0-9_-]`.
pub fn sanitize_key(key: &str) -> String {
    key.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Markup builder restricted to `ALLOWED_HTML`.
#[derive(Debug, Default)]
pub struct Markup {
    out: String,
}

impl Markup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append escaped text.
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.out.push_str(&esc_html(text));
        self
    }

    /// Append a non-breaking space entity.
    pub fn nbsp(&mut self) -> &mut Self {
        self.out.push_str("&nbsp;");
        self
    }

    /// Append a void element such as `br`.
    #[allow(dead_code)] // Part of the allow-listed tag set
    pub fn void(&mut self, tag: &str) -> &mut Self {
        if allowed_attributes(tag).is_some() && VOID_TAGS.contains(&tag) {
            self.out.push_str(&format!("<{} />", tag));
        } else {
            debug!("Dropping disallowed void tag <{}>", tag);
        }
        self
    }

    /// Append `<tag attrs>…</tag>`, with the children written by `body`.
    ///
    /// A disallowed tag is omitted but its children are still rendered.
    pub fn element<F>(&mut self, tag: &str, attrs: &[(&str, &str)], body: F) -> &mut Self
    where
        F: FnOnce(&mut Markup),
    {
        let Some(allowed) = allowed_attributes(tag) else {
            debug!("Dropping disallowed tag <{}>", tag);
            body(self);
            return self;
        };

        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attrs {
            if !allowed.contains(name) {
                debug!("Dropping disallowed attribute {} on <{}>", name, tag);
                continue;
            }
            self.out
                .push_str(&format!(" {}=\"{}\"", name, esc_attr(value)));
        }
        self.out.push('>');

        body(self);

        self.out.push_str(&format!("</{}>", tag));
        self
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esc_html() {
        assert_eq!(
            esc_html(r#"<script>alert("x" & 'y')</script>"#),
            "&lt;script&gt;alert(&quot;x&quot; &amp; &#039;y&#039;)&lt;/script&gt;"
        );
        assert_eq!(esc_html("plain"), "plain");
    }

    #[test]
    fn test_esc_url() {
        assert_eq!(
            esc_url(" https://example.com/wp-admin/plugins.php "),
            "https://example.com/wp-admin/plugins.php"
        );
        assert_eq!(esc_url("javascript:alert(1)"), "");
        assert_eq!(esc_url("JaVaScRiPt:alert(1)"), "");
        assert_eq!(esc_url("http://a b.com/"), "http://ab.com/");
    }

    #[test]
    fn test_sanitizers() {
        assert_eq!(sanitize_html_class("site-archived\" onclick=\"x"), "site-archivedonclickx");
        assert_eq!(sanitize_key("Active<script>"), "activescript");
    }

    #[test]
    fn test_span_keeps_style() {
        let mut m = Markup::new();
        m.element("span", &[("style", "white-space:nowrap"), ("id", "x")], |m| {
            m.text("Not Active");
        });
        assert_eq!(
            m.into_string(),
            "<span style=\"white-space:nowrap\">Not Active</span>"
        );
    }

    #[test]
    fn test_allow_list_enforced() {
        let mut m = Markup::new();
        m.element("ul", &[("id", "x"), ("onclick", "evil()")], |m| {
            m.element("script", &[], |m| {
                m.text("alert(1)");
            });
            m.element("li", &[("title", "a\"b")], |m| {
                m.text("<b>");
            });
        });
        m.void("br").void("img");

        assert_eq!(
            m.into_string(),
            "<ul id=\"x\">alert(1)<li title=\"a&quot;b\">&lt;b&gt;</li></ul><br />"
        );
    }
}
