//! Embedded page templates and the two escaping rules used to fill them.
//!
//! Template slots only accept [`Markup`]. A `Markup` value is either HTML
//! escaped text, a percent-encoded URL path, or the output of another
//! template, so nothing derived from a file name can reach a page unescaped.

use crate::error::AppError;
use crate::fs::{format_modified, ListingPage};
use crate::utils::percent_encode_location;
use rust_embed::RustEmbed;
use std::borrow::Cow;

#[derive(RustEmbed)]
#[folder = "assets"]
struct Assets;

/// Raw bytes of an embedded asset, e.g. `favicon.svg`.
pub fn asset(path: &str) -> Option<Cow<'static, [u8]>> {
    Assets::get(path).map(|file| file.data)
}

/// A fragment that is safe to place in HTML text or inside a quoted attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markup(String);

impl Markup {
    /// HTML-escapes `text` for display.
    pub fn text(text: &str) -> Self {
        Markup(html_escape(text))
    }

    /// Percent-encodes a decoded location for use as a link target.
    pub fn url_path(location: &str) -> Self {
        Markup(percent_encode_location(location))
    }

    pub fn push(&mut self, other: &Markup) {
        self.0.push_str(&other.0);
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }
}

fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// An embedded template with `{{NAME}}` placeholders.
pub struct Template {
    name: String,
    source: String,
}

impl Template {
    pub fn load(name: &str) -> Result<Self, AppError> {
        let data = asset(name).ok_or_else(|| {
            AppError::InternalServerError(format!("Template '{name}' not found"))
        })?;
        let source = String::from_utf8(data.into_owned()).map_err(|_| {
            AppError::InternalServerError(format!("Template '{name}' is not valid UTF-8"))
        })?;
        Ok(Self {
            name: name.to_string(),
            source,
        })
    }

    /// Fills every placeholder in one pass. Inserted values are never scanned
    /// again, so a value that happens to contain `{{X}}` stays literal.
    pub fn render(&self, slots: &[(&str, &Markup)]) -> Result<Markup, AppError> {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "Unterminated placeholder in template '{}'",
                    self.name
                ))
            })?;
            let key = &after_open[..end];
            let value = slots
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.as_str())
                .ok_or_else(|| {
                    AppError::InternalServerError(format!(
                        "No value for '{key}' in template '{}'",
                        self.name
                    ))
                })?;
            out.push_str(value);
            rest = &after_open[end + 2..];
        }
        out.push_str(rest);

        Ok(Markup(out))
    }
}

/// The three pieces of the directory index page.
pub struct TemplateEngine {
    header: Template,
    row: Template,
    footer: Template,
}

impl TemplateEngine {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            header: Template::load("listing/header.html")?,
            row: Template::load("listing/row.html")?,
            footer: Template::load("listing/footer.html")?,
        })
    }

    /// Renders the whole index page into memory.
    pub fn render_directory_listing(&self, page: &ListingPage) -> Result<Markup, AppError> {
        let location = Markup::url_path(&page.location);
        let mut html = self.header.render(&[
            ("TITLE", &Markup::text(&page.title)),
            ("LOCATION", &location),
        ])?;

        for entry in &page.entries {
            let href = Markup::url_path(&format!("{}/{}", page.location, entry.name));
            let row = self.row.render(&[
                ("HREF", &href),
                ("NAME", &Markup::text(&entry.name)),
                ("MODIFIED", &Markup::text(&format_modified(entry.modified))),
                ("SIZE", &Markup::text(&entry.size.to_string())),
                ("IS_DIR", &Markup::text(&entry.is_dir.to_string())),
            ])?;
            html.push(&row);
        }

        html.push(&self.footer.render(&[])?);
        Ok(html)
    }
}
