use crate::error::ColorizeError;
use crate::severity::Severity;
use crate::style::merge_inline_background;
use crate::types::Shade;
use kuchiki::traits::TendrilSink;
use kuchiki::{ElementData, NodeData, NodeDataRef, NodeRef};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StylesheetSource {
    Embedded(String),
    Linked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeveritySource {
    Attribute,
    Text,
}

impl SeveritySource {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SeveritySource::Attribute => "attribute",
            SeveritySource::Text => "text",
        }
    }
}

pub fn parse_report(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

/// Stylesheets in document order, the way `document.styleSheets` lists them.
/// `<style>` blocks inside inline SVG are not part of the report's sheets.
pub(crate) fn stylesheet_sources(document: &NodeRef) -> Vec<StylesheetSource> {
    let mut sources = Vec::new();
    let Ok(nodes) = document.select("link[rel][href], style") else {
        return sources;
    };
    for node in nodes {
        if node.name.local.as_ref().eq_ignore_ascii_case("style") {
            if inside_svg(node.as_node()) {
                continue;
            }
            sources.push(StylesheetSource::Embedded(node.as_node().text_contents()));
            continue;
        }
        let attrs = node.attributes.borrow();
        let is_stylesheet = attrs
            .get("rel")
            .map(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            })
            .unwrap_or(false);
        if !is_stylesheet {
            continue;
        }
        if let Some(href) = attrs.get("href") {
            let href = href.trim();
            if !href.is_empty() {
                sources.push(StylesheetSource::Linked(href.to_string()));
            }
        }
    }
    sources
}

fn inside_svg(node: &NodeRef) -> bool {
    node.ancestors().any(|ancestor| {
        if let NodeData::Element(el) = ancestor.data() {
            el.name.local.as_ref().eq_ignore_ascii_case("svg")
        } else {
            false
        }
    })
}

pub(crate) fn load_stylesheet(
    source: &StylesheetSource,
    base_dir: Option<&Path>,
) -> Result<String, ColorizeError> {
    let href = match source {
        StylesheetSource::Embedded(css) => return Ok(css.clone()),
        StylesheetSource::Linked(href) => href,
    };
    if href.contains("://") || href.starts_with("//") {
        return Err(ColorizeError::MalformedStylesheet(format!(
            "remote stylesheet \"{href}\" cannot be loaded"
        )));
    }
    let Some(base_dir) = base_dir else {
        return Err(ColorizeError::MalformedStylesheet(format!(
            "linked stylesheet \"{href}\" needs the report's directory to be resolved"
        )));
    };
    let relative = href
        .split(['?', '#'])
        .next()
        .unwrap_or(href.as_str());
    let path = base_dir.join(relative);
    std::fs::read_to_string(&path).map_err(|err| {
        ColorizeError::MalformedStylesheet(format!(
            "linked stylesheet {} cannot be read: {err}",
            path.display()
        ))
    })
}

pub(crate) fn select_markers(
    document: &NodeRef,
    selector: &str,
) -> Result<Vec<NodeDataRef<ElementData>>, ColorizeError> {
    let markers = document.select(selector).map_err(|()| {
        ColorizeError::InvalidConfiguration(format!("marker selector \"{selector}\" is not valid"))
    })?;
    Ok(markers.collect())
}

// A typed attribute wins over the legacy "Severity level: N%" text.
pub(crate) fn marker_severity(
    marker: &NodeDataRef<ElementData>,
    attribute: Option<&str>,
) -> Result<(Severity, SeveritySource), ColorizeError> {
    if let Some(name) = attribute {
        let attrs = marker.attributes.borrow();
        if let Some(raw) = attrs.get(name) {
            return Severity::parse_percent(raw)
                .map(|severity| (severity, SeveritySource::Attribute))
                .ok_or_else(|| {
                    ColorizeError::MissingSeverityMarker(format!(
                        "attribute {name}=\"{raw}\" is not a percentage"
                    ))
                });
        }
    }
    let text = marker.as_node().text_contents();
    Severity::from_marker_text(&text).map(|severity| (severity, SeveritySource::Text))
}

pub(crate) fn apply_background(marker: &NodeDataRef<ElementData>, shade: Shade) {
    let mut attrs = marker.attributes.borrow_mut();
    let merged = merge_inline_background(attrs.get("style"), shade);
    attrs.insert("style", merged);
}

pub(crate) fn serialize_report(document: &NodeRef) -> Result<String, ColorizeError> {
    let mut out = Vec::new();
    document.serialize(&mut out)?;
    String::from_utf8(out)
        .map_err(|err| ColorizeError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}
