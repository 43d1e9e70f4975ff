use crate::debug::{DebugLogger, json_string};
use crate::error::ColorizeError;
use crate::palette::Palette;
use crate::types::{Color, Shade};
use lightningcss::declaration::DeclarationBlock;
use lightningcss::properties::{Property, PropertyId};
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::traits::ToCss;
use lightningcss::values::color::{CssColor, SRGB};

/// Where the two reference colors live in the stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReferenceRules {
    // Rule #1 holds the high color, rule #2 the mid color.
    #[default]
    Positional,
    // First top-level style rule whose selector list contains the selector.
    Selectors { high: String, mid: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferenceRole {
    High,
    Mid,
}

impl ReferenceRole {
    fn as_str(self) -> &'static str {
        match self {
            ReferenceRole::High => "high",
            ReferenceRole::Mid => "mid",
        }
    }

    fn position(self) -> usize {
        match self {
            ReferenceRole::High => 0,
            ReferenceRole::Mid => 1,
        }
    }
}

enum BackgroundValue<'a> {
    Color(&'a CssColor),
    Unresolved,
}

pub fn palette_from_css(css: &str, rules: &ReferenceRules) -> Result<Palette, ColorizeError> {
    resolve_palette(css, rules, None)
}

pub(crate) fn resolve_palette(
    css: &str,
    rules: &ReferenceRules,
    debug: Option<&DebugLogger>,
) -> Result<Palette, ColorizeError> {
    let sheet = StyleSheet::parse(css, ParserOptions::default()).map_err(|err| {
        ColorizeError::MalformedStylesheet(format!("stylesheet does not parse: {err}"))
    })?;
    let high = reference_color(&sheet.rules, rules, ReferenceRole::High, debug)?;
    let mid = reference_color(&sheet.rules, rules, ReferenceRole::Mid, debug)?;
    Ok(Palette::new(high, mid))
}

fn reference_color(
    sheet_rules: &CssRuleList,
    rules: &ReferenceRules,
    role: ReferenceRole,
    debug: Option<&DebugLogger>,
) -> Result<Color, ColorizeError> {
    let (declarations, locator) = match rules {
        ReferenceRules::Positional => {
            let index = role.position();
            let locator = format!("rule #{}", index + 1);
            let Some(rule) = sheet_rules.0.get(index) else {
                return Err(ColorizeError::MalformedStylesheet(format!(
                    "{} color expects {} but the stylesheet has {} rule(s)",
                    role.as_str(),
                    locator,
                    sheet_rules.0.len()
                )));
            };
            let CssRule::Style(style) = rule else {
                return Err(ColorizeError::MalformedStylesheet(format!(
                    "{} ({} color) is not a style rule",
                    locator,
                    role.as_str()
                )));
            };
            (&style.declarations, locator)
        }
        ReferenceRules::Selectors { high, mid } => {
            let selector = match role {
                ReferenceRole::High => high,
                ReferenceRole::Mid => mid,
            };
            let Some(declarations) = find_rule_declarations(sheet_rules, selector) else {
                return Err(ColorizeError::MalformedStylesheet(format!(
                    "no style rule for selector \"{}\" ({} color)",
                    selector.trim(),
                    role.as_str()
                )));
            };
            (declarations, format!("selector {}", selector.trim()))
        }
    };

    let color = match declared_background(declarations) {
        Some(BackgroundValue::Color(css_color)) => css_color_to_color(css_color),
        Some(BackgroundValue::Unresolved) | None => None,
    };
    let Some(color) = color else {
        return Err(ColorizeError::MalformedStylesheet(format!(
            "{} ({} color) has no background-color with three resolvable channels",
            locator,
            role.as_str()
        )));
    };

    if let Some(logger) = debug {
        let json = format!(
            "{{\"type\":\"css.reference\",\"role\":{},\"locator\":{},\"r\":{},\"g\":{},\"b\":{}}}",
            json_string(role.as_str()),
            json_string(&locator),
            color.r,
            color.g,
            color.b
        );
        logger.log_json(&json);
    }
    Ok(color)
}

fn find_rule_declarations<'a, 'i>(
    rules: &'a CssRuleList<'i>,
    selector: &str,
) -> Option<&'a DeclarationBlock<'i>> {
    let wanted = selector.trim();
    for rule in &rules.0 {
        if let CssRule::Style(style) = rule {
            let selectors = style
                .selectors
                .to_css_string(PrinterOptions::default())
                .unwrap_or_default();
            if selectors.split(',').any(|candidate| candidate.trim() == wanted) {
                return Some(&style.declarations);
            }
        }
    }
    None
}

// Last declaration wins; `!important` beats normal declarations.
fn declared_background<'a>(declarations: &'a DeclarationBlock) -> Option<BackgroundValue<'a>> {
    last_background(&declarations.important_declarations)
        .or_else(|| last_background(&declarations.declarations))
}

fn last_background<'a>(properties: &'a [Property]) -> Option<BackgroundValue<'a>> {
    properties.iter().filter_map(background_of).last()
}

fn background_of<'a>(property: &'a Property) -> Option<BackgroundValue<'a>> {
    match property {
        Property::BackgroundColor(color) => Some(BackgroundValue::Color(color)),
        Property::Background(layers) => layers
            .last()
            .map(|layer| BackgroundValue::Color(&layer.color)),
        Property::Unparsed(unparsed) => match unparsed.property_id {
            PropertyId::BackgroundColor | PropertyId::Background => {
                Some(BackgroundValue::Unresolved)
            }
            _ => None,
        },
        _ => None,
    }
}

// Alpha is dropped: only the three color channels take part in interpolation.
// A fully transparent background has no color to read; lightningcss also
// fills one in for a `background` shorthand that names no color.
fn css_color_to_color(color: &CssColor) -> Option<Color> {
    if let CssColor::RGBA(rgba) = color {
        if rgba.alpha == 0 {
            return None;
        }
        return Some(Color::rgb(
            rgba.red as f32,
            rgba.green as f32,
            rgba.blue as f32,
        ));
    }
    if matches!(color, CssColor::CurrentColor) {
        return None;
    }
    let srgb = SRGB::try_from(color).ok()?;
    if srgb.alpha <= 0.0 {
        return None;
    }
    let channels = [srgb.r, srgb.g, srgb.b];
    if !channels.iter().all(|c| c.is_finite()) {
        return None;
    }
    Some(Color::rgb(
        srgb.r * 255.0,
        srgb.g * 255.0,
        srgb.b * 255.0,
    ))
}

/// Rewrites an inline `style` attribute so that it ends with the given
/// background, keeping every other declaration in place.
pub(crate) fn merge_inline_background(existing: Option<&str>, shade: Shade) -> String {
    let mut declarations: Vec<String> = existing
        .map(split_declarations)
        .unwrap_or_default()
        .into_iter()
        .filter(|declaration| !is_background_color(declaration))
        .collect();
    declarations.push(format!("background-color: {shade}"));
    declarations
        .iter()
        .map(|declaration| format!("{declaration};"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_background_color(declaration: &str) -> bool {
    declaration
        .split_once(':')
        .map(|(name, _)| name.trim().eq_ignore_ascii_case("background-color"))
        .unwrap_or(false)
}

fn split_declarations(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for ch in raw.chars() {
        match (ch, quote) {
            (q, Some(open)) if q == open => {
                quote = None;
                current.push(ch);
            }
            (_, Some(_)) => current.push(ch),
            ('"' | '\'', None) => {
                quote = Some(ch);
                current.push(ch);
            }
            ('(', None) => {
                depth += 1;
                current.push(ch);
            }
            (')', None) => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            (';', None) if depth == 0 => {
                if !current.trim().is_empty() {
                    out.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT_CSS: &str = "
        .taints { background-color: rgb(255, 0, 0); }
        .sinks { background-color: rgb(255, 255, 0); }
        .method { color: navy; }
    ";

    fn malformed(result: Result<Palette, ColorizeError>) -> String {
        match result {
            Err(ColorizeError::MalformedStylesheet(message)) => message,
            other => panic!("expected MalformedStylesheet, got {other:?}"),
        }
    }

    #[test]
    fn positional_rules_give_high_then_mid() {
        let palette = palette_from_css(REPORT_CSS, &ReferenceRules::Positional).expect("palette");
        assert_eq!(palette.high, Color::rgb(255.0, 0.0, 0.0));
        assert_eq!(palette.mid, Color::rgb(255.0, 255.0, 0.0));
    }

    #[test]
    fn selector_rules_ignore_order() {
        let css = "
            .sinks { background-color: rgb(10, 20, 30); }
            h1, .taints { background: rgb(40, 50, 60) no-repeat; }
        ";
        let rules = ReferenceRules::Selectors {
            high: ".taints".to_string(),
            mid: ".sinks".to_string(),
        };
        let palette = palette_from_css(css, &rules).expect("palette");
        assert_eq!(palette.high, Color::rgb(40.0, 50.0, 60.0));
        assert_eq!(palette.mid, Color::rgb(10.0, 20.0, 30.0));
    }

    #[test]
    fn important_declaration_wins() {
        let css = "
            a { background-color: rgb(1, 2, 3) !important; background-color: rgb(9, 9, 9); }
            b { background-color: rgb(4, 5, 6); }
        ";
        let palette = palette_from_css(css, &ReferenceRules::Positional).expect("palette");
        assert_eq!(palette.high, Color::rgb(1.0, 2.0, 3.0));
    }

    #[test]
    fn hex_reference_colors_resolve() {
        let css = "a { background-color: #ff0000; } b { background-color: #ff0; }";
        let palette = palette_from_css(css, &ReferenceRules::Positional).expect("palette");
        assert_eq!(palette.high, Color::rgb(255.0, 0.0, 0.0));
        assert_eq!(palette.mid, Color::rgb(255.0, 255.0, 0.0));
    }

    #[test]
    fn missing_second_rule_is_malformed() {
        let message = malformed(palette_from_css(
            ".taints { background-color: rgb(255, 0, 0); }",
            &ReferenceRules::Positional,
        ));
        assert!(message.contains("rule #2"), "{message}");
    }

    #[test]
    fn rule_without_background_is_malformed() {
        let css = "a { color: red; } b { background-color: rgb(1, 1, 1); }";
        let message = malformed(palette_from_css(css, &ReferenceRules::Positional));
        assert!(message.contains("rule #1"), "{message}");
    }

    #[test]
    fn unresolvable_background_is_malformed() {
        for value in ["var(--accent)", "currentColor"] {
            let css = format!(
                "a {{ background-color: rgb(255, 0, 0); }} b {{ background-color: {value}; }}"
            );
            let message = malformed(palette_from_css(&css, &ReferenceRules::Positional));
            assert!(message.contains("mid color"), "{message}");
        }
    }

    #[test]
    fn transparent_background_is_malformed() {
        for high in [
            "background-color: transparent",
            "background-color: rgba(255, 0, 0, 0)",
            "background: url(x.png) no-repeat",
        ] {
            let css = format!("a {{ {high}; }} b {{ background-color: rgb(255, 255, 0); }}");
            let message = malformed(palette_from_css(&css, &ReferenceRules::Positional));
            assert!(message.contains("high color"), "{high}: {message}");
        }
    }

    #[test]
    fn translucent_background_keeps_its_channels() {
        let css = "a { background-color: rgba(255, 0, 0, 0.5); } b { background-color: rgb(255, 255, 0); }";
        let palette = palette_from_css(css, &ReferenceRules::Positional).expect("palette");
        assert_eq!(palette.high, Color::rgb(255.0, 0.0, 0.0));
    }

    #[test]
    fn non_style_first_rule_is_malformed() {
        let css = "@media print { a { background-color: rgb(1, 1, 1); } }
                   b { background-color: rgb(2, 2, 2); }";
        let message = malformed(palette_from_css(css, &ReferenceRules::Positional));
        assert!(message.contains("not a style rule"), "{message}");
    }

    #[test]
    fn unknown_selector_is_malformed() {
        let rules = ReferenceRules::Selectors {
            high: ".taints".to_string(),
            mid: ".missing".to_string(),
        };
        let message = malformed(palette_from_css(REPORT_CSS, &rules));
        assert!(message.contains(".missing"), "{message}");
    }

    #[test]
    fn merge_keeps_other_declarations() {
        let shade = Shade::new(255, 128, 0);
        assert_eq!(
            merge_inline_background(None, shade),
            "background-color: rgb(255, 128, 0);"
        );
        assert_eq!(
            merge_inline_background(
                Some("color: red; BACKGROUND-COLOR: blue; background-image: url(\"a;b.png\")"),
                shade
            ),
            "color: red; background-image: url(\"a;b.png\"); background-color: rgb(255, 128, 0);"
        );
    }

    #[test]
    fn merge_is_stable_when_repeated() {
        let shade = Shade::new(1, 2, 3);
        let once = merge_inline_background(Some("margin: 0"), shade);
        let twice = merge_inline_background(Some(&once), shade);
        assert_eq!(once, twice);
    }
}
