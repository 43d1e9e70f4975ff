use crate::error::ColorizeError;

pub const SEVERITY_MARKER: &str = "Severity level: ";

/// Finding criticality in percent. 50 is the baseline (plain sink), 100 an
/// unsanitized taint; anything else extrapolates.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Severity(f64);

impl Severity {
    pub const SINK: Severity = Severity(50.0);
    pub const UNSANITIZED: Severity = Severity(100.0);

    pub fn from_percent(percent: f64) -> Self {
        Severity(percent)
    }

    pub fn percent(self) -> f64 {
        self.0
    }

    /// Position on the mid -> high axis: 0 at 50%, 1 at 100%.
    pub fn distance(self) -> f64 {
        (self.0 - 50.0) / 50.0
    }

    // A sanitizer further away than `limit` levels counts as no sanitizer.
    pub fn for_sanitizer(level: u32, limit: u32) -> Self {
        if limit == 0 {
            return Severity::UNSANITIZED;
        }
        let ratio = (level as f64 / limit as f64).min(1.0);
        Severity(50.0 + ratio * 50.0)
    }

    // Accepts `75`, `62.5`, ` 75 % `.
    pub fn parse_percent(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
        if trimmed.is_empty() {
            return None;
        }
        let value = trimmed.parse::<f64>().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(Severity(value))
    }

    /// Reads the number between the first `Severity level: ` and the `%` that
    /// follows it.
    pub fn from_marker_text(text: &str) -> Result<Self, ColorizeError> {
        let Some((_, rest)) = text.split_once(SEVERITY_MARKER) else {
            return Err(ColorizeError::MissingSeverityMarker(format!(
                "no \"{}\" in text",
                SEVERITY_MARKER.trim_end()
            )));
        };
        let Some((number, _)) = rest.split_once('%') else {
            return Err(ColorizeError::MissingSeverityMarker(
                "severity is not terminated by '%'".to_string(),
            ));
        };
        Severity::parse_percent(number).ok_or_else(|| {
            ColorizeError::MissingSeverityMarker(format!(
                "severity \"{}\" is not a number",
                number.trim()
            ))
        })
    }
}
