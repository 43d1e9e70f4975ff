use std::fmt;

/// Reference color on the 0-255 channel scale. Channels may be fractional
/// because they come straight out of a stylesheet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn channels(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    // Takes the first three numeric tokens of a literal such as
    // `rgb(255, 128.5, 0)` or `255 0 0`. Alpha and anything after it is ignored.
    pub fn from_rgb_literal(raw: &str) -> Option<Color> {
        let tokens = numeric_tokens(raw);
        if tokens.len() < 3 {
            return None;
        }
        let r = tokens[0].parse::<f32>().ok()?;
        let g = tokens[1].parse::<f32>().ok()?;
        let b = tokens[2].parse::<f32>().ok()?;
        if !(r.is_finite() && g.is_finite() && b.is_finite()) {
            return None;
        }
        Some(Color::rgb(r, g, b))
    }
}

fn numeric_tokens(raw: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in raw.char_indices() {
        let numeric = ch.is_ascii_digit() || ch == '.';
        match (numeric, start) {
            (true, None) => start = Some(idx),
            (false, Some(begin)) => {
                out.push(&raw[begin..idx]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        out.push(&raw[begin..]);
    }
    out
}

/// Interpolated marker background. Channels are integers but are not
/// guaranteed to be inside 0..=255 when produced with `ChannelMode::Unclamped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shade {
    pub r: i32,
    pub g: i32,
    pub b: i32,
}

impl Shade {
    pub fn new(r: i32, g: i32, b: i32) -> Self {
        Self { r, g, b }
    }

    pub fn in_gamut(self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|channel| (0..=255).contains(channel))
    }

    pub fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(0, 255),
            g: self.g.clamp(0, 255),
            b: self.b.clamp(0, 255),
        }
    }

    pub fn to_css(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Shade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Clamped,
    Unclamped,
}

/// What to do with a marker whose severity cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPolicy {
    // Abort the pass before any element is written.
    Strict,
    // Leave the marker untouched, record it and keep going.
    Lenient,
}

pub(crate) fn channel_mode_str(mode: ChannelMode) -> &'static str {
    match mode {
        ChannelMode::Clamped => "clamped",
        ChannelMode::Unclamped => "unclamped",
    }
}

pub(crate) fn marker_policy_str(policy: MarkerPolicy) -> &'static str {
    match policy {
        MarkerPolicy::Strict => "strict",
        MarkerPolicy::Lenient => "lenient",
    }
}
