use crate::palette::Palette;

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedMarker {
    // 1-based position among the selected markers, in document order.
    pub position: usize,
    pub reason: String,
}

/// Outcome of one colorization pass over one document.
#[derive(Debug, Clone, PartialEq)]
pub struct PassMetrics {
    pub palette: Palette,
    pub marker_count: usize,
    pub recolored: usize,
    pub skipped: Vec<SkippedMarker>,
    // Shades whose unclamped channels fell outside 0..=255.
    pub out_of_gamut: usize,
    pub elapsed_ms: f64,
}

impl PassMetrics {
    pub(crate) fn new(palette: Palette, marker_count: usize) -> Self {
        Self {
            palette,
            marker_count,
            recolored: 0,
            skipped: Vec::new(),
            out_of_gamut: 0,
            elapsed_ms: 0.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.recolored == self.marker_count
    }

    pub(crate) fn counts(&self) -> [(&'static str, u64); 4] {
        [
            ("taint.markers", self.marker_count as u64),
            ("taint.recolored", self.recolored as u64),
            ("taint.skipped", self.skipped.len() as u64),
            ("taint.out_of_gamut", self.out_of_gamut as u64),
        ]
    }
}
