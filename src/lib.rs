mod debug;
mod error;
mod html;
mod metrics;
mod palette;
mod perf;
mod severity;
mod style;
mod types;

use debug::{DebugLogger, json_number, json_string};
pub use error::ColorizeError;
pub use html::parse_report;
pub use kuchiki::NodeRef;
pub use metrics::{PassMetrics, SkippedMarker};
pub use palette::Palette;
use perf::{PerfLogger, elapsed_ms};
pub use severity::{SEVERITY_MARKER, Severity};
pub use style::{ReferenceRules, palette_from_css};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use types::{channel_mode_str, marker_policy_str};
pub use types::{ChannelMode, Color, MarkerPolicy, Shade};

pub const DEFAULT_MARKER_SELECTOR: &str = ".taint";
pub const DEFAULT_SEVERITY_ATTRIBUTE: &str = "data-severity";

#[derive(Debug, Clone)]
enum PaletteSource {
    Explicit(Palette),
    Stylesheet(String),
    // The report's own stylesheets, re-read on every pass.
    Document,
}

/// Recolors taint markers in a rendered report by severity.
///
/// A pass reads the reference colors, works out every marker's shade and only
/// then writes backgrounds, so a strict failure leaves the document untouched.
pub struct Colorizer {
    palette_source: PaletteSource,
    reference_rules: ReferenceRules,
    marker_selector: String,
    severity_attribute: Option<String>,
    channel_mode: ChannelMode,
    marker_policy: MarkerPolicy,
    debug: Option<Arc<DebugLogger>>,
    perf: Option<Arc<PerfLogger>>,
    next_pass_id: AtomicUsize,
}

#[derive(Clone)]
pub struct ColorizerBuilder {
    palette: Option<Palette>,
    stylesheet: Option<String>,
    reference_rules: ReferenceRules,
    marker_selector: String,
    severity_attribute: Option<String>,
    channel_mode: ChannelMode,
    marker_policy: MarkerPolicy,
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
}

impl Colorizer {
    pub fn builder() -> ColorizerBuilder {
        ColorizerBuilder::new()
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.channel_mode
    }

    pub fn marker_policy(&self) -> MarkerPolicy {
        self.marker_policy
    }

    /// Runs one pass over an already parsed report. `base_dir` resolves
    /// relative `<link rel="stylesheet">` hrefs when the palette comes from the
    /// document itself.
    pub fn colorize_document(
        &self,
        document: &NodeRef,
        base_dir: Option<&Path>,
    ) -> Result<PassMetrics, ColorizeError> {
        let pass_id = self.next_pass_id.fetch_add(1, Ordering::Relaxed);
        let result = self.run_pass(pass_id, document, base_dir);
        self.emit_debug_summary(pass_id, &result);
        result
    }

    pub fn colorize_html(&self, html: &str) -> Result<(String, PassMetrics), ColorizeError> {
        let document = parse_report(html);
        let metrics = self.colorize_document(&document, None)?;
        let out = self.serialize_timed(&document)?;
        Ok((out, metrics))
    }

    /// Reads a report file and returns the recolored markup without writing it.
    pub fn colorize_path(
        &self,
        input: impl AsRef<Path>,
    ) -> Result<(String, PassMetrics), ColorizeError> {
        let input = input.as_ref();
        let source = std::fs::read_to_string(input)?;
        let document = parse_report(&source);
        let metrics = self.colorize_document(&document, input.parent())?;
        let out = self.serialize_timed(&document)?;
        Ok((out, metrics))
    }

    // `output` is only written when the whole pass succeeded.
    pub fn colorize_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<PassMetrics, ColorizeError> {
        let (out, metrics) = self.colorize_path(input)?;
        std::fs::write(output, out)?;
        Ok(metrics)
    }

    // Each job gets its own document; results come back in job order.
    pub fn colorize_files_parallel(
        &self,
        jobs: &[(PathBuf, PathBuf)],
    ) -> Vec<Result<PassMetrics, ColorizeError>> {
        use rayon::prelude::*;

        let start = Instant::now();
        let results: Vec<Result<PassMetrics, ColorizeError>> = jobs
            .par_iter()
            .map(|(input, output)| self.colorize_file(input, output))
            .collect();
        if let Some(perf) = self.perf.as_deref() {
            let failed = results.iter().filter(|r| r.is_err()).count();
            perf.log_span_ms("batch", None, elapsed_ms(start));
            perf.log_counts(
                "batch",
                None,
                &[
                    ("jobs", jobs.len() as u64),
                    ("failed", failed as u64),
                    ("threads", rayon::current_num_threads() as u64),
                ],
            );
            perf.flush();
        }
        results
    }

    fn run_pass(
        &self,
        pass_id: usize,
        document: &NodeRef,
        base_dir: Option<&Path>,
    ) -> Result<PassMetrics, ColorizeError> {
        let pass_start = Instant::now();
        if let Some(logger) = self.debug.as_deref() {
            let json = format!(
                "{{\"type\":\"taint.pass\",\"pass_id\":{},\"selector\":{},\"channel_mode\":\"{}\",\"policy\":\"{}\"}}",
                pass_id,
                json_string(&self.marker_selector),
                channel_mode_str(self.channel_mode),
                marker_policy_str(self.marker_policy)
            );
            logger.log_json(&json);
        }

        let start = Instant::now();
        let palette = self.resolve_palette(document, base_dir)?;
        self.log_span("palette", pass_id, start);

        let start = Instant::now();
        let markers = html::select_markers(document, &self.marker_selector)?;
        let mut metrics = PassMetrics::new(palette, markers.len());
        let mut planned = Vec::with_capacity(markers.len());
        for (idx, marker) in markers.iter().enumerate() {
            let position = idx + 1;
            match html::marker_severity(marker, self.severity_attribute.as_deref()) {
                Ok((severity, source)) => planned.push((marker, position, severity, source)),
                Err(err) => {
                    let err = at_marker(err, position);
                    if self.marker_policy == MarkerPolicy::Strict {
                        return Err(err);
                    }
                    let reason = err.to_string();
                    self.report_skip(pass_id, position, &reason);
                    metrics.skipped.push(SkippedMarker { position, reason });
                }
            }
        }
        self.log_span("markers", pass_id, start);

        let start = Instant::now();
        for (marker, position, severity, source) in planned {
            let shade = palette.shade(severity, self.channel_mode);
            let raw = palette.raw_shade(severity);
            if !raw.in_gamut() {
                metrics.out_of_gamut += 1;
            }
            html::apply_background(marker, shade);
            metrics.recolored += 1;
            if let Some(logger) = self.debug.as_deref() {
                let json = format!(
                    "{{\"type\":\"taint.shade\",\"pass_id\":{},\"position\":{},\"severity\":{},\"source\":\"{}\",\"color\":{},\"clamped\":{}}}",
                    pass_id,
                    position,
                    json_number(severity.percent()),
                    source.as_str(),
                    json_string(&shade.to_css()),
                    shade != raw
                );
                logger.log_json(&json);
            }
        }
        self.log_span("apply", pass_id, start);

        metrics.elapsed_ms = elapsed_ms(pass_start);
        if let Some(perf) = self.perf.as_deref() {
            perf.log_span_ms("pass", Some(pass_id), metrics.elapsed_ms);
            perf.log_counts("pass", Some(pass_id), &metrics.counts());
        }
        Ok(metrics)
    }

    fn resolve_palette(
        &self,
        document: &NodeRef,
        base_dir: Option<&Path>,
    ) -> Result<Palette, ColorizeError> {
        let debug = self.debug.as_deref();
        match &self.palette_source {
            PaletteSource::Explicit(palette) => Ok(*palette),
            PaletteSource::Stylesheet(css) => {
                style::resolve_palette(css, &self.reference_rules, debug)
            }
            PaletteSource::Document => {
                let sources = html::stylesheet_sources(document);
                let Some(first) = sources.first() else {
                    return Err(ColorizeError::MalformedStylesheet(
                        "report has no stylesheet".to_string(),
                    ));
                };
                let css = match &self.reference_rules {
                    ReferenceRules::Positional => html::load_stylesheet(first, base_dir)?,
                    ReferenceRules::Selectors { .. } => sources
                        .iter()
                        .map(|source| html::load_stylesheet(source, base_dir))
                        .collect::<Result<Vec<_>, _>>()?
                        .join("\n"),
                };
                style::resolve_palette(&css, &self.reference_rules, debug)
            }
        }
    }

    fn report_skip(&self, pass_id: usize, position: usize, reason: &str) {
        eprintln!("[taintshade][marker] pass {pass_id}: skipped marker #{position}: {reason}");
        if let Some(logger) = self.debug.as_deref() {
            let json = format!(
                "{{\"type\":\"taint.skipped\",\"pass_id\":{},\"position\":{},\"reason\":{}}}",
                pass_id,
                position,
                json_string(reason)
            );
            logger.log_json(&json);
        }
    }

    fn serialize_timed(&self, document: &NodeRef) -> Result<String, ColorizeError> {
        let start = Instant::now();
        let out = html::serialize_report(document)?;
        if let Some(perf) = self.perf.as_deref() {
            perf.log_span_ms("serialize", None, elapsed_ms(start));
            perf.flush();
        }
        Ok(out)
    }

    fn log_span(&self, name: &str, pass_id: usize, start: Instant) {
        if let Some(perf) = self.perf.as_deref() {
            perf.log_span_ms(name, Some(pass_id), elapsed_ms(start));
        }
    }

    fn emit_debug_summary(&self, pass_id: usize, result: &Result<PassMetrics, ColorizeError>) {
        if let Some(logger) = self.debug.as_deref() {
            let context = format!("pass {pass_id}");
            match result {
                Ok(metrics) => logger.log_summary(&context, &metrics.counts()),
                Err(err) => logger.log_json(&format!(
                    "{{\"type\":\"taint.failed\",\"pass_id\":{},\"error\":{}}}",
                    pass_id,
                    json_string(&err.to_string())
                )),
            }
            logger.flush();
        }
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
    }
}

fn at_marker(err: ColorizeError, position: usize) -> ColorizeError {
    match err {
        ColorizeError::MissingSeverityMarker(message) => {
            ColorizeError::MissingSeverityMarker(format!("marker #{position}: {message}"))
        }
        other => other,
    }
}

impl Default for ColorizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorizerBuilder {
    pub fn new() -> Self {
        Self {
            palette: None,
            stylesheet: None,
            reference_rules: ReferenceRules::Positional,
            marker_selector: DEFAULT_MARKER_SELECTOR.to_string(),
            severity_attribute: Some(DEFAULT_SEVERITY_ATTRIBUTE.to_string()),
            channel_mode: ChannelMode::Clamped,
            marker_policy: MarkerPolicy::Strict,
            debug_path: None,
            perf_path: None,
        }
    }

    // Explicit reference colors; the stylesheet is not consulted at all.
    pub fn palette(mut self, palette: Palette) -> Self {
        self.palette = Some(palette);
        self
    }

    // CSS text to read the reference rules from instead of the report's own sheets.
    pub fn stylesheet(mut self, css: impl Into<String>) -> Self {
        self.stylesheet = Some(css.into());
        self
    }

    pub fn reference_rules(mut self, rules: ReferenceRules) -> Self {
        self.reference_rules = rules;
        self
    }

    pub fn marker_selector(mut self, selector: impl Into<String>) -> Self {
        self.marker_selector = selector.into();
        self
    }

    pub fn severity_attribute(mut self, name: impl Into<String>) -> Self {
        self.severity_attribute = Some(name.into());
        self
    }

    // Read severities from marker text only.
    pub fn without_severity_attribute(mut self) -> Self {
        self.severity_attribute = None;
        self
    }

    pub fn channel_mode(mut self, mode: ChannelMode) -> Self {
        self.channel_mode = mode;
        self
    }

    pub fn marker_policy(mut self, policy: MarkerPolicy) -> Self {
        self.marker_policy = policy;
        self
    }

    // JSON-lines log of resolved reference colors, per-marker shades and counters.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // JSON-lines timing log for pass phases and batches.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Colorizer, ColorizeError> {
        let selector = self.marker_selector.trim().to_string();
        if selector.is_empty() {
            return Err(ColorizeError::InvalidConfiguration(
                "marker selector must not be empty".to_string(),
            ));
        }
        if kuchiki::Selectors::compile(&selector).is_err() {
            return Err(ColorizeError::InvalidConfiguration(format!(
                "marker selector \"{selector}\" is not valid"
            )));
        }
        if let Some(name) = &self.severity_attribute {
            if name.trim().is_empty() {
                return Err(ColorizeError::InvalidConfiguration(
                    "severity attribute name must not be empty".to_string(),
                ));
            }
        }
        if let ReferenceRules::Selectors { high, mid } = &self.reference_rules {
            if high.trim().is_empty() || mid.trim().is_empty() {
                return Err(ColorizeError::InvalidConfiguration(
                    "reference selectors must not be empty".to_string(),
                ));
            }
        }
        let palette_source = match (self.palette, self.stylesheet) {
            (Some(palette), _) => PaletteSource::Explicit(palette),
            (None, Some(css)) => PaletteSource::Stylesheet(css),
            (None, None) => PaletteSource::Document,
        };
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        let perf = if let Some(path) = self.perf_path {
            Some(Arc::new(PerfLogger::new(path)?))
        } else {
            None
        };
        Ok(Colorizer {
            palette_source,
            reference_rules: self.reference_rules,
            marker_selector: selector,
            severity_attribute: self.severity_attribute.map(|name| name.trim().to_string()),
            channel_mode: self.channel_mode,
            marker_policy: self.marker_policy,
            debug,
            perf,
            next_pass_id: AtomicUsize::new(0),
        })
    }
}
