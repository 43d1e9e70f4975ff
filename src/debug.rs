use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSON-lines diagnostics sink shared by every pass of a `Colorizer`.
///
/// Passes running on different threads interleave their event lines; each
/// line carries a `pass_id` (or a `context` for summaries) to tell them apart.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn log_json(&self, json: &str) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{json}");
        }
    }

    // Counts belong to one pass only, so concurrent passes never mix them.
    pub fn log_summary(&self, context: &str, counts: &[(&str, u64)]) {
        self.log_json(&format!(
            "{{\"type\":\"debug.summary\",\"context\":{},\"counts\":{}}}",
            json_string(context),
            json_counts(counts)
        ));
    }

    pub fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

/// Quoted, escaped JSON string literal.
pub(crate) fn json_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

// Non-finite numbers are not valid JSON.
pub(crate) fn json_number(value: f64) -> String {
    if value.is_finite() {
        format!("{value}")
    } else {
        "null".to_string()
    }
}

pub(crate) fn json_counts(counts: &[(&str, u64)]) -> String {
    let fields = counts
        .iter()
        .map(|(key, value)| format!("{}:{}", json_string(key), value))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{fields}}}")
}
