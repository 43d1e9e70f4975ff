use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::debug::{json_counts, json_string};

#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    span_totals: BTreeMap<String, (f64, u64)>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                span_totals: BTreeMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, pass_id: Option<usize>, ms: f64) {
        let json = format!(
            "{{\"type\":\"perf.span\",\"name\":{},\"pass_id\":{},\"unit\":\"ms\",\"ms\":{:.3}}}",
            json_string(name),
            pass_id_json(pass_id),
            ms
        );
        if let Ok(mut state) = self.inner.lock() {
            let entry = state
                .span_totals
                .entry(name.to_string())
                .or_insert((0.0, 0));
            entry.0 += ms;
            entry.1 = entry.1.saturating_add(1);
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn log_counts(&self, name: &str, pass_id: Option<usize>, counts: &[(&str, u64)]) {
        let json = format!(
            "{{\"type\":\"perf.counts\",\"name\":{},\"pass_id\":{},\"counts\":{}}}",
            json_string(name),
            pass_id_json(pass_id),
            json_counts(counts)
        );
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

impl Drop for PerfState {
    fn drop(&mut self) {
        for (name, (ms, count)) in &self.span_totals {
            let avg = if *count == 0 { 0.0 } else { ms / *count as f64 };
            let _ = writeln!(
                self.writer,
                "{{\"type\":\"perf.totals\",\"name\":{},\"unit\":\"ms\",\"ms\":{:.3},\"count\":{},\"avg_ms\":{:.3}}}",
                json_string(name),
                ms,
                count,
                avg
            );
        }
        let _ = self.writer.flush();
    }
}

fn pass_id_json(pass_id: Option<usize>) -> String {
    pass_id
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_written_when_last_handle_drops() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("perf.jsonl");
        {
            let logger = PerfLogger::new(&path).expect("logger");
            let clone = logger.clone();
            logger.log_span_ms("pass", Some(0), 2.0);
            clone.log_span_ms("pass", Some(1), 4.0);
            logger.log_counts("pass", None, &[("markers", 3), ("skipped", 0)]);
        }

        let text = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("\"pass_id\":0"));
        assert_eq!(
            lines[2],
            "{\"type\":\"perf.counts\",\"name\":\"pass\",\"pass_id\":null,\"counts\":{\"markers\":3,\"skipped\":0}}"
        );
        assert_eq!(
            lines[3],
            "{\"type\":\"perf.totals\",\"name\":\"pass\",\"unit\":\"ms\",\"ms\":6.000,\"count\":2,\"avg_ms\":3.000}"
        );
    }
}
