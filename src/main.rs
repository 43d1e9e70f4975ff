use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser as ClapParser;
use color_eyre::eyre::{bail, eyre, Result, WrapErr};

use taintshade::{
    ChannelMode, Color, Colorizer, MarkerPolicy, Palette, PassMetrics, ReferenceRules,
    DEFAULT_MARKER_SELECTOR, DEFAULT_SEVERITY_ATTRIBUTE,
};

#[derive(ClapParser, Debug)]
#[command(
    name = "taintshade",
    version,
    about = "Recolor taint markers in an HTML report by their severity level"
)]
struct Cli {
    /// Report file(s) to recolor.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write the recolored report to this file (single input only).
    #[arg(short, long, conflicts_with = "in_place")]
    output: Option<PathBuf>,

    /// Rewrite every input file in place.
    #[arg(long)]
    in_place: bool,

    /// Read the reference colors from this stylesheet instead of the report's own.
    #[arg(long)]
    css: Option<PathBuf>,

    /// Color for 100% severity, e.g. "rgb(255, 0, 0)" or "255,0,0".
    #[arg(long, requires = "mid")]
    high: Option<String>,

    /// Color for 50% severity.
    #[arg(long, requires = "high")]
    mid: Option<String>,

    /// Selector of the rule holding the 100% color (default: first rule).
    #[arg(long, requires = "mid_rule")]
    high_rule: Option<String>,

    /// Selector of the rule holding the 50% color (default: second rule).
    #[arg(long, requires = "high_rule")]
    mid_rule: Option<String>,

    /// CSS selector of the marker elements.
    #[arg(long, default_value = DEFAULT_MARKER_SELECTOR)]
    selector: String,

    /// Attribute carrying a typed severity percentage.
    #[arg(long, default_value = DEFAULT_SEVERITY_ATTRIBUTE)]
    severity_attr: String,

    /// Only read severities from the marker text.
    #[arg(long)]
    no_severity_attr: bool,

    /// Skip markers without a readable severity instead of failing.
    #[arg(long)]
    lenient: bool,

    /// Do not clamp channels to 0..=255 for severities outside 0..=100.
    #[arg(long)]
    unclamped: bool,

    /// Write a JSON-lines debug log.
    #[arg(long)]
    debug_log: Option<PathBuf>,

    /// Write a JSON-lines timing log.
    #[arg(long)]
    perf_log: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let colorizer = build_colorizer(&cli)?;

    if cli.in_place {
        return run_in_place(&colorizer, &cli.inputs);
    }

    let input = single_input(&cli)?;
    match &cli.output {
        Some(output) => {
            let metrics = colorizer
                .colorize_file(input, output)
                .wrap_err_with(|| format!("failed to recolor {}", input.display()))?;
            eprintln!("{}", summary_line(input, &metrics));
        }
        None => {
            let (html, metrics) = colorizer
                .colorize_path(input)
                .wrap_err_with(|| format!("failed to recolor {}", input.display()))?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(html.as_bytes())?;
            stdout.flush()?;
            eprintln!("{}", summary_line(input, &metrics));
        }
    }
    Ok(())
}

fn single_input(cli: &Cli) -> Result<&PathBuf> {
    match cli.inputs.as_slice() {
        [input] => Ok(input),
        inputs => bail!("{} inputs given; several reports need --in-place", inputs.len()),
    }
}

fn run_in_place(colorizer: &Colorizer, inputs: &[PathBuf]) -> Result<()> {
    let jobs: Vec<(PathBuf, PathBuf)> = inputs
        .iter()
        .map(|path| (path.clone(), path.clone()))
        .collect();
    let results = colorizer.colorize_files_parallel(&jobs);
    let mut failures = 0usize;
    for ((input, _), result) in jobs.iter().zip(results) {
        match result {
            Ok(metrics) => eprintln!("{}", summary_line(input, &metrics)),
            Err(err) => {
                failures += 1;
                eprintln!("{}: {err}", input.display());
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} report(s) could not be recolored", jobs.len());
    }
    Ok(())
}

fn build_colorizer(cli: &Cli) -> Result<Colorizer> {
    let mut builder = Colorizer::builder()
        .marker_selector(cli.selector.clone())
        .channel_mode(if cli.unclamped {
            ChannelMode::Unclamped
        } else {
            ChannelMode::Clamped
        })
        .marker_policy(if cli.lenient {
            MarkerPolicy::Lenient
        } else {
            MarkerPolicy::Strict
        });
    builder = if cli.no_severity_attr {
        builder.without_severity_attribute()
    } else {
        builder.severity_attribute(cli.severity_attr.clone())
    };

    if let (Some(high), Some(mid)) = (&cli.high, &cli.mid) {
        builder = builder.palette(Palette::new(parse_color_arg(high)?, parse_color_arg(mid)?));
    }
    if let Some(css_path) = &cli.css {
        let css = std::fs::read_to_string(css_path)
            .wrap_err_with(|| format!("failed to read stylesheet {}", css_path.display()))?;
        builder = builder.stylesheet(css);
    }
    if let (Some(high), Some(mid)) = (&cli.high_rule, &cli.mid_rule) {
        builder = builder.reference_rules(ReferenceRules::Selectors {
            high: high.clone(),
            mid: mid.clone(),
        });
    }
    if let Some(path) = &cli.debug_log {
        builder = builder.debug_log(path);
    }
    if let Some(path) = &cli.perf_log {
        builder = builder.perf_log(path);
    }
    Ok(builder.build()?)
}

fn parse_color_arg(raw: &str) -> Result<Color> {
    Color::from_rgb_literal(raw).ok_or_else(|| eyre!("\"{raw}\" is not an rgb color"))
}

fn summary_line(input: &Path, metrics: &PassMetrics) -> String {
    format!(
        "{}: recolored {}/{} marker(s), {} skipped, {} out of gamut ({:.1} ms)",
        input.display(),
        metrics.recolored,
        metrics.marker_count,
        metrics.skipped.len(),
        metrics.out_of_gamut,
        metrics.elapsed_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("taintshade").chain(args.iter().copied()))
    }

    #[test]
    fn several_inputs_need_in_place() {
        let cli = parse(&["a.html", "b.html"]).expect("args");
        let err = single_input(&cli).expect_err("two inputs without --in-place");
        assert!(err.to_string().contains("--in-place"), "{err}");

        let cli = parse(&["--in-place", "a.html", "b.html"]).expect("args");
        assert!(cli.in_place);
        assert_eq!(cli.inputs.len(), 2);
    }

    #[test]
    fn explicit_colors_come_in_pairs() {
        let err = parse(&["--high", "255,0,0", "a.html"]).expect_err("missing --mid");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = parse(&["--mid-rule", ".sinks", "a.html"]).expect_err("missing --high-rule");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn output_conflicts_with_in_place() {
        let err = parse(&["--in-place", "-o", "out.html", "a.html"]).expect_err("conflict");
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn bad_color_literal_is_rejected() {
        let cli = parse(&["--high", "red", "--mid", "255,255,0", "a.html"]).expect("args");
        match build_colorizer(&cli) {
            Err(err) => assert!(err.to_string().contains("\"red\""), "{err}"),
            Ok(_) => panic!("named colors are not rgb literals"),
        }
    }

    #[test]
    fn flags_reach_the_colorizer() {
        let cli = parse(&[
            "--high",
            "rgb(255, 0, 0)",
            "--mid",
            "255 255 0",
            "--lenient",
            "--unclamped",
            "a.html",
        ])
        .expect("args");
        let colorizer = build_colorizer(&cli).expect("colorizer");
        assert_eq!(colorizer.marker_policy(), MarkerPolicy::Lenient);
        assert_eq!(colorizer.channel_mode(), ChannelMode::Unclamped);

        let (out, _) = colorizer
            .colorize_html(r#"<li class="taint">Severity level: 0%.</li>"#)
            .expect("pass");
        assert!(out.contains("rgb(255, 510, 0)"), "{out}");
    }
}
