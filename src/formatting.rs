use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pse_lib::output::PSE_OUTPUT_VERSION;
use pse_lib::{ErrorOutput, ExtractError, PseOutput};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &PseOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: ExtractError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let error_payload = err.to_payload();
    let payload = PseOutput::Error(ErrorOutput {
        version: PSE_OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    ExitCode::from(2)
}

fn write_json_output(body: &PseOutput, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

fn write_pretty_output(body: &PseOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &PseOutput, colorize: bool) -> String {
    match body {
        PseOutput::Extract(out) => {
            let mut buf = String::new();
            let snapshot = &out.snapshot;
            let stats = &snapshot.metadata.stats;
            let status = if snapshot.errors.is_empty() {
                color("OK", "32", colorize)
            } else {
                color("PARTIAL", "33", colorize)
            };
            writeln!(buf, "{} Style snapshot of {}", status, out.source.value).ok();
            writeln!(buf, "Viewport: {}", snapshot.metadata.viewport).ok();
            writeln!(
                buf,
                "Elements: {} kept of {} processed ({} candidates, {} off-screen)",
                stats.elements_kept, stats.elements_processed, stats.candidates, stats.offscreen_skipped
            )
            .ok();
            writeln!(
                buf,
                "Stylesheets: {} ({} fetched, {} failed)",
                stats.stylesheets, stats.stylesheets_fetched, stats.stylesheets_failed
            )
            .ok();

            let sections = [
                ("computedStyles", snapshot.computed_styles.len()),
                ("importantRules", snapshot.important_rules.len()),
                ("mediaQueries", snapshot.media_queries.len()),
                ("animations", snapshot.animations.len()),
                ("customProperties", snapshot.custom_properties.len()),
            ];
            writeln!(buf, "Sections:").ok();
            for (name, count) in sections {
                writeln!(buf, "- {:18} {}", name, count).ok();
            }

            if let Some(timings) = &snapshot.metadata.performance {
                writeln!(
                    buf,
                    "Timing: {:.0}ms total (stylesheets {:.0}ms, elements {:.0}ms, theme {:.0}ms)",
                    timings.total, timings.stylesheets, timings.elements, timings.theme
                )
                .ok();
            }

            if !snapshot.errors.is_empty() {
                writeln!(buf, "Errors (max 5):").ok();
                for issue in snapshot.errors.iter().take(5) {
                    let context = issue
                        .context
                        .as_deref()
                        .map(|c| format!(" [{c}]"))
                        .unwrap_or_default();
                    writeln!(
                        buf,
                        "- {}{}: {}",
                        color(issue.kind.as_str(), "31", colorize),
                        context,
                        issue.message
                    )
                    .ok();
                }
            }
            if let Some(path) = &out.capture_path {
                writeln!(buf, "Capture saved to {}", path.display()).ok();
            }
            buf
        }
        PseOutput::Error(out) => {
            let mut buf = String::new();
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or_else(|| out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            buf
        }
    }
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}
