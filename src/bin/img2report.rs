//! CLI binary for edgequake-img2report.
//!
//! A thin shim over the library crate: flags become a `ReportConfig`, the
//! report is printed, and the finished `.docx` is copied to `--output`.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_img2report::pipeline::input::resolve_image;
use edgequake_img2report::prompts::DOWNLOAD_FILE_NAME;
use edgequake_img2report::{
    build_document, generate_report_with, resolve_backend, AppConfig, DocumentSummary,
    ReportConfig, ReportError, ReportOutput, ReportRequest,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # GSR report from a chart screenshot → Image_Report.docx
  img2report gsr_chart.png

  # Custom title and output file
  img2report gsr_chart.jpg --title "Session 12" -o reports/session12.docx

  # Your own instructions, longer reply
  img2report chart.png --prompt-file my_prompt.txt --max-tokens 2500

  # Keep the Markdown, edit it, then rebuild the document without the model
  img2report chart.png --report-out report.md
  img2report --from-markdown report.md -o final.docx

  # See exactly what would be sent (no API call)
  img2report chart.png --dry-run

  # Another provider through edgequake-llm
  img2report chart.png --provider anthropic --model claude-sonnet-4-20250514

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY     OpenAI API key (required for the default provider)
  DEFAULT_MODEL      Model used when --model is not given (default gpt-4o)
  OPENAI_BASE_URL    OpenAI-compatible API root (default https://api.openai.com/v1)
  ANTHROPIC_API_KEY  Used with --provider anthropic
  GEMINI_API_KEY     Used with --provider gemini

  Variables may also be placed in a .env file in the working directory.
"#;

/// Turn a GSR chart image into a Word report using a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "img2report",
    version,
    about = "Turn a GSR chart image into a Word report using a Vision LLM",
    long_about = "Send a PNG or JPEG image (local file or URL) to a multimodal language model \
with a Galvanic Skin Response report prompt, print the Markdown report it writes and convert \
it into a .docx document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image file (png, jpg, jpeg) or HTTP/HTTPS URL.
    #[arg(required_unless_present = "from_markdown")]
    input: Option<String>,

    /// Write the .docx document here.
    #[arg(short, long, env = "IMG2REPORT_OUTPUT", default_value = DOWNLOAD_FILE_NAME)]
    output: PathBuf,

    /// Instructions sent with the image.
    #[arg(long, env = "IMG2REPORT_PROMPT", conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Read the instructions from a text file.
    #[arg(long, env = "IMG2REPORT_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "IMG2REPORT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Model ID (e.g. gpt-4o, gpt-4o-mini, claude-sonnet-4-20250514).
    /// Overrides DEFAULT_MODEL.
    #[arg(long)]
    model: Option<String>,

    /// LLM provider: openai (default), anthropic, gemini, ollama, azure.
    #[arg(long, env = "IMG2REPORT_PROVIDER")]
    provider: Option<String>,

    /// Title heading of the document.
    #[arg(long, env = "IMG2REPORT_TITLE", default_value = "Generated Report")]
    title: String,

    /// Also write the Markdown report to this file instead of stdout.
    #[arg(long, env = "IMG2REPORT_REPORT_OUT")]
    report_out: Option<PathBuf>,

    /// Skip the model and convert an existing Markdown report.
    #[arg(long, conflicts_with_all = ["input", "dry_run"])]
    from_markdown: Option<PathBuf>,

    /// Print the request body (image data elided) and exit without calling the API.
    #[arg(long)]
    dry_run: bool,

    /// Max output tokens for the report.
    #[arg(long, env = "IMG2REPORT_MAX_TOKENS", default_value_t = 1200)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0). Service default when unset.
    #[arg(long, env = "IMG2REPORT_TEMPERATURE")]
    temperature: Option<f32>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "IMG2REPORT_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Report request timeout in seconds.
    #[arg(long, env = "IMG2REPORT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Print a JSON summary instead of the Markdown report.
    #[arg(long, env = "IMG2REPORT_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "IMG2REPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG2REPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMG2REPORT_QUIET")]
    quiet: bool,
}

/// What `--json` prints.
#[derive(Serialize)]
struct RunSummary<'a> {
    report: Option<&'a ReportOutput>,
    output: &'a Path,
    document: &'a DocumentSummary,
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; variables may come from the shell.
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let result = match load_app_config(&cli) {
        Ok(app) => run(cli, app).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("{} {e:#}", red("error:"));
        let fatal_config = e
            .downcast_ref::<ReportError>()
            .is_some_and(ReportError::is_fatal_config);
        std::process::exit(if fatal_config { 2 } else { 1 });
    }
}

async fn run(cli: Cli, app: Option<AppConfig>) -> Result<()> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; INFO logs would
    // tear it, so they are only shown when it is off.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli, app).await?;

    // ── Existing report: no model involved ───────────────────────────────
    if let Some(ref md_path) = cli.from_markdown {
        let markdown = tokio::fs::read_to_string(md_path)
            .await
            .with_context(|| format!("Failed to read report from {:?}", md_path))?;
        return finish(&cli, &config, None, &markdown).await;
    }

    let input = cli
        .input
        .as_deref()
        .context("An image path or URL is required")?;

    // ── Dry run: show the request, touch nothing remote ──────────────────
    if cli.dry_run {
        let image = resolve_image(input, config.download_timeout_secs).await?;
        let mut payload = ReportRequest::new(&config, image).to_chat_payload()?;
        elide_image_data(&mut payload);
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("Failed to serialise request")?
        );
        return Ok(());
    }

    // Credential and provider problems surface here, before the image is read.
    let backend = resolve_backend(&config)?;
    let image = resolve_image(input, config.download_timeout_secs).await?;

    let spinner = show_progress.then(|| spinner(&config.model));
    let result = generate_report_with(backend.as_ref(), image, &config).await;
    if let Some(ref bar) = spinner {
        bar.finish_and_clear();
    }
    let report = result?;

    finish(&cli, &config, Some(&report), &report.markdown).await
}

/// Print or save the report, then build and place the document.
async fn finish(
    cli: &Cli,
    config: &ReportConfig,
    report: Option<&ReportOutput>,
    markdown: &str,
) -> Result<()> {
    if let Some(ref path) = cli.report_out {
        write_file(path, markdown.as_bytes()).await?;
    } else if !cli.json {
        print_report(&mut io::stdout().lock(), markdown)?;
    }

    if let Some(r) = report {
        if r.truncated && !cli.quiet {
            eprintln!(
                "{} Report reached the {}-token limit and is cut off. Re-run with a higher --max-tokens.",
                yellow("⚠"),
                config.max_tokens
            );
        }
    }

    let document = build_document(markdown, &config.title)?;
    let bytes = tokio::fs::read(&document.path)
        .await
        .with_context(|| format!("Failed to read {:?}", document.path))?;
    write_file(&cli.output, &bytes).await?;

    if cli.json {
        let summary = RunSummary {
            report,
            output: &cli.output,
            document: &document.summary,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        let s = &document.summary;
        eprintln!(
            "{}  {}  {}",
            green("✔"),
            bold(&cli.output.display().to_string()),
            dim(&format!(
                "{} headings, {} paragraphs, {} list entries",
                s.headings,
                s.paragraphs,
                s.bullet_items + s.numbered_items
            )),
        );
        if s.skipped.total() > 0 {
            eprintln!(
                "   {}",
                dim(&format!(
                    "{} Markdown elements had no document equivalent and were left out",
                    s.skipped.total()
                ))
            );
        }
        if let Some(r) = report {
            eprintln!(
                "   {} tokens in  /  {} tokens out  ·  {}ms",
                dim(&r.input_tokens.to_string()),
                dim(&r.output_tokens.to_string()),
                r.duration_ms,
            );
        }
    }

    Ok(())
}

/// Read the startup environment once.
///
/// The credential is only required when the run will call OpenAI directly.
/// Other runs proceed without it and fall back to the built-in model.
fn load_app_config(cli: &Cli) -> Result<Option<AppConfig>> {
    let openai = cli
        .provider
        .as_deref()
        .map_or(true, |p| p.eq_ignore_ascii_case("openai"));
    let needs_credential = openai && cli.from_markdown.is_none() && !cli.dry_run;

    match AppConfig::from_env() {
        Ok(app) => Ok(Some(app)),
        Err(e) if needs_credential => Err(e.into()),
        Err(_) => Ok(None),
    }
}

/// Map CLI args to `ReportConfig`. `--model` wins over `DEFAULT_MODEL`.
async fn build_config(cli: &Cli, app: Option<AppConfig>) -> Result<ReportConfig> {
    let mut builder = match app {
        Some(ref app) => ReportConfig::from_app(app),
        None => ReportConfig::builder(),
    };
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    builder = builder
        .title(cli.title.as_str())
        .max_tokens(cli.max_tokens)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref prompt) = cli.prompt {
        builder = builder.prompt(prompt.as_str());
    } else if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }

    if let Some(ref path) = cli.system_prompt {
        let system = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(system);
    }

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }

    Ok(builder.build()?)
}

fn spinner(model: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Generating");
    bar.set_message(format!("report with {model}…"));
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Create parent directories, then write.
async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}

/// Write the report, always ending in a newline.
fn print_report(out: &mut impl Write, markdown: &str) -> Result<()> {
    out.write_all(markdown.as_bytes())
        .context("Failed to write to stdout")?;
    if !markdown.ends_with('\n') {
        out.write_all(b"\n").context("Failed to write to stdout")?;
    }
    Ok(())
}

/// Replace base64 image data in a request body with a short placeholder.
fn elide_image_data(value: &mut Value) {
    match value {
        Value::String(s) if s.starts_with("data:") => {
            if let Some((prefix, data)) = s.split_once(',') {
                *s = format!("{prefix},<{} base64 chars>", data.len());
            }
        }
        Value::Array(items) => items.iter_mut().for_each(elide_image_data),
        Value::Object(map) => map.values_mut().for_each(elide_image_data),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `budget` bytes, then fails like a closed pipe.
    struct ClosingWriter {
        written: Vec<u8>,
        budget: usize,
    }

    impl Write for ClosingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn report_gets_trailing_newline() {
        let mut out = Vec::new();
        print_report(&mut out, "# GSR").unwrap();
        assert_eq!(out, b"# GSR\n");

        let mut out = Vec::new();
        print_report(&mut out, "# GSR\n").unwrap();
        assert_eq!(out, b"# GSR\n");
    }

    #[test]
    fn failed_trailing_newline_is_reported() {
        let mut out = ClosingWriter {
            written: Vec::new(),
            budget: 5,
        };
        let err = print_report(&mut out, "# GSR").unwrap_err();
        assert_eq!(out.written, b"# GSR");
        assert!(err.to_string().contains("Failed to write to stdout"));
    }
}
