//! Normalisation of model-generated Markdown before it is parsed.
//!
//! Even well-prompted VLMs occasionally wrap the whole reply in a
//! ` ```markdown ... ``` ` fence. Parsed literally that is one code block,
//! and code blocks have no document counterpart, so the finished `.docx`
//! would contain nothing but its title. The rules here undo such artefacts
//! without touching content.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the fence pattern only has to
//! match `\n`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to a report.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip an outer Markdown fence wrapping the whole reply
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Ensure the text ends with exactly one newline
pub fn normalise_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_markdown_fences(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\n(.*)\n```\s*$").expect("valid fence regex")
});

/// Only a reply that is one fenced block is unwrapped. A body with a fence
/// line of its own means the reply opens and closes with separate code
/// blocks, and those stay as they are.
fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) if !caps[1].lines().any(|l| l.trim_start().starts_with("```")) => {
            caps[1].to_string()
        }
        _ => input.to_string(),
    }
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Ensure text ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
