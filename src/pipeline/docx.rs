//! Document Builder: flat Markdown blocks → Word (`.docx`) document.
//!
//! Building happens in two steps. [`layout`] turns the parsed blocks into a
//! list of styled paragraphs (pure, easy to assert on), and [`write_document`]
//! emits those paragraphs through `docx-rs` and packs the zip container.
//!
//! ## Styles and numbering
//!
//! Headings use the `Heading1`–`Heading3` style ids so Word shows them in the
//! navigation pane. Bulleted entries all share one numbering definition;
//! every ordered list gets its own definition so each list starts at its
//! own first number (`5. x` starts at 5) instead of continuing the previous
//! list's count.

use crate::error::ReportError;
use crate::output::{DocumentOutput, DocumentSummary};
use crate::pipeline::markdown::{parse_blocks, Block, ListKind, ParsedReport};
use crate::pipeline::postprocess::normalise_markdown;
use docx_rs::{
    AbstractNumbering, BreakType, Docx, IndentLevel, Level, LevelJc, LevelText, NumberFormat,
    Numbering, NumberingId, Paragraph, Run, SpecialIndentType, Start, Style, StyleType,
};
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use tracing::info;

/// Numbering id shared by all bulleted entries.
const BULLET_NUMBERING_ID: usize = 1;
/// Ordered lists are numbered from this id upwards.
const FIRST_ORDERED_NUMBERING_ID: usize = 2;
/// Word supports list levels 0–8.
const MAX_LIST_LEVEL: usize = 8;

const BULLET_SYMBOLS: [&str; 3] = ["•", "◦", "▪"];

/// Paragraph style of one output paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Heading(u8),
    Body,
    ListBullet,
    ListNumber,
}

/// A paragraph ready to be emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocParagraph {
    pub style: ParagraphStyle,
    pub text: String,
    /// `(numbering id, level)` for list entries.
    pub numbering: Option<(usize, usize)>,
}

/// Lay out `report` under a level-1 `title` heading.
pub fn layout(report: &ParsedReport, title: &str) -> Vec<DocParagraph> {
    let ordered_ids = ordered_numbering_ids(report);
    let mut out = Vec::with_capacity(report.blocks.len() + 1);

    out.push(DocParagraph {
        style: ParagraphStyle::Heading(1),
        text: title.to_string(),
        numbering: None,
    });

    for block in &report.blocks {
        out.push(match block {
            Block::Heading { level, text } => DocParagraph {
                style: ParagraphStyle::Heading(*level),
                text: text.clone(),
                numbering: None,
            },
            Block::Paragraph { text } => DocParagraph {
                style: ParagraphStyle::Body,
                text: text.clone(),
                numbering: None,
            },
            Block::ListItem {
                kind: ListKind::Bullet,
                depth,
                text,
                ..
            } => DocParagraph {
                style: ParagraphStyle::ListBullet,
                text: text.clone(),
                numbering: Some((BULLET_NUMBERING_ID, (*depth).min(MAX_LIST_LEVEL))),
            },
            Block::ListItem {
                kind: ListKind::Numbered,
                depth,
                list,
                text,
            } => DocParagraph {
                style: ParagraphStyle::ListNumber,
                text: text.clone(),
                numbering: ordered_ids
                    .get(list)
                    .map(|id| (*id, (*depth).min(MAX_LIST_LEVEL))),
            },
        });
    }

    out
}

/// Numbering id of every ordered list, assigned in order of appearance.
fn ordered_numbering_ids(report: &ParsedReport) -> BTreeMap<usize, usize> {
    let mut ids = BTreeMap::new();
    for block in &report.blocks {
        if let Block::ListItem {
            kind: ListKind::Numbered,
            list,
            ..
        } = block
        {
            let next = FIRST_ORDERED_NUMBERING_ID + ids.len();
            ids.entry(*list).or_insert(next);
        }
    }
    ids
}

/// Count what a layout contains.
pub fn summarize(paragraphs: &[DocParagraph], report: &ParsedReport) -> DocumentSummary {
    let mut summary = DocumentSummary {
        skipped: report.skipped,
        ..Default::default()
    };
    for p in paragraphs {
        match p.style {
            ParagraphStyle::Heading(_) => summary.headings += 1,
            ParagraphStyle::Body => summary.paragraphs += 1,
            ParagraphStyle::ListBullet => summary.bullet_items += 1,
            ParagraphStyle::ListNumber => summary.numbered_items += 1,
        }
    }
    summary
}

/// Write `report` as a `.docx` into `writer`.
pub fn write_document<W: Write + Seek>(
    report: &ParsedReport,
    title: &str,
    writer: W,
) -> std::io::Result<DocumentSummary> {
    let paragraphs = layout(report, title);
    let summary = summarize(&paragraphs, report);

    to_docx(&paragraphs, report)
        .build()
        .pack(writer)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    Ok(summary)
}

/// Convert report Markdown into a `.docx` temp file and return its path.
///
/// The file is kept after return; removing it is up to the caller.
/// Unsupported Markdown never causes an error, only I/O can.
pub fn build_document(markdown: &str, title: &str) -> Result<DocumentOutput, ReportError> {
    let parsed = parse_blocks(&normalise_markdown(markdown));

    let mut tmp = tempfile::Builder::new()
        .prefix("report-")
        .suffix(".docx")
        .tempfile()
        .map_err(|e| ReportError::DocumentWriteFailed {
            path: std::env::temp_dir(),
            source: e,
        })?;

    let summary = write_document(&parsed, title, tmp.as_file_mut()).map_err(|e| {
        ReportError::DocumentWriteFailed {
            path: tmp.path().to_path_buf(),
            source: e,
        }
    })?;

    let (_file, path) = tmp.keep().map_err(|e| {
        let path = e.file.path().to_path_buf();
        ReportError::DocumentWriteFailed {
            path,
            source: e.error,
        }
    })?;

    info!(
        "Wrote {} ({} headings, {} paragraphs, {} list entries, {} skipped)",
        path.display(),
        summary.headings,
        summary.paragraphs,
        summary.bullet_items + summary.numbered_items,
        summary.skipped.total()
    );

    Ok(DocumentOutput { path, summary })
}

// ── docx-rs emission ─────────────────────────────────────────────────────

fn to_docx(paragraphs: &[DocParagraph], report: &ParsedReport) -> Docx {
    let mut docx = Docx::new()
        .add_style(heading_style(1, 32))
        .add_style(heading_style(2, 26))
        .add_style(heading_style(3, 24))
        .add_style(Style::new("ListBullet", StyleType::Paragraph).name("List Bullet"))
        .add_style(Style::new("ListNumber", StyleType::Paragraph).name("List Number"))
        .add_abstract_numbering(bullet_definition())
        .add_numbering(Numbering::new(BULLET_NUMBERING_ID, BULLET_NUMBERING_ID));

    for (list, id) in ordered_numbering_ids(report) {
        let start = report.list_starts.get(&list).copied().unwrap_or(1) as usize;
        docx = docx
            .add_abstract_numbering(decimal_definition(id, start))
            .add_numbering(Numbering::new(id, id));
    }

    for p in paragraphs {
        docx = docx.add_paragraph(to_paragraph(p));
    }
    docx
}

fn to_paragraph(p: &DocParagraph) -> Paragraph {
    let mut run = Run::new();
    for (i, line) in p.text.split('\n').enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(line);
    }

    let paragraph = Paragraph::new().add_run(run);
    let paragraph = match p.style {
        ParagraphStyle::Heading(level) => paragraph.style(&format!("Heading{level}")),
        ParagraphStyle::Body => paragraph,
        ParagraphStyle::ListBullet => paragraph.style("ListBullet"),
        ParagraphStyle::ListNumber => paragraph.style("ListNumber"),
    };

    match p.numbering {
        Some((id, level)) => paragraph.numbering(NumberingId::new(id), IndentLevel::new(level)),
        None => paragraph,
    }
}

/// `size` is in half-points.
fn heading_style(level: u8, size: usize) -> Style {
    Style::new(format!("Heading{level}"), StyleType::Paragraph)
        .name(format!("heading {level}"))
        .size(size)
        .bold()
}

fn bullet_definition() -> AbstractNumbering {
    (0..=MAX_LIST_LEVEL).fold(AbstractNumbering::new(BULLET_NUMBERING_ID), |def, lvl| {
        def.add_level(
            Level::new(
                lvl,
                Start::new(1),
                NumberFormat::new("bullet"),
                LevelText::new(BULLET_SYMBOLS[lvl % BULLET_SYMBOLS.len()]),
                LevelJc::new("left"),
            )
            .indent(Some(indent_for(lvl)), Some(SpecialIndentType::Hanging(360)), None, None),
        )
    })
}

fn decimal_definition(id: usize, start: usize) -> AbstractNumbering {
    (0..=MAX_LIST_LEVEL).fold(AbstractNumbering::new(id), |def, lvl| {
        def.add_level(
            Level::new(
                lvl,
                Start::new(start),
                NumberFormat::new("decimal"),
                LevelText::new(format!("%{}.", lvl + 1)),
                LevelJc::new("left"),
            )
            .indent(Some(indent_for(lvl)), Some(SpecialIndentType::Hanging(360)), None, None),
        )
    })
}

/// Left indent in twips for list level `lvl`.
fn indent_for(lvl: usize) -> i32 {
    720 * (lvl as i32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn docx_bytes(report: &ParsedReport, title: &str) -> (Vec<u8>, DocumentSummary) {
        let mut buf = Cursor::new(Vec::new());
        let summary = write_document(report, title, &mut buf).expect("write should succeed");
        (buf.into_inner(), summary)
    }

    #[test]
    fn empty_report_has_only_title() {
        let parsed = parse_blocks("");
        let paragraphs = layout(&parsed, "Generated Report");
        assert_eq!(
            paragraphs,
            vec![DocParagraph {
                style: ParagraphStyle::Heading(1),
                text: "Generated Report".into(),
                numbering: None,
            }]
        );

        let (bytes, summary) = docx_bytes(&parsed, "Generated Report");
        assert!(bytes.starts_with(b"PK"), "docx is a zip container");
        assert_eq!(summary.headings, 1);
        assert_eq!(summary.paragraphs + summary.bullet_items + summary.numbered_items, 0);
    }

    #[test]
    fn one_paragraph_per_block_in_order() {
        let parsed = parse_blocks("## Baseline\n\nStable.\n\n- a\n- b\n\n1. one\n");
        let paragraphs = layout(&parsed, "T");
        let styles: Vec<ParagraphStyle> = paragraphs.iter().map(|p| p.style).collect();
        assert_eq!(
            styles,
            vec![
                ParagraphStyle::Heading(1),
                ParagraphStyle::Heading(2),
                ParagraphStyle::Body,
                ParagraphStyle::ListBullet,
                ParagraphStyle::ListBullet,
                ParagraphStyle::ListNumber,
            ]
        );
        let texts: Vec<&str> = paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["T", "Baseline", "Stable.", "a", "b", "one"]);
    }

    #[test]
    fn each_ordered_list_gets_its_own_numbering() {
        let parsed = parse_blocks("1. a\n2. b\n\ntext\n\n1. c\n\n- d\n");
        let numbering: Vec<Option<(usize, usize)>> =
            layout(&parsed, "T").iter().map(|p| p.numbering).collect();
        assert_eq!(
            numbering,
            vec![
                None,
                Some((2, 0)),
                Some((2, 0)),
                None,
                Some((3, 0)),
                Some((BULLET_NUMBERING_ID, 0)),
            ]
        );
    }

    #[test]
    fn nested_bullets_use_deeper_level() {
        let parsed = parse_blocks("- top\n  - inner\n");
        let levels: Vec<usize> = layout(&parsed, "T")
            .iter()
            .filter_map(|p| p.numbering.map(|(_, lvl)| lvl))
            .collect();
        assert_eq!(levels, vec![0, 1]);
    }

    #[test]
    fn summary_counts_skipped_elements() {
        let parsed = parse_blocks("Text.\n\n```\ncode\n```\n\n> quote\n");
        let (_, summary) = docx_bytes(&parsed, "T");
        assert_eq!(summary.paragraphs, 1);
        assert_eq!(summary.skipped.code_blocks, 1);
        assert_eq!(summary.skipped.block_quotes, 1);
    }

    #[test]
    fn multi_line_text_packs() {
        let parsed = parse_blocks("first  \nsecond\n\n1. x\n   1. y\n");
        let (bytes, summary) = docx_bytes(&parsed, "T");
        assert!(bytes.starts_with(b"PK"));
        assert_eq!(summary.numbered_items, 2);
    }

    /// `(style id, (numId, ilvl), text)` of every paragraph in a packed document.
    fn read_back(bytes: &[u8]) -> Vec<(Option<String>, Option<(usize, usize)>, String)> {
        let docx = docx_rs::read_docx(bytes).expect("written package should read back");
        docx.document
            .children
            .iter()
            .filter_map(|child| match child {
                docx_rs::DocumentChild::Paragraph(p) => Some(p),
                _ => None,
            })
            .map(|p| {
                let style = p.property.style.as_ref().map(|s| s.val.clone());
                let numbering = p
                    .property
                    .numbering_property
                    .as_ref()
                    .and_then(|n| Some((n.id.as_ref()?.id, n.level.as_ref()?.val)));
                (style, numbering, paragraph_text(p))
            })
            .collect()
    }

    fn paragraph_text(p: &docx_rs::Paragraph) -> String {
        let mut text = String::new();
        for child in &p.children {
            if let docx_rs::ParagraphChild::Run(run) = child {
                for rc in &run.children {
                    match rc {
                        docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                        docx_rs::RunChild::Break(_) => text.push('\n'),
                        _ => {}
                    }
                }
            }
        }
        text
    }

    #[test]
    fn packed_document_reads_back_with_styles_and_numbering() {
        let md = "## Baseline\n\nline one  \nline two\n\n- calm\n  - deeper\n\n\
                  1. a\n2. b\n\nBreak.\n\n1. c\n";
        let (bytes, _) = docx_bytes(&parse_blocks(md), "Generated Report");
        let paragraphs = read_back(&bytes);

        let texts: Vec<&str> = paragraphs.iter().map(|(_, _, t)| t.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Generated Report",
                "Baseline",
                "line one\nline two",
                "calm",
                "deeper",
                "a",
                "b",
                "Break.",
                "c",
            ]
        );

        let style = |i: usize| paragraphs[i].0.as_deref();
        assert_eq!(style(0), Some("Heading1"));
        assert_eq!(style(1), Some("Heading2"));
        assert_eq!(style(3), Some("ListBullet"));
        assert_eq!(style(5), Some("ListNumber"));

        let numbering: Vec<Option<(usize, usize)>> = paragraphs.iter().map(|p| p.1).collect();
        assert_eq!(numbering[3], Some((BULLET_NUMBERING_ID, 0)));
        assert_eq!(numbering[4], Some((BULLET_NUMBERING_ID, 1)));
        assert_eq!(numbering[5], numbering[6]);
        let first_list = numbering[5].map(|(id, _)| id);
        let second_list = numbering[8].map(|(id, _)| id);
        assert!(first_list.is_some() && second_list.is_some());
        assert_ne!(first_list, second_list, "separate lists restart numbering");
    }

    #[test]
    fn ordered_list_start_reaches_numbering_part() {
        let parsed = parse_blocks("5. fifth\n6. sixth\n");
        let xml = to_docx(&layout(&parsed, "T"), &parsed).build().numberings;
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains(r#"w:start w:val="5""#), "{xml}");
    }

    #[test]
    fn build_document_writes_kept_temp_file() {
        let out = build_document("```markdown\n# GSR\n\nCalm.\n```", "Generated Report").unwrap();
        assert!(out.path.exists());
        assert_eq!(out.path.extension().and_then(|e| e.to_str()), Some("docx"));
        assert_eq!(out.summary.headings, 2);
        assert_eq!(out.summary.paragraphs, 1);

        let bytes = std::fs::read(&out.path).unwrap();
        assert!(bytes.starts_with(b"PK"));
        std::fs::remove_file(&out.path).ok();
    }
}
