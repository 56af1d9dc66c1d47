//! Markdown → flat block sequence.
//!
//! The report is parsed with `pulldown-cmark` and walked once, depth first.
//! Only the block types a Word report needs survive: headings 1–3,
//! paragraphs and list items. Everything else (tables, code blocks, block
//! quotes, raw HTML, deeper headings, rules, images) is dropped whole and
//! tallied in [`SkippedElements`] so the loss is visible in logs and in the
//! document summary instead of disappearing silently.
//!
//! Inline markup is flattened to its text content: emphasis, strong,
//! strikethrough and link wrappers are transparent, inline code keeps its
//! literal text, a soft break becomes a space and a hard break a newline.
//!
//! A heading of level 1–3 inside a list item is ordinary item text. Levels
//! 4–6 are dropped and counted wherever they appear.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Style family of a list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListKind {
    Bullet,
    Numbered,
}

/// One document-level unit of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Heading of level 1, 2 or 3.
    Heading { level: u8, text: String },
    Paragraph { text: String },
    /// One list entry. `depth` is 0 for top-level lists; `list` identifies
    /// the list the entry belongs to (numbering restarts per list).
    ListItem {
        kind: ListKind,
        depth: usize,
        list: usize,
        text: String,
    },
}

/// Per-kind count of Markdown elements with no document counterpart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedElements {
    pub tables: usize,
    pub code_blocks: usize,
    pub block_quotes: usize,
    pub html_blocks: usize,
    /// Headings of level 4–6.
    pub deep_headings: usize,
    pub rules: usize,
    pub images: usize,
    pub other: usize,
}

impl SkippedElements {
    pub fn total(&self) -> usize {
        self.tables
            + self.code_blocks
            + self.block_quotes
            + self.html_blocks
            + self.deep_headings
            + self.rules
            + self.images
            + self.other
    }
}

/// Result of flattening a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReport {
    pub blocks: Vec<Block>,
    pub skipped: SkippedElements,
    /// First number of each ordered list, keyed by list id (`5. x` → 5).
    pub list_starts: BTreeMap<usize, u64>,
}

/// Parse `markdown` into blocks. Never fails.
pub fn parse_blocks(markdown: &str) -> ParsedReport {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut walker = Walker::default();
    for event in Parser::new_ext(markdown, options) {
        walker.handle(event);
    }

    let report = walker.finish();
    if report.skipped.total() > 0 {
        debug!("Skipped unsupported Markdown elements: {:?}", report.skipped);
    }
    report
}

// ── Walker ───────────────────────────────────────────────────────────────

enum CaptureKind {
    Heading(u8),
    Paragraph,
}

struct Capture {
    kind: CaptureKind,
    text: String,
}

struct ListFrame {
    kind: ListKind,
    id: usize,
}

struct ItemFrame {
    kind: ListKind,
    depth: usize,
    list: usize,
    text: String,
    emitted: bool,
}

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    skipped: SkippedElements,
    /// Open tags inside an element being dropped.
    skip_depth: usize,
    /// Top-level heading or paragraph in progress.
    capture: Option<Capture>,
    lists: Vec<ListFrame>,
    list_starts: BTreeMap<usize, u64>,
    items: Vec<ItemFrame>,
    next_list_id: usize,
}

impl Walker {
    fn handle(&mut self, event: Event<'_>) {
        if self.skip_depth > 0 {
            match event {
                Event::Start(_) => self.skip_depth += 1,
                Event::End(_) => self.skip_depth -= 1,
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) | Event::Code(text) => self.push_text(&text),
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_text("\n"),
            Event::Rule => self.skipped.rules += 1,
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => match heading_level(level) {
                Some(_) if !self.items.is_empty() => self.separate_item_paragraph(),
                Some(n) => self.begin_capture(CaptureKind::Heading(n)),
                None => {
                    self.skipped.deep_headings += 1;
                    self.skip_depth = 1;
                }
            },
            Tag::Paragraph if !self.items.is_empty() => self.separate_item_paragraph(),
            Tag::Paragraph => self.begin_capture(CaptureKind::Paragraph),
            Tag::List(start) => {
                self.flush_item();
                let kind = match start {
                    Some(n) => {
                        self.list_starts.insert(self.next_list_id, n);
                        ListKind::Numbered
                    }
                    None => ListKind::Bullet,
                };
                self.lists.push(ListFrame {
                    kind,
                    id: self.next_list_id,
                });
                self.next_list_id += 1;
            }
            Tag::Item => {
                let (kind, list) = self
                    .lists
                    .last()
                    .map(|l| (l.kind, l.id))
                    .unwrap_or((ListKind::Bullet, 0));
                self.items.push(ItemFrame {
                    kind,
                    depth: self.lists.len().saturating_sub(1),
                    list,
                    text: String::new(),
                    emitted: false,
                });
            }
            Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. } => {}
            other => {
                match other {
                    Tag::Table(_) => self.skipped.tables += 1,
                    Tag::CodeBlock(_) => self.skipped.code_blocks += 1,
                    Tag::BlockQuote(_) => self.skipped.block_quotes += 1,
                    Tag::HtmlBlock => self.skipped.html_blocks += 1,
                    Tag::Image { .. } => self.skipped.images += 1,
                    _ => self.skipped.other += 1,
                }
                self.skip_depth = 1;
            }
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) | TagEnd::Paragraph => {
                if let Some(capture) = self.capture.take() {
                    let text = clean(&capture.text);
                    self.blocks.push(match capture.kind {
                        CaptureKind::Heading(level) => Block::Heading { level, text },
                        CaptureKind::Paragraph => Block::Paragraph { text },
                    });
                }
            }
            TagEnd::Item => {
                self.flush_item();
                self.items.pop();
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            _ => {}
        }
    }

    fn begin_capture(&mut self, kind: CaptureKind) {
        self.capture = Some(Capture {
            kind,
            text: String::new(),
        });
    }

    fn push_text(&mut self, s: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(s);
        } else if let Some(item) = self.items.last_mut() {
            item.text.push_str(s);
        }
    }

    /// Paragraphs of a loose list item run together, separated by a space.
    fn separate_item_paragraph(&mut self) {
        if let Some(item) = self.items.last_mut() {
            if !item.text.is_empty() && !item.text.ends_with(char::is_whitespace) {
                item.text.push(' ');
            }
        }
    }

    /// Emit the innermost open item once; later text in it is dropped.
    fn flush_item(&mut self) {
        if let Some(item) = self.items.last_mut() {
            if !item.emitted {
                item.emitted = true;
                self.blocks.push(Block::ListItem {
                    kind: item.kind,
                    depth: item.depth,
                    list: item.list,
                    text: clean(&item.text),
                });
            }
        }
    }

    fn finish(self) -> ParsedReport {
        ParsedReport {
            blocks: self.blocks,
            skipped: self.skipped,
            list_starts: self.list_starts,
        }
    }
}

fn heading_level(level: HeadingLevel) -> Option<u8> {
    match level {
        HeadingLevel::H1 => Some(1),
        HeadingLevel::H2 => Some(2),
        HeadingLevel::H3 => Some(3),
        _ => None,
    }
}

fn clean(text: &str) -> String {
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(level: u8, text: &str) -> Block {
        Block::Heading {
            level,
            text: text.into(),
        }
    }

    fn para(text: &str) -> Block {
        Block::Paragraph { text: text.into() }
    }

    fn item(kind: ListKind, depth: usize, list: usize, text: &str) -> Block {
        Block::ListItem {
            kind,
            depth,
            list,
            text: text.into(),
        }
    }

    #[test]
    fn supported_blocks_map_one_to_one_in_order() {
        let md = "# GSR Health Report\n\n\
                  ## Baseline\n\n\
                  Conductance settles around 2.1 µS.\n\n\
                  ### Peaks\n\n\
                  - Peak at 00:42\n\
                  - Peak at 03:10\n\n\
                  1. Reduce caffeine\n\
                  2. Breathing exercises\n";

        let parsed = parse_blocks(md);
        assert_eq!(
            parsed.blocks,
            vec![
                heading(1, "GSR Health Report"),
                heading(2, "Baseline"),
                para("Conductance settles around 2.1 µS."),
                heading(3, "Peaks"),
                item(ListKind::Bullet, 0, 0, "Peak at 00:42"),
                item(ListKind::Bullet, 0, 0, "Peak at 03:10"),
                item(ListKind::Numbered, 0, 1, "Reduce caffeine"),
                item(ListKind::Numbered, 0, 1, "Breathing exercises"),
            ]
        );
        assert_eq!(parsed.skipped.total(), 0);
    }

    #[test]
    fn unsupported_blocks_are_dropped_and_counted() {
        let md = "Intro.\n\n\
                  | Time | µS |\n|---|---|\n| 0 | 2.1 |\n\n\
                  ```\nraw samples\n```\n\n\
                  > A quoted paragraph\n\n\
                  <div>html</div>\n\n\
                  #### Minor heading\n\n\
                  ---\n\n\
                  Outro.\n";

        let parsed = parse_blocks(md);
        assert_eq!(parsed.blocks, vec![para("Intro."), para("Outro.")]);
        assert_eq!(parsed.skipped.tables, 1);
        assert_eq!(parsed.skipped.code_blocks, 1);
        assert_eq!(parsed.skipped.block_quotes, 1);
        assert_eq!(parsed.skipped.html_blocks, 1);
        assert_eq!(parsed.skipped.deep_headings, 1);
        assert_eq!(parsed.skipped.rules, 1);
        assert_eq!(parsed.skipped.total(), 6);
    }

    #[test]
    fn inline_markup_flattens_to_text() {
        let parsed = parse_blocks("Skin **conductance** is *elevated*, see `ch1` and [notes](https://x.test).");
        assert_eq!(
            parsed.blocks,
            vec![para("Skin conductance is elevated, see ch1 and notes.")]
        );
    }

    #[test]
    fn soft_break_becomes_space_hard_break_newline() {
        let parsed = parse_blocks("line one\nline two  \nline three");
        assert_eq!(parsed.blocks, vec![para("line one line two\nline three")]);
    }

    #[test]
    fn nested_list_entries_follow_parent() {
        let md = "- Stress markers\n  - sharp rise\n  - slow decay\n- Relaxation\n";
        let parsed = parse_blocks(md);
        assert_eq!(
            parsed.blocks,
            vec![
                item(ListKind::Bullet, 0, 0, "Stress markers"),
                item(ListKind::Bullet, 1, 1, "sharp rise"),
                item(ListKind::Bullet, 1, 1, "slow decay"),
                item(ListKind::Bullet, 0, 0, "Relaxation"),
            ]
        );
    }

    #[test]
    fn loose_list_item_is_one_entry() {
        let md = "1. First point.\n\n   More on it.\n\n2. Second point.\n";
        let parsed = parse_blocks(md);
        assert_eq!(
            parsed.blocks,
            vec![
                item(ListKind::Numbered, 0, 0, "First point. More on it."),
                item(ListKind::Numbered, 0, 0, "Second point."),
            ]
        );
    }

    #[test]
    fn separate_ordered_lists_get_distinct_ids() {
        let md = "1. a\n2. b\n\nBreak.\n\n1. c\n";
        let ids: Vec<usize> = parse_blocks(md)
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::ListItem { list, .. } => Some(*list),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![0, 0, 1]);
    }

    #[test]
    fn image_inside_paragraph_is_dropped() {
        let parsed = parse_blocks("Chart: ![GSR trace](trace.png) above.");
        assert_eq!(parsed.blocks, vec![para("Chart:  above.")]);
        assert_eq!(parsed.skipped.images, 1);
    }

    #[test]
    fn code_block_inside_list_item_is_skipped() {
        let md = "- Sample:\n\n  ```\n  0.1 0.2\n  ```\n- Next\n";
        let parsed = parse_blocks(md);
        assert_eq!(
            parsed.blocks,
            vec![
                item(ListKind::Bullet, 0, 0, "Sample:"),
                item(ListKind::Bullet, 0, 0, "Next"),
            ]
        );
        assert_eq!(parsed.skipped.code_blocks, 1);
    }

    #[test]
    fn headings_inside_items_follow_top_level_rules() {
        let md = "- ## Arousal\n- #### Minor\n- plain\n";
        let parsed = parse_blocks(md);
        assert_eq!(
            parsed.blocks,
            vec![
                item(ListKind::Bullet, 0, 0, "Arousal"),
                item(ListKind::Bullet, 0, 0, ""),
                item(ListKind::Bullet, 0, 0, "plain"),
            ]
        );
        assert_eq!(parsed.skipped.deep_headings, 1);
    }

    #[test]
    fn ordered_list_start_is_kept() {
        let parsed = parse_blocks("5. fifth\n6. sixth\n\n- bullet\n\n1. again\n");
        assert_eq!(parsed.list_starts, BTreeMap::from([(0, 5), (2, 1)]));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert_eq!(parse_blocks(""), ParsedReport::default());
    }
}
