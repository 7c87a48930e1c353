//! Markdown structure - headings and code masking via the pulldown AST
//!
//! Walking the AST (rather than scanning lines) keeps headings inside
//! fenced code blocks out of the object tree and lets reference/trait
//! extraction ignore backticked text.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

/// A heading in the document
#[derive(Debug, Clone)]
pub struct Heading {
    /// Heading level (1-6)
    pub level: u8,

    /// Heading text content
    pub text: String,

    /// Line number (1-indexed)
    pub line: usize,
}

/// Parsed markdown structure
#[derive(Debug, Clone)]
pub struct MarkdownStructure {
    /// All headings in the document, in order
    pub headings: Vec<Heading>,

    /// Byte ranges of the input covered by fenced blocks or inline code
    pub code_ranges: Vec<std::ops::Range<usize>>,
}

/// Parse markdown structure from content.
///
/// `start_line` is the 1-indexed line number of the first content line
/// (after any frontmatter).
pub fn parse_markdown_structure(content: &str, start_line: usize) -> MarkdownStructure {
    let mut headings = Vec::new();
    let mut code_ranges = Vec::new();
    let mut current_heading_level: Option<u8> = None;
    let mut current_heading_text = String::new();
    let mut current_heading_line = start_line;

    // Byte offset -> line number
    let mut offset_to_line: Vec<usize> = Vec::with_capacity(content.len() + 1);
    let mut line = start_line;
    for b in content.bytes() {
        offset_to_line.push(line);
        if b == b'\n' {
            line += 1;
        }
    }
    offset_to_line.push(line);

    let parser = Parser::new(content);

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current_heading_level = Some(heading_level_to_u8(level));
                current_heading_text.clear();
                current_heading_line = offset_to_line.get(range.start).copied().unwrap_or(start_line);
            }
            Event::Text(text) if current_heading_level.is_some() => {
                current_heading_text.push_str(&text);
            }
            Event::Code(code) if current_heading_level.is_some() => {
                // Inline code inside a heading still contributes to the title.
                current_heading_text.push_str(&code);
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(level) = current_heading_level.take() {
                    headings.push(Heading {
                        level,
                        text: current_heading_text.trim().to_string(),
                        line: current_heading_line,
                    });
                }
            }
            Event::Start(Tag::CodeBlock(_)) => {
                // Fenced and indented blocks both shadow references.
                code_ranges.push(range);
            }
            Event::Code(_) => {
                code_ranges.push(range);
            }
            _ => {}
        }
    }

    MarkdownStructure { headings, code_ranges }
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Blank out code ranges with spaces, preserving byte offsets and
/// newlines so line/column arithmetic stays valid on the masked text.
pub fn mask_code(content: &str, code_ranges: &[std::ops::Range<usize>]) -> String {
    if code_ranges.is_empty() {
        return content.to_string();
    }

    let mut bytes = content.as_bytes().to_vec();
    for range in code_ranges {
        let end = range.end.min(bytes.len());
        for b in bytes[range.start..end].iter_mut() {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    // Masking only writes ASCII spaces over non-newline bytes; any
    // multi-byte character is either fully inside or fully outside a range
    // emitted by the parser, so the result is valid UTF-8.
    String::from_utf8(bytes).unwrap_or_else(|_| content.to_string())
}

/// Find the line range for a heading's span.
///
/// Returns (start_line, end_line) inclusive: the span runs until the line
/// before the next heading of equal or shallower level, or to `last_line`.
pub fn find_heading_scope(headings: &[Heading], heading_idx: usize, last_line: usize) -> (usize, usize) {
    let heading = &headings[heading_idx];
    let start = heading.line;

    let end = headings
        .iter()
        .skip(heading_idx + 1)
        .find(|h| h.level <= heading.level)
        .map(|h| h.line.saturating_sub(1))
        .unwrap_or(last_line);

    (start, end.max(start))
}
