use once_cell::sync::Lazy;
use regex::Regex;

// fenced blocks: both fences start a line, the opening one may carry a language tag
// and must end its line; the body runs up to the next line-leading fence
static FENCED_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[\w+\-]*[ \t]*\r?\n(.*?)^[ \t]*```")
        .expect("fenced block regex is valid")
});

static LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("markdown link regex is valid")
});

// leading heading, quote and bullet markers
static LINE_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(#{1,6}[ \t]+|>[ \t]?|[-*+][ \t]+)").expect("line marker regex is valid")
});

static EMPHASIS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[*_`~]+").expect("emphasis regex is valid"));

static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

// A top level piece of a message: either regular text or a preformatted block.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Prose(String),
    Code(String),
}

// A piece of a prose line.
#[derive(Clone, Debug, PartialEq)]
pub enum Inline {
    Text(String),
    Link { label: String, url: String },
}

// Splits message text into prose and fenced code blocks. Fence markers are dropped,
// everything else is kept literally.
pub fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut last_end = 0;
    for captures in FENCED_BLOCK_REGEX.captures_iter(text) {
        let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let prose = &text[last_end..whole.start()];
        if !prose.trim().is_empty() {
            blocks.push(Block::Prose(prose.trim_matches('\n').to_owned()));
        }
        blocks.push(Block::Code(body.as_str().trim_end_matches('\n').to_owned()));
        last_end = whole.end();
    }

    let rest = &text[last_end..];
    if !rest.trim().is_empty() {
        blocks.push(Block::Prose(rest.trim_matches('\n').to_owned()));
    }
    blocks
}

// Splits a single prose line into literal text and `[label](url)` links.
pub fn split_inline(line: &str) -> Vec<Inline> {
    let mut pieces = Vec::new();
    let mut last_end = 0;
    for captures in LINK_REGEX.captures_iter(line) {
        let (Some(whole), Some(label), Some(url)) = (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        if whole.start() > last_end {
            pieces.push(Inline::Text(line[last_end..whole.start()].to_owned()));
        }
        pieces.push(Inline::Link {
            label: label.as_str().to_owned(),
            url: url.as_str().to_owned(),
        });
        last_end = whole.end();
    }
    if last_end < line.len() {
        pieces.push(Inline::Text(line[last_end..].to_owned()));
    }
    pieces
}

// Returns the body of the last fenced block in the text, trimmed, if there is one.
pub fn extract_last_fenced_block(text: &str) -> Option<String> {
    FENCED_BLOCK_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .last()
        .map(|body| body.as_str().trim().to_owned())
        .filter(|body| !body.is_empty())
}

// Reduces a message to plain sentences for text-to-speech: code blocks are dropped,
// links are read by their label and markdown markers disappear.
pub fn strip_for_speech(text: &str) -> String {
    let without_code = FENCED_BLOCK_REGEX.replace_all(text, " ");
    let without_links = LINK_REGEX.replace_all(&without_code, "$1");
    let without_markers = LINE_MARKER_REGEX.replace_all(&without_links, "");
    let without_emphasis = EMPHASIS_REGEX.replace_all(&without_markers, "");
    WHITESPACE_REGEX
        .replace_all(&without_emphasis, " ")
        .trim()
        .to_owned()
}
