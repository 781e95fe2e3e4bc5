//! Code completion over the editor buffer.
//!
//! Candidates come from a fixed keyword list followed by identifiers the
//! buffer assigns to. Caret positions are byte offsets into the buffer.

use regex::Regex;
use std::sync::OnceLock;

/// Most candidates returned by [`suggest`]
pub const MAX_SUGGESTIONS: usize = 5;

/// Words of the kids' drawing language, in suggestion order
pub const KEYWORDS: &[&str] = &[
    "screen", "fill", "circle", "rect", "text", "clear", "repeat", "if", "else", "for", "while",
    "function", "return", "let", "const", "true", "false", "print",
];

static ASSIGNMENT: OnceLock<Option<Regex>> = OnceLock::new();

fn assignment() -> Option<&'static Regex> {
    ASSIGNMENT
        .get_or_init(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)[ \t]*=").ok())
        .as_ref()
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Clamp `caret` into `buffer` and snap it back to a char boundary
fn clamp_caret(buffer: &str, caret: usize) -> usize {
    let mut caret = caret.min(buffer.len());
    while !buffer.is_char_boundary(caret) {
        caret -= 1;
    }
    caret
}

/// The identifier-like word ending at `caret`, if any.
///
/// Leading digits are not part of the word, so `3ci` yields `ci`.
pub fn prefix_at(buffer: &str, caret: usize) -> Option<&str> {
    let caret = clamp_caret(buffer, caret);
    let head = &buffer[..caret];

    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c))
        .last()
        .map(|(i, _)| i)?;

    let run = &head[start..];
    let word = run.trim_start_matches(|c: char| c.is_ascii_digit());
    (!word.is_empty()).then_some(word)
}

/// Identifiers declared by assignment, in order of first appearance
pub fn discover_identifiers(buffer: &str) -> Vec<String> {
    let Some(re) = assignment() else {
        return Vec::new();
    };

    let mut found: Vec<String> = Vec::new();
    for caps in re.captures_iter(buffer) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // `==` and `=>` are comparisons and arrows, not assignments
        if matches!(buffer[whole.end()..].chars().next(), Some('=') | Some('>')) {
            continue;
        }
        if !found.iter().any(|f| f == name.as_str()) {
            found.push(name.as_str().to_string());
        }
    }
    found
}

/// Up to [`MAX_SUGGESTIONS`] completions for the word ending at `caret`
pub fn suggest(buffer: &str, caret: usize) -> Vec<String> {
    let Some(prefix) = prefix_at(buffer, caret) else {
        return Vec::new();
    };

    let mut pool: Vec<String> = KEYWORDS.iter().map(|k| k.to_string()).collect();
    for ident in discover_identifiers(buffer) {
        if !pool.contains(&ident) {
            pool.push(ident);
        }
    }

    pool.into_iter()
        .filter(|c| c.starts_with(prefix) && c != prefix)
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Replace the word ending at `caret` with `candidate`.
///
/// Returns the new buffer and the caret just after the inserted text. With no
/// word at the caret the candidate is inserted there.
pub fn accept(buffer: &str, caret: usize, candidate: &str) -> (String, usize) {
    let caret = clamp_caret(buffer, caret);
    let start = prefix_at(buffer, caret).map_or(caret, |p| caret - p.len());

    let mut out = String::with_capacity(buffer.len() + candidate.len());
    out.push_str(&buffer[..start]);
    out.push_str(candidate);
    out.push_str(&buffer[caret..]);
    (out, start + candidate.len())
}
