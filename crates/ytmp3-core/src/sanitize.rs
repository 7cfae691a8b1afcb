//! Portable filename and tag text sanitization

use regex::Regex;
use std::sync::LazyLock;

/// Characters replaced by `_` in filenames.
const UNSAFE_FILENAME_CHARS: &[char] = &[
    '/', '\\', ':', '*', '?', '"', '<', '>', '|', '\'', '&', '+', '=', '!', '@', '#', '$', '%',
    '^', '(', ')', '[', ']', '{', '}', ';', ',', '`', '~',
];

const UNTITLED: &str = "untitled";

static UNDERSCORE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());
static DISALLOWED_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\s.,!?()\-]+").unwrap());
static WHITESPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Reduce a filename to a portable ASCII subset.
///
/// Non-ASCII characters are dropped, filesystem-unsafe punctuation becomes `_`,
/// runs of `_` collapse to one and surrounding spaces/underscores are trimmed.
/// Returns `"untitled"` when nothing survives.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches(&[' ', '_'][..]);

    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Longest stem kept in generated file names, in bytes.
pub const MAX_STEM_LEN: usize = 200;

/// Build `<stem>.<extension>` from a title. The stem is sanitized on its own
/// so an empty title still yields `untitled.<ext>`.
pub fn file_name_for_title(title: &str, extension: &str) -> String {
    let mut stem = sanitize_filename(title);
    if stem.len() > MAX_STEM_LEN {
        // ASCII only at this point, any index is a char boundary
        stem.truncate(MAX_STEM_LEN);
        stem = sanitize_filename(&stem);
    }
    format!("{stem}.{extension}")
}

/// Clean free text for tag fields (title, artist, album, comments).
///
/// Keeps ASCII letters, digits, whitespace and `. , ! ? ( ) -`, collapses
/// whitespace to single spaces and trims.
pub fn sanitize_text(text: &str) -> String {
    let ascii: String = text.chars().filter(char::is_ascii).collect();
    let allowed = DISALLOWED_TEXT.replace_all(&ascii, "");
    let spaced = WHITESPACE_RUNS.replace_all(&allowed, " ");
    spaced.trim().to_string()
}
