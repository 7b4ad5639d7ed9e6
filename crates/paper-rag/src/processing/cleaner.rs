//! Text cleanup applied to extracted papers and to LLM-produced queries.

use std::sync::LazyLock;

static BACK_MATTER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?im)^[ \t]*(?:#+[ \t]+\*\*[ \t]*(?:references|acknowledge?ments?)[^\n]*|(?:\d+\.?[ \t]+)?(?:references|acknowledge?ments?)[ \t]*)$",
    )
    .expect("back matter regex is valid")
});

static NEXT_SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^[ \t]*(?:#+\s+\*\*|appendix\b)").expect("next section regex is valid")
});

static SPLIT_NUMBER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(\d+)([.,])\s*\n+\s*(\d+)").expect("split number regex is valid")
});

static WHITESPACE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Remove References and Acknowledgments sections, each from its heading up
/// to the next section heading or the end of the text.
pub fn remove_back_matter(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(heading) = BACK_MATTER_RE.find(rest) {
        out.push_str(&rest[..heading.start()]);
        let after = &rest[heading.end()..];
        rest = match NEXT_SECTION_RE.find(after) {
            Some(next) => &after[next.start()..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Rejoin numbers broken across lines by extraction (`3.\n14` -> `3.14`).
pub fn join_split_numbers(text: &str) -> String {
    SPLIT_NUMBER_RE.replace_all(text, "$1$2$3").into_owned()
}

/// Collapse all whitespace runs to a single space and trim.
pub fn clean_text(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Full cleanup applied to an extracted document before chunking.
pub fn prepare_document(text: &str) -> String {
    join_split_numbers(&remove_back_matter(text))
}
