//! Markdown sanitizer: strip OCR artefacts before table parsing.
//!
//! OCR engines emit two kinds of noise inside statement tables:
//!
//! - `<br>` tags where a cell's text wrapped onto a second line
//! - inline LaTeX (`$1,234.00$`, `$\text{Cr}$`, `$$\begin{array}…$$`) where
//!   the engine decided a number or symbol looked like math
//!
//! Both break the pipe-table grammar or pollute cell text. The passes here are
//! pure `&str → String` functions applied in a fixed order.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Apply every sanitizer pass to raw OCR markdown.
///
/// 1. Remove `<br>`, `<br/>` and `<br />`
/// 2. Replace inline math segments with their plain-text content
/// 3. Put a blank line in front of pipe tables glued to a preceding paragraph
pub fn sanitize(markdown: &str) -> String {
    let s = strip_break_tags(markdown);
    let s = strip_inline_math(&s);
    separate_table_blocks(&s)
}

// ── Pass 1: break tags ───────────────────────────────────────────────────────

fn strip_break_tags(input: &str) -> String {
    input
        .replace("<br>", "")
        .replace("<br/>", "")
        .replace("<br />", "")
}

// ── Pass 2: inline math ──────────────────────────────────────────────────────

static RE_MATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$+([^$]+?)\$+").unwrap());
static RE_ENV_BEGIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\begin\{[a-zA-Z]+\}").unwrap());
static RE_ENV_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\end\{[a-zA-Z]+\}").unwrap());
static RE_TEXT_CMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\text\s*\{\s*(.*?)\s*\}").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn strip_inline_math(input: &str) -> String {
    RE_MATH
        .replace_all(input, |caps: &Captures<'_>| math_to_text(&caps[1]))
        .into_owned()
}

fn math_to_text(math: &str) -> String {
    let s = RE_ENV_BEGIN.replace_all(math, "");
    let s = RE_ENV_END.replace_all(&s, "");
    let s = RE_TEXT_CMD.replace_all(&s, "$1");
    let s = s.replace("\\\\", " ");
    RE_WHITESPACE.replace_all(&s, " ").trim().to_string()
}

// ── Pass 3: table block separation ───────────────────────────────────────────

/// A pipe table only parses when it starts its own block. OCR output often
/// glues the header row to the line above (a caption or account line).
fn separate_table_blocks(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut prev: Option<&str> = None;
    for line in input.split('\n') {
        if let Some(p) = prev {
            out.push('\n');
            if is_table_row(line) && !p.trim().is_empty() && !is_table_row(p) {
                out.push('\n');
            }
        }
        out.push_str(line);
        prev = Some(line);
    }
    out
}

pub(crate) fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_break_variants_only() {
        assert_eq!(strip_break_tags("a<br>b<br/>c<br />d<b>e</b>"), "abcd<b>e</b>");
    }

    #[test]
    fn math_and_breaks_removed() {
        let out = sanitize("A $x+y$ B<br>C");
        assert!(!out.contains("<br>"));
        assert!(!out.contains('$'));
        assert_eq!(out, "A x+y BC");
    }

    #[test]
    fn double_dollar_amount() {
        assert_eq!(sanitize("| Amt | $$1,234.00$$ |"), "| Amt | 1,234.00 |");
    }

    #[test]
    fn text_command_unwrapped() {
        assert_eq!(strip_inline_math(r"$\text{ Opening Balance }$"), "Opening Balance");
    }

    #[test]
    fn environments_and_line_continuations() {
        assert_eq!(
            strip_inline_math(r"$\begin{aligned}a \\ b\end{aligned}$"),
            "a b"
        );
    }

    #[test]
    fn unpaired_dollar_passes_through() {
        assert_eq!(sanitize("fee $5 charged"), "fee $5 charged");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in [
            "A $x+y$ B<br>C",
            "Account 123\n| Date | Amount |\n| --- | --- |\n| 01/01 | $100$ |\n",
            "plain text\n",
        ] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn table_glued_to_paragraph_gets_blank_line() {
        let input = "Statement for May\n| Date | Amount |\n| --- | --- |";
        assert_eq!(
            separate_table_blocks(input),
            "Statement for May\n\n| Date | Amount |\n| --- | --- |"
        );
    }

    #[test]
    fn separated_table_untouched() {
        let input = "Intro\n\n| A | B |\n| --- | --- |\n";
        assert_eq!(separate_table_blocks(input), input);
    }
}
