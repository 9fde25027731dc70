//! Turns display markdown into text fit for synthesis.
//!
//! Display text keeps its citations and links; the speakable copy must not read
//! out URLs, reference numbers or emphasis markers.

use once_cell::sync::Lazy;
use regex::Regex;

static REFERENCE_DEFINITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*\[\d+\]:\s*\S+.*$"#).expect("valid regex"));
static NUMBERED_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+\]\([^)]*\)").expect("valid regex"));
static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("valid regex"));
static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").expect("valid regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#{1,6}\s*").expect("valid regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{1,3}|_{2,3}|`+").expect("valid regex"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([.,!?;:])").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip citations, links, and markdown markers; collapse whitespace.
pub fn clean_for_speech(text: &str) -> String {
    let s = REFERENCE_DEFINITION.replace_all(text, "");
    let s = NUMBERED_LINK.replace_all(&s, "");
    let s = MARKDOWN_LINK.replace_all(&s, "$1");
    let s = CITATION.replace_all(&s, "");
    let s = HEADING.replace_all(&s, "");
    let s = EMPHASIS.replace_all(&s, "");
    let s = WHITESPACE.replace_all(&s, " ");
    let s = SPACE_BEFORE_PUNCT.replace_all(&s, "$1");
    s.trim().to_string()
}
