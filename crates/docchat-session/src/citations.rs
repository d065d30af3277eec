//! Citation marker resolution for finished answers
//!
//! Answers reference retrieved documents with `[docN]` markers, where `N` is
//! a 1-based index into the citations of the preceding tool message. Markers
//! are renumbered in order of first appearance and rewritten to `^N^`
//! superscript tokens.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use docchat_wire::{ChatMessage, Citation, MessageContent, Role, ToolContext};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of a highlight excerpt, in characters
pub const HIGHLIGHT_MAX_CHARS: usize = 300;

/// Characters of answer text captured on each side of a marker
const CONTEXT_WINDOW_CHARS: usize = 100;

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[doc(\d{1,3})\]").unwrap());

static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "also", "been", "before", "being", "between", "both", "could",
    "does", "each", "from", "have", "having", "here", "into", "more", "most", "must", "only",
    "other", "over", "should", "some", "such", "than", "that", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "under", "very", "were", "what", "when",
    "where", "which", "while", "will", "with", "would", "your",
];

/// An answer ready for display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedAnswer {
    /// Answer text with markers rewritten to superscript tokens
    pub markdown_text: String,
    /// Referenced citations in display order
    pub citations: Vec<Citation>,
}

impl ParsedAnswer {
    /// Look up a citation by its display number
    pub fn citation_for(&self, reindex_id: &str) -> Option<&Citation> {
        self.citations
            .iter()
            .find(|c| c.reindex_id.as_deref() == Some(reindex_id))
    }
}

/// Resolve `[docN]` markers in `answer` against `citations`.
///
/// Markers whose index has no citation are left in the text untouched.
pub fn parse_answer(answer: &str, citations: &[Citation]) -> ParsedAnswer {
    let mut text = answer.to_string();
    let mut emitted: Vec<Citation> = Vec::new();
    let mut reindexed: HashMap<usize, usize> = HashMap::new();

    for caps in CITATION_MARKER.captures_iter(answer) {
        let Some(marker) = caps.get(0) else { continue };
        let Ok(index) = caps[1].parse::<usize>() else {
            continue;
        };

        // Same document under a differently written marker, e.g. [doc01]
        if let Some(&reindex_id) = reindexed.get(&index) {
            text = text.replace(marker.as_str(), &superscript(reindex_id));
            continue;
        }

        let Some(source) = index.checked_sub(1).and_then(|i| citations.get(i)) else {
            tracing::debug!(marker = marker.as_str(), available = citations.len(), "Citation marker has no source");
            continue;
        };

        let reindex_id = emitted.len() + 1;
        let (before, after) = surrounding_text(answer, marker.start(), marker.end());

        let mut citation = source.clone();
        citation.id = index.to_string();
        citation.reindex_id = Some(reindex_id.to_string());
        citation
            .full_content
            .get_or_insert_with(|| source.content.clone());
        citation.highlight_text = Some(highlight_excerpt(
            &source.content,
            &format!("{} {}", before, after),
        ));
        citation.context_before = Some(before);
        citation.context_after = Some(after);

        text = text.replace(marker.as_str(), &superscript(reindex_id));
        reindexed.insert(index, reindex_id);
        emitted.push(citation);
    }

    assign_part_indexes(&mut emitted);

    ParsedAnswer {
        markdown_text: text,
        citations: emitted,
    }
}

fn superscript(reindex_id: usize) -> String {
    format!(" ^{}^ ", reindex_id)
}

/// Number citations sharing a filepath 1, 2, 3... in display order
fn assign_part_indexes(citations: &mut [Citation]) {
    let mut counters: HashMap<Option<String>, u32> = HashMap::new();
    for citation in citations {
        let counter = counters.entry(citation.filepath.clone()).or_insert(0);
        *counter += 1;
        citation.part_index = Some(*counter);
    }
}

/// Answer text on either side of a marker, with other markers removed
fn surrounding_text(answer: &str, start: usize, end: usize) -> (String, String) {
    let head = &answer[..start];
    let skip = head.chars().count().saturating_sub(CONTEXT_WINDOW_CHARS);
    let before: String = head.chars().skip(skip).collect();
    let after: String = answer[end..].chars().take(CONTEXT_WINDOW_CHARS).collect();

    let clean = |s: &str| CITATION_MARKER.replace_all(s, "").trim().to_string();
    (clean(&before), clean(&after))
}

/// Pick the part of `content` most related to `context`, at most
/// [`HIGHLIGHT_MAX_CHARS`] characters long.
pub fn highlight_excerpt(content: &str, context: &str) -> String {
    if content.chars().count() <= HIGHLIGHT_MAX_CHARS {
        return content.to_string();
    }
    let content = content.trim();

    let wanted = keywords(context);
    let paragraphs = split_paragraphs(content);

    let region = match best_span(&paragraphs, &wanted) {
        Some(i) => paragraphs[i],
        None => {
            let first = paragraphs.first().copied().unwrap_or(content);
            if first.chars().count() <= HIGHLIGHT_MAX_CHARS {
                return fill_from(&paragraphs, 0);
            }
            first
        }
    };

    if region.chars().count() <= HIGHLIGHT_MAX_CHARS {
        return region.to_string();
    }

    let sentences = split_sentences(region);
    let start = best_span(&sentences, &wanted).unwrap_or(0);
    fill_from(&sentences, start)
}

/// Index of the span sharing the most keywords with the context, if any share one
fn best_span(spans: &[&str], wanted: &HashSet<String>) -> Option<usize> {
    if wanted.is_empty() {
        return None;
    }
    spans
        .iter()
        .enumerate()
        .map(|(i, span)| (keywords(span).intersection(wanted).count(), i))
        .filter(|(score, _)| *score > 0)
        // Earliest span wins ties
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, i)| i)
}

/// Join spans starting at `start` while they fit, then truncate
fn fill_from(spans: &[&str], start: usize) -> String {
    let mut out = String::new();
    for span in spans.iter().skip(start) {
        if out.is_empty() {
            out.push_str(span);
            continue;
        }
        if out.chars().count() + 1 + span.chars().count() > HIGHLIGHT_MAX_CHARS {
            break;
        }
        out.push(' ');
        out.push_str(span);
    }
    truncate_chars(&out, HIGHLIGHT_MAX_CHARS)
}

/// Truncate to at most `max` characters, preferring a word boundary
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let prefix: String = text.chars().take(keep).collect();
    let cut = match prefix.rfind(char::is_whitespace) {
        Some(pos) if pos >= prefix.len() / 2 => &prefix[..pos],
        _ => prefix.as_str(),
    };
    format!("{}...", cut.trim_end())
}

fn split_paragraphs(content: &str) -> Vec<&str> {
    let paragraphs: Vec<&str> = PARAGRAPH_BREAK
        .split(content)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.len() > 1 {
        paragraphs
    } else {
        split_sentences(content)
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next)) = chars.peek() {
                if next.is_whitespace() {
                    sentences.push(text[start..next_i].trim());
                    start = next_i;
                }
            }
        }
    }
    sentences.push(text[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Parse the context carried by a tool message
pub fn parse_tool_context(message: &ChatMessage) -> Option<ToolContext> {
    if message.role != Role::Tool {
        return None;
    }
    let parsed = match &message.content {
        MessageContent::Text(text) => serde_json::from_str(text),
        MessageContent::Structured(value) => serde_json::from_value(value.clone()),
    };
    match parsed {
        Ok(context) => Some(context),
        Err(e) => {
            tracing::warn!(error = %e, message_id = %message.id, "Tool message content is not a citation context");
            None
        }
    }
}

/// Search intents from a tool context. The backend sends either a list or a
/// JSON-encoded list inside a string.
pub fn intents(context: &ToolContext) -> Vec<String> {
    match &context.intent {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(s)) => match serde_json::from_str::<Vec<String>>(s) {
            Ok(list) => list,
            Err(_) if s.is_empty() => vec![],
            Err(_) => vec![s.clone()],
        },
        _ => vec![],
    }
}

/// Citations for the assistant answer at `answer_index`, taken from the tool
/// message immediately before it.
pub fn citations_for_answer(messages: &[ChatMessage], answer_index: usize) -> Vec<Citation> {
    answer_index
        .checked_sub(1)
        .and_then(|i| messages.get(i))
        .and_then(parse_tool_context)
        .map(|context| context.citations)
        .unwrap_or_default()
}

/// Parse the assistant answer at `answer_index` with its adjacent citations
pub fn parse_message_answer(messages: &[ChatMessage], answer_index: usize) -> Option<ParsedAnswer> {
    let message = messages.get(answer_index)?;
    if message.role != Role::Assistant {
        return None;
    }
    let citations = citations_for_answer(messages, answer_index);
    Some(parse_answer(&message.text(), &citations))
}
