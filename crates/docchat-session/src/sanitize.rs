//! Turning backend error text into something a user can read

use std::sync::LazyLock;

use regex::Regex;

/// Shown when the request never reached a usable response
pub const NETWORK_ERROR_MESSAGE: &str =
    "An error occurred. Please try again. If the problem persists, please contact the site administrator.";

const CONTENT_FILTER_LEARN_MORE: &str = "https://go.microsoft.com/fwlink/?linkid=2198766";

/// Start of a Python-repr error payload embedded in the message
const INNER_ERROR_CUE: &str = "{'error': {'message':";

static INNER_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'innererror': (\{.*\})\}\}").unwrap());

static INNER_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{'error': \{'message':\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#).unwrap()
});

static PY_TRUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bTrue\b").unwrap());
static PY_FALSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bFalse\b").unwrap());
static PY_NONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bNone\b").unwrap());

/// Content filter categories and how they are named to the user
const FILTER_CATEGORIES: &[(&str, &str)] = &[
    ("jailbreak", "Jailbreak"),
    ("hate", "Hate"),
    ("sexual", "Sexual"),
    ("violence", "Violence"),
    ("self_harm", "Self Harm"),
];

/// Clean up an error message from the backend for in-line display
pub fn sanitize_error_message(raw: &str) -> String {
    let unescaped = raw.replace("\\'", "'");

    if let Some(pretty) = content_filter_message(&unescaped) {
        return pretty;
    }

    let message = unwrap_inner_error(&unescaped).unwrap_or(unescaped);
    strip_control_chars(&message)
}

/// Replace `Error code: 400 - {'error': {'message': '...', ...}}` with
/// `Error code: 400 - ...`
fn unwrap_inner_error(message: &str) -> Option<String> {
    let cue = message.find(INNER_ERROR_CUE)?;
    let caps = INNER_MESSAGE.captures(&message[cue..])?;
    let inner = caps.get(1).or_else(|| caps.get(2))?.as_str();
    let prefix = message[..cue].trim();

    Some(if prefix.is_empty() {
        inner.to_string()
    } else {
        format!("{} {}", prefix, inner)
    })
}

/// Detect a content-filter rejection and explain it
fn content_filter_message(message: &str) -> Option<String> {
    let caps = INNER_ERROR.captures(message)?;
    let json = caps[1].replace('\'', "\"");
    let json = PY_TRUE.replace_all(&json, "true");
    let json = PY_FALSE.replace_all(&json, "false");
    let json = PY_NONE.replace_all(&json, "null");

    let inner: serde_json::Value = match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Could not parse inner error payload");
            return None;
        }
    };

    let results = inner.get("content_filter_result")?;
    let reasons: Vec<&str> = FILTER_CATEGORIES
        .iter()
        .filter(|(key, _)| {
            results
                .get(key)
                .and_then(|c| c.get("filtered"))
                .and_then(|f| f.as_bool())
                .unwrap_or(false)
        })
        .map(|(_, label)| *label)
        .collect();

    if reasons.is_empty() {
        return None;
    }

    Some(format!(
        "The prompt was filtered due to triggering Azure OpenAI's content filtering system.\n\
         Reason: This prompt contains content flagged as {}\n\n\
         Please modify your prompt and retry. Learn more: {}",
        reasons.join(", "),
        CONTENT_FILTER_LEARN_MORE
    ))
}

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAILBREAK: &str = r#"Error code: 400 - {'error': {'message': "The response was filtered due to the prompt triggering Azure OpenAI's content management policy.", 'type': None, 'param': 'prompt', 'code': 'content_filter', 'status': 400, 'innererror': {'code': 'ResponsibleAIPolicyViolation', 'content_filter_result': {'hate': {'filtered': False, 'severity': 'safe'}, 'jailbreak': {'filtered': True, 'detected': True}, 'self_harm': {'filtered': False, 'severity': 'safe'}, 'sexual': {'filtered': False, 'severity': 'safe'}, 'violence': {'filtered': False, 'severity': 'safe'}}}}}"#;

    #[test]
    fn test_jailbreak_filter_gets_friendly_message() {
        let msg = sanitize_error_message(JAILBREAK);
        assert!(msg.starts_with("The prompt was filtered"));
        assert!(msg.contains("flagged as Jailbreak"));
        assert!(msg.contains(CONTENT_FILTER_LEARN_MORE));
    }

    #[test]
    fn test_escaped_quotes_are_handled() {
        let escaped = JAILBREAK.replace('\'', "\\'");
        let msg = sanitize_error_message(&escaped);
        assert!(msg.contains("flagged as Jailbreak"));
    }

    #[test]
    fn test_multiple_filter_categories_are_listed() {
        let raw = "Error code: 400 - {'error': {'message': 'filtered', 'innererror': {'code': 'ResponsibleAIPolicyViolation', 'content_filter_result': {'hate': {'filtered': True, 'severity': 'high'}, 'violence': {'filtered': True, 'severity': 'medium'}}}}}";
        let msg = sanitize_error_message(raw);
        assert!(msg.contains("flagged as Hate, Violence"));
    }

    #[test]
    fn test_inner_error_message_is_unwrapped() {
        let raw = r"Error code: 500 - {\'error\': {\'message\': \'The server had an error while processing your request.\', \'type\': \'server_error\'}}";
        assert_eq!(
            sanitize_error_message(raw),
            "Error code: 500 - The server had an error while processing your request."
        );
    }

    #[test]
    fn test_unfiltered_inner_error_falls_through() {
        let raw = "Error code: 400 - {'error': {'message': 'Bad input', 'innererror': {'code': 'X', 'content_filter_result': {'hate': {'filtered': False}}}}}";
        assert_eq!(sanitize_error_message(raw), "Error code: 400 - Bad input");
    }

    #[test]
    fn test_plain_message_passes_through() {
        assert_eq!(
            sanitize_error_message("The deployment was not found"),
            "The deployment was not found"
        );
    }

    #[test]
    fn test_control_characters_are_stripped() {
        assert_eq!(sanitize_error_message("bad\u{0007} thing\nhappened"), "bad thing\nhappened");
    }
}
