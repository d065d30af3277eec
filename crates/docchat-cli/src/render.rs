//! Plain-terminal rendering of answers, citations and errors

use std::sync::LazyLock;

use docchat_session::{ParsedAnswer, Theme};
use docchat_wire::{ChatMessage, Citation};
use regex::Regex;
use tokio::sync::watch;

static SUPERSCRIPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\^(\d+)\^").unwrap());

const RESET: &str = "\x1b[0m";

/// ANSI colors for one theme
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    /// Citation numbers
    pub accent: &'static str,
    /// Secondary text (highlights, file paths)
    pub dim: &'static str,
    pub error: &'static str,
    /// Citation titles
    pub title: &'static str,
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            accent: "\x1b[36m",
            dim: "\x1b[90m",
            error: "\x1b[31m",
            title: "\x1b[1;37m",
        }
    }

    pub fn light() -> Self {
        Self {
            accent: "\x1b[34m",
            dim: "\x1b[2m",
            error: "\x1b[31m",
            title: "\x1b[1;30m",
        }
    }

    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self::light(),
            Theme::Dark => Self::dark(),
        }
    }
}

/// Renders session output, following theme changes as they happen
pub struct Renderer {
    theme: watch::Receiver<Theme>,
    color: bool,
}

impl Renderer {
    pub fn new(theme: watch::Receiver<Theme>, color: bool) -> Self {
        Self { theme, color }
    }

    fn paint(&self, pick: fn(&Palette) -> &'static str, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        let palette = Palette::for_theme(*self.theme.borrow());
        format!("{}{}{}", pick(&palette), text, RESET)
    }

    /// Answer text followed by its numbered citation list
    pub fn answer(&self, answer: &ParsedAnswer) -> String {
        let text = SUPERSCRIPT.replace_all(answer.markdown_text.trim(), |caps: &regex::Captures| {
            self.paint(|p| p.accent, &format!("[{}]", &caps[1]))
        });
        let mut out = text.into_owned();

        if !answer.citations.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.paint(|p| p.dim, "Sources:"));
            for citation in &answer.citations {
                out.push('\n');
                out.push_str(&self.citation(citation));
            }
        }
        out
    }

    /// One entry of the citation list
    pub fn citation(&self, citation: &Citation) -> String {
        let number = citation.reindex_id.as_deref().unwrap_or(&citation.id);
        let mut line = format!(
            "{} {}",
            self.paint(|p| p.accent, &format!("[{}]", number)),
            self.paint(|p| p.title, &citation_title(citation)),
        );

        if let Some(filepath) = &citation.filepath {
            let mut location = filepath.clone();
            if let Some(part) = citation.part_index {
                location.push_str(&format!(" - Part {}", part));
            }
            if let Some(page) = citation.page {
                location.push_str(&format!(", page {}", page));
            }
            line.push_str("\n    ");
            line.push_str(&self.paint(|p| p.dim, &location));
        }
        if let Some(url) = &citation.url {
            line.push_str("\n    ");
            line.push_str(&self.paint(|p| p.dim, url));
        }
        if let Some(highlight) = citation.highlight_text.as_deref().filter(|h| !h.is_empty()) {
            line.push_str("\n    ");
            line.push_str(&self.paint(|p| p.dim, &format!("\"{}\"", highlight.replace('\n', " "))));
        }
        line
    }

    /// Full text of one cited source
    pub fn source(&self, citation: &Citation) -> String {
        let body = citation.full_content.as_deref().unwrap_or(&citation.content);
        format!("{}\n\n{}", self.citation(citation), body.trim())
    }

    /// The search queries the backend ran, if it reported any
    pub fn searched(&self, intents: &[String]) -> Option<String> {
        if intents.is_empty() {
            return None;
        }
        Some(self.paint(|p| p.dim, &format!("Searched for: {}", intents.join("; "))))
    }

    /// An error message shown in place of an answer
    pub fn error(&self, message: &ChatMessage) -> String {
        self.paint(|p| p.error, &format!("Error: {}", message.text()))
    }
}

/// Title, falling back to the file name, then to a generic label
fn citation_title(citation: &Citation) -> String {
    citation
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            citation
                .filepath
                .as_deref()
                .and_then(|p| p.rsplit(['/', '\\']).next())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Citation".to_string())
}
