//! Theme preference as explicit, observable state

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// The other theme
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    /// Parse a theme name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

/// Holds the current theme and notifies subscribers on change
#[derive(Debug)]
pub struct ThemeStore {
    tx: watch::Sender<Theme>,
}

impl Default for ThemeStore {
    fn default() -> Self {
        Self::new(Theme::default())
    }
}

impl ThemeStore {
    pub fn new(initial: Theme) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Get the current theme
    pub fn current(&self) -> Theme {
        *self.tx.borrow()
    }

    /// Set the theme; subscribers are only notified when it changes
    pub fn set(&self, theme: Theme) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == theme {
                false
            } else {
                *current = theme;
                true
            }
        })
    }

    /// Switch between light and dark, returning the new theme
    pub fn toggle(&self) -> Theme {
        let next = self.current().toggled();
        self.set(next);
        next
    }

    /// Subscribe to theme changes
    pub fn subscribe(&self) -> watch::Receiver<Theme> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_flips_theme() {
        let store = ThemeStore::default();
        assert_eq!(store.current(), Theme::Light);
        assert_eq!(store.toggle(), Theme::Dark);
        assert_eq!(store.current(), Theme::Dark);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = ThemeStore::new(Theme::Dark);
        let mut rx = store.subscribe();

        store.set(Theme::Light);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Theme::Light);
    }

    #[test]
    fn test_setting_same_theme_does_not_notify() {
        let store = ThemeStore::new(Theme::Dark);
        let rx = store.subscribe();
        assert!(!store.set(Theme::Dark));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_parse() {
        assert_eq!(Theme::parse("DARK"), Some(Theme::Dark));
        assert_eq!(Theme::parse("solarized"), None);
    }
}
