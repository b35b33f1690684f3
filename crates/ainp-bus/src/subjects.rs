//! # Stream Subjects
//!
//! Subjects are `<category>.<did>` for per-agent delivery plus
//! `agents.<event>` for registry lifecycle events. Retention is a property
//! of the category.

use ainp_types::Did;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery categories with their retention windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Intents,
    Results,
    Negotiations,
    DiscoverResults,
    Agents,
}

impl Category {
    /// Subject prefix on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Intents => "intents",
            Category::Results => "results",
            Category::Negotiations => "negotiations",
            Category::DiscoverResults => "discover_results",
            Category::Agents => "agents",
        }
    }

    /// Retention window for the category's retained log.
    #[must_use]
    pub fn retention_ms(&self) -> u64 {
        const HOUR: u64 = 3_600_000;
        match self {
            Category::Intents => 24 * HOUR,
            Category::DiscoverResults => 24 * HOUR,
            Category::Negotiations => 48 * HOUR,
            Category::Results => 7 * 24 * HOUR,
            Category::Agents => 30 * 24 * HOUR,
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "intents" => Some(Category::Intents),
            "results" => Some(Category::Results),
            "negotiations" => Some(Category::Negotiations),
            "discover_results" => Some(Category::DiscoverResults),
            "agents" => Some(Category::Agents),
            _ => None,
        }
    }
}

/// A fully-qualified stream subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    /// Per-agent delivery subject, `<category>.<did>`.
    #[must_use]
    pub fn for_agent(category: Category, did: &Did) -> Self {
        Self(format!("{}.{}", category.as_str(), did))
    }

    /// Registry lifecycle subject, `agents.<event>`.
    #[must_use]
    pub fn agents_event(event: &str) -> Self {
        Self(format!("{}.{event}", Category::Agents.as_str()))
    }

    /// Parse an externally supplied subject string.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The category, when the prefix is recognized.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        let prefix = self.0.split('.').next().unwrap_or_default();
        Category::from_prefix(prefix)
    }

    /// Raw subject string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
