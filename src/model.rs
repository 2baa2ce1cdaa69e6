use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Store-assigned row identifier. Numeric for SQLite, whatever the remote
/// table uses for NocoDB.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId(String);

impl RepoId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.0.trim().parse().ok()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<i64> for RepoId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for RepoId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_i64() {
            Some(n) => serializer.serialize_i64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for RepoId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => RepoId::from(n),
            Raw::Str(s) => RepoId(s),
        })
    }
}

/// One tracked repository and its last-seen release tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchedRepo {
    pub id: RepoId,
    pub owner: String,
    pub repo: String,
    pub latest_tag: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WatchedRepo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Insert payload; the store assigns `id` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWatchedRepo {
    pub owner: String,
    pub repo: String,
}

/// Latest published release as reported by the release source.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

const BODY_MAX_CHARS: usize = 120;

impl Notification {
    /// Build the push message for a newly observed release of `row`.
    pub fn for_release(row: &WatchedRepo, release: &Release) -> Self {
        let title = format!(
            "{}/{} a new version {}",
            row.owner, row.repo, release.tag_name
        );
        let summary = [release.name.as_deref(), release.body.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("");
        let body = summary.chars().take(BODY_MAX_CHARS).collect();
        Self { title, body }
    }
}
