//! AI agent widget and SDK version helpers
//!
//! In `aiagent` mode no calling client exists. The harness only keeps the
//! widget configuration and produces the embed document for it.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Version tag meaning "whatever is newest"
pub const LATEST: &str = "latest";

/// How many SDK versions a version picker offers
pub const MAX_SDK_VERSIONS: usize = 50;

const WIDGET_PACKAGE_URL: &str = "https://unpkg.com/@telnyx/ai-agent-widget";

/// Embedded AI agent widget configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentWidget {
    pub agent_id: String,
    pub trickle_ice: bool,
    pub version: String,
}

impl AgentWidget {
    /// Widget for `agent_id` on the latest version
    pub fn new(agent_id: impl Into<String>) -> HarnessResult<Self> {
        let agent_id = agent_id.into().trim().to_string();
        if agent_id.is_empty() {
            return Err(HarnessError::config("Agent ID is required"));
        }
        Ok(Self {
            agent_id,
            trickle_ice: false,
            version: LATEST.to_string(),
        })
    }

    pub fn with_trickle_ice(mut self, trickle_ice: bool) -> Self {
        self.trickle_ice = trickle_ice;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        self.version = if version.trim().is_empty() {
            LATEST.to_string()
        } else {
            version.trim().to_string()
        };
        self
    }

    /// Script URL, pinned unless the version is `latest`
    pub fn script_src(&self) -> String {
        if self.version == LATEST {
            WIDGET_PACKAGE_URL.to_string()
        } else {
            format!("{WIDGET_PACKAGE_URL}@{}", self.version)
        }
    }

    /// Standalone HTML document hosting the widget
    pub fn embed_document(&self) -> String {
        let trickle = if self.trickle_ice {
            " trickle-ice=\"true\""
        } else {
            ""
        };
        format!(
            concat!(
                "<!DOCTYPE html>\n<html>\n<head>\n",
                "<style>body {{ margin: 0; display: flex; justify-content: center; align-items: center; height: 100vh; }}</style>\n",
                "<script src=\"{src}\"></script>\n",
                "</head>\n<body>\n",
                "<telnyx-ai-agent agent-id=\"{agent}\"{trickle}></telnyx-ai-agent>\n",
                "</body>\n</html>\n"
            ),
            src = self.script_src(),
            agent = escape_attribute(&self.agent_id),
            trickle = trickle,
        )
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn split_version(version: &str) -> (Vec<u64>, Option<&str>) {
    let (main, prerelease) = match version.split_once('-') {
        Some((main, prerelease)) => (main, Some(prerelease)),
        None => (version, None),
    };
    let parts = main
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect();
    (parts, prerelease)
}

/// Newest-first ordering of widget versions
///
/// Numeric parts compare numerically; for the same base version a stable
/// release sorts before its prereleases, and prereleases sort descending.
pub fn compare_versions_desc(a: &str, b: &str) -> Ordering {
    let (a_parts, a_pre) = split_version(a);
    let (b_parts, b_pre) = split_version(b);

    let len = a_parts.len().max(b_parts.len());
    for i in 0..len {
        let a_part = a_parts.get(i).copied().unwrap_or(0);
        let b_part = b_parts.get(i).copied().unwrap_or(0);
        match b_part.cmp(&a_part) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    match (a_pre, b_pre) {
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a_pre), Some(b_pre)) => b_pre.cmp(a_pre),
        (None, None) => Ordering::Equal,
    }
}

/// Sort widget versions newest first
pub fn sort_widget_versions(mut versions: Vec<String>) -> Vec<String> {
    versions.sort_by(|a, b| compare_versions_desc(a, b));
    versions
}

/// Build the SDK version picker list
///
/// `latest` first, then dist-tag versions, then releases newest first,
/// then anything previously offered; duplicates removed, capped at
/// [`MAX_SDK_VERSIONS`]. The `created` / `modified` registry pseudo
/// entries are skipped.
pub fn sdk_version_choices(
    dist_tags: &[String],
    releases: &[(String, DateTime<Utc>)],
    current: &[String],
) -> Vec<String> {
    let mut releases: Vec<&(String, DateTime<Utc>)> = releases
        .iter()
        .filter(|(name, _)| name != "created" && name != "modified")
        .collect();
    releases.sort_by(|a, b| b.1.cmp(&a.1));

    let mut seen = HashSet::new();
    std::iter::once(LATEST.to_string())
        .chain(dist_tags.iter().cloned())
        .chain(releases.into_iter().map(|(name, _)| name.clone()))
        .chain(current.iter().cloned())
        .filter(|version| seen.insert(version.clone()))
        .take(MAX_SDK_VERSIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn agent_id_is_required_and_trimmed() {
        assert!(AgentWidget::new("   ").is_err());
        let widget = AgentWidget::new("  assistant-123 ").unwrap();
        assert_eq!(widget.agent_id, "assistant-123");
        assert_eq!(widget.version, "latest");
    }

    #[test]
    fn script_is_pinned_unless_latest() {
        let widget = AgentWidget::new("assistant-1").unwrap();
        assert_eq!(widget.script_src(), "https://unpkg.com/@telnyx/ai-agent-widget");
        let pinned = widget.with_version("1.2.0");
        assert_eq!(pinned.script_src(), "https://unpkg.com/@telnyx/ai-agent-widget@1.2.0");
    }

    #[test]
    fn embed_document_carries_the_widget_attributes() {
        let doc = AgentWidget::new("assistant-\"x\"")
            .unwrap()
            .with_trickle_ice(true)
            .embed_document();
        assert!(doc.contains("agent-id=\"assistant-&quot;x&quot;\""));
        assert!(doc.contains("trickle-ice=\"true\""));
        assert!(doc.contains("<script src=\"https://unpkg.com/@telnyx/ai-agent-widget\"></script>"));
    }

    #[test]
    fn versions_sort_newest_first_with_stable_before_prerelease() {
        let sorted = sort_widget_versions(
            ["0.9.0", "1.0.0-beta.1", "1.0.0", "1.10.0", "1.2.0", "1.0.0-beta.2"]
                .map(String::from)
                .to_vec(),
        );
        assert_eq!(
            sorted,
            ["1.10.0", "1.2.0", "1.0.0", "1.0.0-beta.2", "1.0.0-beta.1", "0.9.0"]
        );
    }

    #[test]
    fn sdk_choices_are_deduplicated_and_ordered() {
        let at = |day| Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        let releases = vec![
            ("created".to_string(), at(1)),
            ("2.21.0".to_string(), at(2)),
            ("2.22.0".to_string(), at(5)),
            ("modified".to_string(), at(6)),
        ];
        let choices = sdk_version_choices(
            &["2.22.0".to_string()],
            &releases,
            &["2.19.1".to_string(), "latest".to_string()],
        );
        assert_eq!(choices, ["latest", "2.22.0", "2.21.0", "2.19.1"]);
    }
}
