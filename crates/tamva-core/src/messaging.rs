//! Messaging collaborator for autonomous chat sessions.
//!
//! [`MessagingSurface`] is the narrow seam the session drives: open a chat with a named
//! contact, send text, read the latest incoming message, close. [`HttpMessagingBridge`]
//! talks to a local bridge process (for example a WhatsApp Web automation) over JSON.
//!
//! Contact names are resolved fuzzily: the best candidate must score strictly above the
//! confidence threshold (0..=100) or the open fails rather than guessing.

use crate::error::{AssistantError, AssistantResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    #[serde(default)]
    pub token: Option<String>,

    /// Minimum contact-name similarity (exclusive), 0..=100.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u8,

    /// Seconds between reply polls in a session.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:3030".to_string()
}

fn default_confidence_threshold() -> u8 {
    70
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            token: None,
            confidence_threshold: default_confidence_threshold(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl MessagingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// An open chat with one resolved contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatHandle {
    pub id: String,
    /// The contact's display name as the platform knows it.
    pub contact: String,
}

pub trait MessagingSurface {
    /// Resolve `identity` and open a chat. Fails with `SessionStartFailure`.
    fn open(&mut self, identity: &str) -> AssistantResult<ChatHandle>;

    /// Deliver one message. Fails with `SendFailure`.
    fn send(&mut self, handle: &ChatHandle, text: &str) -> AssistantResult<()>;

    /// Latest incoming message in the chat, if any. Callers dedupe against what they saw.
    /// Fails with `PollFailure`.
    fn poll_reply(&mut self, handle: &ChatHandle) -> AssistantResult<Option<String>>;

    /// Release the chat. Best-effort.
    fn close(&mut self, handle: &ChatHandle);
}

// ---------------------------------------------------------------------------
// Contact resolution
// ---------------------------------------------------------------------------

/// Similarity of two names, 0..=100, case-insensitive.
///
/// `200 * LCS / (len_a + len_b)`, which equals the normalized indel (Levenshtein with
/// substitution cost 2) ratio. Two empty strings score 100.
pub fn similarity(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    let lcs = prev[b.len()];
    ((200 * lcs + total / 2) / total) as u8
}

/// Best candidate scoring strictly above `threshold`, with its score. Ties keep the first.
pub fn resolve_contact<'a>(
    query: &str,
    candidates: &'a [String],
    threshold: u8,
) -> Option<(&'a str, u8)> {
    let mut best: Option<(&str, u8)> = None;
    for candidate in candidates {
        let score = similarity(query, candidate);
        debug!("  - '{}' vs '{}' -> {}", query, candidate, score);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate.as_str(), score));
        }
    }
    best.filter(|(_, score)| *score > threshold)
}

// ---------------------------------------------------------------------------
// HTTP bridge
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Contact {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct OpenedChat {
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct LatestMessage {
    #[serde(default)]
    text: Option<String>,
}

/// JSON client for a local messaging bridge.
///
/// | Method | Path | Body / response |
/// |--------|------|-----------------|
/// | GET | `/contacts?query=<name>` | `[{"id", "name"}]` |
/// | POST | `/chats` | `{"contact_id"}` → `{"chat_id"}` |
/// | POST | `/chats/<id>/messages` | `{"text"}` |
/// | GET | `/chats/<id>/messages/latest-incoming` | `{"text": string \| null}` or 204 |
/// | DELETE | `/chats/<id>` | |
pub struct HttpMessagingBridge {
    base_url: String,
    token: Option<String>,
    threshold: u8,
    client: reqwest::blocking::Client,
}

impl HttpMessagingBridge {
    pub fn from_config(config: &MessagingConfig) -> AssistantResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::FatalInitError(format!("messaging client: {}", e)))?;
        Ok(Self {
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            threshold: config.confidence_threshold,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::blocking::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, String> {
        let res = self
            .request(reqwest::Method::GET, "/contacts")
            .query(&[("query", query)])
            .send()
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            return Err(format!("contact search returned {}", res.status()));
        }
        res.json().map_err(|e| e.to_string())
    }
}

impl MessagingSurface for HttpMessagingBridge {
    fn open(&mut self, identity: &str) -> AssistantResult<ChatHandle> {
        info!("🔎 Searching for a contact similar to '{}'", identity);
        let contacts = self
            .search_contacts(identity)
            .map_err(AssistantError::SessionStartFailure)?;
        if contacts.is_empty() {
            return Err(AssistantError::SessionStartFailure(format!(
                "no contacts found for '{}'",
                identity
            )));
        }
        let names: Vec<String> = contacts.iter().map(|c| c.name.clone()).collect();
        let Some((name, score)) = resolve_contact(identity, &names, self.threshold) else {
            return Err(AssistantError::SessionStartFailure(format!(
                "no contact matched '{}' with confidence above {}",
                identity, self.threshold
            )));
        };
        let Some(contact) = contacts.iter().find(|c| c.name == name) else {
            return Err(AssistantError::SessionStartFailure(format!(
                "contact '{}' disappeared",
                name
            )));
        };
        info!("✅ Best match '{}' (score {})", contact.name, score);

        let res = self
            .request(reqwest::Method::POST, "/chats")
            .json(&serde_json::json!({ "contact_id": contact.id }))
            .send()
            .map_err(|e| AssistantError::SessionStartFailure(e.to_string()))?;
        if !res.status().is_success() {
            return Err(AssistantError::SessionStartFailure(format!(
                "opening chat returned {}",
                res.status()
            )));
        }
        let opened: OpenedChat = res
            .json()
            .map_err(|e| AssistantError::SessionStartFailure(e.to_string()))?;
        Ok(ChatHandle {
            id: opened.chat_id,
            contact: contact.name.clone(),
        })
    }

    fn send(&mut self, handle: &ChatHandle, text: &str) -> AssistantResult<()> {
        let res = self
            .request(reqwest::Method::POST, &format!("/chats/{}/messages", handle.id))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .map_err(|e| AssistantError::SendFailure(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(AssistantError::SendFailure(format!("{}: {}", status, body)));
        }
        Ok(())
    }

    fn poll_reply(&mut self, handle: &ChatHandle) -> AssistantResult<Option<String>> {
        let res = self
            .request(
                reqwest::Method::GET,
                &format!("/chats/{}/messages/latest-incoming", handle.id),
            )
            .send()
            .map_err(|e| AssistantError::PollFailure(e.to_string()))?;
        if res.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(AssistantError::PollFailure(format!("bridge returned {}", res.status())));
        }
        let latest: LatestMessage = res
            .json()
            .map_err(|e| AssistantError::PollFailure(e.to_string()))?;
        Ok(latest.text.filter(|t| !t.trim().is_empty()))
    }

    fn close(&mut self, handle: &ChatHandle) {
        match self
            .request(reqwest::Method::DELETE, &format!("/chats/{}", handle.id))
            .send()
        {
            Ok(res) if res.status().is_success() => debug!("Closed chat {}", handle.id),
            Ok(res) => warn!("Closing chat {} returned {}", handle.id, res.status()),
            Err(e) => warn!("Closing chat {} failed: {}", handle.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("Aswin", "aswin"), 100);
        assert_eq!(similarity("", ""), 100);
        assert_eq!(similarity("abc", "xyz"), 0);
        // LCS("aswin", "aswin ai&ds") = 5 → 200*5/16
        assert_eq!(similarity("aswin", "Aswin Ai&Ds"), 63);
    }

    #[test]
    fn resolution_requires_strictly_above_threshold() {
        let candidates = names(&["Priya Office", "Aswin Ai&Ds", "Aswini"]);
        assert_eq!(
            resolve_contact("aswin", &candidates, 70),
            Some(("Aswini", 91))
        );
        assert_eq!(resolve_contact("aswin", &candidates, 91), None);
        assert_eq!(resolve_contact("zed", &candidates, 70), None);
        assert_eq!(resolve_contact("aswin", &[], 0), None);
    }

    #[test]
    fn ties_keep_first_candidate() {
        let candidates = names(&["Riya A", "Riya B"]);
        assert_eq!(resolve_contact("riya", &candidates, 50).map(|c| c.0), Some("Riya A"));
    }

    #[test]
    fn bridge_builds_without_network() {
        let bridge = HttpMessagingBridge::from_config(&MessagingConfig {
            bridge_url: "http://localhost:9/".to_string(),
            token: Some(" ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(bridge.base_url, "http://localhost:9");
        assert!(bridge.token.is_none());
    }

    #[test]
    fn unreachable_bridge_poll_is_a_poll_failure() {
        let mut bridge = HttpMessagingBridge::from_config(&MessagingConfig {
            bridge_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        })
        .unwrap();
        let handle = ChatHandle {
            id: "c1".to_string(),
            contact: "Riya".to_string(),
        };
        let err = bridge.poll_reply(&handle).unwrap_err();
        assert!(matches!(err, AssistantError::PollFailure(_)), "{:?}", err);
    }
}
