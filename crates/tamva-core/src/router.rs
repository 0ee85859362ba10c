//! **CommandRouter**: classify interpreted text into exactly one [`RoutingDecision`].
//!
//! Routing is an explicit ordered list of [`Matcher`]s evaluated first-match-wins, with
//! `AgentRequest` as the final default. The order comes from [`RoutingPolicy`]:
//! `SessionFirst` (default) checks chat-session triggers before the fast-path table, so
//! "chat with Aswin, mute" starts a chat instead of muting.
//!
//! ## Target extraction
//! Lowercase the text, take everything after the first word-boundary "with " (or, if
//! absent, "to "), drop a trailing "on/in/via/over/using <platform>" clause, title-case
//! each word, and trim whitespace, quotes and trailing `.!?,`. An empty result means no
//! target: the matcher declines and routing falls through.

use crate::actions::FastPathTable;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome of routing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// A local action ran; the payload is its spoken confirmation.
    FastAction(String),
    /// Hand the text to the reasoning agent.
    AgentRequest(String),
    /// Start an autonomous chat session with this target.
    SessionRequest(String),
}

impl RoutingDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            RoutingDecision::FastAction(_) => "fast_action",
            RoutingDecision::AgentRequest(_) => "agent_request",
            RoutingDecision::SessionRequest(_) => "session_request",
        }
    }
}

/// Precedence between session triggers and the fast-path table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    #[default]
    SessionFirst,
    FastPathFirst,
}

impl std::str::FromStr for RoutingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "session_first" => Ok(RoutingPolicy::SessionFirst),
            "fast_path_first" => Ok(RoutingPolicy::FastPathFirst),
            other => Err(format!("unknown routing policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub policy: RoutingPolicy,

    /// Phrases that start a chat session on their own. Keep these specific: ordinary
    /// questions ("how do I talk to my boss") must still reach the agent.
    #[serde(default = "default_trigger_phrases")]
    pub trigger_phrases: Vec<String>,

    /// Messaging platform names. A platform token plus a chat keyword also triggers.
    #[serde(default = "default_platform_tokens")]
    pub platform_tokens: Vec<String>,

    #[serde(default = "default_chat_keywords")]
    pub chat_keywords: Vec<String>,
}

fn default_trigger_phrases() -> Vec<String> {
    [
        "flirt with",
        "chat with",
        "start a chat with",
        "start chatting with",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_platform_tokens() -> Vec<String> {
    vec!["whatsapp".to_string()]
}

fn default_chat_keywords() -> Vec<String> {
    ["flirt", "chat", "message", "talk to"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            policy: RoutingPolicy::default(),
            trigger_phrases: default_trigger_phrases(),
            platform_tokens: default_platform_tokens(),
            chat_keywords: default_chat_keywords(),
        }
    }
}

/// One routing rule. Returns `None` to let the next matcher decide.
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// `lowered` is `text` lowercased once by the router.
    fn try_match(&self, text: &str, lowered: &str) -> Option<RoutingDecision>;
}

// ---------------------------------------------------------------------------
// Session trigger
// ---------------------------------------------------------------------------

pub struct SessionTriggerMatcher {
    trigger_phrases: Vec<String>,
    platform_tokens: Vec<String>,
    chat_keywords: Vec<String>,
    prepositions: Vec<Regex>,
    platform_clause: Option<Regex>,
}

impl SessionTriggerMatcher {
    pub fn new(config: &RouterConfig) -> Self {
        let platform_tokens = normalize_terms(&config.platform_tokens);
        let prepositions = ["with", "to"]
            .iter()
            .filter_map(|p| Regex::new(&format!(r"\b{}\s+(.+)$", p)).ok())
            .collect();
        let platform_clause = if platform_tokens.is_empty() {
            None
        } else {
            let escaped: Vec<String> = platform_tokens.iter().map(|t| regex::escape(t)).collect();
            Regex::new(&format!(
                r"\s+(?:on|in|via|over|using)\s+(?:{})\b.*$",
                escaped.join("|")
            ))
            .ok()
        };
        Self {
            trigger_phrases: normalize_terms(&config.trigger_phrases),
            platform_tokens,
            chat_keywords: normalize_terms(&config.chat_keywords),
            prepositions,
            platform_clause,
        }
    }

    fn is_triggered(&self, lowered: &str) -> bool {
        let contains_any = |terms: &[String]| terms.iter().any(|t| lowered.contains(t.as_str()));
        contains_any(&self.trigger_phrases)
            || (contains_any(&self.platform_tokens) && contains_any(&self.chat_keywords))
    }

    /// Chat target named in `lowered`, or `None` when nothing usable follows "with"/"to".
    pub fn extract_target(&self, lowered: &str) -> Option<String> {
        let tail = self
            .prepositions
            .iter()
            .find_map(|re| re.captures(lowered))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())?;
        let tail = match &self.platform_clause {
            Some(re) => re.replace(tail, "").into_owned(),
            None => tail.to_string(),
        };
        let target = title_case(&tail);
        let target = target
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’'))
            .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ','))
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’'))
            .trim();
        if target.is_empty() {
            None
        } else {
            Some(target.to_string())
        }
    }
}

impl Matcher for SessionTriggerMatcher {
    fn name(&self) -> &'static str {
        "session_trigger"
    }

    fn try_match(&self, _text: &str, lowered: &str) -> Option<RoutingDecision> {
        if !self.is_triggered(lowered) {
            return None;
        }
        match self.extract_target(lowered) {
            Some(target) => {
                info!("💬 Chat session requested with '{}'", target);
                Some(RoutingDecision::SessionRequest(target))
            }
            None => {
                debug!("Session trigger without a target; falling through");
                None
            }
        }
    }
}

fn normalize_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest ("ai&ds" → "Ai&Ds").
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Fast path
// ---------------------------------------------------------------------------

pub struct FastPathMatcher {
    table: FastPathTable,
}

impl FastPathMatcher {
    pub fn new(table: FastPathTable) -> Self {
        Self { table }
    }
}

impl Matcher for FastPathMatcher {
    fn name(&self) -> &'static str {
        "fast_path"
    }

    fn try_match(&self, _text: &str, lowered: &str) -> Option<RoutingDecision> {
        let (phrase, action) = self.table.find(lowered)?;
        info!("⚡ Fast path: '{}'", phrase);
        Some(RoutingDecision::FastAction(action()))
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct CommandRouter {
    matchers: Vec<Box<dyn Matcher>>,
}

impl CommandRouter {
    /// Session trigger and fast path, ordered by `config.policy`.
    pub fn new(config: &RouterConfig, table: FastPathTable) -> Self {
        let session: Box<dyn Matcher> = Box::new(SessionTriggerMatcher::new(config));
        let fast: Box<dyn Matcher> = Box::new(FastPathMatcher::new(table));
        let matchers = match config.policy {
            RoutingPolicy::SessionFirst => vec![session, fast],
            RoutingPolicy::FastPathFirst => vec![fast, session],
        };
        Self::from_matchers(matchers)
    }

    pub fn from_matchers(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn matcher_names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    pub fn route(&self, text: &str) -> RoutingDecision {
        let lowered = text.to_lowercase();
        for matcher in &self.matchers {
            if let Some(decision) = matcher.try_match(text, &lowered) {
                debug!(matcher = matcher.name(), kind = decision.kind(), "routed");
                return decision;
            }
        }
        debug!("No matcher claimed the command; passing to agent");
        RoutingDecision::AgentRequest(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> SessionTriggerMatcher {
        SessionTriggerMatcher::new(&RouterConfig::default())
    }

    fn router(policy: RoutingPolicy) -> CommandRouter {
        let config = RouterConfig {
            policy,
            ..Default::default()
        };
        let table = FastPathTable::new()
            .bind("increase volume", || "Volume set to up.".to_string())
            .bind("mute", || "Volume set to mute.".to_string());
        CommandRouter::new(&config, table)
    }

    #[test]
    fn title_case_matches_word_runs() {
        assert_eq!(title_case("aswin ai&ds"), "Aswin Ai&Ds");
        assert_eq!(title_case("o'brien"), "O'Brien");
        assert_eq!(title_case("PARTHIBAN s"), "Parthiban S");
    }

    #[test]
    fn extraction_prefers_with_over_to() {
        let m = matcher();
        assert_eq!(m.extract_target("talk to mom with love").as_deref(), Some("Love"));
        assert_eq!(m.extract_target("talk to mom").as_deref(), Some("Mom"));
        assert_eq!(m.extract_target("chat with \"priya\".").as_deref(), Some("Priya"));
        assert_eq!(m.extract_target("chat without anyone"), None);
    }

    #[test]
    fn talk_to_needs_a_platform() {
        let r = router(RoutingPolicy::SessionFirst);
        assert_eq!(
            r.route("How do I talk to my boss"),
            RoutingDecision::AgentRequest("How do I talk to my boss".into())
        );
        assert_eq!(
            r.route("talk to Riya on WhatsApp"),
            RoutingDecision::SessionRequest("Riya".into())
        );
    }

    #[test]
    fn extraction_drops_platform_clause() {
        let m = matcher();
        assert_eq!(
            m.extract_target("start a chat with aswin ai&ds on whatsapp").as_deref(),
            Some("Aswin Ai&Ds")
        );
        assert_eq!(
            m.extract_target("message to riya via whatsapp please").as_deref(),
            Some("Riya")
        );
    }

    #[test]
    fn platform_plus_keyword_triggers() {
        let r = router(RoutingPolicy::SessionFirst);
        assert_eq!(
            r.route("Send a message to Riya on WhatsApp"),
            RoutingDecision::SessionRequest("Riya".to_string())
        );
    }

    #[test]
    fn trigger_without_target_falls_through() {
        let r = router(RoutingPolicy::SessionFirst);
        assert_eq!(
            r.route("flirt on whatsapp"),
            RoutingDecision::AgentRequest("flirt on whatsapp".to_string())
        );
        assert_eq!(
            r.route("chat with"),
            RoutingDecision::AgentRequest("chat with".to_string())
        );
    }

    #[test]
    fn policy_orders_matchers() {
        assert_eq!(
            router(RoutingPolicy::SessionFirst).matcher_names(),
            vec!["session_trigger", "fast_path"]
        );
        assert_eq!(
            router(RoutingPolicy::FastPathFirst).matcher_names(),
            vec!["fast_path", "session_trigger"]
        );
    }

    #[test]
    fn policy_parses_from_env_strings() {
        assert_eq!("fast-path-first".parse::<RoutingPolicy>(), Ok(RoutingPolicy::FastPathFirst));
        assert_eq!("Session_First".parse::<RoutingPolicy>(), Ok(RoutingPolicy::SessionFirst));
        assert!("random".parse::<RoutingPolicy>().is_err());
    }
}
