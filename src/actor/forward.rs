//! The forwarding table (spec §4.4.3): topic-pattern → target rules,
//! plus the optional catch-all.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use regex::Regex;

// Layer 3: Internal module imports
use crate::util::ActorId;

/// Where a forwarded topic is redirected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardTarget {
    Parent,
    Child(ActorId),
}

/// A topic pattern: either an exact string or a user-anchored regex
/// (spec §4.4.3: "string (exact equality) or a regular expression").
#[derive(Debug, Clone)]
pub enum TopicPattern {
    Exact(String),
    Regex(Regex),
}

impl TopicPattern {
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Exact(s) => s == topic,
            TopicPattern::Regex(re) => re.is_match(topic),
        }
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPattern::Exact(s) => write!(f, "{s:?}"),
            TopicPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// The ordered set of forwarding rules for one actor, plus its optional
/// catch-all (spec §3: `forwardList`, `forwardAllUnknown`).
#[derive(Debug, Clone, Default)]
pub struct ForwardTable {
    rules: Vec<(TopicPattern, ForwardTarget)>,
    catch_all: Option<ForwardTarget>,
}

impl ForwardTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, pattern: TopicPattern, target: ForwardTarget) {
        self.rules.push((pattern, target));
    }

    pub fn set_catch_all(&mut self, target: ForwardTarget) {
        self.catch_all = Some(target);
    }

    /// Resolve a topic to a forwarding target, or `None` if it should be
    /// dispatched locally.
    ///
    /// `has_local_handler` lets the catch-all rule defer to a handler
    /// that already exists locally, per spec §4.4.3: "If
    /// `forwardAllUnknown` is set and `topic` is not in the local
    /// behavior, forward there."
    pub fn resolve(&self, topic: &str, has_local_handler: bool) -> Option<ForwardTarget> {
        if !has_local_handler {
            if let Some(target) = &self.catch_all {
                return Some(target.clone());
            }
        }
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(topic))
            .map(|(_, target)| target.clone())
    }

    /// Remove every rule whose target is the given child, used when a
    /// child detaches (spec §4.4.5: "iterating children after detach
    /// never observes it" — forwarding rules follow the same rule).
    pub fn remove_target(&mut self, child: ActorId) {
        self.rules
            .retain(|(_, target)| *target != ForwardTarget::Child(child));
        if self.catch_all == Some(ForwardTarget::Child(child)) {
            self.catch_all = None;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        let pattern = TopicPattern::Exact("hello".into());
        assert!(pattern.matches("hello"));
        assert!(!pattern.matches("hello2"));
    }

    #[test]
    fn regex_pattern_respects_user_anchoring() {
        let pattern = TopicPattern::Regex(Regex::new("^event\\.").unwrap());
        assert!(pattern.matches("event.created"));
        assert!(!pattern.matches("other.event.created"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut table = ForwardTable::new();
        let child_a = ActorId::new();
        let child_b = ActorId::new();
        table.add_rule(TopicPattern::Exact("x".into()), ForwardTarget::Child(child_a));
        table.add_rule(TopicPattern::Exact("x".into()), ForwardTarget::Child(child_b));

        assert_eq!(table.resolve("x", false), Some(ForwardTarget::Child(child_a)));
    }

    #[test]
    fn catch_all_only_applies_when_no_local_handler() {
        let mut table = ForwardTable::new();
        table.set_catch_all(ForwardTarget::Parent);

        assert_eq!(table.resolve("anything", false), Some(ForwardTarget::Parent));
        assert_eq!(table.resolve("anything", true), None);
    }

    #[test]
    fn topic_not_matching_any_rule_dispatches_locally() {
        let table = ForwardTable::new();
        assert_eq!(table.resolve("whatever", false), None);
    }

    #[test]
    fn remove_target_drops_rules_and_catch_all() {
        let mut table = ForwardTable::new();
        let child = ActorId::new();
        table.add_rule(TopicPattern::Exact("x".into()), ForwardTarget::Child(child));
        table.set_catch_all(ForwardTarget::Child(child));

        table.remove_target(child);

        assert_eq!(table.resolve("x", false), None);
    }
}
