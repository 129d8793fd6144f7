//! Signature detection.
//!
//! The engine holds the rule set, a Bloom prefilter, and an Aho–Corasick
//! automaton over all non-empty rule patterns. Payload scanning is a single
//! automaton pass; the prefilter short-circuits payloads that cannot contain
//! any pattern.

pub mod aho_corasick;
pub mod bloom;
pub mod rules;

use self::aho_corasick::AhoCorasick;
use self::bloom::BloomFilter;
use crate::flowtable::FlowKey;

use std::collections::HashMap;

/// A detection rule: a literal byte pattern to find in application payload.
///
/// Patterns are compared byte-for-byte; there is no regex support and no
/// case folding. The flow-key predicate slot is reserved: every rule
/// currently admits every flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: u32,
    pub message: String,
    pub pattern: Vec<u8>,
}

impl Rule {
    pub fn new(id: u32, message: impl Into<String>, pattern: impl Into<Vec<u8>>) -> Self {
        Rule {
            id,
            message: message.into(),
            pattern: pattern.into(),
        }
    }
}

/// Context bytes captured on each side of a match.
const CONTEXT_WINDOW: usize = 10;

/// One admitted rule hit inside a scanned payload.
#[derive(Debug)]
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    /// Absolute offset of the match inside the scanned payload.
    pub position: usize,
    /// Matched length (the rule's pattern length).
    pub length: usize,
    /// Payload slice `[position - 10 .. position + length + 10]`, clipped
    /// to payload bounds.
    pub context: Vec<u8>,
}

impl RuleMatch<'_> {
    /// Offset one past the last matched byte.
    #[inline]
    pub fn end(&self) -> usize {
        self.position + self.length
    }
}

/// Multi-pattern detection engine.
pub struct Engine {
    rules: Vec<Rule>,
    automaton: AhoCorasick,
    prefilter: BloomFilter,
    /// Automaton pattern id to index in `rules`.
    pattern_rules: HashMap<usize, usize>,
    /// Window width for the payload-side prefilter probe; the length of the
    /// shortest registered pattern. `None` until built or when no rule
    /// carries a pattern.
    prefilter_window: Option<usize>,
    built: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            rules: Vec::new(),
            automaton: AhoCorasick::new(),
            prefilter: BloomFilter::default(),
            pattern_rules: HashMap::new(),
            prefilter_window: None,
            built: false,
        }
    }

    /// Appends a rule. A rule with a non-empty pattern is registered with
    /// the automaton and the prefilter; a rule with an empty pattern is kept
    /// but can never match. Clears the built flag.
    pub fn add_rule(&mut self, rule: Rule) {
        if !rule.pattern.is_empty() {
            let pattern_id = self.automaton.add_pattern(&rule.pattern);
            self.pattern_rules.insert(pattern_id, self.rules.len());
        }
        self.rules.push(rule);
        self.built = false;
    }

    /// Finalizes the automaton and the prefilter. Idempotent.
    ///
    /// The prefilter is populated with the `w`-byte prefix of every pattern,
    /// where `w` is the shortest pattern length; [`scan`](Engine::scan)
    /// probes payload windows of the same width. Any payload containing a
    /// pattern necessarily contains that pattern's prefix as a window, so
    /// the prefilter never suppresses a true match.
    pub fn build(&mut self) {
        if self.built {
            return;
        }
        self.automaton.build();
        self.prefilter.clear();
        self.prefilter_window = self.automaton.min_pattern_len();
        if let Some(window) = self.prefilter_window {
            for pattern_id in 0..self.automaton.pattern_count() {
                self.prefilter.add(&self.automaton.pattern(pattern_id)[..window]);
            }
        }
        self.built = true;
    }

    #[inline]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Scans `payload` and returns all admitted matches in scan order.
    /// Builds lazily on first use.
    pub fn scan(&mut self, payload: &[u8], flow_key: Option<&FlowKey>) -> Vec<RuleMatch<'_>> {
        if payload.is_empty() {
            return Vec::new();
        }
        self.build();
        if !self.payload_may_match(payload) {
            return Vec::new();
        }

        let hits = self.automaton.search(payload);
        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            let rule = &self.rules[self.pattern_rules[&hit.pattern_id]];
            if let Some(key) = flow_key {
                if !Self::admits(rule, key) {
                    continue;
                }
            }
            let start = hit.start.saturating_sub(CONTEXT_WINDOW);
            let end = (hit.start + hit.len + CONTEXT_WINDOW).min(payload.len());
            matches.push(RuleMatch {
                rule,
                position: hit.start,
                length: hit.len,
                context: payload[start..end].to_vec(),
            });
        }
        matches
    }

    /// Payload-side prefilter: probes every `window`-byte slice of the
    /// payload against the Bloom filter. `false` guarantees no pattern
    /// occurs in the payload.
    fn payload_may_match(&self, payload: &[u8]) -> bool {
        let Some(window) = self.prefilter_window else {
            // No rule carries a pattern; nothing can match.
            return false;
        };
        if payload.len() < window {
            return false;
        }
        payload
            .windows(window)
            .any(|w| self.prefilter.possibly_contains(w))
    }

    /// Reserved flow-key predicate hook; admits unconditionally.
    fn admits(_rule: &Rule, _key: &FlowKey) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_key() -> FlowKey {
        FlowKey {
            src_ip: Ipv4Addr::new(192, 168, 1, 10),
            dst_ip: Ipv4Addr::new(93, 184, 216, 34),
            src_port: 12345,
            dst_port: 80,
            proto: 6,
        }
    }

    fn engine_with(patterns: &[(u32, &str, &[u8])]) -> Engine {
        let mut engine = Engine::new();
        for &(id, msg, pattern) in patterns {
            engine.add_rule(Rule::new(id, msg, pattern));
        }
        engine.build();
        engine
    }

    #[test]
    fn core_engine_single_match_position_round_trip() {
        let mut engine = engine_with(&[(1, "t", b"pattern")]);
        let prefix = b"some leading bytes ";
        let payload = [&prefix[..], b"pattern", b" trailer"].concat();
        let matches = engine.scan(&payload, Some(&sample_key()));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].position, prefix.len());
        assert_eq!(matches[0].rule.id, 1);
    }

    #[test]
    fn core_engine_context_window_clipped() {
        let mut engine = engine_with(&[(1, "t", b"mid")]);
        let matches = engine.scan(b"abmidcd", None);
        assert_eq!(matches.len(), 1);
        // Clipped to payload bounds on both sides.
        assert_eq!(matches[0].context, b"abmidcd");

        let payload = [&[b'x'; 30][..], b"mid", &[b'y'; 30][..]].concat();
        let matches = engine.scan(&payload, None);
        assert_eq!(matches[0].context.len(), 10 + 3 + 10);
        assert_eq!(&matches[0].context[10..13], b"mid");
    }

    #[test]
    fn core_engine_empty_payload_no_matches() {
        let mut engine = engine_with(&[(1, "t", b"x")]);
        assert!(engine.scan(b"", None).is_empty());
    }

    #[test]
    fn core_engine_no_patterns_never_matches() {
        let mut engine = Engine::new();
        engine.add_rule(Rule::new(1, "empty pattern", b"".to_vec()));
        engine.build();
        assert!(engine.scan(b"anything at all", None).is_empty());
        assert_eq!(engine.rule_count(), 1);
    }

    #[test]
    fn core_engine_multiple_rules_scan_order() {
        let mut engine = engine_with(&[
            (1, "sql", b"SELECT * FROM"),
            (2, "xss", b"<script>"),
            (3, "generic", b"test"),
        ]);
        let payload = b"test<script>SELECT * FROM users";
        let ids: Vec<u32> = engine
            .scan(payload, Some(&sample_key()))
            .iter()
            .map(|m| m.rule.id)
            .collect();
        // Emission order follows match end positions.
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn core_engine_add_after_build_rebuilds() {
        let mut engine = engine_with(&[(1, "a", b"alpha")]);
        assert_eq!(engine.scan(b"alpha", None).len(), 1);
        engine.add_rule(Rule::new(2, "b", b"beta"));
        let matches = engine.scan(b"alpha beta", None);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn core_engine_prefilter_skips_clean_payload() {
        let mut engine = engine_with(&[(1, "t", b"needle")]);
        // Shorter than the shortest pattern: trivially clean.
        assert!(engine.scan(b"abc", None).is_empty());
        assert!(engine.scan(&vec![0u8; 4096], None).is_empty());
    }
}
