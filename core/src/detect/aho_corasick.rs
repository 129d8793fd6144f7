//! Aho–Corasick multi-pattern matcher.
//!
//! Goto trie plus BFS-computed failure links plus output-set propagation.
//! Scanning is O(|text| + matches) regardless of pattern count, which is
//! what keeps detection linear at wire speed. Adding a pattern invalidates
//! the build; the build is recomputed lazily on the next search.

use std::collections::{HashMap, VecDeque};

/// One occurrence reported by [`AhoCorasick::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    /// Identifier returned by [`AhoCorasick::add_pattern`].
    pub pattern_id: usize,
    /// Byte offset of the first matched byte.
    pub start: usize,
    /// Pattern length.
    pub len: usize,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<u8, usize>,
    fail: usize,
    /// Patterns terminating exactly at this node.
    own: Vec<usize>,
    /// `own` plus the outputs inherited along the failure chain. Rebuilt by
    /// `build()`.
    output: Vec<usize>,
}

/// The automaton. Node 0 is the root.
#[derive(Debug)]
pub struct AhoCorasick {
    nodes: Vec<Node>,
    patterns: Vec<Vec<u8>>,
    built: bool,
}

impl Default for AhoCorasick {
    fn default() -> Self {
        Self::new()
    }
}

impl AhoCorasick {
    pub fn new() -> Self {
        AhoCorasick {
            nodes: vec![Node::default()],
            patterns: Vec::new(),
            built: false,
        }
    }

    /// Adds a pattern to the trie and returns its identifier. Invalidates
    /// any previous build.
    pub fn add_pattern(&mut self, pattern: &[u8]) -> usize {
        let pattern_id = self.patterns.len();
        self.patterns.push(pattern.to_vec());

        let mut current = 0;
        for &byte in pattern {
            current = match self.nodes[current].children.get(&byte) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[current].children.insert(byte, next);
                    next
                }
            };
        }
        self.nodes[current].own.push(pattern_id);
        self.built = false;
        pattern_id
    }

    /// Computes failure links and output sets. Idempotent; a no-op when the
    /// automaton is already built.
    pub fn build(&mut self) {
        if self.built {
            return;
        }
        let mut queue = VecDeque::new();
        self.nodes[0].fail = 0;
        self.nodes[0].output = self.nodes[0].own.clone();

        let roots: Vec<usize> = self.nodes[0].children.values().copied().collect();
        for child in roots {
            self.nodes[child].fail = 0;
            self.nodes[child].output = self.nodes[child].own.clone();
            queue.push_back(child);
        }

        while let Some(current) = queue.pop_front() {
            let children: Vec<(u8, usize)> = self.nodes[current]
                .children
                .iter()
                .map(|(&byte, &node)| (byte, node))
                .collect();
            for (byte, child) in children {
                queue.push_back(child);

                let mut fail = self.nodes[current].fail;
                let target = loop {
                    match self.nodes[fail].children.get(&byte) {
                        Some(&next) if next != child => break next,
                        _ if fail == 0 => break 0,
                        _ => fail = self.nodes[fail].fail,
                    }
                };
                self.nodes[child].fail = target;

                let mut output = self.nodes[child].own.clone();
                output.extend_from_slice(&self.nodes[target].output);
                self.nodes[child].output = output;
            }
        }
        self.built = true;
    }

    /// Streams through `text` and reports every occurrence of every pattern,
    /// in emission order: matches are reported as their last byte is
    /// reached, longest (leftmost-starting) first at each position, ties by
    /// pattern insertion order. Builds the automaton first if needed.
    pub fn search(&mut self, text: &[u8]) -> Vec<PatternMatch> {
        self.build();

        let mut matches = Vec::new();
        let mut current = 0;
        for (i, &byte) in text.iter().enumerate() {
            loop {
                if let Some(&next) = self.nodes[current].children.get(&byte) {
                    current = next;
                    break;
                }
                if current == 0 {
                    break;
                }
                current = self.nodes[current].fail;
            }
            for &pattern_id in &self.nodes[current].output {
                let len = self.patterns[pattern_id].len();
                matches.push(PatternMatch {
                    pattern_id,
                    start: i + 1 - len,
                    len,
                });
            }
        }
        matches
    }

    /// The bytes of a previously added pattern.
    #[inline]
    pub fn pattern(&self, pattern_id: usize) -> &[u8] {
        &self.patterns[pattern_id]
    }

    #[inline]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Length of the shortest registered pattern, if any.
    pub fn min_pattern_len(&self) -> Option<usize> {
        self.patterns.iter().map(|p| p.len()).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference implementation: all literal occurrences by brute force.
    fn naive_occurrences(text: &[u8], patterns: &[&[u8]]) -> Vec<(usize, usize)> {
        let mut hits = Vec::new();
        for (id, pattern) in patterns.iter().enumerate() {
            if pattern.is_empty() || pattern.len() > text.len() {
                continue;
            }
            for start in 0..=(text.len() - pattern.len()) {
                if &text[start..start + pattern.len()] == *pattern {
                    hits.push((id, start));
                }
            }
        }
        hits.sort_unstable();
        hits
    }

    fn automaton(patterns: &[&[u8]]) -> AhoCorasick {
        let mut ac = AhoCorasick::new();
        for pattern in patterns {
            ac.add_pattern(pattern);
        }
        ac
    }

    #[test]
    fn core_aho_single_occurrence_position() {
        let mut ac = automaton(&[b"test"]);
        let hits = ac.search(b"xxtestyy");
        assert_eq!(
            hits,
            vec![PatternMatch {
                pattern_id: 0,
                start: 2,
                len: 4
            }]
        );
    }

    #[test]
    fn core_aho_overlapping_and_nested_patterns() {
        let patterns: [&[u8]; 4] = [b"he", b"she", b"his", b"hers"];
        let text = b"ushers";
        let mut ac = automaton(&patterns);
        let mut got: Vec<(usize, usize)> = ac
            .search(text)
            .iter()
            .map(|m| (m.pattern_id, m.start))
            .collect();
        got.sort_unstable();
        assert_eq!(got, naive_occurrences(text, &patterns));
    }

    #[test]
    fn core_aho_matches_equal_naive_scan() {
        let patterns: [&[u8]; 5] = [b"ab", b"abc", b"bca", b"c", b"aabc"];
        let text = b"aabcabcbcaabcac";
        let mut ac = automaton(&patterns);
        let mut got: Vec<(usize, usize)> = ac
            .search(text)
            .iter()
            .map(|m| (m.pattern_id, m.start))
            .collect();
        got.sort_unstable();
        assert_eq!(got, naive_occurrences(text, &patterns));
    }

    #[test]
    fn core_aho_repeated_occurrences() {
        let mut ac = automaton(&[b"aa"]);
        let hits = ac.search(b"aaaa");
        let starts: Vec<usize> = hits.iter().map(|m| m.start).collect();
        assert_eq!(starts, vec![0, 1, 2]);
    }

    #[test]
    fn core_aho_emission_order_prefers_longest_at_position() {
        // Both end at the same byte; the longer one starts leftmost and is
        // reported first.
        let mut ac = automaton(&[b"she", b"he"]);
        let hits = ac.search(b"she");
        assert_eq!(hits[0].pattern_id, 0);
        assert_eq!(hits[1].pattern_id, 1);
    }

    #[test]
    fn core_aho_incremental_add_rebuilds() {
        let mut ac = AhoCorasick::new();
        ac.add_pattern(b"alpha");
        assert_eq!(ac.search(b"alpha beta").len(), 1);
        // Adding after a build must invalidate and rebuild cleanly, without
        // duplicating output sets.
        ac.add_pattern(b"beta");
        let hits = ac.search(b"alpha beta");
        assert_eq!(hits.len(), 2);
        let hits = ac.search(b"alpha beta");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn core_aho_binary_patterns() {
        let patterns: [&[u8]; 2] = [&[0x00, 0xff, 0x00], &[0xff, 0x00]];
        let text = [0x00, 0xff, 0x00, 0xff, 0x00];
        let mut ac = automaton(&patterns);
        let mut got: Vec<(usize, usize)> = ac
            .search(&text)
            .iter()
            .map(|m| (m.pattern_id, m.start))
            .collect();
        got.sort_unstable();
        assert_eq!(got, naive_occurrences(&text, &patterns));
    }

    #[test]
    fn core_aho_pattern_retrieval() {
        let mut ac = AhoCorasick::new();
        let id = ac.add_pattern(b"needle");
        assert_eq!(ac.pattern(id), b"needle");
        assert_eq!(ac.pattern_count(), 1);
        assert_eq!(ac.min_pattern_len(), Some(6));
    }
}
