//! Rule file loading.
//!
//! Rule files are UTF-8 text. Lines starting with `#` and blank lines are
//! comments; every other line is `<message>|<pattern>` with a literal byte
//! pattern. Ids are assigned sequentially from 1 in load order across all
//! files. A malformed line is skipped with a warning; loading zero rules is
//! a warning but not an error (the pipeline still produces flow statistics).

use super::Rule;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Parses rule lines from `text`, assigning ids starting at `*next_id`.
pub fn parse_rules(text: &str, next_id: &mut u32) -> Vec<Rule> {
    let mut rules = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('|') {
            Some((message, pattern)) if !message.is_empty() => {
                rules.push(Rule::new(*next_id, message, pattern.as_bytes().to_vec()));
                *next_id += 1;
            }
            _ => {
                log::warn!("skipping malformed rule on line {}: {:?}", lineno + 1, line);
            }
        }
    }
    rules
}

/// Loads every rule file in `paths`, in order. An unreadable file is an
/// initialization error; malformed lines inside a readable file are skipped.
pub fn load_rule_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    let mut next_id = 1;
    for path in paths {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read rule file {}", path.display()))?;
        let loaded = parse_rules(&text, &mut next_id);
        log::info!("loaded {} rules from {}", loaded.len(), path.display());
        rules.extend(loaded);
    }
    if rules.is_empty() {
        log::warn!("no rules loaded; running with flow statistics only");
    }
    Ok(rules)
}

/// The stock rule set used when no rule files are configured.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(1, "Suspicious test pattern", b"test".to_vec()),
        Rule::new(2, "Malicious payload detected", b"malicious".to_vec()),
        Rule::new(3, "SQL injection attempt", b"SELECT * FROM".to_vec()),
        Rule::new(4, "XSS attempt", b"<script>".to_vec()),
        Rule::new(5, "Potential backdoor", b"backdoor".to_vec()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_rules_parse_skips_comments_and_bad_lines() {
        let text = "\
# comment
Suspicious test pattern|test

SQL injection attempt|SELECT * FROM
no separator here
|empty message
XSS attempt|<script>
";
        let mut next_id = 1;
        let rules = parse_rules(text, &mut next_id);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].id, 1);
        assert_eq!(rules[0].message, "Suspicious test pattern");
        assert_eq!(rules[0].pattern, b"test");
        assert_eq!(rules[1].id, 2);
        assert_eq!(rules[1].pattern, b"SELECT * FROM");
        assert_eq!(rules[2].id, 3);
        assert_eq!(next_id, 4);
    }

    #[test]
    fn core_rules_pattern_may_contain_pipe() {
        let mut next_id = 1;
        let rules = parse_rules("msg|a|b", &mut next_id);
        // Only the first separator splits; the rest is pattern bytes.
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, b"a|b");
    }

    #[test]
    fn core_rules_ids_continue_across_files() {
        let mut next_id = 1;
        let first = parse_rules("a|one\nb|two", &mut next_id);
        let second = parse_rules("c|three", &mut next_id);
        assert_eq!(first[1].id, 2);
        assert_eq!(second[0].id, 3);
    }

    #[test]
    fn core_rules_missing_file_is_an_error() {
        assert!(load_rule_files(&["/nonexistent/rules.txt"]).is_err());
    }
}
