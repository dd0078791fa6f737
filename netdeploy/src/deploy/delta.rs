//! Desired-state delta computation

use std::collections::HashSet;

use crate::models::config::{ConfigLine, COMMENT_MARKER};

fn is_meaningful(line: &ConfigLine) -> bool {
    let text = line.as_str().trim();
    !text.is_empty() && !text.starts_with(COMMENT_MARKER)
}

/// Lines of `intended` missing from `running`, in `intended` order.
///
/// Strictly additive: lines only present in `running` are never scheduled
/// for removal. Blank and comment lines on the intended side are ignored and
/// a line repeated in `intended` is emitted once.
pub fn compute_delta(running: &[ConfigLine], intended: &[ConfigLine]) -> Vec<ConfigLine> {
    let running_set: HashSet<&str> = running.iter().map(|l| l.as_str().trim()).collect();
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut delta = Vec::new();

    for line in intended {
        if !is_meaningful(line) {
            continue;
        }
        let text = line.as_str().trim();
        if !running_set.contains(text) && emitted.insert(text) {
            delta.push(ConfigLine::new(text));
        }
    }

    delta
}

/// Running lines that the intended config does not mention.
///
/// Informational only; these stay on the device.
pub fn running_only(running: &[ConfigLine], intended: &[ConfigLine]) -> Vec<ConfigLine> {
    let intended_set: HashSet<&str> = intended.iter().map(|l| l.as_str().trim()).collect();
    running
        .iter()
        .filter(|line| is_meaningful(line) && !intended_set.contains(line.as_str().trim()))
        .cloned()
        .collect()
}
