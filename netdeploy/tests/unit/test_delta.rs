//! Delta computation tests

use netdeploy::deploy::delta::{compute_delta, running_only};
use netdeploy::models::config::{intended_lines, running_lines, ConfigLine};

fn lines(raw: &[&str]) -> Vec<ConfigLine> {
    raw.iter().map(|l| ConfigLine::new(l)).collect()
}

#[test]
fn test_delta_is_missing_intended_lines_in_order() {
    let running = lines(&["set a", "set c"]);
    let intended = lines(&["set d", "set a", "set b", "set c"]);

    assert_eq!(compute_delta(&running, &intended), lines(&["set d", "set b"]));
}

#[test]
fn test_delta_never_removes() {
    let running = lines(&["set a", "set legacy"]);
    let intended = lines(&["set a"]);

    assert!(compute_delta(&running, &intended).is_empty());
    assert_eq!(running_only(&running, &intended), lines(&["set legacy"]));
}

#[test]
fn test_delta_ignores_whitespace_and_comments() {
    let running = running_lines("set a   \n\n  set b\n");
    let intended = intended_lines("# rendered for R1\nset a\n   \n  set b  \n# trailer\nset c\n");

    assert_eq!(compute_delta(&running, &intended), lines(&["set c"]));
}

#[test]
fn test_delta_emits_duplicates_once() {
    let intended = lines(&["set x", "set y", "set x"]);

    assert_eq!(compute_delta(&[], &intended), lines(&["set x", "set y"]));
}

#[test]
fn test_delta_is_stable_after_apply() {
    let mut running = lines(&["set a"]);
    let intended = lines(&["set a", "set b", "set c"]);

    let delta = compute_delta(&running, &intended);
    running.extend(delta);
    assert!(compute_delta(&running, &intended).is_empty());
}

#[test]
fn test_delta_is_case_sensitive() {
    let running = lines(&["set interfaces ethernet eth0 description WAN"]);
    let intended = lines(&["set interfaces ethernet eth0 description wan"]);

    assert_eq!(compute_delta(&running, &intended).len(), 1);
}
