//! Glob matching for operation patterns.
//!
//! Patterns support `*` (any run, including empty) and `?` (any single
//! character). Matching is anchored at both ends and case-insensitive, so a
//! cached decision for `rm -rf *` never leaks onto a bare `rm`.

#[must_use]
pub fn operation_matches(pattern: &str, operation: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let operation: Vec<char> = operation.to_lowercase().chars().collect();
    glob_match(&pattern, &operation)
}

fn glob_match(pattern: &[char], value: &[char]) -> bool {
    match pattern.split_first() {
        None => value.is_empty(),
        Some(('*', rest)) => {
            // Try every possible span for the star, shortest first.
            (0..=value.len()).any(|skip| glob_match(rest, &value[skip..]))
        }
        Some(('?', rest)) => !value.is_empty() && glob_match(rest, &value[1..]),
        Some((literal, rest)) => {
            value.first() == Some(literal) && glob_match(rest, &value[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_star_requires_the_prefix() {
        assert!(operation_matches("rm -rf *", "rm -rf /tmp/x"));
        assert!(!operation_matches("rm -rf *", "rm /tmp/x"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(operation_matches("GIT *", "git push"));
        assert!(operation_matches("git *", "GIT PUSH"));
    }

    #[test]
    fn matching_is_anchored() {
        assert!(!operation_matches("push", "git push"));
        assert!(!operation_matches("git", "git push"));
        assert!(operation_matches("git push", "git push"));
    }

    #[test]
    fn star_matches_empty_run() {
        assert!(operation_matches("cargo*", "cargo"));
        assert!(operation_matches("*", ""));
        assert!(operation_matches("*", "anything at all"));
    }

    #[test]
    fn question_mark_matches_exactly_one() {
        assert!(operation_matches("file?.txt", "file1.txt"));
        assert!(!operation_matches("file?.txt", "file.txt"));
        assert!(!operation_matches("file?.txt", "file12.txt"));
    }

    #[test]
    fn interior_star_spans_arbitrary_text() {
        assert!(operation_matches("git * origin", "git push origin"));
        assert!(operation_matches("git * origin", "git push --force origin"));
        assert!(!operation_matches("git * origin", "git push upstream"));
    }

    #[test]
    fn multibyte_operations_do_not_panic() {
        assert!(operation_matches("écho *", "ÉCHO bonjour"));
    }
}
