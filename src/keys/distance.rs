//! Edit distance used by simple-rename detection.

/// Levenshtein distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }

    // single rolling row of the DP matrix
    let mut row: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != *cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        assert_eq!(levenshtein("JiraEventSource", "JiraEventSource"), 0);
    }

    #[test]
    fn test_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", ""), 0);
    }

    #[test]
    fn test_classic_example() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_single_edits() {
        assert_eq!(levenshtein("GitSource", "GitSources"), 1);
        assert_eq!(levenshtein("GitSource", "GtSource"), 1);
        assert_eq!(levenshtein("GitSource", "GidSource"), 1);
    }

    #[test]
    fn test_symmetric() {
        assert_eq!(levenshtein("Exchange", "Xchange2"), levenshtein("Xchange2", "Exchange"));
    }
}
