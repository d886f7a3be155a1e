//! Natural, case-insensitive name ordering.
//!
//! Digit runs compare by numeric value (`file2` < `file10`), everything else
//! compares case-insensitively. Names that tie are ordered by their exact
//! bytes so the order is total and cursors are unambiguous.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

enum Chunk {
    Digits(String),
    Text(String),
}

fn next_chunk(chars: &mut Peekable<Chars<'_>>) -> Option<Chunk> {
    let first = *chars.peek()?;
    let digits = first.is_ascii_digit();
    let mut chunk = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() != digits {
            break;
        }
        chunk.push(c);
        chars.next();
    }
    Some(if digits {
        Chunk::Digits(chunk)
    } else {
        Chunk::Text(chunk.to_lowercase())
    })
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.len().cmp(&b.len()))
}

fn natural_only(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        let ordering = match (next_chunk(&mut left), next_chunk(&mut right)) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Chunk::Digits(x)), Some(Chunk::Digits(y))) => compare_digits(&x, &y),
            (Some(Chunk::Text(x)), Some(Chunk::Text(y))) => x.cmp(&y),
            (Some(Chunk::Digits(_)), Some(Chunk::Text(_))) => Ordering::Less,
            (Some(Chunk::Text(_)), Some(Chunk::Digits(_))) => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

/// Total natural ordering used for listings and cursors.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_only(a, b).then_with(|| a.cmp(b))
}

/// Sort names in place by [`natural_cmp`].
pub fn sort_natural(names: &mut [String]) {
    names.sort_by(|a, b| natural_cmp(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        sort_natural(&mut names);
        names
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(
            sorted(&["file10", "file2", "file1"]),
            vec!["file1", "file2", "file10"]
        );
        assert_eq!(sorted(&["10", "9", "009"]), vec!["9", "009", "10"]);
    }

    #[test]
    fn test_case_insensitive_with_exact_tiebreak() {
        assert_eq!(
            sorted(&["beta", "Alpha", "alpha", "Beta"]),
            vec!["Alpha", "alpha", "Beta", "beta"]
        );
        assert_eq!(natural_cmp("a", "a"), Ordering::Equal);
        assert_eq!(natural_cmp("A", "a"), Ordering::Less);
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert_eq!(sorted(&["docs2", "docs"]), vec!["docs", "docs2"]);
        assert_eq!(natural_cmp("2024", "report"), Ordering::Less);
    }
}
