use std::ops::Range;

/// Resolve an inclusive `[start, end]` pair into a slice range.
///
/// Negative indices count from the end (`-1` is the last element). Out of
/// bounds ends are clamped; an inverted or empty window yields `None`.
pub fn resolve(len: usize, start: i64, end: i64) -> Option<Range<usize>> {
    let len = len as i64;
    if len == 0 {
        return None;
    }

    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };

    if start > end || start >= len {
        return None;
    }

    Some(start as usize..end as usize + 1)
}

/// Character-based substring using inclusive indices
pub fn substr(s: &str, start: i64, end: i64) -> String {
    let chars: Vec<char> = s.chars().collect();
    match resolve(chars.len(), start, end) {
        Some(range) => chars[range].iter().collect(),
        None => String::new(),
    }
}

/// Longest string a range write may produce, matching redis' 512 MiB cap
pub const MAX_STRING_LEN: usize = 512 * 1024 * 1024;

/// Whether writing `value` at `index` stays under [`MAX_STRING_LEN`]
pub fn fits(index: usize, value: &str) -> bool {
    index
        .checked_add(value.len())
        .is_some_and(|end| end <= MAX_STRING_LEN)
}

/// Overwrite `s` from character `index` with `value`, padding with NULs past the end
pub fn overwrite(s: &str, index: usize, value: &str) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    if chars.len() < index {
        chars.resize(index, '\0');
    }
    for (offset, c) in value.chars().enumerate() {
        let pos = index + offset;
        if pos < chars.len() {
            chars[pos] = c;
        } else {
            chars.push(c);
        }
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_handles_negative_and_clamped_bounds() {
        assert_eq!(resolve(5, 0, -1), Some(0..5));
        assert_eq!(resolve(5, 1, 2), Some(1..3));
        assert_eq!(resolve(5, -2, -1), Some(3..5));
        assert_eq!(resolve(5, 2, 100), Some(2..5));
        assert_eq!(resolve(5, -100, 1), Some(0..2));
        assert_eq!(resolve(5, 3, 1), None);
        assert_eq!(resolve(5, 5, 9), None);
        assert_eq!(resolve(0, 0, -1), None);
    }

    #[test]
    fn substr_counts_characters() {
        assert_eq!(substr("hello", 0, -1), "hello");
        assert_eq!(substr("hello", 1, 3), "ell");
        assert_eq!(substr("héllo", 1, 1), "é");
        assert_eq!(substr("hello", 9, 12), "");
    }

    #[test]
    fn overwrite_pads_past_the_end() {
        assert_eq!(overwrite("Hello World", 6, "Redis"), "Hello Redis");
        assert_eq!(overwrite("ab", 4, "cd"), "ab\0\0cd");
        assert_eq!(overwrite("", 0, "new"), "new");
    }

    #[test]
    fn fits_caps_the_written_end() {
        assert!(fits(0, "abc"));
        assert!(fits(MAX_STRING_LEN - 1, "x"));
        assert!(!fits(MAX_STRING_LEN, "x"));
        assert!(!fits(usize::MAX, "x"));
    }
}
