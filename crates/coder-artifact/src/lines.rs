//! Line-change ratio
//!
//! A positional rewrite detector. It is deliberately not a diff: lines are
//! compared index by index and any length difference counts as changed.

/// Result of comparing two texts line by line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineChange {
    /// Changed line count
    pub changed: usize,
    /// `max(old_lines, new_lines)`
    pub total: usize,
    /// `changed / total`, 0 when `total` is 0
    pub ratio: f64,
}

impl LineChange {
    /// Percentage rounded to the nearest integer
    #[inline]
    #[must_use]
    pub fn percent(&self) -> u32 {
        // ratio is within [0, 1]
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (self.ratio * 100.0).round() as u32;
        pct
    }

    /// Whether the change exceeds both bounds (strict comparisons)
    #[inline]
    #[must_use]
    pub fn exceeds(&self, min_lines: usize, max_ratio: f64) -> bool {
        self.total > min_lines && self.ratio > max_ratio
    }
}

/// Compare `old` and `new` split on LF
#[must_use]
pub fn line_change_ratio(old: &str, new: &str) -> LineChange {
    if old == new {
        let total = old.split('\n').count().max(new.split('\n').count());
        return LineChange {
            changed: 0,
            total,
            ratio: 0.0,
        };
    }

    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = new.split('\n').collect();

    let total = old_lines.len().max(new_lines.len());
    let shared = old_lines.len().min(new_lines.len());

    let differing = old_lines
        .iter()
        .zip(new_lines.iter())
        .take(shared)
        .filter(|(a, b)| a != b)
        .count();
    let changed = differing + (total - shared);

    #[allow(clippy::cast_precision_loss)]
    let ratio = if total == 0 {
        0.0
    } else {
        changed as f64 / total as f64
    };

    LineChange {
        changed,
        total,
        ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn numbered(n: usize) -> String {
        (0..n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn equal_inputs_are_zero() {
        let change = line_change_ratio("a\nb\n", "a\nb\n");
        assert_eq!(change.changed, 0);
        assert_eq!(change.ratio, 0.0);
    }

    #[test]
    fn empty_vs_empty_is_zero() {
        assert_eq!(line_change_ratio("", "").ratio, 0.0);
    }

    #[test]
    fn counts_positional_changes_and_tail() {
        // old: [a, b, c]  new: [a, x, c, d, e]
        let change = line_change_ratio("a\nb\nc", "a\nx\nc\nd\ne");
        assert_eq!(change.total, 5);
        assert_eq!(change.changed, 3);
        assert!((change.ratio - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn pure_append_counts_as_changed() {
        let old = numbered(10);
        let new = format!("{old}\n{}", numbered(30));
        let change = line_change_ratio(&old, &new);
        assert_eq!(change.total, 40);
        assert_eq!(change.changed, 30);
    }

    #[test]
    fn guard_boundary_is_strict() {
        let exact = LineChange {
            changed: 18,
            total: 30,
            ratio: 0.60,
        };
        assert!(!exact.exceeds(30, 0.60));

        let over = LineChange {
            changed: 19,
            total: 31,
            ratio: 19.0 / 31.0,
        };
        assert!(over.exceeds(30, 0.60));
    }

    #[test]
    fn large_rewrite_of_two_hundred_lines() {
        let old = numbered(200);
        let new_lines: Vec<String> = (0..200)
            .map(|i| if i < 140 { format!("rewritten {i}") } else { format!("line {i}") })
            .collect();
        let change = line_change_ratio(&old, &new_lines.join("\n"));
        assert_eq!(change.total, 200);
        assert_eq!(change.changed, 140);
        assert_eq!(change.percent(), 70);
        assert!(change.exceeds(30, 0.60));
    }

    proptest! {
        #[test]
        fn ratio_is_bounded(old in "[a-c\n]{0,64}", new in "[a-c\n]{0,64}") {
            let change = line_change_ratio(&old, &new);
            prop_assert!(change.ratio >= 0.0 && change.ratio <= 1.0);
            let expected_total = old.split('\n').count().max(new.split('\n').count());
            prop_assert_eq!(change.total, expected_total);
        }

        #[test]
        fn identical_inputs_never_change(text in "[a-z \n]{0,128}") {
            prop_assert_eq!(line_change_ratio(&text, &text).ratio, 0.0);
        }
    }
}
