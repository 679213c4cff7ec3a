//! Sorted-sequence joins used by the export engine.
//!
//! Both sides must be sorted ascending; each join is a single two-pointer
//! pass, O(n + m).

use chrono::NaiveDate;

/// For each target date, the index of the last event dated on or before it.
///
/// Several events on the same date resolve to the last one in `events`
/// order, so callers sort ties by precedence (e.g. by report date).
pub fn asof_indices(targets: &[NaiveDate], events: &[NaiveDate]) -> Vec<Option<usize>> {
    debug_assert!(targets.windows(2).all(|w| w[0] <= w[1]));
    debug_assert!(events.windows(2).all(|w| w[0] <= w[1]));

    let mut out = Vec::with_capacity(targets.len());
    let mut next = 0;
    let mut current = None;
    for &t in targets {
        while next < events.len() && events[next] <= t {
            current = Some(next);
            next += 1;
        }
        out.push(current);
    }
    out
}

/// For each target date, the index of the last event dated exactly on it.
pub fn exact_indices(targets: &[NaiveDate], events: &[NaiveDate]) -> Vec<Option<usize>> {
    debug_assert!(targets.windows(2).all(|w| w[0] <= w[1]));
    debug_assert!(events.windows(2).all(|w| w[0] <= w[1]));

    let mut out = Vec::with_capacity(targets.len());
    let mut next = 0;
    let mut last_le = None;
    for &t in targets {
        while next < events.len() && events[next] <= t {
            last_le = Some(next);
            next += 1;
        }
        out.push(last_le.filter(|&i| events[i] == t));
    }
    out
}

/// Forward-fill `values` (aligned with `events`) onto `targets`.
pub fn forward_fill<T: Clone>(
    targets: &[NaiveDate],
    events: &[NaiveDate],
    values: &[T],
) -> Vec<Option<T>> {
    asof_indices(targets, events)
        .into_iter()
        .map(|i| i.and_then(|i| values.get(i).cloned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn value_holds_until_next_publication() {
        let targets = [
            d(2024, 4, 24),
            d(2024, 4, 25),
            d(2024, 6, 3),
            d(2024, 7, 26),
            d(2024, 7, 27),
            d(2024, 7, 28),
            d(2024, 7, 29),
        ];
        let events = [d(2024, 4, 25), d(2024, 7, 28)];
        let filled = forward_fill(&targets, &events, &[0.12, 0.15]);
        assert_eq!(
            filled,
            vec![
                None,
                Some(0.12),
                Some(0.12),
                Some(0.12),
                Some(0.12),
                Some(0.15),
                Some(0.15)
            ]
        );
    }

    #[test]
    fn same_date_events_resolve_to_the_last() {
        let events = [d(2024, 4, 25), d(2024, 4, 25)];
        assert_eq!(asof_indices(&[d(2024, 5, 1)], &events), vec![Some(1)]);
    }

    #[test]
    fn exact_join_skips_gaps() {
        let targets = [d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)];
        let events = [d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 4)];
        assert_eq!(exact_indices(&targets, &events), vec![Some(1), None, Some(2)]);
    }

    #[test]
    fn empty_sides() {
        assert!(asof_indices(&[], &[d(2024, 1, 1)]).is_empty());
        assert_eq!(asof_indices(&[d(2024, 1, 1)], &[]), vec![None]);
    }
}
