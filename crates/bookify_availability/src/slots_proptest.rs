#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use crate::slots::{candidate_slots, merge_intervals, subtract_busy, Interval};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
    }

    // (offset, length) in minutes from midnight
    fn intervals(max: usize) -> impl Strategy<Value = Vec<Interval>> {
        prop::collection::vec((0i64..1440, 1i64..240), 0..max).prop_map(|raw| {
            raw.into_iter()
                .map(|(offset, len)| {
                    let start = base() + Duration::minutes(offset);
                    (start, start + Duration::minutes(len))
                })
                .collect()
        })
    }

    fn overlaps(a: &Interval, b: &Interval) -> bool {
        a.0 < b.1 && b.0 < a.1
    }

    proptest! {
        #[test]
        fn free_time_never_overlaps_busy_time(
            open in intervals(4),
            busy in intervals(8),
        ) {
            let free = subtract_busy(&open, &busy);
            for f in &free {
                prop_assert!(f.0 < f.1);
                for b in &busy {
                    prop_assert!(!overlaps(f, b), "free {:?} overlaps busy {:?}", f, b);
                }
            }
        }

        #[test]
        fn free_time_stays_inside_open_time(
            open in intervals(4),
            busy in intervals(8),
        ) {
            let open_merged = merge_intervals(&open);
            for f in subtract_busy(&open, &busy) {
                prop_assert!(open_merged.iter().any(|o| o.0 <= f.0 && f.1 <= o.1));
            }
        }

        #[test]
        fn candidates_fit_their_free_interval_and_respect_now(
            open in intervals(4),
            busy in intervals(6),
            duration in 15i64..180,
            now_offset in 0i64..1440,
        ) {
            let free = subtract_busy(&open, &busy);
            let now = base() + Duration::minutes(now_offset);
            let duration = Duration::minutes(duration);

            for (start, end) in candidate_slots(&free, duration, Duration::minutes(15), now) {
                prop_assert!(start >= now);
                prop_assert_eq!(end - start, duration);
                prop_assert!(free.iter().any(|f| f.0 <= start && end <= f.1));
                prop_assert!(!busy.iter().any(|b| overlaps(&(start, end), b)));
            }
        }
    }
}
