#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::slots::{
        candidate_slots, fits, intersect, merge_intervals, subtract_busy, Interval, Slot,
    };

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 22, hour, minute, 0).unwrap()
    }

    fn span(from: (u32, u32), to: (u32, u32)) -> Interval {
        (at(from.0, from.1), at(to.0, to.1))
    }

    #[test]
    fn merge_joins_touching_and_overlapping_blocks() {
        let merged = merge_intervals(&[
            span((11, 0), (12, 0)),
            span((9, 0), (10, 0)),
            span((10, 0), (10, 30)),
            span((11, 30), (13, 0)),
            span((14, 0), (14, 0)),
        ]);
        assert_eq!(merged, vec![span((9, 0), (10, 30)), span((11, 0), (13, 0))]);
    }

    #[test]
    fn subtract_cuts_busy_blocks_out_of_open_time() {
        let free = subtract_busy(
            &[span((8, 0), (18, 0))],
            &[span((10, 0), (11, 0)), span((7, 0), (8, 30)), span((17, 30), (19, 0))],
        );
        assert_eq!(
            free,
            vec![span((8, 30), (10, 0)), span((11, 0), (17, 30))]
        );
    }

    #[test]
    fn subtract_with_full_cover_leaves_nothing() {
        let free = subtract_busy(&[span((9, 0), (12, 0))], &[span((8, 0), (13, 0))]);
        assert!(free.is_empty());
    }

    #[test]
    fn intersect_keeps_only_shared_time() {
        let shared = intersect(
            &[span((8, 0), (12, 0)), span((13, 0), (18, 0))],
            &[span((9, 0), (14, 0))],
        );
        assert_eq!(shared, vec![span((9, 0), (12, 0)), span((13, 0), (14, 0))]);
    }

    #[test]
    fn candidates_follow_the_step_grid_and_fit() {
        let slots = candidate_slots(
            &[span((8, 0), (9, 30))],
            Duration::minutes(60),
            Duration::minutes(15),
            at(0, 0),
        );
        let starts: Vec<_> = slots.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![at(8, 0), at(8, 15), at(8, 30)]);
        assert!(slots.iter().all(|(s, e)| *e - *s == Duration::minutes(60)));
    }

    #[test]
    fn candidates_skip_starts_before_now() {
        let slots = candidate_slots(
            &[span((8, 0), (10, 0))],
            Duration::minutes(30),
            Duration::minutes(15),
            at(8, 20),
        );
        assert_eq!(slots.first().map(|(s, _)| *s), Some(at(8, 30)));
    }

    #[test]
    fn zero_duration_yields_nothing() {
        let slots = candidate_slots(
            &[span((8, 0), (10, 0))],
            Duration::zero(),
            Duration::minutes(15),
            at(0, 0),
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn fits_requires_a_single_free_interval() {
        let free = vec![span((8, 0), (9, 0)), span((9, 0), (10, 0))];
        assert!(fits(&free, at(8, 0), at(9, 0)));
        // merged intervals would allow this; unmerged input does not
        assert!(!fits(&free, at(8, 30), at(9, 30)));
        assert!(!fits(&free, at(9, 0), at(9, 0)));
    }

    #[test]
    fn slot_reports_local_wall_clock() {
        let slot = Slot::new(at(7, 0), at(8, 0), chrono_tz::Europe::Zurich);
        assert_eq!(slot.start_time, "08:00");
        assert_eq!(slot.end_time, "09:00");
        assert_eq!(slot.day_of_week, 1);
    }
}
