//! Pure interval and ease arithmetic. No I/O, no clock, no database: every
//! function here takes the values it needs and returns a result, so the
//! numeric contract can be tested without a running scheduler.

use crate::model::GroupConfig;

pub const MIN_FACTOR: i64 = 1300;

/// `delayForGrade`: the step delay, in seconds, for the current position in
/// `delays`. Clamped to the last step once `grade` runs past the end.
pub fn delay_for_grade(delays: &[i64], grade: i64) -> i64 {
    if delays.is_empty() {
        return 0;
    }
    let idx = grade.max(0) as usize;
    let idx = idx.min(delays.len() - 1);
    delays[idx] * 60
}

/// The ideal next review interval in days, before sibling fuzzing.
/// `late` is `max(0, today - due)`, `ivl`/`factor` are the card's current
/// values. Integer truncation of `late/4` and `late/2` happens before the
/// multiplication, matching the reference implementation's behavior.
pub fn next_review_interval(ivl: i64, factor: i64, late: i64, ease: u8, conf: &GroupConfig) -> i64 {
    let fct = factor as f64 / 1000.0;
    let late = late.max(0);
    #[allow(clippy::cast_possible_truncation)]
    let raw = match ease {
        2 => ((ivl + late / 4) as f64 * 1.2) as i64,
        3 => ((ivl + late / 2) as f64 * fct) as i64,
        4 => ((ivl + late) as f64 * fct * conf.rev_ease4) as i64,
        _ => ivl,
    };
    let min_growth = ivl + if ease == 4 { 2 } else { 1 };
    raw.max(min_growth)
}

pub fn next_ease_factor(factor: i64, ease: u8) -> i64 {
    let delta = match ease {
        2 => -150,
        4 => 150,
        _ => 0,
    };
    (factor + delta).max(MIN_FACTOR)
}

/// Lapse interval and ease update (`_rescheduleLapse`/`_nextLapseIvl`).
/// Returns `(new_ivl, new_factor)`.
pub fn lapse_interval(ivl: i64, factor: i64, lapse_mult: f64) -> (i64, i64) {
    #[allow(clippy::cast_possible_truncation)]
    let new_ivl = ((ivl as f64 * lapse_mult) as i64 + 1).max(1);
    let new_factor = (factor - 200).max(MIN_FACTOR);
    (new_ivl, new_factor)
}

/// Graduating interval for a card leaving the learning queue.
pub fn graduating_interval(conf: &GroupConfig, early: bool, cycles: i64) -> i64 {
    if !early {
        conf.new_ints[0]
    } else if cycles > 0 {
        conf.new_ints[2]
    } else {
        conf.new_ints[1]
    }
}

/// Sibling spacing adjustment (`_adjRevIvl`). Given an ideal interval `ivl`
/// for a card due on `today`, and the due-days of its review-queue siblings,
/// returns an adjusted interval that avoids colliding with a sibling's due
/// day, searching outward by at most `leeway` days and preferring earlier
/// dates over later ones.
pub fn adjust_for_siblings(
    today: i64,
    ivl: i64,
    sibling_dues: &[i64],
    min_space: i64,
    fuzz: f64,
) -> i64 {
    let ideal_due = today + ivl;
    if !sibling_dues.contains(&ideal_due) {
        return ivl;
    }
    #[allow(clippy::cast_possible_truncation)]
    let fuzzed = (ivl as f64 * fuzz) as i64;
    let leeway = min_space.max(fuzzed);
    if leeway == 0 {
        return ivl;
    }
    for d in 1..=leeway {
        for fudge in [-d, d] {
            let candidate_due = ideal_due + fudge;
            let candidate_ivl = ivl + fudge;
            if candidate_due >= today + 1
                && candidate_ivl >= 1
                && !sibling_dues.contains(&candidate_due)
            {
                return candidate_ivl;
            }
        }
    }
    ivl
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> GroupConfig {
        GroupConfig::default()
    }

    #[test]
    fn delay_for_grade_clamps_to_last_step() {
        let delays = vec![1, 10, 20];
        assert_eq!(delay_for_grade(&delays, 0), 60);
        assert_eq!(delay_for_grade(&delays, 2), 1200);
        assert_eq!(delay_for_grade(&delays, 10), 1200);
    }

    #[test]
    fn next_review_interval_good_uses_factor() {
        let c = conf();
        let result = next_review_interval(20, 2500, 0, 3, &c);
        assert_eq!(result, 50);
    }

    #[test]
    fn next_review_interval_never_shrinks() {
        let c = conf();
        let result = next_review_interval(20, 1300, 0, 2, &c);
        assert!(result >= 21);
    }

    #[test]
    fn next_review_interval_easy_grows_more_than_good() {
        let c = conf();
        let good = next_review_interval(20, 2500, 0, 3, &c);
        let easy = next_review_interval(20, 2500, 0, 4, &c);
        assert!(easy > good);
    }

    #[test]
    fn ease_factor_floors_at_minimum() {
        assert_eq!(next_ease_factor(1300, 2), MIN_FACTOR);
        assert_eq!(next_ease_factor(1400, 2), MIN_FACTOR);
    }

    #[test]
    fn lapse_interval_applies_multiplier_and_floors() {
        let (ivl, factor) = lapse_interval(20, 2500, 0.5);
        assert_eq!(ivl, 11);
        assert_eq!(factor, 2300);

        let (ivl, _) = lapse_interval(1, 2500, 0.0);
        assert_eq!(ivl, 1);
    }

    #[test]
    fn graduating_interval_picks_bonus_on_first_early_pass() {
        let c = conf();
        assert_eq!(graduating_interval(&c, false, 0), c.new_ints[0]);
        assert_eq!(graduating_interval(&c, true, 0), c.new_ints[1]);
        assert_eq!(graduating_interval(&c, true, 1), c.new_ints[2]);
    }

    #[test]
    fn sibling_adjustment_is_noop_without_collision() {
        let result = adjust_for_siblings(0, 10, &[20, 30], 1, 0.05);
        assert_eq!(result, 10);
    }

    #[test]
    fn sibling_adjustment_prefers_earlier_slot() {
        // ideal due = 10; leeway = max(1, floor(10*0.05)) = 1
        let result = adjust_for_siblings(0, 10, &[10], 1, 0.05);
        assert_eq!(result, 9);
    }

    #[test]
    fn sibling_adjustment_gives_up_beyond_leeway() {
        let siblings: Vec<i64> = (8..=12).collect();
        let result = adjust_for_siblings(0, 10, &siblings, 1, 0.05);
        assert_eq!(result, 10);
    }

    #[test]
    fn sibling_adjustment_leaves_collision_unresolved_when_leeway_is_zero() {
        // min_space=0 and an ivl/fuzz small enough to truncate to 0 leaves no
        // room to search for an alternate due day; the collision stands.
        let result = adjust_for_siblings(0, 10, &[10], 0, 0.01);
        assert_eq!(result, 10);
    }
}
