//! History queries - baseline session lookup and personal best detection

use crate::db::{ExerciseId, SessionExercise, TemplateId, WorkoutSession};

/// Most recent sealed session of `template_id` that has at least one main set.
/// Ties on `end_time` go to the later entry in `history`.
pub fn most_recent_session(history: &[WorkoutSession], template_id: TemplateId) -> Option<&WorkoutSession> {
    history
        .iter()
        .filter(|s| s.template_id == template_id)
        .filter(|s| s.is_sealed() && s.has_main_set())
        .max_by_key(|s| s.end_time)
}

/// Whether a main set at `planned_index` beats the same-index main set of
/// `previous`. No prior set at that index counts as a personal best.
pub fn is_personal_best(
    previous: Option<&WorkoutSession>,
    exercise_id: ExerciseId,
    planned_index: usize,
    reps: u32,
    weight: f64,
) -> bool {
    let prior = previous
        .and_then(|s| s.exercise(exercise_id))
        .and_then(|ex| ex.main_sets().get(planned_index).copied());

    match prior {
        None => true,
        Some(prior) => reps > prior.reps || weight > prior.weight,
    }
}

/// Expected `(reps, weight)` per planned set, taken from `previous`
pub fn prefill(
    previous: Option<&WorkoutSession>,
    exercise_id: ExerciseId,
    planned_sets: u32,
) -> Vec<Option<(u32, f64)>> {
    let mains = previous
        .and_then(|s| s.exercise(exercise_id))
        .map(|ex| ex.main_sets())
        .unwrap_or_default();

    (0..planned_sets as usize)
        .map(|idx| mains.get(idx).map(|s| (s.reps, s.weight)))
        .collect()
}

/// Every session that logged sets for `exercise_id`, oldest first,
/// paired with that exercise's entry
pub fn exercise_history(history: &[WorkoutSession], exercise_id: ExerciseId) -> Vec<(&WorkoutSession, &SessionExercise)> {
    let mut entries: Vec<_> = history
        .iter()
        .filter_map(|s| s.exercise(exercise_id).map(|ex| (s, ex)))
        .filter(|(_, ex)| !ex.logged_sets.is_empty())
        .collect();
    entries.sort_by_key(|(s, _)| s.start_time);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SessionExercise, WorkoutSet};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn main_set(id: i64, reps: u32, weight: f64, minute: i64) -> WorkoutSet {
        WorkoutSet {
            id,
            reps,
            weight,
            notes: String::new(),
            parent_set_id: None,
            timestamp: at(minute),
            is_personal_best: false,
        }
    }

    fn session(id: i64, template_id: TemplateId, end: Option<i64>, sets: Vec<WorkoutSet>) -> WorkoutSession {
        WorkoutSession {
            id: Some(id),
            template_id,
            date: at(0).date_naive(),
            start_time: at(0),
            end_time: end.map(at),
            exercises: vec![SessionExercise {
                exercise_id: 10,
                planned_sets: 3,
                logged_sets: sets,
            }],
        }
    }

    #[test]
    fn test_no_sessions_returns_none() {
        assert!(most_recent_session(&[], 1).is_none());
    }

    #[test]
    fn test_unsealed_and_empty_sessions_skipped() {
        let mut sub_only = main_set(2, 5, 10.0, 1);
        sub_only.parent_set_id = Some(99);
        let history = vec![
            session(1, 1, None, vec![main_set(1, 5, 50.0, 1)]),
            session(2, 1, Some(30), vec![sub_only]),
            session(3, 1, Some(40), vec![]),
            session(4, 2, Some(50), vec![main_set(3, 5, 50.0, 1)]),
        ];
        assert!(most_recent_session(&history, 1).is_none());
    }

    #[test]
    fn test_greatest_end_time_wins() {
        let history = vec![
            session(1, 1, Some(90), vec![main_set(1, 5, 50.0, 1)]),
            session(2, 1, Some(30), vec![main_set(2, 5, 50.0, 1)]),
            session(3, 1, Some(60), vec![main_set(3, 5, 50.0, 1)]),
        ];
        assert_eq!(most_recent_session(&history, 1).unwrap().id, Some(1));
    }

    #[test]
    fn test_personal_best_rules() {
        let prev = session(1, 1, Some(60), vec![main_set(1, 8, 60.0, 1), main_set(2, 6, 70.0, 5)]);

        // no history at all
        assert!(is_personal_best(None, 10, 0, 1, 1.0));
        // equal on both counts
        assert!(!is_personal_best(Some(&prev), 10, 0, 8, 60.0));
        // more reps, less weight
        assert!(is_personal_best(Some(&prev), 10, 0, 9, 40.0));
        // more weight, fewer reps
        assert!(is_personal_best(Some(&prev), 10, 1, 1, 72.5));
        // index beyond previous main sets
        assert!(is_personal_best(Some(&prev), 10, 2, 1, 1.0));
        // exercise absent from previous session
        assert!(is_personal_best(Some(&prev), 11, 0, 1, 1.0));
    }

    #[test]
    fn test_personal_best_uses_timestamp_order() {
        // stored out of order; index 0 is the earlier set
        let prev = session(1, 1, Some(60), vec![main_set(2, 12, 40.0, 9), main_set(1, 5, 80.0, 2)]);
        assert!(!is_personal_best(Some(&prev), 10, 0, 5, 80.0));
        assert!(is_personal_best(Some(&prev), 10, 1, 5, 80.0));
    }

    #[test]
    fn test_exercise_history() {
        let mut later = session(1, 1, Some(90), vec![main_set(1, 8, 60.0, 61)]);
        later.start_time = at(60);
        let history = vec![
            later,
            session(2, 2, Some(30), vec![main_set(2, 5, 50.0, 1)]),
            // planned but nothing logged
            session(3, 1, Some(40), vec![]),
        ];

        let entries = exercise_history(&history, 10);
        let ids: Vec<_> = entries.iter().map(|(s, _)| s.id).collect();
        assert_eq!(ids, vec![Some(2), Some(1)]);
        assert_eq!(entries[1].1.logged_sets[0].reps, 8);
        assert!(exercise_history(&history, 11).is_empty());
    }

    #[test]
    fn test_prefill() {
        let prev = session(1, 1, Some(60), vec![main_set(1, 8, 60.0, 1), main_set(2, 6, 70.0, 5)]);
        let expected = prefill(Some(&prev), 10, 3);
        assert_eq!(expected, vec![Some((8, 60.0)), Some((6, 70.0)), None]);
        assert_eq!(prefill(None, 10, 2), vec![None, None]);
    }
}
