//! Grouping and labelling of logged sets: `Set 1`, `1.a`, `1.b`, `Set 2`, ...

use crate::db::WorkoutSet;

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSet<'a> {
    pub label: String,
    pub set: &'a WorkoutSet,
}

/// A main set together with its sub-sets
#[derive(Debug, Clone, PartialEq)]
pub struct SetGroup<'a> {
    pub label: String,
    pub set: &'a WorkoutSet,
    pub sub_sets: Vec<LabeledSet<'a>>,
}

/// Main sets in timestamp order, each with its own sub-sets in timestamp order.
/// Sub-sets whose parent is missing are left out.
pub fn group_sets(sets: &[WorkoutSet]) -> Vec<SetGroup<'_>> {
    let mut mains: Vec<&WorkoutSet> = sets.iter().filter(|s| s.is_main()).collect();
    mains.sort_by_key(|s| s.timestamp);

    mains
        .into_iter()
        .enumerate()
        .map(|(main_idx, main)| {
            let mut subs: Vec<&WorkoutSet> = sets
                .iter()
                .filter(|s| s.parent_set_id == Some(main.id))
                .collect();
            subs.sort_by_key(|s| s.timestamp);

            SetGroup {
                label: format!("Set {}", main_idx + 1),
                set: main,
                sub_sets: subs
                    .into_iter()
                    .enumerate()
                    .map(|(sub_idx, set)| LabeledSet {
                        label: sub_label(main_idx + 1, sub_idx),
                        set,
                    })
                    .collect(),
            }
        })
        .collect()
}

fn sub_label(main_number: usize, sub_idx: usize) -> String {
    match u8::try_from(sub_idx) {
        Ok(idx) if idx < 26 => format!("{}.{}", main_number, (b'a' + idx) as char),
        _ => format!("{}.{}", main_number, sub_idx + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn set(id: i64, parent: Option<i64>, secs: i64) -> WorkoutSet {
        WorkoutSet {
            id,
            reps: 1,
            weight: 1.0,
            notes: String::new(),
            parent_set_id: parent,
            timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap() + Duration::seconds(secs),
            is_personal_best: false,
        }
    }

    #[test]
    fn test_labels() {
        let sets = vec![
            set(1, None, 0),
            set(2, None, 100),
            set(3, Some(1), 50),
            set(4, Some(1), 40),
            set(5, Some(2), 120),
        ];
        let groups = group_sets(&sets);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "Set 1");
        let first: Vec<(&str, i64)> = groups[0]
            .sub_sets
            .iter()
            .map(|s| (s.label.as_str(), s.set.id))
            .collect();
        assert_eq!(first, vec![("1.a", 4), ("1.b", 3)]);
        assert_eq!(groups[1].label, "Set 2");
        assert_eq!(groups[1].sub_sets[0].label, "2.a");
    }

    #[test]
    fn test_orphans_skipped() {
        let sets = vec![set(1, None, 0), set(2, Some(99), 10)];
        let groups = group_sets(&sets);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].sub_sets.is_empty());
    }

    #[test]
    fn test_many_sub_sets() {
        let mut sets = vec![set(1, None, 0)];
        sets.extend((0..28).map(|i| set(100 + i, Some(1), 1 + i)));
        let groups = group_sets(&sets);
        assert_eq!(groups[0].sub_sets[25].label, "1.z");
        assert_eq!(groups[0].sub_sets[26].label, "1.27");
    }
}
