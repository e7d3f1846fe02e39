//! Record types shared by the local store, the remote mirror and the session core

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type ExerciseId = i64;
pub type TemplateId = i64;
pub type SessionId = i64;
pub type SetId = i64;

/// Rest duration used when no settings record exists yet
pub const DEFAULT_REST_TIME_SECS: u32 = 60;

/// User-defined exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: Option<ExerciseId>,
    pub name: String,
    pub category: String,
}

/// One exercise slot in a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateExercise {
    pub exercise_id: ExerciseId,
    /// Target count of main sets, at least 1
    pub planned_sets: u32,
}

/// Workout template - an ordered plan of exercises
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutTemplate {
    pub id: Option<TemplateId>,
    pub name: String,
    pub date: NaiveDate,
    pub exercises: Vec<TemplateExercise>,
}

/// A logged set. `parent_set_id == None` marks a main set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSet {
    pub id: SetId,
    pub reps: u32,
    pub weight: f64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub parent_set_id: Option<SetId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_personal_best: bool,
}

impl WorkoutSet {
    pub fn is_main(&self) -> bool {
        self.parent_set_id.is_none()
    }
}

/// Per-exercise progress inside a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExercise {
    pub exercise_id: ExerciseId,
    pub planned_sets: u32,
    #[serde(default)]
    pub logged_sets: Vec<WorkoutSet>,
}

impl SessionExercise {
    /// Main sets in timestamp order
    pub fn main_sets(&self) -> Vec<&WorkoutSet> {
        let mut sets: Vec<_> = self.logged_sets.iter().filter(|s| s.is_main()).collect();
        sets.sort_by_key(|s| s.timestamp);
        sets
    }

    pub fn logged_main_sets(&self) -> usize {
        self.logged_sets.iter().filter(|s| s.is_main()).count()
    }

    pub fn has_main_set(&self, id: SetId) -> bool {
        self.logged_sets.iter().any(|s| s.id == id && s.is_main())
    }
}

/// One performed instance of a template. Active while `end_time` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSession {
    pub id: Option<SessionId>,
    pub template_id: TemplateId,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub exercises: Vec<SessionExercise>,
}

impl WorkoutSession {
    /// Build an unsaved session with one empty entry per template exercise
    pub fn from_template(template_id: TemplateId, template: &WorkoutTemplate, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            template_id,
            date: now.date_naive(),
            start_time: now,
            end_time: None,
            exercises: template
                .exercises
                .iter()
                .map(|ex| SessionExercise {
                    exercise_id: ex.exercise_id,
                    planned_sets: ex.planned_sets,
                    logged_sets: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn exercise(&self, exercise_id: ExerciseId) -> Option<&SessionExercise> {
        self.exercises.iter().find(|ex| ex.exercise_id == exercise_id)
    }

    /// Total planned main sets across all exercises
    pub fn planned_main_sets(&self) -> usize {
        self.exercises.iter().map(|ex| ex.planned_sets as usize).sum()
    }

    /// Total logged main sets across all exercises (sub-sets excluded)
    pub fn logged_main_sets(&self) -> usize {
        self.exercises.iter().map(|ex| ex.logged_main_sets()).sum()
    }

    pub fn has_main_set(&self) -> bool {
        self.logged_main_sets() > 0
    }

    /// Largest set id used anywhere in this session
    pub fn max_set_id(&self) -> Option<SetId> {
        self.exercises
            .iter()
            .flat_map(|ex| ex.logged_sets.iter().map(|s| s.id))
            .max()
    }
}

/// Partial update of a stored session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionChanges {
    pub exercises: Option<Vec<SessionExercise>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Persisted user settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub rest_time_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rest_time_secs: DEFAULT_REST_TIME_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn set(id: SetId, parent: Option<SetId>, secs: i64) -> WorkoutSet {
        WorkoutSet {
            id,
            reps: 5,
            weight: 50.0,
            notes: String::new(),
            parent_set_id: parent,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs),
            is_personal_best: false,
        }
    }

    #[test]
    fn test_from_template_copies_plan() {
        let template = WorkoutTemplate {
            id: Some(1),
            name: "Push".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            exercises: vec![
                TemplateExercise { exercise_id: 10, planned_sets: 3 },
                TemplateExercise { exercise_id: 11, planned_sets: 2 },
            ],
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 18, 30, 0).unwrap();
        let session = WorkoutSession::from_template(1, &template, now);

        assert_eq!(session.exercises.len(), 2);
        assert!(session.exercises.iter().all(|ex| ex.logged_sets.is_empty()));
        assert_eq!(session.exercises[0].planned_sets, 3);
        assert_eq!(session.exercises[1].planned_sets, 2);
        assert_eq!(session.planned_main_sets(), 5);
        assert_eq!(session.date, now.date_naive());
        assert!(!session.is_sealed());
    }

    #[test]
    fn test_main_sets_exclude_sub_sets() {
        let ex = SessionExercise {
            exercise_id: 10,
            planned_sets: 2,
            logged_sets: vec![set(2, None, 30), set(3, Some(2), 40), set(1, None, 0)],
        };
        let mains: Vec<SetId> = ex.main_sets().iter().map(|s| s.id).collect();
        assert_eq!(mains, vec![1, 2]);
        assert_eq!(ex.logged_main_sets(), 2);
        assert!(ex.has_main_set(2));
        assert!(!ex.has_main_set(3));
    }

    #[test]
    fn test_null_fields_serialize_explicitly() {
        let json = serde_json::to_value(set(1, None, 0)).unwrap();
        assert!(json.get("parentSetId").unwrap().is_null());

        let session = WorkoutSession {
            id: Some(7),
            template_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            start_time: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            end_time: None,
            exercises: vec![],
        };
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("endTime").unwrap().is_null());
        let back: WorkoutSession = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_absent_parent_reads_as_main_set() {
        let json = r#"{"id":5,"reps":8,"weight":20.0,"timestamp":"2024-03-01T10:00:00Z"}"#;
        let s: WorkoutSet = serde_json::from_str(json).unwrap();
        assert!(s.is_main());
        assert_eq!(s.notes, "");
        assert!(!s.is_personal_best);
    }
}
