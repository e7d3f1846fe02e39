//! Session state machine - one active workout at a time
//!
//! `SessionManager` owns the current session, both timers and the working
//! history list. Every mutation goes through `start_session`, `log_set` and
//! `end_session`; the local store is written before in-memory state changes,
//! remote mirroring is queued and never fails an operation.

mod sets;

pub use sets::{LabeledSet, SetGroup, group_sets};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::db::{
    ExerciseId, SessionChanges, SessionId, SessionStore, SetId, Settings, StoreError, TemplateId,
    WorkoutSession, WorkoutSet,
};
use crate::history;
use crate::sync::{Reconciler, RemoteError, UserId};
use crate::timer::{TimerEngine, TimerEvent};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Workout template not found: ID {0}")]
    TemplateNotFound(TemplateId),
    #[error("No active workout session")]
    NoActiveSession,
    #[error("Workout session {0} is still active, end it first")]
    SessionAlreadyActive(SessionId),
    #[error("Set {parent_set_id} is not a main set of exercise {exercise_id}")]
    InvalidParentSet {
        exercise_id: ExerciseId,
        parent_set_id: SetId,
    },
    #[error("Exercise {0} is not part of the active session")]
    UnknownExercise(ExerciseId),
    #[error("Weight must be a finite number >= 0, got {0}")]
    InvalidWeight(f64),
    #[error("Local storage failed: {0}")]
    LocalPersistence(#[from] StoreError),
    #[error("Remote sync is not configured")]
    RemoteNotConfigured,
    #[error("Remote sync failed: {0}")]
    Remote(#[from] RemoteError),
}

impl SessionError {
    /// Operation needs a different session state
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::NoActiveSession | Self::SessionAlreadyActive(_))
    }
}

/// Input for [`SessionManager::log_set`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewSet {
    pub exercise_id: ExerciseId,
    pub reps: u32,
    pub weight: f64,
    pub notes: String,
    pub parent_set_id: Option<SetId>,
    /// `None` lets the manager compare against the previous session
    pub is_personal_best: Option<bool>,
}

impl NewSet {
    pub fn main(exercise_id: ExerciseId, reps: u32, weight: f64) -> Self {
        Self {
            exercise_id,
            reps,
            weight,
            notes: String::new(),
            parent_set_id: None,
            is_personal_best: None,
        }
    }

    pub fn sub(exercise_id: ExerciseId, parent_set_id: SetId, reps: u32, weight: f64) -> Self {
        Self {
            parent_set_id: Some(parent_set_id),
            ..Self::main(exercise_id, reps, weight)
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn personal_best(mut self, is_personal_best: bool) -> Self {
        self.is_personal_best = Some(is_personal_best);
        self
    }
}

struct ActiveSession {
    id: SessionId,
    session: WorkoutSession,
    /// Most recent prior session of the same template, captured at start
    baseline: Option<WorkoutSession>,
}

pub struct SessionManager<S> {
    store: S,
    clock: Arc<dyn Clock>,
    timers: TimerEngine,
    remote: Option<Reconciler>,
    active: Option<ActiveSession>,
    history: Vec<WorkoutSession>,
    settings: Settings,
    last_set_id: SetId,
}

impl<S: SessionStore> SessionManager<S> {
    /// Load settings and history from `store`. The receiver yields timer events.
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        remote: Option<Reconciler>,
    ) -> Result<(Self, UnboundedReceiver<TimerEvent>), SessionError> {
        let settings = store.load_settings()?;
        let history = store.list_sessions()?;
        let (timers, events) = TimerEngine::new();
        let manager = Self {
            store,
            clock,
            timers,
            remote,
            active: None,
            history,
            settings,
            last_set_id: 0,
        };
        Ok((manager, events))
    }

    /// Start a session from a template.
    /// Returns the most recent completed session of that template, if any.
    pub fn start_session(
        &mut self,
        template_id: TemplateId,
        user: Option<&UserId>,
    ) -> Result<Option<WorkoutSession>, SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::SessionAlreadyActive(active.id));
        }
        let Some(template) = self.store.load_template(template_id)? else {
            warn!(template_id, "Template not found");
            return Err(SessionError::TemplateNotFound(template_id));
        };

        self.timers.stop_all();

        let previous = history::most_recent_session(&self.history, template_id).cloned();
        let now = self.clock.now();
        let mut session = WorkoutSession::from_template(template_id, &template, now);
        session.id = Some(self.next_session_id(now));

        let id = self.store.create_session(&session)?;
        session.id = Some(id);

        if let Some(user) = user {
            match &self.remote {
                Some(remote) => remote.mirror_create(user, &session),
                None => debug!(%user, "No remote configured, session kept local"),
            }
        }

        self.timers.start_session(now);
        info!(session_id = id, template_id, exercises = session.exercises.len(), "Workout session started");
        self.active = Some(ActiveSession {
            id,
            session,
            baseline: previous.clone(),
        });
        Ok(previous)
    }

    /// Append a set to the active session and drive the rest timer
    pub fn log_set(&mut self, new_set: NewSet, user: Option<&UserId>) -> Result<WorkoutSet, SessionError> {
        let now = self.clock.now();
        let active = self.active.as_ref().ok_or(SessionError::NoActiveSession)?;

        if !new_set.weight.is_finite() || new_set.weight < 0.0 {
            return Err(SessionError::InvalidWeight(new_set.weight));
        }
        let exercise_idx = active
            .session
            .exercises
            .iter()
            .position(|ex| ex.exercise_id == new_set.exercise_id)
            .ok_or(SessionError::UnknownExercise(new_set.exercise_id))?;
        let exercise = &active.session.exercises[exercise_idx];

        if let Some(parent_set_id) = new_set.parent_set_id
            && !exercise.has_main_set(parent_set_id)
        {
            return Err(SessionError::InvalidParentSet {
                exercise_id: new_set.exercise_id,
                parent_set_id,
            });
        }

        let is_main = new_set.parent_set_id.is_none();
        let is_personal_best = new_set.is_personal_best.unwrap_or_else(|| {
            is_main
                && history::is_personal_best(
                    active.baseline.as_ref(),
                    new_set.exercise_id,
                    exercise.logged_main_sets(),
                    new_set.reps,
                    new_set.weight,
                )
        });
        let session_id = active.id;
        let mut exercises = active.session.exercises.clone();

        let set = WorkoutSet {
            id: self.next_set_id(now),
            reps: new_set.reps,
            weight: new_set.weight,
            notes: new_set.notes,
            parent_set_id: new_set.parent_set_id,
            timestamp: now,
            is_personal_best,
        };
        exercises[exercise_idx].logged_sets.push(set.clone());

        self.store.update_session(
            session_id,
            &SessionChanges {
                exercises: Some(exercises.clone()),
                end_time: None,
            },
        )?;

        let Some(active) = self.active.as_mut() else {
            return Err(SessionError::NoActiveSession);
        };
        active.session.exercises = exercises;
        debug!(session_id, set_id = set.id, exercise_id = new_set.exercise_id, is_main, "Set logged");

        if let (Some(user), Some(remote)) = (user, &self.remote) {
            remote.mirror_update(user, session_id, &active.session);
        }

        if is_main {
            self.timers.start_rest(self.settings.rest_time_secs);
        }
        let planned = active.session.planned_main_sets();
        let logged = active.session.logged_main_sets();
        if logged >= planned {
            info!(session_id, logged, planned, "All planned sets done");
            self.timers.reset_rest();
        }

        Ok(set)
    }

    /// Seal the active session. Returns the sealed session, or `None` if no
    /// session was active.
    pub async fn end_session(&mut self, user: Option<&UserId>) -> Result<Option<WorkoutSession>, SessionError> {
        let Some(active) = &self.active else {
            return Ok(None);
        };
        let session_id = active.id;
        let end_time = self.clock.now();

        self.store.update_session(
            session_id,
            &SessionChanges {
                exercises: None,
                end_time: Some(end_time),
            },
        )?;

        let mut sealed = active.session.clone();
        sealed.end_time = Some(end_time);
        self.active = None;
        self.timers.stop_all();
        info!(session_id, "Workout session ended");

        let resynced = match (user, &self.remote) {
            (Some(user), Some(remote)) => {
                remote.mirror_update(user, session_id, &sealed);
                match remote.resync(user).await {
                    Ok(sessions) if sessions.iter().any(|s| s.id == Some(session_id)) => Some(sessions),
                    Ok(_) => {
                        warn!(%user, session_id, "Remote history lacks the ended session, keeping local history");
                        None
                    }
                    Err(e) => {
                        warn!(%user, error = %e, "History resync failed, keeping local history");
                        None
                    }
                }
            }
            _ => None,
        };

        match resynced {
            Some(sessions) => match self.store.replace_sessions(&sessions) {
                Ok(()) => {
                    info!(sessions = sessions.len(), "History resynced from remote");
                    self.history = sessions;
                }
                Err(e) => {
                    warn!(error = %e, "Could not store remote history");
                    self.reload_history(&sealed);
                }
            },
            None => self.reload_history(&sealed),
        }

        Ok(Some(sealed))
    }

    /// Replace local history with the user's remote history
    pub async fn pull_history(&mut self, user: &UserId) -> Result<usize, SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::SessionAlreadyActive(active.id));
        }
        let remote = self.remote.as_ref().ok_or(SessionError::RemoteNotConfigured)?;
        let sessions = remote.resync(user).await?;
        self.store.replace_sessions(&sessions)?;
        self.history = sessions;
        Ok(self.history.len())
    }

    /// Delete a template and its sessions. Ends the active session if it
    /// belongs to the template.
    pub fn remove_template(&mut self, template_id: TemplateId) -> Result<(), SessionError> {
        self.store.delete_template(template_id)?;
        self.history.retain(|s| s.template_id != template_id);
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.session.template_id == template_id)
        {
            self.active = None;
            self.timers.stop_all();
            info!(template_id, "Active session dropped with its template");
        }
        Ok(())
    }

    pub fn set_rest_time(&mut self, secs: u32) -> Result<(), SessionError> {
        let settings = Settings { rest_time_secs: secs };
        self.store.save_settings(&settings)?;
        self.settings = settings;
        Ok(())
    }

    /// Wait for queued remote writes
    pub async fn flush_remote(&self) {
        if let Some(remote) = &self.remote
            && let Err(e) = remote.flush().await
        {
            warn!(error = %e, "Remote queue not drained");
        }
    }

    pub fn current_session(&self) -> Option<&WorkoutSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Previous session the active one is compared against
    pub fn baseline(&self) -> Option<&WorkoutSession> {
        self.active.as_ref().and_then(|a| a.baseline.as_ref())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn history(&self) -> &[WorkoutSession] {
        &self.history
    }

    pub fn most_recent_session(&self, template_id: TemplateId) -> Option<&WorkoutSession> {
        history::most_recent_session(&self.history, template_id)
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Planned main sets of the active session, 0 when idle
    pub fn planned_main_sets(&self) -> usize {
        self.current_session().map_or(0, WorkoutSession::planned_main_sets)
    }

    pub fn logged_main_sets(&self) -> usize {
        self.current_session().map_or(0, WorkoutSession::logged_main_sets)
    }

    pub fn rest_remaining(&self) -> u32 {
        self.timers.rest().remaining()
    }

    pub fn is_rest_active(&self) -> bool {
        self.timers.rest().is_active()
    }

    pub fn session_elapsed(&self) -> Duration {
        self.timers.session().elapsed(self.clock.now())
    }

    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        self.timers.session().started_at()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Millisecond start time, bumped past every known session id. The same
    /// id keys the remote copy, so it must not repeat across devices.
    fn next_session_id(&self, now: DateTime<Utc>) -> SessionId {
        let floor = self.history.iter().filter_map(|s| s.id).max().unwrap_or(0);
        now.timestamp_millis().max(floor + 1)
    }

    fn next_set_id(&mut self, now: DateTime<Utc>) -> SetId {
        let floor = self
            .active
            .as_ref()
            .and_then(|a| a.session.max_set_id())
            .unwrap_or(0)
            .max(self.last_set_id);
        self.last_set_id = now.timestamp_millis().max(floor + 1);
        self.last_set_id
    }

    fn reload_history(&mut self, sealed: &WorkoutSession) {
        match self.store.list_sessions() {
            Ok(sessions) => self.history = sessions,
            Err(e) => {
                warn!(error = %e, "Could not reload history, appending ended session");
                self.history.retain(|s| s.id != sealed.id);
                self.history.push(sealed.clone());
            }
        }
    }
}
