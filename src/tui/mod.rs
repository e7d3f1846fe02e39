//! TUI module - live workout screen with ratatui

use std::collections::HashMap;
use std::io::{Stdout, stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

use crate::db::{Database, ExerciseId, SessionExercise, WorkoutSession};
use crate::history;
use crate::session::{NewSet, SessionManager, group_sets};
use crate::sync::UserId;
use crate::timer::{TimerEvent, format_elapsed};

type Tui = Terminal<CrosstermBackend<Stdout>>;

const FRAME: Duration = Duration::from_millis(50);

/// Parse `reps weight [notes...]`
pub fn parse_set_input(input: &str) -> Option<(u32, f64, String)> {
    let mut parts = input.split_whitespace();
    let reps = parts.next()?.parse().ok()?;
    let weight = parts.next()?.replace(',', ".").parse().ok()?;
    let notes = parts.collect::<Vec<_>>().join(" ");
    Some((reps, weight, notes))
}

fn format_weight(weight: f64) -> String {
    if weight.fract() == 0.0 {
        format!("{:.0}", weight)
    } else {
        format!("{}", weight)
    }
}

/// One line per exercise: grouped sets, e.g. `Set 1 8x60* (1.a 3x40)`
fn sets_summary(exercise: &SessionExercise) -> String {
    group_sets(&exercise.logged_sets)
        .iter()
        .map(|group| {
            let mut text = format!(
                "{} {}x{}{}",
                group.label,
                group.set.reps,
                format_weight(group.set.weight),
                if group.set.is_personal_best { "*" } else { "" }
            );
            if !group.sub_sets.is_empty() {
                let subs: Vec<String> = group
                    .sub_sets
                    .iter()
                    .map(|s| format!("{} {}x{}", s.label, s.set.reps, format_weight(s.set.weight)))
                    .collect();
                text.push_str(&format!(" ({})", subs.join(", ")));
            }
            text
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// App state for the live workout
pub struct WorkoutApp {
    manager: SessionManager<Database>,
    events: UnboundedReceiver<TimerEvent>,
    user: Option<UserId>,
    exercise_names: HashMap<ExerciseId, String>,
    template_name: String,
    selected: usize,
    input: String,
    sub_set_mode: bool,
    status: String,
    should_quit: bool,
}

impl WorkoutApp {
    /// `manager` must already hold the active session
    pub fn new(
        manager: SessionManager<Database>,
        events: UnboundedReceiver<TimerEvent>,
        user: Option<UserId>,
        template_name: String,
    ) -> Result<Self> {
        let exercise_names = manager
            .store()
            .get_exercises()?
            .into_iter()
            .filter_map(|ex| ex.id.map(|id| (id, ex.name)))
            .collect();
        Ok(Self {
            manager,
            events,
            user,
            exercise_names,
            template_name,
            selected: 0,
            input: String::new(),
            sub_set_mode: false,
            status: "Type `reps weight [notes]` and press Enter".to_string(),
            should_quit: false,
        })
    }

    /// Run until the workout is ended. Returns the sealed session.
    pub async fn run(mut self) -> Result<(SessionManager<Database>, Option<WorkoutSession>)> {
        let mut terminal = init_terminal()?;
        let result = self.event_loop(&mut terminal).await;
        restore_terminal()?;
        let sealed = result?;
        Ok((self.manager, sealed))
    }

    async fn event_loop(&mut self, terminal: &mut Tui) -> Result<Option<WorkoutSession>> {
        let looped = self.drive(terminal).await;
        self.finish(looped).await
    }

    async fn drive(&mut self, terminal: &mut Tui) -> Result<()> {
        while !self.should_quit {
            self.drain_timer_events();
            terminal.draw(|frame| self.render(frame))?;
            self.handle_events()?;
            tokio::time::sleep(FRAME).await;
        }
        Ok(())
    }

    /// Seal the session however the loop ended; a loop error wins
    async fn finish(&mut self, looped: Result<()>) -> Result<Option<WorkoutSession>> {
        let sealed = self.manager.end_session(self.user.as_ref()).await;
        looped?;
        Ok(sealed?)
    }

    fn drain_timer_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(TimerEvent::RestFinished) => self.status = "Rest over - next set!".to_string(),
                Ok(TimerEvent::RestTick { .. } | TimerEvent::SessionTick) => {}
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn exercise_name(&self, id: ExerciseId) -> String {
        self.exercise_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("#{}", id))
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .split(area);

        // Header
        let elapsed = self.manager.session_elapsed().num_seconds().max(0) as u64;
        let rest = if self.manager.is_rest_active() {
            format!("Rest {}", format_elapsed(u64::from(self.manager.rest_remaining())))
        } else {
            "Rest -".to_string()
        };
        let header = Paragraph::new(format!(
            "{}  |  {}  |  {}",
            self.template_name,
            format_elapsed(elapsed),
            rest
        ))
        .style(Style::default().fg(Color::Cyan).bold())
        .block(Block::default().borders(Borders::ALL));
        frame.render_widget(header, chunks[0]);

        // Exercise table
        let session = self.manager.current_session();
        let baseline = self.manager.baseline();
        let rows: Vec<Row> = session
            .map(|s| s.exercises.as_slice())
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(idx, ex)| {
                let logged = ex.logged_main_sets();
                let last_time = history::prefill(baseline, ex.exercise_id, ex.planned_sets)
                    .get(logged)
                    .copied()
                    .flatten()
                    .map(|(reps, weight)| format!("{}x{}", reps, format_weight(weight)))
                    .unwrap_or_else(|| "-".to_string());
                let style = if idx == self.selected {
                    Style::default().fg(Color::Yellow).bold()
                } else {
                    Style::default()
                };
                Row::new(vec![
                    Cell::from(self.exercise_name(ex.exercise_id)),
                    Cell::from(format!("{}/{}", logged, ex.planned_sets)),
                    Cell::from(last_time),
                    Cell::from(sets_summary(ex)),
                ])
                .style(style)
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(20),
                Constraint::Length(7),
                Constraint::Length(10),
                Constraint::Min(20),
            ],
        )
        .header(Row::new(vec!["Exercise", "Sets", "Last time", "Logged"]).style(Style::default().bold()))
        .block(Block::default().borders(Borders::ALL).title("Workout"));
        frame.render_widget(table, chunks[1]);

        // Input
        let mode = if self.sub_set_mode { "sub-set" } else { "set" };
        let input = Paragraph::new(self.input.as_str())
            .block(Block::default().borders(Borders::ALL).title(format!("New {}", mode)));
        frame.render_widget(input, chunks[2]);

        // Footer
        let footer = Paragraph::new(format!(
            "{}   [Up/Down: exercise | Tab: set/sub-set | Enter: log | Esc: finish]",
            self.status
        ))
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL));
        frame.render_widget(footer, chunks[3]);
    }

    fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::ZERO)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Esc => self.should_quit = true,
                KeyCode::Enter => self.submit(),
                KeyCode::Tab => self.sub_set_mode = !self.sub_set_mode,
                KeyCode::Up => self.selected = self.selected.saturating_sub(1),
                KeyCode::Down => {
                    let count = self.manager.current_session().map_or(0, |s| s.exercises.len());
                    if self.selected + 1 < count {
                        self.selected += 1;
                    }
                }
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Char(c) => self.input.push(c),
                _ => {}
            }
        }
        Ok(())
    }

    fn submit(&mut self) {
        let Some((reps, weight, notes)) = parse_set_input(&self.input) else {
            self.status = "Expected: reps weight [notes]".to_string();
            return;
        };
        let Some(exercise) = self
            .manager
            .current_session()
            .and_then(|s| s.exercises.get(self.selected))
        else {
            return;
        };
        let exercise_id = exercise.exercise_id;

        let new_set = if self.sub_set_mode {
            let Some(parent) = exercise.main_sets().last().map(|s| s.id) else {
                self.status = "Log a main set first".to_string();
                return;
            };
            NewSet::sub(exercise_id, parent, reps, weight)
        } else {
            NewSet::main(exercise_id, reps, weight)
        };

        match self.manager.log_set(new_set.with_notes(notes), self.user.as_ref()) {
            Ok(set) => {
                self.status = format!(
                    "Logged {} {}x{}{}",
                    self.exercise_name(exercise_id),
                    set.reps,
                    format_weight(set.weight),
                    if set.is_personal_best { " - personal best!" } else { "" }
                );
                self.input.clear();
            }
            Err(e) => self.status = e.to_string(),
        }
    }
}

fn init_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    Ok(terminal)
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}
