//! fitnotes - Strength workout tracker

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};

use fitnotes::clock::SystemClock;
use fitnotes::db::{Database, Exercise, TemplateExercise, WorkoutSession, WorkoutTemplate};
use fitnotes::history;
use fitnotes::session::SessionManager;
use fitnotes::sync::{HttpRemote, Reconciler, UserId};
use fitnotes::timer::format_elapsed;
use fitnotes::tui::WorkoutApp;

#[derive(Parser)]
#[command(name = "fitnotes")]
#[command(author, version, about = "Strength workout tracker")]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = "FITNOTES_DB", default_value = "fitnotes.db")]
    db: String,

    /// User id for remote sync
    #[arg(long, global = true, env = "FITNOTES_USER")]
    user: Option<String>,

    /// Base URL of the remote workout store
    #[arg(long, global = true, env = "FITNOTES_REMOTE_URL")]
    remote_url: Option<String>,

    /// Seconds to wait for the remote when resyncing
    #[arg(long, global = true, env = "FITNOTES_REMOTE_TIMEOUT", default_value = "10")]
    remote_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage exercises
    Exercise {
        #[command(subcommand)]
        action: ExerciseAction,
    },

    /// Manage workout templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Start a live workout from a template
    Workout {
        /// Template id
        template: i64,
    },

    /// List recorded sessions
    History {
        /// Only sessions of this template
        #[arg(short, long)]
        template: Option<i64>,
    },

    /// Show the most recent completed session of a template
    Last {
        /// Template id
        template: i64,
    },

    /// Change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Replace local history with the remote copy
    Sync,
}

#[derive(Subcommand)]
enum ExerciseAction {
    /// Add an exercise
    Add {
        name: String,

        /// Category (e.g., "chest", "legs")
        #[arg(short, long, default_value = "general")]
        category: String,
    },
    /// List exercises
    List {
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Remove an exercise
    Rm { id: i64 },
    /// Every logged session of an exercise
    History { id: i64 },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Add a template, exercises given as `EXERCISE_ID:SETS`
    Add {
        name: String,

        #[arg(required = true, value_parser = parse_plan_entry)]
        exercises: Vec<TemplateExercise>,
    },
    /// List templates
    List,
    /// Remove a template and its sessions
    Rm { id: i64 },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Rest time between sets, in seconds
    Rest { secs: u32 },
}

fn parse_plan_entry(s: &str) -> Result<TemplateExercise, String> {
    let (id, sets) = s
        .split_once(':')
        .ok_or_else(|| format!("expected EXERCISE_ID:SETS, got `{}`", s))?;
    let exercise_id = id.parse().map_err(|_| format!("bad exercise id `{}`", id))?;
    let planned_sets = sets.parse().map_err(|_| format!("bad set count `{}`", sets))?;
    Ok(TemplateExercise { exercise_id, planned_sets })
}

impl Cli {
    fn user(&self) -> Option<UserId> {
        self.user.as_deref().map(UserId::new)
    }

    /// Remote mirror, if a URL is configured. Needs the tokio runtime.
    fn reconciler(&self) -> Result<Option<Reconciler>> {
        let Some(url) = &self.remote_url else {
            return Ok(None);
        };
        let timeout = Duration::from_secs(self.remote_timeout);
        let remote = HttpRemote::new(url.as_str(), timeout).context("Failed to build HTTP client")?;
        Ok(Some(Reconciler::spawn(remote, timeout)))
    }
}

/// Logs go to stderr. During a live workout they are only enabled when
/// RUST_LOG is set, so they don't draw over the screen.
fn init_tracing(live_screen: bool) {
    if live_screen && std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fitnotes=info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_session(session: &WorkoutSession, names: &dyn Fn(i64) -> String) {
    let duration = session
        .end_time
        .map(|end| format_elapsed((end - session.start_time).num_seconds().max(0) as u64))
        .unwrap_or_else(|| "active".to_string());
    println!(
        "#{} | {} | template {} | {} | {}/{} sets",
        session.id.unwrap_or_default(),
        session.start_time.format("%Y-%m-%d %H:%M"),
        session.template_id,
        duration,
        session.logged_main_sets(),
        session.planned_main_sets()
    );
    for ex in &session.exercises {
        let sets: Vec<String> = ex
            .main_sets()
            .iter()
            .map(|s| format!("{}x{}{}", s.reps, s.weight, if s.is_personal_best { "*" } else { "" }))
            .collect();
        println!("    {:20} {}", names(ex.exercise_id), sets.join(", "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Workout { .. }));

    let db = Database::open(&cli.db).with_context(|| format!("Failed to open database {}", cli.db))?;

    match &cli.command {
        Commands::Exercise { action } => match action {
            ExerciseAction::Add { name, category } => {
                let id = db.add_exercise(&Exercise {
                    id: None,
                    name: name.clone(),
                    category: category.clone(),
                })?;
                println!("Added exercise: {} [{}] (id: {})", name, category, id);
            }
            ExerciseAction::List { category } => {
                let exercises = match category {
                    Some(c) => db.get_exercises_by_category(c)?,
                    None => db.get_exercises()?,
                };
                println!("Exercises:");
                println!("{:-<40}", "");
                for ex in exercises {
                    println!("{:>4} | {:20} | {}", ex.id.unwrap_or_default(), ex.name, ex.category);
                }
            }
            ExerciseAction::Rm { id } => {
                if db.delete_exercise(*id)? {
                    println!("Removed exercise {}", id);
                } else {
                    println!("No exercise with id {}", id);
                }
            }
            ExerciseAction::History { id } => {
                let Some(exercise) = db.get_exercises()?.into_iter().find(|ex| ex.id == Some(*id)) else {
                    bail!("Exercise {} not found, see `fitnotes exercise list`", id);
                };
                let (manager, _events) = SessionManager::new(db, Arc::new(SystemClock), None)?;
                let entries = history::exercise_history(manager.history(), *id);

                println!("Exercise history: {} [{}]", exercise.name, exercise.category);
                println!("{:-<40}", "");
                if entries.is_empty() {
                    println!("No workout history for this exercise yet");
                }
                for (idx, (session, logged)) in entries.iter().enumerate() {
                    println!("Session {} - {}", idx + 1, session.date.format("%Y-%m-%d"));
                    for (set_idx, set) in logged.main_sets().iter().enumerate() {
                        let notes = if set.notes.is_empty() {
                            String::new()
                        } else {
                            format!(" ({})", set.notes)
                        };
                        println!("    Set {}: {} reps @ {} kg{}", set_idx + 1, set.reps, set.weight, notes);
                    }
                }
            }
        },

        Commands::Template { action } => match action {
            TemplateAction::Add { name, exercises } => {
                let id = db.add_template(&WorkoutTemplate {
                    id: None,
                    name: name.clone(),
                    date: Utc::now().date_naive(),
                    exercises: exercises.clone(),
                })?;
                println!("Added template: {} (id: {})", name, id);
            }
            TemplateAction::List => {
                let names = exercise_names(&db)?;
                println!("Templates:");
                println!("{:-<60}", "");
                for t in db.get_templates()? {
                    let plan: Vec<String> = t
                        .exercises
                        .iter()
                        .map(|ex| format!("{} x{}", names(ex.exercise_id), ex.planned_sets))
                        .collect();
                    println!("{:>4} | {:20} | {}", t.id.unwrap_or_default(), t.name, plan.join(", "));
                }
            }
            TemplateAction::Rm { id } => {
                let (mut manager, _events) = SessionManager::new(db, Arc::new(SystemClock), None)?;
                manager.remove_template(*id)?;
                println!("Removed template {} and its sessions", id);
            }
        },

        Commands::Workout { template } => {
            let Some(name) = db.get_templates()?.into_iter().find(|t| t.id == Some(*template)).map(|t| t.name)
            else {
                bail!("Template {} not found, see `fitnotes template list`", template);
            };
            let user = cli.user();
            let (mut manager, events) = SessionManager::new(db, Arc::new(SystemClock), cli.reconciler()?)?;
            manager.start_session(*template, user.as_ref())?;

            let app = WorkoutApp::new(manager, events, user, name)?;
            let (manager, sealed) = app.run().await?;
            manager.flush_remote().await;

            if let Some(session) = sealed {
                let names = exercise_names(manager.store())?;
                println!("Workout saved:");
                print_session(&session, &names);
            }
        }

        Commands::History { template } => {
            let names = exercise_names(&db)?;
            let (manager, _events) = SessionManager::new(db, Arc::new(SystemClock), None)?;
            let sessions: Vec<&WorkoutSession> = manager
                .history()
                .iter()
                .filter(|s| template.is_none_or(|t| s.template_id == t))
                .collect();
            if sessions.is_empty() {
                println!("No sessions recorded yet");
            }
            for session in sessions {
                print_session(session, &names);
            }
        }

        Commands::Last { template } => {
            let names = exercise_names(&db)?;
            let (manager, _events) = SessionManager::new(db, Arc::new(SystemClock), None)?;
            match manager.most_recent_session(*template) {
                Some(session) => {
                    print_session(session, &names);
                    println!("Next time:");
                    for ex in &session.exercises {
                        let targets: Vec<String> = history::prefill(Some(session), ex.exercise_id, ex.planned_sets)
                            .into_iter()
                            .map(|p| p.map_or("-".to_string(), |(reps, weight)| format!("{}x{}", reps, weight)))
                            .collect();
                        println!("    {:20} {}", names(ex.exercise_id), targets.join(", "));
                    }
                }
                None => println!("No completed session for template {}", template),
            }
        }

        Commands::Settings { action } => match action {
            SettingsAction::Rest { secs } => {
                let (mut manager, _events) = SessionManager::new(db, Arc::new(SystemClock), None)?;
                manager.set_rest_time(*secs)?;
                println!("Rest time set to {}s", secs);
            }
        },

        Commands::Sync => {
            let Some(user) = cli.user() else {
                bail!("Set --user or FITNOTES_USER to sync");
            };
            let (mut manager, _events) = SessionManager::new(db, Arc::new(SystemClock), cli.reconciler()?)?;
            let count = manager.pull_history(&user).await?;
            println!("Synced {} sessions for {}", count, user);
        }
    }

    Ok(())
}

fn exercise_names(db: &Database) -> Result<impl Fn(i64) -> String + use<>> {
    let names: std::collections::HashMap<i64, String> = db
        .get_exercises()?
        .into_iter()
        .filter_map(|ex| ex.id.map(|id| (id, ex.name)))
        .collect();
    Ok(move |id| names.get(&id).cloned().unwrap_or_else(|| format!("#{}", id)))
}
