//! fitnotes - Strength workout tracker
//!
//! Templates plan the workout, sessions record it set by set, with a rest
//! countdown between sets and optional mirroring to a remote store.

pub mod clock;
pub mod db;
pub mod history;
pub mod session;
pub mod sync;
pub mod timer;
pub mod tui;

pub use db::Database;
pub use session::{NewSet, SessionError, SessionManager};
