use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use progress_core::model::{CourseId, ModuleId, UserId};
use storage::sqlite::PoolConfig;

#[derive(Debug, Parser)]
#[command(name = "progressctl")]
#[command(about = "Operate the course progress store")]
pub struct Cli {
    #[command(flatten)]
    pub db: DbArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct DbArgs {
    /// SQLite database URL or file path
    #[arg(long = "db", env = "LEARN_DB_URL", default_value = "sqlite://dev.sqlite3")]
    pub url: String,

    #[arg(long, env = "LEARN_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    #[arg(long, env = "LEARN_DB_MIN_CONNECTIONS", default_value_t = 1)]
    pub min_connections: u32,

    /// Seconds before a pooled connection is recycled
    #[arg(long, env = "LEARN_DB_MAX_LIFETIME_SECS", default_value_t = 3600)]
    pub max_lifetime_secs: u64,

    /// Seconds an idle pooled connection is kept
    #[arg(long, env = "LEARN_DB_IDLE_TIMEOUT_SECS", default_value_t = 1800)]
    pub idle_timeout_secs: u64,
}

impl DbArgs {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            max_lifetime: Duration::from_secs(self.max_lifetime_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ..PoolConfig::default()
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or upgrade the schema
    Migrate,
    /// Insert a small demo catalog (user 5, course 7, modules 41-43)
    Seed,
    /// Mark a module completed, or clear it with --undo
    Toggle {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        course: CourseId,
        #[arg(long)]
        module: ModuleId,
        #[arg(long)]
        undo: bool,
    },
    /// Recompute a user's progress and completed-course count
    SyncProgress {
        #[arg(long)]
        user: UserId,
    },
    /// Recount a user's completed courses only
    SyncCourses {
        #[arg(long)]
        user: UserId,
    },
    /// Print a user's cached profile, or a course checklist with --course
    Profile {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        course: Option<CourseId>,
    },
    /// Delete a course and repair the aggregates of its learners
    RemoveCourse {
        #[arg(long)]
        course: CourseId,
    },
    /// Delete a user with their progress
    RemoveUser {
        #[arg(long)]
        user: UserId,
    },
}
