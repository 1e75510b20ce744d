use std::fmt;

use clap::Parser;
use progress_core::model::{Course, CourseId, Module, ModuleId, Role, User, UserId};
use services::{AppServices, Clock, ToggleProgress};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

const DEFAULT_LOG_FILTER: &str = "progressctl=info,services=info,storage=info";

#[derive(Debug)]
struct InvalidDbUrl {
    raw: String,
}

impl fmt::Display for InvalidDbUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid --db value: {}", self.raw)
    }
}

impl std::error::Error for InvalidDbUrl {}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let invalid = || InvalidDbUrl {
        raw: db_url.to_string(),
    };
    let path = db_url.strip_prefix("sqlite://").ok_or_else(invalid)?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(invalid().into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Demo rows inserted by `seed`.
fn demo_catalog() -> Result<(User, Course, Vec<Module>), progress_core::Error> {
    let user = User::new(UserId::new(5), "demo", "demo@example.com", Role::User)?;
    let course = Course::new(CourseId::new(7), "Rust Basics", "beginner")?;
    let modules = [
        (41, "Ownership"),
        (42, "Borrowing"),
        (43, "Lifetimes"),
    ]
    .into_iter()
    .map(|(id, title)| {
        Module::new(
            ModuleId::new(id),
            course.id(),
            title,
            format!("An introduction to {}", title.to_lowercase()),
            "",
            None,
        )
    })
    .collect::<Result<Vec<_>, _>>()?;
    Ok((user, course, modules))
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.db.url.trim().is_empty() {
        return Err(InvalidDbUrl { raw: cli.db.url }.into());
    }
    let db_url = normalize_sqlite_url(&cli.db.url);

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&db_url)?;
    let services = AppServices::new_sqlite(&db_url, &cli.db.pool_config(), Clock::system()).await?;

    match cli.command {
        Command::Migrate => info!(db = %db_url, "schema up to date"),
        Command::Seed => {
            let (user, course, modules) = demo_catalog()?;
            let catalog = &services.storage().catalog;
            catalog.upsert_user(&user).await?;
            catalog.upsert_course(&course).await?;
            for module in &modules {
                catalog.upsert_module(module).await?;
            }
            info!(modules = modules.len(), "demo catalog seeded");
        }
        Command::Toggle {
            user,
            course,
            module,
            undo,
        } => {
            let outcome = services
                .progress()
                .toggle_progress(
                    user,
                    ToggleProgress {
                        course_id: course,
                        module_id: module,
                        completed: !undo,
                    },
                )
                .await?;
            println!(
                "progress={} completed_courses={} course_completed={}",
                outcome.progress, outcome.completed_courses, outcome.course_completed
            );
        }
        Command::SyncProgress { user } => {
            let aggregates = services
                .sync()
                .sync_user_progress(user)
                .await?;
            println!(
                "progress={} completed_courses={}",
                aggregates.progress, aggregates.completed_courses
            );
        }
        Command::SyncCourses { user } => {
            let completed = services
                .sync()
                .sync_completed_courses(user)
                .await?;
            println!("completed_courses={completed}");
        }
        Command::Profile { user, course } => {
            let profiles = services.profiles();
            let json = match course {
                Some(course) => serde_json::to_string_pretty(
                    &profiles
                        .course_progress(user, course)
                        .await?,
                )?,
                None => serde_json::to_string_pretty(&profiles.profile(user).await?)?,
            };
            println!("{json}");
        }
        Command::RemoveCourse { course } => {
            let report = services
                .cleanup()
                .remove_course(course)
                .await?;
            println!(
                "modules={} completions={} enrollments={} refreshed_users={}",
                report.modules_removed,
                report.completions_removed,
                report.enrollments_removed,
                report.refreshed_users.len()
            );
            for warning in &report.warnings {
                eprintln!("warning: {}: {}", warning.step, warning.message);
            }
        }
        Command::RemoveUser { user } => {
            let report = services.cleanup().remove_user(user).await?;
            println!(
                "completions={} enrollments={}",
                report.completions_removed, report.enrollments_removed
            );
            for warning in &report.warnings {
                eprintln!("warning: {}: {}", warning.step, warning.message);
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
