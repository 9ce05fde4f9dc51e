//! Command-line front end for the timetable core.
//!
//! # Responsibility
//! - Resolve configuration and open the database.
//! - Map each subcommand onto one core service call and print the result
//!   (JSON, or import-format text for `export`).

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use timetable_core::db::Connection;
use timetable_core::import::record::parse_date;
use timetable_core::{
    find_all_conflicts, init_from_config, load_config, open_db, week_start, ConflictPair,
    CoreConfig, DateRange, ExportService, ImportService, LessonStore, ParityRule, RecordKind,
    RowLocation, ScheduleService, SqliteCatalog, SqliteLessonStore, SqliteTemplateRepository,
};

const DEFAULT_CONFIG_FILE: &str = "timetable.toml";

#[derive(Parser)]
#[command(name = "timetable", version, about = "School timetable engine")]
struct Cli {
    /// Config file (defaults to ./timetable.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file, overriding the config.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate lessons from weekly templates for a date range
    Generate {
        #[arg(long, value_parser = parse_cli_date)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_cli_date)]
        to: NaiveDate,
    },
    /// Show the lessons of one week
    Week {
        /// First day of the week (defaults to this week's Monday).
        #[arg(long, value_parser = parse_cli_date)]
        start: Option<NaiveDate>,
    },
    /// Import lessons or reference entities from a text or .xlsx file
    Import {
        #[arg(long, value_parser = parse_kind)]
        kind: RecordKind,
        #[arg(long)]
        file: PathBuf,
    },
    /// Export lessons in the lesson import format
    Export {
        #[arg(long, value_parser = parse_cli_date)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_cli_date)]
        to: NaiveDate,
        /// Only lessons of this group.
        #[arg(long)]
        group: Option<String>,
    },
    /// List teacher and classroom double bookings in a date range
    Conflicts {
        #[arg(long, value_parser = parse_cli_date)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_cli_date)]
        to: NaiveDate,
    },
    /// Show the week number and parity of a date
    Parity {
        #[arg(long, value_parser = parse_cli_date)]
        date: NaiveDate,
    },
}

#[derive(Serialize)]
struct ParityOutput {
    date: NaiveDate,
    rule: ParityRule,
    week_number: i64,
    is_even_week: bool,
}

#[derive(Serialize)]
struct ConflictsOutput {
    from: NaiveDate,
    to: NaiveDate,
    conflicts: Vec<ConflictPair>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    init_from_config(&config.logging)?;

    // Parity needs no database.
    if let Commands::Parity { date } = cli.command {
        let rule = config.schedule.parity_rule;
        return print_json(&ParityOutput {
            date,
            rule,
            week_number: rule.week_number(date),
            is_even_week: rule.is_even_week(date),
        });
    }

    let conn = open_db(&config.database.path)?;
    match cli.command {
        Commands::Generate { from, to } => {
            let service = schedule_service(&conn, &config);
            print_json(&service.generate_week_schedule(from, to)?)
        }
        Commands::Week { start } => {
            let service = schedule_service(&conn, &config);
            let start = start.unwrap_or_else(|| week_start(Local::now().date_naive()));
            print_json(&service.get_week_schedule(start)?)
        }
        Commands::Import { kind, file } => {
            let service = ImportService::new(
                SqliteCatalog::new(&conn),
                SqliteLessonStore::new(&conn),
                config.reconcile_options(),
            );
            let report = service.import_file(&file, kind, None);
            print_json(&report)?;
            if report.is_source_unreadable() {
                return Err(format!("could not read `{}`", file.display()).into());
            }
            Ok(())
        }
        Commands::Export { from, to, group } => {
            let service =
                ExportService::new(SqliteCatalog::new(&conn), SqliteLessonStore::new(&conn));
            let text = service.export_lessons(DateRange::new(from, to), group.as_deref())?;
            print!("{text}");
            Ok(())
        }
        Commands::Conflicts { from, to } => {
            let lessons = SqliteLessonStore::new(&conn).query(DateRange::new(from, to), None)?;
            print_json(&ConflictsOutput {
                from,
                to,
                conflicts: find_all_conflicts(&lessons),
            })
        }
        Commands::Parity { .. } => Ok(()),
    }
}

fn resolve_config(explicit: Option<&Path>) -> Result<CoreConfig, Box<dyn Error>> {
    if let Some(path) = explicit {
        return Ok(load_config(path)?);
    }
    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if fallback.is_file() {
        return Ok(load_config(fallback)?);
    }
    Ok(CoreConfig::default())
}

fn schedule_service<'conn>(
    conn: &'conn Connection,
    config: &CoreConfig,
) -> ScheduleService<SqliteTemplateRepository<'conn>, SqliteLessonStore<'conn>> {
    ScheduleService::new(
        SqliteTemplateRepository::new(conn),
        SqliteLessonStore::new(conn),
        config.schedule.parity_rule,
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_cli_date(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw, RowLocation::Line(0)).map_err(|err| err.to_string())
}

fn parse_kind(raw: &str) -> Result<RecordKind, String> {
    raw.parse()
}
