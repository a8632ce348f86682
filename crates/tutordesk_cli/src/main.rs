//! Command-line front end for the tutoring core.
//!
//! # Responsibility
//! - Wire config, logging and the SQLite stores into the core services.
//! - Run the monthly rollover check before every command.
//!
//! # Invariants
//! - One process owns the database file for the duration of a command.

use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::collections::BTreeSet;
use std::error::Error;
use std::path::PathBuf;
use tutordesk_core::db::open_db;
use tutordesk_core::{
    core_version, default_log_level, init_logging, load_config, CoreConfig, LedgerEngine,
    MonthKey, MonthRange, MovementKind, NewMovement, NewSessionRequest, RecurrenceExpander,
    RecurrenceRule, RolloverOutcome, RolloverScheduler, SlotCalendar, SqliteMarkerStore,
    SqliteMovementStore, SqliteSessionStore, SqliteStudentDirectory, Student, StudentId,
    SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "tutordesk")]
#[command(about = "Capacity-aware lesson calendar and student ledger", version)]
struct Cli {
    /// SQLite database file
    #[arg(long, default_value = "tutordesk.db")]
    db: PathBuf,

    /// TOML file with opening hours and slot capacity
    #[arg(long)]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off when absent
    #[arg(long)]
    log_dir: Option<String>,

    #[arg(long)]
    log_level: Option<String>,

    /// Overrides `max_per_slot` from the config file
    #[arg(long)]
    max_per_slot: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monthly carryover if it is due
    Startup,
    #[command(subcommand)]
    Student(StudentCommand),
    #[command(subcommand)]
    Session(SessionCommand),
    /// Show occupancy for every slot of one day
    Slots {
        #[arg(long)]
        day: NaiveDate,
    },
    #[command(subcommand)]
    Ledger(LedgerCommand),
}

#[derive(Subcommand, Debug)]
enum StudentCommand {
    Add { name: String },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    Add(SessionArgs),
    /// Create one session per selected weekday in a date range
    Repeat {
        /// Weekday numbers, 1=Monday .. 7=Sunday
        #[arg(long, value_delimiter = ',', required = true)]
        weekdays: Vec<u8>,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, value_parser = parse_hh_mm)]
        start: NaiveTime,
        #[arg(long, value_parser = parse_hh_mm)]
        end: NaiveTime,
        #[arg(long)]
        student: StudentId,
        #[arg(long, default_value = "")]
        title: String,
    },
}

#[derive(Args, Debug)]
struct SessionArgs {
    #[arg(long)]
    day: NaiveDate,
    #[arg(long, value_parser = parse_hh_mm)]
    start: NaiveTime,
    #[arg(long, value_parser = parse_hh_mm)]
    end: NaiveTime,
    #[arg(long)]
    student: StudentId,
    #[arg(long, default_value = "")]
    title: String,
}

#[derive(Subcommand, Debug)]
enum LedgerCommand {
    Add {
        #[arg(long)]
        student: StudentId,
        /// `debt` or `payment`
        #[arg(long)]
        kind: String,
        /// Amount in minor currency units
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        payer: Option<String>,
    },
    /// Pending balances per student, highest first
    Report {
        #[arg(long)]
        from: MonthKey,
        #[arg(long)]
        to: Option<MonthKey>,
    },
}

fn parse_hh_mm(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value, "%H:%M")
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CoreConfig::default(),
    };
    if let Some(max_per_slot) = cli.max_per_slot {
        config.max_per_slot = max_per_slot;
    }
    config.validate()?;

    let conn = open_db(&cli.db)?;
    info!(
        "event=cli_start module=cli status=ok version={}",
        core_version()
    );

    let ledger = LedgerEngine::new(
        SqliteMovementStore::new(&conn),
        SqliteStudentDirectory::new(&conn),
    );
    let rollover = RolloverScheduler::new(&ledger, SqliteMarkerStore::new(&conn), SystemClock);
    match rollover.run_if_due()? {
        RolloverOutcome::Completed(report) => println!(
            "rollover {}: carried {} balance(s) from {}",
            report.month,
            report.carried.len(),
            report.from
        ),
        RolloverOutcome::AlreadyDone(month) => {
            if matches!(cli.command, Command::Startup) {
                println!("rollover {month}: already done");
            }
        }
    }

    let calendar = SlotCalendar::try_new(SqliteSessionStore::new(&conn), config)?;

    match cli.command {
        Command::Startup => {}
        Command::Student(StudentCommand::Add { name }) => {
            let id = ledger.students().create_student(&Student::new(name))?;
            println!("{id}");
        }
        Command::Session(SessionCommand::Add(args)) => {
            let id = calendar.create_session(&NewSessionRequest {
                day: args.day,
                student_id: args.student,
                start: args.start,
                end: args.end,
                title: args.title,
            })?;
            println!("{id}");
        }
        Command::Session(SessionCommand::Repeat {
            weekdays,
            from,
            to,
            start,
            end,
            student,
            title,
        }) => {
            let rule = RecurrenceRule {
                weekdays: weekdays.into_iter().collect::<BTreeSet<_>>(),
                from,
                to,
                start_time: start,
                end_time: end,
                student_id: student,
                title,
            };
            let report = RecurrenceExpander::new(&calendar).expand(&rule)?;
            println!("{}", report.summary());
            for skipped in &report.skipped {
                println!(
                    "skipped {} (slot {} full)",
                    skipped.date,
                    skipped.bucket.start_time().format("%H:%M")
                );
            }
        }
        Command::Slots { day } => {
            for slot in calendar.day_occupancy(day)? {
                println!(
                    "{}-{} {}/{}",
                    slot.bucket.start.format("%H:%M"),
                    slot.bucket.end.format("%H:%M"),
                    slot.occupancy,
                    slot.capacity
                );
            }
        }
        Command::Ledger(LedgerCommand::Add {
            student,
            kind,
            amount,
            date,
            note,
            payer,
        }) => {
            let mut request = NewMovement::new(student, date, MovementKind::parse(&kind)?, amount);
            request.note = note;
            request.payer = payer;
            let movement = ledger.add_movement(request)?;
            println!("{}", movement.id);
        }
        Command::Ledger(LedgerCommand::Report { from, to }) => {
            let range = MonthRange::new(from, to.unwrap_or(from))?;
            for row in ledger.all_students_monthly_totals(range)? {
                println!(
                    "{:<24} debt={:>10} payment={:>10} pending={:>10}",
                    row.name, row.totals.debt, row.totals.payment, row.totals.pending
                );
            }
        }
    }

    Ok(())
}
