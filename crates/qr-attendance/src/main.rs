//! `qrattend` - CLI for qr-attendance
//!
//! This binary is a thin presentation layer over the library: it owns the
//! scan session and renders outcomes, while the library does the decoding,
//! look-up and marking.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use qr_attendance::cli::{
    Cli, Command, ConfigCommand, DecodeCommand, ListCommand, MarkCommand, OutputFormat,
    ScanCommand, StatsCommand,
};
use qr_attendance::logging::{init_logging_with_file, Verbosity};
use qr_attendance::{init_logging, Config, Desk, QrScanner, RosterStore, ScanSession};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Decode(cmd) => {
            setup(&cli)?;
            handle_decode(cmd)
        }
        Command::Scan(cmd) => handle_scan(&setup(&cli)?, cmd),
        Command::Mark(cmd) => handle_mark(&setup(&cli)?, cmd),
        Command::Stats(cmd) => handle_stats(&setup(&cli)?, cmd),
        Command::List(cmd) => handle_list(&setup(&cli)?, cmd),
        Command::Config(cmd) => handle_config(&cli, cmd),
    }
}

/// Load configuration, apply `--roster` and start logging.
fn setup(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load_from(cli.config.clone())?;
    if let Some(roster) = &cli.roster {
        config.roster.path = Some(roster.clone());
    }

    start_logging(cli.verbosity(), config.log.file.as_deref())?;
    Ok(config)
}

fn start_logging(verbosity: Verbosity, log_file: Option<&Path>) -> anyhow::Result<()> {
    match log_file {
        Some(path) => init_logging_with_file(verbosity, path)
            .with_context(|| format!("cannot open log file {}", path.display())),
        None => {
            init_logging(verbosity);
            Ok(())
        }
    }
}

fn open_for_marking(config: &Config) -> anyhow::Result<Desk> {
    Desk::from_config(config)
        .with_context(|| format!("cannot open roster {}", config.roster_path().display()))
}

fn open_read_only(config: &Config) -> anyhow::Result<Desk> {
    let store = RosterStore::new(config.roster_path(), config.columns.clone());
    Desk::open_unlocked(store)
        .with_context(|| format!("cannot open roster {}", config.roster_path().display()))
}

fn handle_decode(cmd: &DecodeCommand) -> anyhow::Result<()> {
    let scanner = QrScanner::new();
    let mut results = Vec::with_capacity(cmd.images.len());

    for image in &cmd.images {
        let result = scanner.decode_file(image);
        if !cmd.json {
            match (&result.payload, &result.error) {
                (Some(payload), _) => println!("{}: {payload}", image.display()),
                (None, Some(error)) => println!("{}: {error}", image.display()),
                (None, None) => println!("{}:", image.display()),
            }
        }
        results.push(serde_json::json!({ "image": image, "scan": result }));
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

fn handle_scan(config: &Config, cmd: &ScanCommand) -> anyhow::Result<()> {
    let desk = open_for_marking(config)?;
    let mut session = ScanSession::new();
    let mut results = Vec::with_capacity(cmd.images.len());

    for image in &cmd.images {
        let check_in = desk.check_in_file(&mut session, image)?;
        if !cmd.json {
            let mark = if check_in.success() { "ok " } else { "-- " };
            println!("{mark}{}: {}", image.display(), check_in.message());
        }
        results.push(serde_json::json!({ "image": image, "check_in": check_in }));
    }

    finish_session(&session, &results, cmd.json)
}

fn handle_mark(config: &Config, cmd: &MarkCommand) -> anyhow::Result<()> {
    let desk = open_for_marking(config)?;
    let mut session = ScanSession::new();
    let mut results = Vec::with_capacity(cmd.registration_numbers.len());

    for registration in &cmd.registration_numbers {
        let outcome = desk.mark(&mut session, registration)?;
        if !cmd.json {
            let mark = if outcome.success { "ok " } else { "-- " };
            println!("{mark}{registration}: {}", outcome.message);
        }
        results.push(serde_json::to_value(outcome)?);
    }

    finish_session(&session, &results, cmd.json)
}

fn finish_session(
    session: &ScanSession,
    results: &[serde_json::Value],
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let report = serde_json::json!({ "results": results, "session": session });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    print!("Checked in this session: {}", session.scan_count);
    if let Some(last) = session.last_scan {
        print!(" (last at {})", last.format("%H:%M:%S"));
    }
    println!();
    Ok(())
}

fn handle_stats(config: &Config, cmd: &StatsCommand) -> anyhow::Result<()> {
    let summary = open_read_only(config)?.summary()?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Attendance Summary");
        println!("==================");
        println!("Total participants: {}", summary.total);
        println!("Present:            {}", summary.present);
        println!("Absent:             {}", summary.absent);
    }
    Ok(())
}

fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let records: Vec<_> = open_read_only(config)?
        .records()?
        .into_iter()
        .filter(|r| cmd.includes(r.attendance()))
        .collect();

    let status = |present: bool| if present { "Present" } else { "Absent" };
    let reg_header = config.columns.registration.as_str();
    let name_header = config.columns.name.as_str();
    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Plain => {
            for record in &records {
                println!("{}", record.registration_number());
            }
        }
        OutputFormat::Table => {
            let reg_width = records
                .iter()
                .map(|r| r.registration_number().chars().count())
                .chain(std::iter::once(reg_header.chars().count()))
                .max()
                .unwrap_or_default();
            let name_width = records
                .iter()
                .map(|r| r.name().chars().count())
                .chain(std::iter::once(name_header.chars().count()))
                .max()
                .unwrap_or_default();

            println!("{reg_header:<reg_width$}  {name_header:<name_width$}  Attendance");
            for record in &records {
                println!(
                    "{:<reg_width$}  {:<name_width$}  {}",
                    record.registration_number(),
                    record.name(),
                    status(record.attendance())
                );
            }
        }
    }
    Ok(())
}

fn handle_config(cli: &Cli, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = setup(cli)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            init_logging(cli.verbosity());
            match file.clone().or_else(|| cli.config.clone()) {
                Some(path) if !path.exists() => {
                    anyhow::bail!("configuration file {} does not exist", path.display());
                }
                Some(path) => validate_config_file(path)?,
                None => validate_config_file(Config::default_config_path())?,
            }
        }
    }
    Ok(())
}

fn validate_config_file(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration: {}", path.display());
    let display = path.display().to_string();
    Config::load_from(Some(path)).with_context(|| format!("invalid configuration in {display}"))?;
    println!("Configuration is valid.");
    Ok(())
}

fn print_config(config: &Config) {
    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("[Roster]");
    println!("  Path:               {}", config.roster_path().display());
    println!("  Lock while marking: {}", config.roster.lock);
    println!();
    println!("[Columns]");
    println!("  Registration:       {}", config.columns.registration);
    println!("  Name:               {}", config.columns.name);
    println!("  Email:              {}", config.columns.email);
    println!("  Attendance:         {}", config.columns.attendance);
    println!();
    println!("[Log]");
    match &config.log.file {
        Some(path) => println!("  File:               {}", path.display()),
        None => println!("  File:               (stderr only)"),
    }
}
