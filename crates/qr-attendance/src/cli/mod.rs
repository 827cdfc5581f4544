//! Command-line interface for qr-attendance.
//!
//! This module provides the CLI structure for the `qrattend` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, DecodeCommand, ListCommand, MarkCommand, OutputFormat, ScanCommand,
    StatsCommand,
};

use crate::logging::Verbosity;

/// qrattend - Check people in by scanning their badge QR codes
///
/// Reads the registration number from a badge image, finds the registrant in
/// the event roster CSV and records their attendance exactly once.
#[derive(Debug, Parser)]
#[command(name = "qrattend")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Roster CSV to use instead of the configured one
    #[arg(short, long, global = true, value_name = "FILE")]
    pub roster: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read QR payloads from images without touching the roster
    Decode(DecodeCommand),

    /// Check in registrants from badge images
    Scan(ScanCommand),

    /// Check in registrants by registration number
    Mark(MarkCommand),

    /// Show attendance totals
    Stats(StatsCommand),

    /// List registrants and their attendance
    List(ListCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}
