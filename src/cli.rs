use crate::model::TaskStatus;
use crate::views::StatusFilter;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "daybook",
    version,
    about = "Tasks, calendar events and a chat box that files them for you"
)]
pub struct Cli {
    /// Directory holding todos.yml and calendar_events.yml
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Manage calendar events
    Event {
        #[command(subcommand)]
        command: EventCommand,
    },
    /// Send one chat message, apply what it asks for and print the reply
    Chat {
        /// The message, e.g. "add task: buy groceries"
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Launch the interactive TUI
    Tui,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Add a new task
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// not-started, in-progress or completed
        #[arg(long, default_value = "not-started")]
        status: TaskStatus,
        /// Due date: today, tomorrow, a weekday, 2025-05-15, "May 15, 2025", 2025.05.15@09:00 ...
        #[arg(long)]
        due: Option<String>,
    },
    /// List tasks, open ones first
    List {
        /// all, active or completed
        #[arg(long, default_value = "all")]
        filter: StatusFilter,
        /// Case-insensitive match on title or description
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Edit an existing task
    Edit {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
    },
    /// Flip a task between completed and not-started
    Toggle { id: u64 },
    /// Delete a task
    Rm { id: u64 },
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Add a new event
    Add {
        title: String,
        /// today, tomorrow, a weekday, 2025-05-15, "May 15, 2025", 2025-05-15 18:30 ...
        #[arg(long)]
        date: String,
        #[arg(long)]
        description: Option<String>,
        /// Minutes before the event
        #[arg(long)]
        reminder: Option<u32>,
        /// Decorative image, 1-4
        #[arg(long)]
        image: Option<u8>,
    },
    /// List events grouped by day
    List {
        /// Only the events on this day (today, friday, 2025-05-15 ...)
        #[arg(long)]
        on: Option<String>,
    },
    /// Edit an existing event
    Edit {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
        #[arg(long)]
        reminder: Option<u32>,
        #[arg(long, conflicts_with = "reminder")]
        clear_reminder: bool,
        #[arg(long)]
        image: Option<u8>,
    },
    /// Flip an event's completed flag
    Toggle { id: u64 },
    /// Delete an event
    Rm { id: u64 },
}
