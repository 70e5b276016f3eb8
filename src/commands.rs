use crate::assistant::ChatSession;
use crate::cli::{EventCommand, TaskCommand};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dates::resolve_date;
use crate::dispatch::{dispatch, Dispatched};
use crate::model::{Event, EventUpdate, NewEvent, NewTask, Task, TaskUpdate};
use crate::storage::FileStorage;
use crate::store::Store;
use crate::ui;
use crate::views::{events_grouped_by_date, filtered_tasks, is_past_due};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

pub fn task(config: &Config, command: TaskCommand) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut store = open_store(config, clock.clone())?;
    match command {
        TaskCommand::Add {
            title,
            description,
            status,
            due,
        } => {
            let due_date = parse_date(due.as_deref(), clock.as_ref())?;
            let task = store.add_task(NewTask {
                title,
                description,
                status,
                due_date,
            })?;
            println!("Added task {}: {}", task.id, task.title);
        }
        TaskCommand::List { filter, search } => {
            let now = clock.now();
            let tasks = filtered_tasks(store.tasks(), filter, &search);
            println!("Tasks ({filter})");
            if tasks.is_empty() {
                println!("  (none)");
            }
            for task in tasks {
                print_task(task, now);
            }
        }
        TaskCommand::Edit {
            id,
            title,
            description,
            clear_description,
            status,
            due,
            clear_due,
        } => {
            let due_date = parse_date(due.as_deref(), clock.as_ref())?;
            let update = TaskUpdate {
                title,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                status,
                due_date: if clear_due { Some(None) } else { due_date.map(Some) },
            };
            match store.update_task(id, update)? {
                Some(task) => println!("Updated task {}", task.id),
                None => println!("No task {id}"),
            }
        }
        TaskCommand::Toggle { id } => match store.toggle_task_complete(id) {
            Some(task) => println!("Task {} is now {}", task.id, task.status),
            None => println!("No task {id}"),
        },
        TaskCommand::Rm { id } => {
            if store.delete_task(id) {
                println!("Deleted task {id}");
            } else {
                println!("No task {id}");
            }
        }
    }
    Ok(())
}

pub fn event(config: &Config, command: EventCommand) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut store = open_store(config, clock.clone())?;
    match command {
        EventCommand::Add {
            title,
            date,
            description,
            reminder,
            image,
        } => {
            let date = resolve_local(&date, clock.as_ref())?;
            let event = store.add_event(NewEvent {
                title,
                date,
                description,
                reminder,
                image_index: image,
            })?;
            println!(
                "Added event {}: {} on {}",
                event.id,
                event.title,
                format_when(&event.date)
            );
        }
        EventCommand::List { on: Some(token) } => {
            let day = resolve_local(&token, clock.as_ref())?
                .with_timezone(&Local)
                .date_naive();
            let events = store.events_on(day, &Local);
            println!("{}", day.format("%Y-%m-%d %A"));
            if events.is_empty() {
                println!("  (none)");
            }
            for event in events {
                print_event(event);
            }
        }
        EventCommand::List { on: None } => {
            let grouped = events_grouped_by_date(store.events(), &Local);
            if grouped.is_empty() {
                println!("No events");
            }
            for (day, events) in grouped {
                println!("{}", day.format("%Y-%m-%d %A"));
                for event in events {
                    print_event(event);
                }
                println!();
            }
        }
        EventCommand::Edit {
            id,
            title,
            date,
            description,
            clear_description,
            reminder,
            clear_reminder,
            image,
        } => {
            let date = date
                .as_deref()
                .map(|token| resolve_local(token, clock.as_ref()))
                .transpose()?;
            let update = EventUpdate {
                title,
                date,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                reminder: if clear_reminder {
                    Some(None)
                } else {
                    reminder.map(Some)
                },
                image_index: image.map(Some),
                completed: None,
            };
            match store.update_event(id, update)? {
                Some(event) => println!("Updated event {}", event.id),
                None => println!("No event {id}"),
            }
        }
        EventCommand::Toggle { id } => match store.toggle_event_complete(id) {
            Some(event) if event.completed => println!("Event {} completed", event.id),
            Some(event) => println!("Event {} reopened", event.id),
            None => println!("No event {id}"),
        },
        EventCommand::Rm { id } => {
            if store.delete_event(id) {
                println!("Deleted event {id}");
            } else {
                println!("No event {id}");
            }
        }
    }
    Ok(())
}

pub fn chat(config: &Config, message: Vec<String>) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut store = open_store(config, clock.clone())?;
    let message = message.join(" ");
    let remote = config.remote_assistant();
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    let mut session = ChatSession::new(StdRng::from_entropy());
    let now = clock.now().with_timezone(&Local);
    let reply = runtime.block_on(session.respond(&message, remote.as_ref(), now));
    println!("{}", reply.message);
    match dispatch(&mut store, reply.action.as_ref())? {
        Dispatched::Nothing => {}
        Dispatched::Task(task) => println!("  + task {}: {}", task.id, task.title),
        Dispatched::Event(event) => println!(
            "  + event {}: {} ({})",
            event.id,
            event.title,
            format_when(&event.date)
        ),
    }
    Ok(())
}

pub fn tui(config: &Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config, clock.clone())?;
    ui::run(store, config, clock)
}

fn open_store(config: &Config, clock: Arc<dyn Clock>) -> Result<Store> {
    let dir = config.data_dir()?;
    Store::open(Arc::new(FileStorage::new(dir)), clock)
}

fn parse_date(input: Option<&str>, clock: &dyn Clock) -> Result<Option<DateTime<Utc>>> {
    match input.map(str::trim) {
        None | Some("") => Ok(None),
        Some(token) => resolve_local(token, clock).map(Some),
    }
}

fn resolve_local(token: &str, clock: &dyn Clock) -> Result<DateTime<Utc>> {
    let now = clock.now().with_timezone(&Local);
    Ok(resolve_date(token, &now)?)
}

pub(crate) fn format_when(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y.%m.%d@%H:%M").to_string()
}

fn print_task(task: &Task, now: DateTime<Utc>) {
    let mark = if task.completed { "x" } else { " " };
    println!("  [{}] {}: {} ({})", mark, task.id, task.title, task.status);
    if let Some(description) = &task.description {
        println!("      {}", description);
    }
    if let Some(due) = task.due_date {
        let overdue = if is_past_due(task, now) { "  OVERDUE" } else { "" };
        println!("      due: {}{}", format_when(&due), overdue);
    }
    if let Some(done) = task.completed_at {
        println!("      completed: {}", format_when(&done));
    }
}

fn print_event(event: &Event) {
    let mark = if event.completed { "x" } else { " " };
    println!(
        "  [{}] {}: {} at {}",
        mark,
        event.id,
        event.title,
        event.date.with_timezone(&Local).format("%H:%M")
    );
    if let Some(description) = &event.description {
        println!("      {}", description);
    }
    if let Some(minutes) = event.reminder {
        println!("      reminder: {} min before", minutes);
    }
}
