use crate::model::{Event, Task};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    pub fn accepts(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            StatusFilter::All => StatusFilter::Active,
            StatusFilter::Active => StatusFilter::Completed,
            StatusFilter::Completed => StatusFilter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Active => "active",
            StatusFilter::Completed => "completed",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            "completed" => Ok(StatusFilter::Completed),
            other => Err(format!(
                "unknown filter `{other}` (expected all, active or completed)"
            )),
        }
    }
}

/// Tasks passing the status filter and search query, incomplete first,
/// newest first within each group.
pub fn filtered_tasks<'a>(tasks: &'a [Task], filter: StatusFilter, query: &str) -> Vec<&'a Task> {
    let query = query.trim().to_lowercase();
    let mut selected: Vec<&Task> = tasks
        .iter()
        .filter(|task| filter.accepts(task))
        .filter(|task| query.is_empty() || matches_query(task, &query))
        .collect();
    selected.sort_by_key(|task| (task.completed, Reverse(task.created_at)));
    selected
}

fn matches_query(task: &Task, query: &str) -> bool {
    task.title.to_lowercase().contains(query)
        || task
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(query))
}

/// Events bucketed by calendar day in `tz`; days ascend, events inside a
/// day keep insertion order.
pub fn events_grouped_by_date<'a, Tz: TimeZone>(
    events: &'a [Event],
    tz: &Tz,
) -> BTreeMap<NaiveDate, Vec<&'a Event>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<&Event>> = BTreeMap::new();
    for event in events {
        let day = event.date.with_timezone(tz).date_naive();
        grouped.entry(day).or_default().push(event);
    }
    grouped
}

pub fn is_past_due(task: &Task, now: DateTime<Utc>) -> bool {
    !task.completed && task.due_date.is_some_and(|due| due < now)
}
