use crate::clock::Clock;
use crate::model::{
    check_image_index, clean_title, Event, EventUpdate, NewEvent, NewTask, RecordError, RecordId,
    Task, TaskStatus, TaskUpdate,
};
use crate::storage::{Storage, WriteBehind, COUNTERS_KEY, EVENTS_KEY, TASKS_KEY};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which collection a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Tasks,
    Events,
}

type Subscriber = Box<dyn FnMut(Change)>;

/// Next ids to hand out, persisted so deleted ids stay retired across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Counters {
    next_task_id: RecordId,
    next_event_id: RecordId,
}

/// Owner of the canonical task and event collections.
///
/// Every successful mutation updates memory first, then hands the full
/// serialized collection to the write-behind queue, then notifies subscribers.
/// Unknown ids on update/delete/toggle are silent no-ops.
pub struct Store {
    tasks: Vec<Task>,
    events: Vec<Event>,
    next_task_id: RecordId,
    next_event_id: RecordId,
    clock: Arc<dyn Clock>,
    writer: WriteBehind,
    subscribers: Vec<Subscriber>,
}

impl Store {
    /// Loads both collections. Unreadable or corrupt data resets that
    /// collection to empty with a warning.
    pub fn open(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Result<Self> {
        let now = clock.now();
        let mut tasks: Vec<Task> = load_collection(storage.as_ref(), TASKS_KEY);
        let mut events: Vec<Event> = load_collection(storage.as_ref(), EVENTS_KEY);
        for task in &mut tasks {
            let status = task.status;
            set_task_status(task, status, now);
        }
        for event in &mut events {
            let completed = event.completed;
            set_event_completed(event, completed, now);
        }
        let stored = load_counters(storage.as_ref());
        let next_task_id = stored
            .next_task_id
            .max(tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1);
        let next_event_id = stored
            .next_event_id
            .max(events.iter().map(|e| e.id).max().unwrap_or(0) + 1);
        log::info!("loaded {} tasks and {} events", tasks.len(), events.len());
        Ok(Store {
            tasks,
            events,
            next_task_id,
            next_event_id,
            clock,
            writer: WriteBehind::spawn(storage)?,
            subscribers: Vec::new(),
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn task(&self, id: RecordId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn event(&self, id: RecordId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Events whose date falls on `day` in the given time zone.
    pub fn events_on<Tz: TimeZone>(&self, day: NaiveDate, tz: &Tz) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.date.with_timezone(tz).date_naive() == day)
            .collect()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(Change) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Waits for queued writes to reach storage.
    pub fn flush(&self) {
        self.writer.flush();
    }

    pub fn add_task(&mut self, new: NewTask) -> Result<Task, RecordError> {
        let title = clean_title(&new.title)?;
        let now = self.clock.now();
        let mut task = Task {
            id: self.next_task_id,
            title,
            description: new.description,
            status: TaskStatus::NotStarted,
            due_date: new.due_date,
            created_at: now,
            completed: false,
            completed_at: None,
        };
        set_task_status(&mut task, new.status, now);
        self.next_task_id += 1;
        self.tasks.push(task.clone());
        self.committed(Change::Tasks);
        Ok(task)
    }

    pub fn update_task(
        &mut self,
        id: RecordId,
        update: TaskUpdate,
    ) -> Result<Option<Task>, RecordError> {
        let now = self.clock.now();
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        let title = update.title.as_deref().map(clean_title).transpose()?;
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(due_date) = update.due_date {
            task.due_date = due_date;
        }
        let status = update.status.unwrap_or(task.status);
        set_task_status(task, status, now);
        let updated = task.clone();
        self.committed(Change::Tasks);
        Ok(Some(updated))
    }

    pub fn delete_task(&mut self, id: RecordId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            self.committed(Change::Tasks);
        }
        removed
    }

    /// Flips completion. Completing moves the task to `completed`;
    /// un-completing moves it back to `not-started`.
    pub fn toggle_task_complete(&mut self, id: RecordId) -> Option<Task> {
        let now = self.clock.now();
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        let next = if task.completed {
            TaskStatus::NotStarted
        } else {
            TaskStatus::Completed
        };
        set_task_status(task, next, now);
        let toggled = task.clone();
        self.committed(Change::Tasks);
        Some(toggled)
    }

    pub fn add_event(&mut self, new: NewEvent) -> Result<Event, RecordError> {
        let title = clean_title(&new.title)?;
        let image_index = check_image_index(new.image_index)?;
        let event = Event {
            id: self.next_event_id,
            title,
            date: new.date,
            description: new.description,
            reminder: new.reminder,
            image_index,
            completed: false,
            completed_at: None,
            created_at: self.clock.now(),
        };
        self.next_event_id += 1;
        self.events.push(event.clone());
        self.committed(Change::Events);
        Ok(event)
    }

    pub fn update_event(
        &mut self,
        id: RecordId,
        update: EventUpdate,
    ) -> Result<Option<Event>, RecordError> {
        let now = self.clock.now();
        let Some(event) = self.events.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        let title = update.title.as_deref().map(clean_title).transpose()?;
        let image_index = update.image_index.map(check_image_index).transpose()?;
        if let Some(title) = title {
            event.title = title;
        }
        if let Some(date) = update.date {
            event.date = date;
        }
        if let Some(description) = update.description {
            event.description = description;
        }
        if let Some(reminder) = update.reminder {
            event.reminder = reminder;
        }
        if let Some(image_index) = image_index {
            event.image_index = image_index;
        }
        let completed = update.completed.unwrap_or(event.completed);
        set_event_completed(event, completed, now);
        let updated = event.clone();
        self.committed(Change::Events);
        Ok(Some(updated))
    }

    pub fn delete_event(&mut self, id: RecordId) -> bool {
        let before = self.events.len();
        self.events.retain(|e| e.id != id);
        let removed = self.events.len() != before;
        if removed {
            self.committed(Change::Events);
        }
        removed
    }

    pub fn toggle_event_complete(&mut self, id: RecordId) -> Option<Event> {
        let completed = !self.event(id)?.completed;
        self.update_event(id, EventUpdate::completed(completed))
            .ok()
            .flatten()
    }

    fn committed(&mut self, change: Change) {
        match change {
            Change::Tasks => self.persist(TASKS_KEY, &self.tasks),
            Change::Events => self.persist(EVENTS_KEY, &self.events),
        }
        let counters = Counters {
            next_task_id: self.next_task_id,
            next_event_id: self.next_event_id,
        };
        match serde_yaml::to_string(&counters) {
            Ok(payload) => self.writer.submit(COUNTERS_KEY, payload),
            Err(err) => log::warn!("failed to serialize id counters: {err}"),
        }
        for subscriber in &mut self.subscribers {
            subscriber(change);
        }
    }

    fn persist<T: Serialize>(&self, key: &str, records: &[T]) {
        match serde_yaml::to_string(records) {
            Ok(payload) => self.writer.submit(key, payload),
            Err(err) => log::warn!("failed to serialize `{key}`: {err}"),
        }
    }
}

/// Keeps `completed` and `completed_at` coupled to `status`. Entering
/// `completed` stamps `now`; staying there keeps the original stamp.
fn set_task_status(task: &mut Task, status: TaskStatus, now: DateTime<Utc>) {
    let was_completed = task.status == TaskStatus::Completed;
    task.status = status;
    task.completed = status == TaskStatus::Completed;
    if !task.completed {
        task.completed_at = None;
    } else if !was_completed || task.completed_at.is_none() {
        task.completed_at = Some(now);
    }
}

fn set_event_completed(event: &mut Event, completed: bool, now: DateTime<Utc>) {
    let was_completed = event.completed;
    event.completed = completed;
    if !completed {
        event.completed_at = None;
    } else if !was_completed || event.completed_at.is_none() {
        event.completed_at = Some(now);
    }
}

fn load_counters(storage: &dyn Storage) -> Counters {
    match storage.load(COUNTERS_KEY) {
        Ok(Some(data)) => serde_yaml::from_str(&data).unwrap_or_else(|err| {
            log::warn!("stored id counters are corrupt, deriving from records: {err}");
            Counters::default()
        }),
        Ok(None) => Counters::default(),
        Err(err) => {
            log::warn!("could not read id counters, deriving from records: {err:#}");
            Counters::default()
        }
    }
}

fn load_collection<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Vec<T> {
    let data = match storage.load(key) {
        Ok(Some(data)) => data,
        Ok(None) => return Vec::new(),
        Err(err) => {
            log::warn!("could not read `{key}`, starting empty: {err:#}");
            return Vec::new();
        }
    };
    match serde_yaml::from_str::<Option<Vec<T>>>(&data) {
        Ok(records) => records.unwrap_or_default(),
        Err(err) => {
            log::warn!("stored `{key}` is corrupt, starting empty: {err}");
            Vec::new()
        }
    }
}
