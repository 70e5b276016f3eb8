use crate::model::{Event, NewEvent, NewTask, RecordError, Task};
use crate::protocol::Action;
use crate::store::Store;

/// The record an action created, if any.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Nothing,
    Task(Task),
    Event(Event),
}

/// Applies at most one store mutation for an action. Persistence is the
/// store's business, not ours.
pub fn dispatch(store: &mut Store, action: Option<&Action>) -> Result<Dispatched, RecordError> {
    let Some(action) = action else {
        return Ok(Dispatched::Nothing);
    };
    let dispatched = match action {
        Action::AddTodo { title } => Dispatched::Task(store.add_task(NewTask::titled(title.as_str()))?),
        Action::AddEvent {
            title,
            date,
            image_index,
        } => {
            let mut new = NewEvent::new(title.as_str(), *date);
            new.image_index = *image_index;
            Dispatched::Event(store.add_event(new)?)
        }
    };
    log::info!("dispatched {}", describe(&dispatched));
    Ok(dispatched)
}

fn describe(dispatched: &Dispatched) -> String {
    match dispatched {
        Dispatched::Nothing => "nothing".to_string(),
        Dispatched::Task(task) => format!("add-todo -> task {}", task.id),
        Dispatched::Event(event) => format!("add-event -> event {}", event.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::ChatSession;
    use crate::clock::{Clock, FixedClock};
    use crate::model::TaskStatus;
    use crate::storage::{MemoryStorage, COUNTERS_KEY, EVENTS_KEY, TASKS_KEY};
    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn store() -> Store {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap(),
        ));
        Store::open(Arc::new(MemoryStorage::new()), clock).unwrap()
    }

    struct Harness {
        store: Store,
        storage: Arc<MemoryStorage>,
        clock: Arc<FixedClock>,
        chat: ChatSession,
    }

    impl Harness {
        fn new() -> Self {
            let storage = Arc::new(MemoryStorage::new());
            let clock = Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2025, 5, 1, 14, 30, 0).unwrap(),
            ));
            let store = Store::open(storage.clone(), clock.clone()).unwrap();
            Harness {
                store,
                storage,
                clock,
                chat: ChatSession::new(StdRng::seed_from_u64(3)),
            }
        }

        /// Sends a message through the local grammar and applies its action.
        fn say(&mut self, message: &str) -> (String, Dispatched) {
            let reply = self.chat.complete(message, None, self.clock.now());
            let dispatched = dispatch(&mut self.store, reply.action.as_ref()).unwrap();
            self.store.flush();
            (reply.message, dispatched)
        }
    }

    #[test]
    fn chat_add_task_lands_in_store_and_storage() {
        let mut h = Harness::new();
        let (message, dispatched) = h.say("add task: buy groceries");
        assert!(message.contains("buy groceries"));
        assert!(matches!(dispatched, Dispatched::Task(_)));

        assert_eq!(h.store.tasks().len(), 1);
        let task = &h.store.tasks()[0];
        assert_eq!(task.title, "buy groceries");
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert!(h.store.events().is_empty());

        let saved = h.storage.get(TASKS_KEY).unwrap();
        assert!(saved.contains("buy groceries"));
        assert!(h.storage.get(EVENTS_KEY).is_none());
    }

    #[test]
    fn chat_schedule_tomorrow_lands_one_day_later() {
        let mut h = Harness::new();
        let invoked = h.clock.now();
        let (_, dispatched) = h.say("schedule lunch with Amy on tomorrow");
        assert!(matches!(dispatched, Dispatched::Event(_)));

        assert_eq!(h.store.events().len(), 1);
        let event = &h.store.events()[0];
        assert_eq!(event.title, "lunch with Amy");
        assert_eq!(event.date, invoked + Duration::days(1));
        assert!(matches!(event.image_index, Some(1..=4)));
        assert!(h.store.tasks().is_empty());

        let saved = h.storage.get(EVENTS_KEY).unwrap();
        assert!(saved.contains("lunch with Amy"));
    }

    #[test]
    fn chat_with_unknown_date_changes_nothing() {
        let mut h = Harness::new();
        let (message, dispatched) = h.say("schedule team sync on banana");
        assert_eq!(dispatched, Dispatched::Nothing);
        assert!(message.contains("banana"));
        assert!(h.store.tasks().is_empty());
        assert!(h.store.events().is_empty());
        assert!(h.storage.get(TASKS_KEY).is_none());
        assert!(h.storage.get(EVENTS_KEY).is_none());
        assert!(h.storage.get(COUNTERS_KEY).is_none());
    }

    #[test]
    fn no_action_leaves_store_alone() {
        let mut store = store();
        assert_eq!(dispatch(&mut store, None), Ok(Dispatched::Nothing));
        assert!(store.tasks().is_empty());
        assert!(store.events().is_empty());
    }

    #[test]
    fn add_todo_creates_a_default_task() {
        let mut store = store();
        let action = Action::AddTodo {
            title: "buy groceries".into(),
        };
        let Ok(Dispatched::Task(task)) = dispatch(&mut store, Some(&action)) else {
            panic!("expected a task");
        };
        assert_eq!(task.title, "buy groceries");
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert!(task.description.is_none());
        assert!(task.due_date.is_none());
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn add_event_carries_date_and_image() {
        let mut store = store();
        let date = Utc.with_ymd_and_hms(2025, 5, 2, 12, 0, 0).unwrap();
        let action = Action::AddEvent {
            title: "lunch".into(),
            date,
            image_index: Some(2),
        };
        let Ok(Dispatched::Event(event)) = dispatch(&mut store, Some(&action)) else {
            panic!("expected an event");
        };
        assert_eq!(event.date, date);
        assert_eq!(event.image_index, Some(2));
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn remote_action_with_blank_title_is_rejected() {
        let mut store = store();
        let action = Action::AddTodo { title: "  ".into() };
        assert_eq!(
            dispatch(&mut store, Some(&action)),
            Err(RecordError::EmptyTitle)
        );
        assert!(store.tasks().is_empty());
    }
}
