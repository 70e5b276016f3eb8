use crate::dates::ResolveDate;
use crate::model::IMAGE_COUNT;
use crate::protocol::{Action, ChatMessage, Reply};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static ADD_TODO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:add task|add todo|create task)(?::|\s)\s*(?P<title>.*)").unwrap()
});

static ADD_EVENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:add event|schedule|create event):?\s*(?P<title>.+?)\s+(?:on|for)\s+(?P<date>.+)")
        .unwrap()
});

pub const HELP_REPLIES: [&str; 3] = [
    "I can help you manage your tasks and calendar. Try something like 'add task: buy groceries' or 'schedule meeting with John on tomorrow'.",
    "I'm your personal assistant. I can add tasks to your todo list or events to your calendar. What would you like to do?",
    "Not sure what you mean. You can ask me to 'add task: finish report' or 'create event: lunch with Amy on friday'.",
];

/// What a rule needs from the outside world: dates relative to now and
/// a random source for decorative fields.
pub struct ParseContext<'a> {
    pub dates: &'a dyn ResolveDate,
    pub rng: &'a mut dyn RngCore,
}

type Extract = fn(&Captures<'_>, &mut ParseContext<'_>) -> Option<Reply>;

/// One grammar rule: a pattern that decides whether the rule applies and an
/// extractor that turns the captures into a reply. An extractor returning
/// `None` means the phrasing was malformed and evaluation moves on.
pub struct Rule {
    pub name: &'static str,
    pattern: &'static LazyLock<Regex>,
    extract: Extract,
}

impl Rule {
    pub fn add_todo() -> Self {
        Rule {
            name: "add-todo",
            pattern: &ADD_TODO_RE,
            extract: extract_todo,
        }
    }

    pub fn add_event() -> Self {
        Rule {
            name: "add-event",
            pattern: &ADD_EVENT_RE,
            extract: extract_event,
        }
    }

    pub fn apply(&self, message: &str, ctx: &mut ParseContext<'_>) -> Option<Reply> {
        let captures = self.pattern.captures(message)?;
        (self.extract)(&captures, ctx)
    }
}

/// Ordered rule list; the first rule producing a reply wins.
pub struct IntentParser {
    rules: Vec<Rule>,
}

impl Default for IntentParser {
    fn default() -> Self {
        IntentParser::new(vec![Rule::add_todo(), Rule::add_event()])
    }
}

impl IntentParser {
    pub fn new(rules: Vec<Rule>) -> Self {
        IntentParser { rules }
    }

    #[cfg(test)]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Maps a message to a reply and at most one action. Never fails.
    ///
    /// `history` is accepted so callers can pass the same conversation the
    /// remote assistant sees; the grammar only looks at `message`.
    pub fn parse(
        &self,
        message: &str,
        _history: &[ChatMessage],
        ctx: &mut ParseContext<'_>,
    ) -> Reply {
        let message = message.trim();
        if !message.is_empty() {
            for rule in &self.rules {
                if let Some(reply) = rule.apply(message, ctx) {
                    log::debug!("message matched rule `{}`", rule.name);
                    return reply;
                }
            }
        }
        let help = HELP_REPLIES
            .choose(&mut *ctx.rng)
            .copied()
            .unwrap_or(HELP_REPLIES[0]);
        Reply::text(help)
    }
}

fn extract_todo(captures: &Captures<'_>, _ctx: &mut ParseContext<'_>) -> Option<Reply> {
    let title = non_empty(captures.name("title")?.as_str())?;
    Some(Reply::with_action(
        format!("I've added \"{title}\" to your todo list! Is there anything else you'd like me to do?"),
        Action::AddTodo { title },
    ))
}

fn extract_event(captures: &Captures<'_>, ctx: &mut ParseContext<'_>) -> Option<Reply> {
    let title = non_empty(captures.name("title")?.as_str())?;
    let token = non_empty(captures.name("date")?.as_str())?;
    let date = match ctx.dates.resolve(&token) {
        Ok(date) => date,
        Err(failure) => {
            log::debug!("{failure}");
            return Some(Reply::text(format!(
                "I'm not sure about the date \"{token}\". Could you try again with a format like \"tomorrow\" or \"May 15, 2025\"?"
            )));
        }
    };
    let image_index = ctx.rng.gen_range(1..=IMAGE_COUNT);
    Some(Reply::with_action(
        format!(
            "Great! I've added \"{title}\" to your calendar for {}. Anything else you'd like to add?",
            ctx.dates.describe(&date)
        ),
        Action::AddEvent {
            title,
            date,
            image_index: Some(image_index),
        },
    ))
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateResolver;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 14, 30, 0).unwrap()
    }

    fn parse(message: &str) -> Reply {
        let dates = DateResolver::new(now());
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = ParseContext {
            dates: &dates,
            rng: &mut rng,
        };
        IntentParser::default().parse(message, &[], &mut ctx)
    }

    #[test]
    fn rules_are_ordered_todo_first() {
        let parser = IntentParser::default();
        let names: Vec<_> = parser.rules().iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["add-todo", "add-event"]);
    }

    #[test]
    fn add_task_with_colon() {
        let reply = parse("add task: buy groceries");
        assert_eq!(
            reply.action,
            Some(Action::AddTodo {
                title: "buy groceries".into()
            })
        );
        assert!(reply.message.contains("buy groceries"));
    }

    #[test]
    fn todo_triggers_are_case_insensitive_and_keep_title_case() {
        for message in [
            "Add Todo pick up Dry Cleaning",
            "please CREATE TASK:   pick up Dry Cleaning  ",
            "add todo:pick up Dry Cleaning",
        ] {
            assert_eq!(
                parse(message).action,
                Some(Action::AddTodo {
                    title: "pick up Dry Cleaning".into()
                }),
                "{message}"
            );
        }
    }

    #[test]
    fn todo_trigger_needs_separator_and_remainder() {
        assert_eq!(parse("add task:").action, None);
        assert_eq!(parse("add task   ").action, None);
        assert_eq!(parse("add tasks later").action, None);
    }

    #[test]
    fn schedule_on_tomorrow() {
        let reply = parse("schedule lunch with Amy on tomorrow");
        match reply.action {
            Some(Action::AddEvent {
                title,
                date,
                image_index,
            }) => {
                assert_eq!(title, "lunch with Amy");
                assert_eq!(date, now() + Duration::days(1));
                assert!(matches!(image_index, Some(1..=4)));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(reply.message.contains("Fri, May 2, 2025"));
    }

    #[test]
    fn event_splits_on_first_on_or_for() {
        let reply = parse("create event: dinner for two on 2025-06-01");
        assert_eq!(reply.action, None);
        assert!(reply.message.contains("\"two on 2025-06-01\""));
    }

    #[test]
    fn event_for_literal_date() {
        let reply = parse("add event team offsite for May 15, 2025");
        match reply.action {
            Some(Action::AddEvent { title, date, .. }) => {
                assert_eq!(title, "team offsite");
                assert_eq!(date, Utc.with_ymd_and_hms(2025, 5, 15, 0, 0, 0).unwrap());
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn unresolvable_date_asks_for_clarification() {
        let reply = parse("schedule team sync on banana");
        assert_eq!(reply.action, None);
        assert!(reply.message.contains("banana"));
        assert!(reply.message.contains("tomorrow"));
        assert!(!HELP_REPLIES.contains(&reply.message.as_str()));
    }

    #[test]
    fn event_without_date_clause_falls_back_to_help() {
        let reply = parse("schedule a haircut");
        assert_eq!(reply.action, None);
        assert!(HELP_REPLIES.contains(&reply.message.as_str()));
    }

    #[test]
    fn todo_wins_when_both_categories_match() {
        let reply = parse("add task: schedule dentist on friday");
        assert_eq!(
            reply.action,
            Some(Action::AddTodo {
                title: "schedule dentist on friday".into()
            })
        );
    }

    #[test]
    fn malformed_todo_falls_through_to_event() {
        let reply = parse("add tasks? no, schedule review on tomorrow");
        match reply.action {
            Some(Action::AddEvent { title, .. }) => assert_eq!(title, "review"),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn nonsense_and_blank_messages_get_help() {
        for message in ["", "   ", "what's the weather?"] {
            let reply = parse(message);
            assert_eq!(reply.action, None);
            assert!(HELP_REPLIES.contains(&reply.message.as_str()));
        }
    }

    #[test]
    fn seeded_rng_pins_image_index() {
        let first = parse("schedule gym on today");
        let second = parse("schedule gym on today");
        assert_eq!(first, second);
    }
}
