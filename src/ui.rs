use crate::assistant::{AssistantError, ChatSession, RemoteAssistant};
use crate::clock::Clock;
use crate::commands::format_when;
use crate::config::Config;
use crate::dispatch::{dispatch, Dispatched};
use crate::model::{Event as CalendarEvent, RecordId, Task, TaskStatus, TaskUpdate};
use crate::protocol::{Reply, Sender as Speaker};
use crate::store::Store;
use crate::views::{events_grouped_by_date, filtered_tasks, is_past_due, StatusFilter};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::cell::Cell;
use std::io::{stdout, Stdout};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};

pub fn run(store: Store, config: &Config, clock: Arc<dyn Clock>) -> Result<()> {
    let runtime = Runtime::new().context("starting async runtime")?;
    let data_dir = config.data_dir()?.display().to_string();
    let mut terminal = setup_terminal()?;
    let mut app = App::new(
        store,
        clock,
        config.remote_assistant(),
        runtime.handle().clone(),
        data_dir,
    );
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal)?;
    app.store.flush();
    log::info!("tui closed; pending writes flushed");
    drop(app);
    runtime.shutdown_background();
    result
}

/// A remote answer travelling back from the runtime to the UI thread.
struct RemoteOutcome {
    message: String,
    outcome: Result<Reply, AssistantError>,
}

struct App {
    store: Store,
    clock: Arc<dyn Clock>,
    chat: ChatSession,
    remote: Option<RemoteAssistant>,
    runtime: Handle,
    outcomes_tx: Sender<RemoteOutcome>,
    outcomes_rx: Receiver<RemoteOutcome>,
    awaiting: Vec<String>,
    data_dir: String,
    last_change: Rc<Cell<Option<Instant>>>,
    focus: Focus,
    mode: Mode,
    filter: StatusFilter,
    search: String,
    input: String,
    selected_task: usize,
    selected_event: usize,
    status: String,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Focus {
    Tasks,
    Events,
    Chat,
}

enum Mode {
    Normal,
    Searching,
    ConfirmDelete(Target),
}

#[derive(Copy, Clone)]
enum Target {
    Task(RecordId),
    Event(RecordId),
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Tasks => Focus::Events,
            Focus::Events => Focus::Chat,
            Focus::Chat => Focus::Tasks,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Focus::Tasks => "tasks",
            Focus::Events => "events",
            Focus::Chat => "chat",
        }
    }
}

impl App {
    fn new(
        mut store: Store,
        clock: Arc<dyn Clock>,
        remote: Option<RemoteAssistant>,
        runtime: Handle,
        data_dir: String,
    ) -> Self {
        let last_change = Rc::new(Cell::new(None));
        let stamp = last_change.clone();
        store.subscribe(move |_| stamp.set(Some(Instant::now())));
        let (outcomes_tx, outcomes_rx) = mpsc::channel();
        let status = format!(
            "Loaded {} tasks and {} events",
            store.tasks().len(),
            store.events().len()
        );
        App {
            store,
            clock,
            chat: ChatSession::new(StdRng::from_entropy()),
            remote,
            runtime,
            outcomes_tx,
            outcomes_rx,
            awaiting: Vec::new(),
            data_dir,
            last_change,
            focus: Focus::Tasks,
            mode: Mode::Normal,
            filter: StatusFilter::All,
            search: String::new(),
            input: String::new(),
            selected_task: 0,
            selected_event: 0,
            status,
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.drain_remote_outcomes();
            terminal.draw(|f| self.draw(f))?;
            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Searching => {
                self.handle_search_key(key);
                false
            }
            Mode::ConfirmDelete(target) => {
                self.handle_confirm_key(key, target);
                false
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Tab {
            self.focus = self.focus.next();
            return false;
        }
        if self.focus == Focus::Chat {
            self.handle_chat_key(key);
            return false;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('f') if self.focus == Focus::Tasks => {
                self.filter = self.filter.cycle();
                self.selected_task = 0;
            }
            KeyCode::Char('/') if self.focus == Focus::Tasks => {
                self.mode = Mode::Searching;
            }
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('s') if self.focus == Focus::Tasks => self.cycle_selected_status(),
            KeyCode::Char('d') => {
                if let Some(target) = self.selected_target() {
                    self.mode = Mode::ConfirmDelete(target);
                }
            }
            KeyCode::Char('c') => self.focus = Focus::Chat,
            _ => {}
        }
        false
    }

    fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.focus = Focus::Tasks,
            KeyCode::Enter => self.send_message(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(ch) => self.input.push(ch),
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.mode = Mode::Normal,
            KeyCode::Esc => {
                self.search.clear();
                self.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                self.search.pop();
            }
            KeyCode::Char(ch) => self.search.push(ch),
            _ => {}
        }
        self.selected_task = 0;
    }

    fn handle_confirm_key(&mut self, key: KeyEvent, target: Target) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                let (removed, label) = match target {
                    Target::Task(id) => (self.store.delete_task(id), format!("task {id}")),
                    Target::Event(id) => (self.store.delete_event(id), format!("event {id}")),
                };
                self.status = if removed {
                    format!("Deleted {label}")
                } else {
                    format!("{label} was already gone")
                };
                self.mode = Mode::Normal;
                self.clamp_selection();
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                self.mode = Mode::Normal;
                self.status = "Delete cancelled".into();
            }
            _ => {}
        }
    }

    fn send_message(&mut self) {
        let message = self.input.trim().to_string();
        if message.is_empty() {
            return;
        }
        self.input.clear();
        match &self.remote {
            Some(remote) => {
                let request = self.chat.request(&message);
                let remote = remote.clone();
                let tx = self.outcomes_tx.clone();
                let pending = message.clone();
                self.runtime.spawn(async move {
                    let outcome = remote.ask(&request).await;
                    let _ = tx.send(RemoteOutcome {
                        message: pending,
                        outcome,
                    });
                });
                self.awaiting.push(message);
                self.status = "Asking the assistant...".into();
            }
            None => self.settle(&message, None),
        }
    }

    fn drain_remote_outcomes(&mut self) {
        while let Ok(RemoteOutcome { message, outcome }) = self.outcomes_rx.try_recv() {
            if let Some(pos) = self.awaiting.iter().position(|m| *m == message) {
                self.awaiting.remove(pos);
            }
            self.settle(&message, Some(outcome));
        }
    }

    fn settle(&mut self, message: &str, outcome: Option<Result<Reply, AssistantError>>) {
        let now = self.clock.now().with_timezone(&Local);
        let reply = self.chat.complete(message, outcome, now);
        self.status = match dispatch(&mut self.store, reply.action.as_ref()) {
            Ok(Dispatched::Nothing) => "No changes".into(),
            Ok(Dispatched::Task(task)) => format!("Added task {}", task.title),
            Ok(Dispatched::Event(event)) => {
                format!("Added event {} on {}", event.title, format_when(&event.date))
            }
            Err(err) => format!("Could not apply assistant action: {err}"),
        };
    }

    fn visible_tasks(&self) -> Vec<&Task> {
        filtered_tasks(self.store.tasks(), self.filter, &self.search)
    }

    fn visible_events(&self) -> Vec<(NaiveDate, &CalendarEvent)> {
        events_grouped_by_date(self.store.events(), &Local)
            .into_iter()
            .flat_map(|(day, events)| events.into_iter().map(move |e| (day, e)))
            .collect()
    }

    fn selected_target(&self) -> Option<Target> {
        match self.focus {
            Focus::Tasks => self
                .visible_tasks()
                .get(self.selected_task)
                .map(|t| Target::Task(t.id)),
            Focus::Events => self
                .visible_events()
                .get(self.selected_event)
                .map(|(_, e)| Target::Event(e.id)),
            Focus::Chat => None,
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = match self.focus {
            Focus::Tasks => self.visible_tasks().len(),
            Focus::Events => self.visible_events().len(),
            Focus::Chat => return,
        };
        let selected = if self.focus == Focus::Tasks {
            &mut self.selected_task
        } else {
            &mut self.selected_event
        };
        if len == 0 {
            *selected = 0;
            return;
        }
        *selected = (*selected as isize + delta).clamp(0, len as isize - 1) as usize;
    }

    fn clamp_selection(&mut self) {
        let tasks = self.visible_tasks().len();
        let events = self.visible_events().len();
        self.selected_task = self.selected_task.min(tasks.saturating_sub(1));
        self.selected_event = self.selected_event.min(events.saturating_sub(1));
    }

    fn toggle_selected(&mut self) {
        match self.selected_target() {
            Some(Target::Task(id)) => {
                if let Some(task) = self.store.toggle_task_complete(id) {
                    self.status = format!("{} is now {}", task.title, task.status);
                }
            }
            Some(Target::Event(id)) => {
                if let Some(event) = self.store.toggle_event_complete(id) {
                    let state = if event.completed { "done" } else { "open" };
                    self.status = format!("{} is {}", event.title, state);
                }
            }
            None => {}
        }
        self.clamp_selection();
    }

    fn cycle_selected_status(&mut self) {
        let Some(Target::Task(id)) = self.selected_target() else {
            return;
        };
        let Some(next) = self.store.task(id).map(|t| t.status.cycle()) else {
            return;
        };
        match self.store.update_task(id, TaskUpdate::status(next)) {
            Ok(Some(task)) => self.status = format!("{} is now {}", task.title, task.status),
            Ok(None) => {}
            Err(err) => self.status = err.to_string(),
        }
        self.clamp_selection();
    }

    fn draw(&self, f: &mut ratatui::Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(8),
                Constraint::Length(3),
            ])
            .split(f.size());
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(layout[1]);
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(body[1]);

        self.draw_header(f, layout[0]);
        self.draw_tasks(f, body[0]);
        self.draw_events(f, right[0]);
        self.draw_chat(f, right[1]);
        self.draw_footer(f, layout[2]);

        if let Mode::ConfirmDelete(target) = self.mode {
            self.draw_confirm(f, target);
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let saved = match self.last_change.get() {
            Some(at) => format!("saved {}", format_elapsed(at)),
            None => "no changes yet".into(),
        };
        let assistant = if self.remote.is_some() {
            "remote assistant"
        } else {
            "local assistant"
        };
        let title = Line::from(vec![
            Span::styled(
                "daybook ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(self.data_dir.clone(), Style::default().fg(Color::DarkGray)),
            Span::raw("  •  "),
            Span::styled(saved, Style::default().fg(Color::Gray)),
            Span::raw("  •  "),
            Span::styled(assistant, Style::default().fg(Color::Green)),
            Span::raw("  •  "),
            Span::styled(
                format!("focus {}", self.focus.label()),
                Style::default().fg(Color::Magenta),
            ),
        ]);
        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));
        f.render_widget(
            Paragraph::new(title).alignment(Alignment::Center).block(block),
            area,
        );
    }

    fn draw_tasks(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let now = self.clock.now();
        let tasks = self.visible_tasks();
        let items = tasks
            .iter()
            .map(|task| task_item(task, is_past_due(task, now)))
            .collect::<Vec<_>>();
        let mut title = format!("Tasks [{}] ({})", self.filter, tasks.len());
        if !self.search.is_empty() || matches!(self.mode, Mode::Searching) {
            title.push_str(&format!("  /{}", self.search));
        }
        let mut state = ListState::default();
        if !tasks.is_empty() {
            state.select(Some(self.selected_task.min(tasks.len() - 1)));
        }
        let list = List::new(items)
            .block(pane_block(title, self.focus == Focus::Tasks, Color::Yellow))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_events(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let events = self.visible_events();
        let mut items = Vec::new();
        let mut selected_row = None;
        let mut last_day = None;
        for (idx, (day, event)) in events.iter().enumerate() {
            if last_day != Some(*day) {
                items.push(ListItem::new(Line::from(Span::styled(
                    day.format("%a %Y-%m-%d").to_string(),
                    Style::default()
                        .fg(Color::LightBlue)
                        .add_modifier(Modifier::BOLD),
                ))));
                last_day = Some(*day);
            }
            if idx == self.selected_event {
                selected_row = Some(items.len());
            }
            items.push(event_item(event));
        }
        let mut state = ListState::default();
        state.select(selected_row);
        let list = List::new(items)
            .block(pane_block(
                format!("Events ({})", events.len()),
                self.focus == Focus::Events,
                Color::LightBlue,
            ))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_chat(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(3)])
            .split(area);
        let mut lines = Vec::new();
        for turn in self.chat.history() {
            let (who, color) = match turn.sender {
                Speaker::User => ("you", Color::Cyan),
                Speaker::Assistant => ("bot", Color::Green),
            };
            lines.push(Line::from(vec![
                Span::styled(format!("{who}: "), Style::default().fg(color)),
                Span::raw(turn.text.clone()),
            ]));
        }
        for pending in &self.awaiting {
            lines.push(Line::from(vec![
                Span::styled("you: ", Style::default().fg(Color::Cyan)),
                Span::raw(pending.clone()),
                Span::styled("  …", Style::default().fg(Color::DarkGray)),
            ]));
        }
        let visible = chunks[0].height.saturating_sub(2) as usize;
        let scroll = lines.len().saturating_sub(visible) as u16;
        let transcript = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .block(pane_block(
                "Assistant".to_string(),
                self.focus == Focus::Chat,
                Color::Green,
            ));
        f.render_widget(transcript, chunks[0]);

        let caret = if self.focus == Focus::Chat { "▏" } else { "" };
        let input = Paragraph::new(format!("{}{}", self.input, caret)).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Message")
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        f.render_widget(input, chunks[1]);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let help = match (&self.mode, self.focus) {
            (Mode::Searching, _) => "type to search • enter keep • esc clear",
            (Mode::ConfirmDelete(_), _) => "y confirm • n cancel",
            (Mode::Normal, Focus::Chat) => "type a message • enter send • esc back • tab focus",
            (Mode::Normal, Focus::Tasks) => {
                "j/k move • space toggle • s status • f filter • / search • d delete • c chat • tab focus • q quit"
            }
            (Mode::Normal, Focus::Events) => {
                "j/k move • space toggle • d delete • c chat • tab focus • q quit"
            }
        };
        let lines = vec![
            Line::from(Span::styled(
                self.status.clone(),
                Style::default().fg(Color::White),
            )),
            Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))),
        ];
        let block = Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray));
        f.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn draw_confirm(&self, f: &mut ratatui::Frame<'_>, target: Target) {
        let label = match target {
            Target::Task(id) => self
                .store
                .task(id)
                .map(|t| format!("task \"{}\"", t.title)),
            Target::Event(id) => self
                .store
                .event(id)
                .map(|e| format!("event \"{}\"", e.title)),
        }
        .unwrap_or_else(|| "this record".into());
        let area = centered_rect(50, 20, f.size());
        let text = vec![
            Line::from(format!("Delete {label}?")),
            Line::from(""),
            Line::from(Span::styled(
                "y to delete, n to keep",
                Style::default().fg(Color::DarkGray),
            )),
        ];
        let popup = Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .title("Confirm")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            );
        f.render_widget(Clear, area);
        f.render_widget(popup, area);
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn pane_block(title: String, focused: bool, accent: Color) -> Block<'static> {
    let modifier = if focused {
        Modifier::BOLD | Modifier::UNDERLINED
    } else {
        Modifier::BOLD
    };
    Block::default()
        .title(Span::styled(title, Style::default().fg(accent).add_modifier(modifier)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { accent } else { Color::DarkGray }))
        .style(Style::default().bg(Color::Rgb(16, 18, 24)))
}

fn task_item(task: &Task, overdue: bool) -> ListItem<'static> {
    let mark = if task.completed { "[x] " } else { "[ ] " };
    let title_style = if task.completed {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default().fg(Color::White)
    };
    let mut spans = vec![
        Span::raw(mark),
        Span::styled(truncate_text(&task.title, 48), title_style),
        Span::raw("  "),
        Span::styled(task.status.to_string(), status_style(task)),
    ];
    if let Some(due) = task.due_date.as_ref() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("due {}", format_when(due)),
            Style::default().fg(if overdue { Color::LightRed } else { Color::Gray }),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn status_style(task: &Task) -> Style {
    match task.status {
        TaskStatus::NotStarted => Style::default().fg(Color::Gray),
        TaskStatus::InProgress => Style::default().fg(Color::LightBlue),
        TaskStatus::Completed => Style::default().fg(Color::Green),
    }
}

fn event_item(event: &CalendarEvent) -> ListItem<'static> {
    let mark = if event.completed { "  ✓ " } else { "  • " };
    let mut spans = vec![
        Span::raw(mark),
        Span::styled(
            event.date.with_timezone(&Local).format("%H:%M").to_string(),
            Style::default().fg(Color::Gray),
        ),
        Span::raw(" "),
        Span::styled(
            truncate_text(&event.title, 40),
            if event.completed {
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::CROSSED_OUT)
            } else {
                Style::default().fg(Color::White)
            },
        ),
    ];
    if let Some(minutes) = event.reminder {
        spans.push(Span::styled(
            format!("  ⏰{minutes}m"),
            Style::default().fg(Color::Yellow),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn truncate_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn format_elapsed(last: Instant) -> String {
    let secs = last.elapsed().as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
