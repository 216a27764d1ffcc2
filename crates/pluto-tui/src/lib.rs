// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use pluto_app::{
    Console, CycleOutcome, HistoryDirection, NodeRow, NodeTable, StormCommand, StormEvent,
    StormMessage, StormState, Summary, SummaryTone,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const TABLE_PAGE_ROWS: usize = 10;
const CONSOLE_PAGE_LINES: usize = 5;
const MAX_EVENTS_PER_TICK: usize = 2_000;
const QUERY_PROMPT: &str = "storm> ";
const ADDRESS_PLACEHOLDER: &str = "https://user@cortex.example.com";
const WELCOME_TEXT: &str = "Welcome to pluto, a terminal user-interface for Synapse!\nEnter your Cortex address below and press Enter to get started.";

/// What a query worker reports back to the UI loop.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    Message {
        request_id: u64,
        message: StormMessage,
    },
    Ended {
        request_id: u64,
    },
    Broken {
        request_id: u64,
        error: String,
    },
}

impl QueryEvent {
    fn into_command(self) -> StormCommand {
        match self {
            Self::Message {
                request_id,
                message,
            } => StormCommand::Message {
                request_id,
                message,
            },
            Self::Ended { request_id } => StormCommand::StreamEnded { request_id },
            Self::Broken { request_id, error } => StormCommand::StreamBroken { request_id, error },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    Query(QueryEvent),
}

/// The session endpoint as seen from the UI.
pub trait SessionRuntime {
    /// Authenticates against `address` and returns a label for the session.
    fn connect(&mut self, address: &str) -> Result<String>;
    /// Starts streaming `query`; every event must carry `request_id`.
    fn spawn_query(&mut self, request_id: u64, query: &str, tx: Sender<InternalEvent>)
    -> Result<()>;
    fn cancel_query(&mut self, _request_id: u64) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Login,
    Storm,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct LoginUiState {
    input: String,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct QueryUiState {
    input: String,
    browsing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct TablesUiState {
    selected: usize,
    offsets: HashMap<u64, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    screen: Screen,
    login: LoginUiState,
    query: QueryUiState,
    tables: TablesUiState,
    session_label: Option<String>,
    status_line: Option<String>,
    status_token: u64,
}

impl ViewData {
    fn with_address(address: &str) -> Self {
        Self {
            login: LoginUiState {
                input: address.to_owned(),
                error: None,
            },
            ..Self::default()
        }
    }
}

pub fn run_app<R: SessionRuntime>(
    state: &mut StormState,
    runtime: &mut R,
    address: &str,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::with_address(address);
    let (internal_tx, internal_rx) = mpsc::channel();

    let mut result: Result<()> = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(Duration::from_millis(120)).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if !has_event {
            continue;
        }

        match event::read().context("read event") {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                    break;
                }
            }
            Ok(_) => {}
            Err(error) => {
                result = Err(error);
                break;
            }
        }
    }

    if let Some(request_id) = state.in_flight() {
        let _ = runtime.cancel_query(request_id);
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: SessionRuntime>(
    state: &mut StormState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    for _ in 0..MAX_EVENTS_PER_TICK {
        let Ok(event) = rx.try_recv() else {
            return;
        };
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                view_data.status_line = None;
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Query(event) => {
                let events = state.dispatch(event.into_command());
                apply_storm_events(state, runtime, view_data, tx, &events);
            }
        }
    }
}

fn apply_storm_events<R: SessionRuntime>(
    state: &StormState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: &[StormEvent],
) {
    for event in events {
        match event {
            StormEvent::TablesCleared => {
                view_data.tables = TablesUiState::default();
            }
            StormEvent::CycleFinished {
                request_id,
                outcome: outcome @ (CycleOutcome::Failed | CycleOutcome::Canceled),
            } => {
                if let Err(error) = runtime.cancel_query(*request_id) {
                    warn!(request_id, %error, "stopping query worker failed");
                }
                if *outcome == CycleOutcome::Canceled {
                    emit_status(view_data, tx, "query canceled");
                }
            }
            _ => {}
        }
    }
    clamp_table_selection(state, view_data);
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    view_data.status_line = Some(message.into());
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: SessionRuntime>(
    state: &mut StormState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    match view_data.screen {
        Screen::Login => handle_login_key(runtime, view_data, internal_tx, key),
        Screen::Storm => {
            handle_storm_key(state, runtime, view_data, internal_tx, key);
            false
        }
    }
}

fn handle_login_key<R: SessionRuntime>(
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => return true,
        (KeyCode::Enter, _) => submit_login(runtime, view_data, internal_tx),
        (KeyCode::Backspace, _) => {
            view_data.login.input.pop();
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            view_data.login.input.clear();
        }
        (KeyCode::Char(ch), modifiers) => {
            if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT {
                view_data.login.input.push(ch);
            }
        }
        _ => {}
    }
    false
}

fn submit_login<R: SessionRuntime>(
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let address = view_data.login.input.trim().to_owned();
    if address.is_empty() {
        view_data.login.error = Some(format!(
            "enter a cortex address, for example {ADDRESS_PLACEHOLDER}"
        ));
        return;
    }

    match runtime.connect(&address) {
        Ok(label) => {
            view_data.login.error = None;
            view_data.screen = Screen::Storm;
            emit_status(view_data, internal_tx, format!("connected as {label}"));
            view_data.session_label = Some(label);
        }
        Err(error) => {
            warn!(%address, error = %format!("{error:#}"), "cortex login failed");
            view_data.login.error = Some(format!("{error:#}"));
        }
    }
}

fn handle_storm_key<R: SessionRuntime>(
    state: &mut StormState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if control => {
            if state.in_flight().is_some() {
                let events = state.dispatch(StormCommand::Cancel);
                apply_storm_events(state, runtime, view_data, internal_tx, &events);
            } else {
                emit_status(view_data, internal_tx, "no query running");
            }
        }
        KeyCode::Char('u') if control => state.console.scroll_up(CONSOLE_PAGE_LINES),
        KeyCode::Char('d') if control => state.console.scroll_down(CONSOLE_PAGE_LINES),
        KeyCode::Enter => submit_query(state, runtime, view_data, internal_tx),
        KeyCode::Up => history_older(state, view_data),
        KeyCode::Down => history_newer(state, view_data),
        KeyCode::Tab => select_table(state, view_data, 1),
        KeyCode::BackTab => select_table(state, view_data, -1),
        KeyCode::PageDown => scroll_table(state, view_data, TABLE_PAGE_ROWS as isize),
        KeyCode::PageUp => scroll_table(state, view_data, -(TABLE_PAGE_ROWS as isize)),
        KeyCode::Esc => view_data.query.input.clear(),
        KeyCode::Backspace => {
            view_data.query.input.pop();
        }
        KeyCode::Char(ch) => {
            if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                view_data.query.input.push(ch);
            }
        }
        _ => {}
    }
}

fn submit_query<R: SessionRuntime>(
    state: &mut StormState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let query = std::mem::take(&mut view_data.query.input);
    view_data.query.browsing = false;

    let events = state.dispatch(StormCommand::Submit(query.clone()));
    apply_storm_events(state, runtime, view_data, internal_tx, &events);

    let Some(request_id) = state.in_flight() else {
        return;
    };
    debug!(request_id, %query, "spawning query worker");
    if let Err(error) = runtime.spawn_query(request_id, &query, internal_tx.clone()) {
        let events = state.dispatch(StormCommand::StreamBroken {
            request_id,
            error: format!("{error:#}"),
        });
        apply_storm_events(state, runtime, view_data, internal_tx, &events);
    }
}

fn history_older(state: &mut StormState, view_data: &mut ViewData) {
    if !view_data.query.browsing {
        if let Some(entry) = state.history.current() {
            view_data.query.input = entry.to_owned();
            view_data.query.browsing = true;
        }
        return;
    }
    if let Some(entry) = state.history.navigate(HistoryDirection::Older) {
        view_data.query.input = entry.to_owned();
    }
}

fn history_newer(state: &mut StormState, view_data: &mut ViewData) {
    if !view_data.query.browsing {
        return;
    }
    if let Some(entry) = state.history.navigate(HistoryDirection::Newer) {
        view_data.query.input = entry.to_owned();
    }
}

fn select_table(state: &StormState, view_data: &mut ViewData, delta: isize) {
    let count = state.nodes.tables().len();
    if count == 0 {
        return;
    }
    let current = view_data.tables.selected.min(count - 1) as isize;
    view_data.tables.selected = (current + delta).rem_euclid(count as isize) as usize;
}

fn scroll_table(state: &StormState, view_data: &mut ViewData, delta: isize) {
    let Some(table) = state.nodes.tables().get(view_data.tables.selected) else {
        return;
    };
    let max = table.len().saturating_sub(1);
    let offset = view_data.tables.offsets.entry(table.id()).or_insert(0);
    *offset = offset.saturating_add_signed(delta).min(max);
}

fn clamp_table_selection(state: &StormState, view_data: &mut ViewData) {
    let count = state.nodes.tables().len();
    view_data.tables.selected = view_data.tables.selected.min(count.saturating_sub(1));
}

fn render(frame: &mut ratatui::Frame<'_>, state: &StormState, view_data: &ViewData) {
    match view_data.screen {
        Screen::Login => render_login(frame, view_data),
        Screen::Storm => render_storm(frame, state, view_data),
    }
}

fn render_login(frame: &mut ratatui::Frame<'_>, view_data: &ViewData) {
    let area = centered_rect(70, 40, frame.area());
    frame.render_widget(Clear, area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);

    let welcome = Paragraph::new(WELCOME_TEXT)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title("pluto")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
    frame.render_widget(welcome, layout[0]);

    let (visible, cursor) =
        input_window(&view_data.login.input, layout[1].width.saturating_sub(2));
    let (text, style) = if view_data.login.input.is_empty() {
        (
            ADDRESS_PLACEHOLDER.to_owned(),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (visible, Style::default())
    };
    let input = Paragraph::new(text)
        .style(style)
        .block(Block::default().title("cortex").borders(Borders::ALL));
    frame.render_widget(input, layout[1]);
    frame.set_cursor_position((
        layout[1].x.saturating_add(1).saturating_add(cursor),
        layout[1].y.saturating_add(1),
    ));

    if let Some(error) = &view_data.login.error {
        let error = Paragraph::new(error.as_str())
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(Color::Red));
        frame.render_widget(error, layout[2]);
    }
}

fn render_storm(frame: &mut ratatui::Frame<'_>, state: &StormState, view_data: &ViewData) {
    let console_height = (frame.area().height.saturating_mul(3) / 10).max(3);
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Min(3),
            Constraint::Length(console_height),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let prompt_width = text_width(QUERY_PROMPT);
    let (visible, cursor) = input_window(
        &view_data.query.input,
        layout[0].width.saturating_sub(2).saturating_sub(prompt_width),
    );
    let input = Paragraph::new(format!("{QUERY_PROMPT}{visible}"))
        .block(Block::default().title("query").borders(Borders::ALL));
    frame.render_widget(input, layout[0]);
    frame.set_cursor_position((
        layout[0]
            .x
            .saturating_add(1)
            .saturating_add(prompt_width)
            .saturating_add(cursor),
        layout[0].y.saturating_add(1),
    ));

    let tone = tone_color(state.summary.tone());
    let summary = Paragraph::new(summary_text(&state.summary))
        .alignment(Alignment::Center)
        .style(Style::default().fg(tone))
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(tone)),
        );
    frame.render_widget(summary, layout[1]);

    render_tables(frame, layout[2], state, view_data);

    let console_lines = console_window(
        &state.console,
        usize::from(layout[3].height.saturating_sub(2)),
    );
    let console = Paragraph::new(console_lines.join("\n"))
        .style(Style::default().fg(Color::Gray))
        .block(
            Block::default()
                .title(console_title(&state.console))
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::Cyan)),
        );
    frame.render_widget(console, layout[3]);

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(status, layout[4]);
}

fn render_tables(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &StormState,
    view_data: &ViewData,
) {
    let tables = state.nodes.tables();
    if tables.is_empty() {
        let empty = Paragraph::new("no nodes")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().title("nodes").borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    }

    let constraints = vec![Constraint::Ratio(1, tables.len() as u32); tables.len()];
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    for (index, (table, table_area)) in tables.iter().zip(areas.iter()).enumerate() {
        let selected = index == view_data.tables.selected;
        let offset = view_data
            .tables
            .offsets
            .get(&table.id())
            .copied()
            .unwrap_or(0);
        let visible = usize::from(table_area.height.saturating_sub(3));
        render_node_table(frame, *table_area, table, offset, visible, selected);
    }
}

fn render_node_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    table: &NodeTable,
    offset: usize,
    visible: usize,
    selected: bool,
) {
    let header = Row::new([
        Cell::from(table.form().to_owned()),
        Cell::from("props"),
        Cell::from("tags"),
    ])
    .style(
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let rows = table_window(table.rows(), offset, visible)
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let style = if (offset + index) % 2 == 1 {
                Style::default().bg(Color::Indexed(236))
            } else {
                Style::default()
            };
            Row::new([
                Cell::from(row.primary.clone()),
                Cell::from(row.props.clone()),
                Cell::from(row.tags.clone()),
            ])
            .style(style)
        });

    let border = if selected {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let widths = [
        Constraint::Percentage(35),
        Constraint::Percentage(45),
        Constraint::Percentage(20),
    ];
    let widget = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(table, offset, visible))
                .borders(Borders::ALL)
                .border_style(border),
        );
    frame.render_widget(widget, area);
}

fn table_window(rows: &[NodeRow], offset: usize, visible: usize) -> &[NodeRow] {
    let start = offset.min(rows.len());
    let end = start.saturating_add(visible).min(rows.len());
    &rows[start..end]
}

fn table_title(table: &NodeTable, offset: usize, visible: usize) -> String {
    if table.len() <= visible || visible == 0 {
        return format!("{} ({})", table.form(), table.len());
    }
    let last = offset.saturating_add(visible).min(table.len());
    format!(
        "{} ({}) {}-{}",
        table.form(),
        table.len(),
        offset.min(table.len()) + 1,
        last
    )
}

fn summary_text(summary: &Summary) -> String {
    summary.text()
}

fn tone_color(tone: SummaryTone) -> Color {
    match tone {
        SummaryTone::Neutral => Color::DarkGray,
        SummaryTone::Info => Color::Cyan,
        SummaryTone::Error => Color::Red,
        SummaryTone::Success => Color::Green,
    }
}

/// The `height` lines ending `scroll_back` entries above the newest one.
fn console_window(console: &Console, height: usize) -> Vec<String> {
    if height == 0 {
        return Vec::new();
    }
    let end = console.len().saturating_sub(console.scroll_back());
    let start = end.saturating_sub(height);
    console
        .lines()
        .skip(start)
        .take(end - start)
        .map(|line| line.display())
        .collect()
}

fn console_title(console: &Console) -> String {
    if console.scroll_back() == 0 {
        "console".to_owned()
    } else {
        format!("console (-{})", console.scroll_back())
    }
}

fn status_text(state: &StormState, view_data: &ViewData) -> String {
    let session = view_data.session_label.as_deref().unwrap_or("offline");
    let running = if state.in_flight().is_some() {
        " | ctrl+c cancel"
    } else {
        ""
    };
    let default = format!(
        "{session} | enter run | up/down history | tab table | pgup/pgdn rows | ctrl+u/d console{running} | ctrl+q"
    );
    match &view_data.status_line {
        Some(status) => format!("{status} | {default}"),
        None => default,
    }
}

fn text_width(text: &str) -> u16 {
    u16::try_from(text.chars().count()).unwrap_or(u16::MAX)
}

/// The tail of `text` that fits in `width` columns with room for the cursor,
/// and the cursor column within it.
fn input_window(text: &str, width: u16) -> (String, u16) {
    if width == 0 {
        return (String::new(), 0);
    }
    let count = text.chars().count();
    let room = usize::from(width - 1);
    if count <= room {
        return (text.to_owned(), text_width(text));
    }
    let visible = text.chars().skip(count - room).collect();
    (visible, width - 1)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        InternalEvent, QueryEvent, Screen, SessionRuntime, ViewData, console_window,
        handle_key_event, input_window, process_internal_events, render, status_text,
        table_title, table_window,
    };
    use anyhow::{Result, anyhow};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use pluto_app::{Console, NodeRow, StormLimits, StormMessage, StormState};
    use pluto_testkit::StormScript;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::mpsc;
    use time::macros::datetime;

    #[derive(Debug, Default)]
    struct TestRuntime {
        connect_error: Option<String>,
        connected: Vec<String>,
        scripts: HashMap<String, Vec<Value>>,
        spawned: Vec<(u64, String)>,
        canceled: Vec<u64>,
        spawn_error: Option<String>,
        hold_open: bool,
    }

    impl SessionRuntime for TestRuntime {
        fn connect(&mut self, address: &str) -> Result<String> {
            if let Some(error) = self.connect_error.take() {
                return Err(anyhow!("{error}"));
            }
            self.connected.push(address.to_owned());
            Ok(format!("visi@{address}"))
        }

        fn spawn_query(
            &mut self,
            request_id: u64,
            query: &str,
            tx: mpsc::Sender<InternalEvent>,
        ) -> Result<()> {
            self.spawned.push((request_id, query.to_owned()));
            if let Some(error) = self.spawn_error.take() {
                return Err(anyhow!("{error}"));
            }

            let script = self.scripts.get(query).cloned().unwrap_or_default();
            for raw in script {
                tx.send(InternalEvent::Query(QueryEvent::Message {
                    request_id,
                    message: StormMessage::from_wire(raw),
                }))
                .map_err(|_| anyhow!("channel closed"))?;
            }
            if !self.hold_open {
                tx.send(InternalEvent::Query(QueryEvent::Ended { request_id }))
                    .map_err(|_| anyhow!("channel closed"))?;
            }
            Ok(())
        }

        fn cancel_query(&mut self, request_id: u64) -> Result<()> {
            self.canceled.push(request_id);
            Ok(())
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    fn storm_view() -> ViewData {
        ViewData {
            screen: Screen::Storm,
            session_label: Some("visi@cortex".to_owned()),
            ..ViewData::default()
        }
    }

    struct Harness {
        state: StormState,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: mpsc::Sender<InternalEvent>,
        rx: mpsc::Receiver<InternalEvent>,
    }

    impl Harness {
        fn new(view_data: ViewData) -> Self {
            let (tx, rx) = mpsc::channel();
            Self {
                state: StormState::new(StormLimits::default()),
                runtime: TestRuntime::default(),
                view_data,
                tx,
                rx,
            }
        }

        fn press(&mut self, event: KeyEvent) -> bool {
            let quit = handle_key_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                event,
            );
            self.pump();
            quit
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.press(key(KeyCode::Char(ch)));
            }
        }

        fn submit(&mut self, query: &str) {
            self.type_text(query);
            self.press(key(KeyCode::Enter));
        }

        fn pump(&mut self) {
            process_internal_events(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
            );
        }

        fn screen_text(&self) -> String {
            let mut terminal =
                Terminal::new(TestBackend::new(120, 40)).expect("test terminal should build");
            terminal
                .draw(|frame| render(frame, &self.state, &self.view_data))
                .expect("frame should draw");
            terminal
                .backend()
                .buffer()
                .content()
                .iter()
                .map(|cell| cell.symbol())
                .collect()
        }
    }

    #[test]
    fn login_enter_connects_and_switches_screen() {
        let mut harness = Harness::new(ViewData::with_address("https://visi@cortex"));
        harness.press(key(KeyCode::Enter));

        assert_eq!(harness.runtime.connected, vec!["https://visi@cortex"]);
        assert_eq!(harness.view_data.screen, Screen::Storm);
        assert_eq!(
            harness.view_data.session_label.as_deref(),
            Some("visi@https://visi@cortex")
        );
    }

    #[test]
    fn login_failure_stays_on_login_with_error() {
        let mut harness = Harness::new(ViewData::with_address("aha://visi@cortex"));
        harness.runtime.connect_error = Some("telepath scheme \"aha\" is not supported".into());
        harness.press(key(KeyCode::Enter));

        assert_eq!(harness.view_data.screen, Screen::Login);
        let error = harness.view_data.login.error.clone().unwrap_or_default();
        assert!(error.contains("not supported"));
        assert!(harness.screen_text().contains("not supported"));
    }

    #[test]
    fn blank_login_prompts_for_address() {
        let mut harness = Harness::new(ViewData::default());
        harness.press(key(KeyCode::Enter));
        assert!(harness.runtime.connected.is_empty());
        assert!(harness.view_data.login.error.is_some());
    }

    #[test]
    fn esc_quits_from_login_and_ctrl_q_quits_anywhere() {
        let mut harness = Harness::new(ViewData::default());
        assert!(harness.press(key(KeyCode::Esc)));

        let mut harness = Harness::new(storm_view());
        assert!(!harness.press(key(KeyCode::Esc)));
        assert!(harness.press(ctrl('q')));
    }

    #[test]
    fn submitted_query_streams_into_tables_and_summary() {
        let mut harness = Harness::new(storm_view());
        harness.runtime.scripts.insert(
            "inet:ipv4".to_owned(),
            StormScript::new()
                .init("inet:ipv4")
                .ipv4_nodes(250)
                .fini(250, 1500)
                .build(),
        );

        harness.submit("inet:ipv4");

        assert_eq!(harness.runtime.spawned, vec![(1, "inet:ipv4".to_owned())]);
        assert_eq!(harness.state.in_flight(), None);
        assert_eq!(harness.state.summary.text(), "250 in 1.50s");
        assert_eq!(harness.state.nodes.tables().len(), 1);
        assert_eq!(harness.state.nodes.row_count(), 250);
        assert!(harness.view_data.query.input.is_empty());

        let screen = harness.screen_text();
        assert!(screen.contains("250 in 1.50s"));
        assert!(screen.contains("inet:ipv4 (250)"));
        assert!(screen.contains("10.0.0.0"));
    }

    #[test]
    fn immediate_failure_keeps_previous_tables() {
        let mut harness = Harness::new(storm_view());
        harness.runtime.scripts.insert(
            "inet:fqdn".to_owned(),
            StormScript::new()
                .message(pluto_testkit::fqdn("vertex.link"))
                .fini(1, 4)
                .build(),
        );
        harness.runtime.scripts.insert(
            "inet:ipv4 | bad".to_owned(),
            StormScript::new().err("StormRuntimeError", "boom").build(),
        );

        harness.submit("inet:fqdn");
        harness.submit("inet:ipv4 | bad");

        assert_eq!(harness.state.summary.text(), "StormRuntimeError: boom");
        assert_eq!(harness.state.nodes.row_count(), 1);
        assert!(harness.runtime.canceled.contains(&2));
        assert!(harness.screen_text().contains("StormRuntimeError: boom"));
    }

    #[test]
    fn resubmitting_while_running_cancels_prior_worker() {
        let mut harness = Harness::new(storm_view());
        harness.runtime.hold_open = true;

        harness.submit("inet:ipv4");
        assert_eq!(harness.state.in_flight(), Some(1));

        harness.submit("inet:fqdn");
        assert_eq!(harness.runtime.canceled, vec![1]);
        assert_eq!(harness.state.in_flight(), Some(2));
        assert_eq!(harness.state.summary.text(), "running...");

        harness
            .tx
            .send(InternalEvent::Query(QueryEvent::Message {
                request_id: 1,
                message: StormMessage::from_wire(pluto_testkit::ipv4(1)),
            }))
            .expect("channel open");
        harness
            .tx
            .send(InternalEvent::Query(QueryEvent::Ended { request_id: 1 }))
            .expect("channel open");
        harness.pump();
        assert!(harness.state.nodes.is_empty());
        assert_eq!(harness.state.in_flight(), Some(2));
    }

    #[test]
    fn ctrl_c_cancels_running_query() {
        let mut harness = Harness::new(storm_view());
        harness.runtime.hold_open = true;
        harness.submit("inet:ipv4");

        harness.press(ctrl('c'));
        assert_eq!(harness.runtime.canceled, vec![1]);
        assert_eq!(harness.state.in_flight(), None);
        assert_eq!(harness.state.summary.text(), "Canceled: query canceled");
        assert_eq!(
            harness.view_data.status_line.as_deref(),
            Some("query canceled")
        );

        harness.press(ctrl('c'));
        assert_eq!(
            harness.view_data.status_line.as_deref(),
            Some("no query running")
        );
    }

    #[test]
    fn spawn_failure_reports_stream_error() {
        let mut harness = Harness::new(storm_view());
        harness.runtime.spawn_error = Some("cannot reach cortex".to_owned());
        harness.submit("inet:ipv4");

        assert_eq!(
            harness.state.summary.text(),
            "StreamError: cannot reach cortex"
        );
        assert_eq!(harness.state.in_flight(), None);
    }

    #[test]
    fn up_recalls_newest_then_walks_older() {
        let mut harness = Harness::new(storm_view());
        harness.submit("A");
        harness.submit("B");
        harness.submit("C");

        harness.press(key(KeyCode::Up));
        assert_eq!(harness.view_data.query.input, "C");
        harness.press(key(KeyCode::Up));
        assert_eq!(harness.view_data.query.input, "B");
        harness.press(key(KeyCode::Up));
        assert_eq!(harness.view_data.query.input, "A");
        harness.press(key(KeyCode::Up));
        assert_eq!(harness.view_data.query.input, "A");

        harness.press(key(KeyCode::Down));
        assert_eq!(harness.view_data.query.input, "B");
        harness.press(key(KeyCode::Down));
        harness.press(key(KeyCode::Down));
        assert_eq!(harness.view_data.query.input, "C");
    }

    #[test]
    fn repeated_query_is_recorded_once() {
        let mut harness = Harness::new(storm_view());
        harness.submit("inet:ipv4");
        harness.submit("inet:ipv4");
        assert_eq!(harness.state.history.len(), 1);
        assert_eq!(harness.runtime.spawned.len(), 2);
    }

    #[test]
    fn tab_cycles_tables_and_page_down_scrolls() {
        let mut harness = Harness::new(storm_view());
        let mut script = StormScript::new().ipv4_nodes(30);
        script = script.message(pluto_testkit::fqdn("vertex.link"));
        harness
            .runtime
            .scripts
            .insert("mixed".to_owned(), script.fini(31, 9).build());
        harness.submit("mixed");

        assert_eq!(harness.view_data.tables.selected, 0);
        harness.press(key(KeyCode::PageDown));
        let ipv4_id = harness.state.nodes.tables()[0].id();
        assert_eq!(harness.view_data.tables.offsets.get(&ipv4_id), Some(&10));

        harness.press(key(KeyCode::Tab));
        assert_eq!(harness.view_data.tables.selected, 1);
        harness.press(key(KeyCode::Tab));
        assert_eq!(harness.view_data.tables.selected, 0);
        harness.press(key(KeyCode::BackTab));
        assert_eq!(harness.view_data.tables.selected, 1);

        harness.press(key(KeyCode::PageDown));
        let fqdn_id = harness.state.nodes.tables()[1].id();
        assert_eq!(harness.view_data.tables.offsets.get(&fqdn_id), Some(&0));
    }

    #[test]
    fn print_messages_show_in_console() {
        let mut harness = Harness::new(storm_view());
        harness.runtime.scripts.insert(
            "$lib.print(hello)".to_owned(),
            StormScript::new().print("hello").fini(0, 1).build(),
        );
        harness.submit("$lib.print(hello)");

        assert_eq!(harness.state.console.len(), 1);
        assert!(harness.screen_text().contains(" - hello"));
    }

    #[test]
    fn console_window_follows_newest_lines() {
        let mut console = Console::new(10);
        console.print_at("a\nb\nc\nd\ne", datetime!(2026-01-09 0:00 UTC));

        let window = console_window(&console, 2);
        assert_eq!(
            window,
            vec!["2026-01-09 00:00:00 - d", "2026-01-09 00:00:00 - e"]
        );

        console.scroll_up(2);
        let window = console_window(&console, 2);
        assert_eq!(
            window,
            vec!["2026-01-09 00:00:00 - b", "2026-01-09 00:00:00 - c"]
        );
        assert!(console_window(&console, 0).is_empty());
    }

    #[test]
    fn table_window_clamps_to_rows() {
        let rows = (0..5)
            .map(|index| NodeRow {
                primary: index.to_string(),
                props: String::new(),
                tags: String::new(),
            })
            .collect::<Vec<_>>();

        assert_eq!(table_window(&rows, 3, 10).len(), 2);
        assert!(table_window(&rows, 9, 10).is_empty());
        assert_eq!(table_window(&rows, 0, 2)[1].primary, "1");
    }

    #[test]
    fn table_title_shows_range_only_when_scrolled_content_overflows() {
        let mut state = StormState::default();
        state.run_stream(
            "inet:ipv4",
            (0..20).map(|index| StormMessage::from_wire(pluto_testkit::ipv4(index))),
        );
        let table = &state.nodes.tables()[0];

        assert_eq!(table_title(table, 0, 50), "inet:ipv4 (20)");
        assert_eq!(table_title(table, 5, 10), "inet:ipv4 (20) 6-15");
    }

    #[test]
    fn status_text_mentions_cancel_only_while_running() {
        let mut harness = Harness::new(storm_view());
        assert!(!status_text(&harness.state, &harness.view_data).contains("ctrl+c"));

        harness.runtime.hold_open = true;
        harness.submit("inet:ipv4");
        let status = status_text(&harness.state, &harness.view_data);
        assert!(status.contains("ctrl+c cancel"));
        assert!(status.starts_with("visi@cortex"));
    }

    #[test]
    fn blank_query_is_still_submitted() {
        let mut harness = Harness::new(storm_view());
        harness.submit("  ");
        harness.press(key(KeyCode::Enter));

        assert_eq!(
            harness.runtime.spawned,
            vec![(1, "  ".to_owned()), (2, String::new())]
        );
        assert!(harness.view_data.query.input.is_empty());
    }

    #[test]
    fn oversized_input_renders_its_tail() {
        let mut harness = Harness::new(storm_view());
        harness.view_data.query.input = format!("{}tail", "a".repeat(70_000));
        let screen = harness.screen_text();
        assert!(screen.contains("storm> aaa"));
        assert!(screen.contains("aaatail"));

        let mut harness = Harness::new(ViewData::with_address(&"b".repeat(70_000)));
        assert!(harness.screen_text().contains("bbbb"));
        harness.press(key(KeyCode::Char('z')));
        assert!(harness.screen_text().contains("bbbz"));
    }

    #[test]
    fn input_window_keeps_a_cell_for_the_cursor() {
        assert_eq!(input_window("abc", 10), ("abc".to_owned(), 3));
        assert_eq!(input_window("abcdef", 4), ("def".to_owned(), 3));
        assert_eq!(input_window("abcdef", 0), (String::new(), 0));
        assert_eq!(input_window("", 1), (String::new(), 0));
        assert_eq!(input_window("ab", 1), (String::new(), 0));
    }

    #[test]
    fn node_tags_render_in_their_own_column() {
        let mut harness = Harness::new(storm_view());
        let tagged = json!(["node", [["inet:fqdn", "vertex.link"], {
            "repr": "vertex.link",
            "props": {},
            "tags": {"rep.feed": [null, null]}
        }]]);
        harness.runtime.scripts.insert(
            "inet:fqdn#rep".to_owned(),
            StormScript::new().message(tagged).fini(1, 2).build(),
        );
        harness.submit("inet:fqdn#rep");

        let screen = harness.screen_text();
        assert!(screen.contains("tags"));
        assert!(screen.contains("#rep.feed"));
    }
}
