use anyhow::{Context, Result};
use crossbeam::channel::Receiver;
use crossterm::{
    event::{
        self, Event as CrosstermEvent, KeyCode, KeyEvent as CrosstermKeyEvent,
        MouseEvent as CrosstermMouseEvent,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::{Constraint, CrosstermBackend, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use std::{
    io, panic, thread,
    time::{Duration, Instant},
};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::application::ApplicationState;

// Used to control application flow from the specialized input handlers
// for each ApplicationState scene.
#[derive(PartialEq)]
pub enum ProcessInputResult {
    // no action is needed
    None,

    // user requested the app to quit
    Quit,

    // user has requested a scene change
    ChangeScene(ApplicationState),
}

// The event pump and the terminal wrapper follow the layout used in the Ratatui Book:
// https://ratatui.rs/index.html
pub type CrosstermTerminal = ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>;

// Implement this on all UI state objects that can be drawn.
pub trait TerminalRenderable {
    fn render(&mut self, f: &mut Frame);
    fn process_input(&mut self, event: TerminalEvent) -> ProcessInputResult;

    // called once per loop before input is handled, for scenes that watch background work
    fn update(&mut self) {}
}

// A type encapsulating all the terminal events we wish to capture and report.
#[derive(Clone, Copy, Debug)]
pub enum TerminalEvent {
    // terminal tick
    Tick,
    // key press
    Key(CrosstermKeyEvent),
    // mouse click or scroll,
    Mouse(CrosstermMouseEvent),
    // terminal resize
    Resize(u16, u16),
}

pub struct TerminalEventHandler {
    // event receiver channel
    receiver: Receiver<TerminalEvent>,

    // event handler thread handle
    _handler: thread::JoinHandle<()>,
}
impl TerminalEventHandler {
    // Creates a new TerminalEventHandler with the specified tick rate in milliseconds.
    pub fn new(tick_rate: u64) -> Self {
        let tick_rate = Duration::from_millis(tick_rate);
        let (sender, receiver) = crossbeam::channel::unbounded();
        let _handler = thread::spawn(move || {
            let mut last_tick = Instant::now();
            loop {
                // use the tick_rate minus the elapsed time since last tick
                // defaults to just tick_rate on overflow.
                let timeout = tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or(tick_rate);

                let has_event = match event::poll(timeout) {
                    Ok(b) => b,
                    Err(err) => {
                        log::error!("Unable to poll terminal events, stopping the input pump: {err}");
                        return;
                    }
                };
                if has_event {
                    let forwarded = match event::read() {
                        // we only pass on 'press' events for multiplatform compatibility
                        Ok(CrosstermEvent::Key(e)) if e.kind == event::KeyEventKind::Press => {
                            sender.send(TerminalEvent::Key(e))
                        }
                        Ok(CrosstermEvent::Mouse(e)) => sender.send(TerminalEvent::Mouse(e)),
                        Ok(CrosstermEvent::Resize(w, h)) => sender.send(TerminalEvent::Resize(w, h)),

                        // ignore the rest
                        Ok(_) => Ok(()),
                        Err(err) => {
                            log::error!("Unable to read a terminal event: {err}");
                            Ok(())
                        }
                    };
                    if forwarded.is_err() {
                        // the UI side hung up; nothing left to do
                        return;
                    }
                }

                if last_tick.elapsed() >= tick_rate {
                    if sender.send(TerminalEvent::Tick).is_err() {
                        return;
                    }
                    last_tick = Instant::now();
                }
            }
        });

        Self { receiver, _handler }
    }

    // attempts to get the next input and should return None if none exist.
    // as a backup, a timeout is created and the duration can be passed in milliseconds.
    pub fn get_next_input(&self, timeout_ms: Option<u64>) -> Option<TerminalEvent> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(16));
        if self.receiver.is_empty() {
            None
        } else {
            match self.receiver.recv_timeout(timeout) {
                Ok(event) => Some(event),
                Err(err) => {
                    log::error!("Failed to receive the event on the input handler pump: {err}");
                    None
                }
            }
        }
    }
}

// This is a thin abstraction around the terminal interface.
// Note: the enable()/disable() functions don't need a self reference
// so they're kept as type functions so as they can be used more flexibly
// (e.g. panic hooks)
pub struct Tui {
    // the internal interface to the terminal
    terminal: CrosstermTerminal,

    // encapsulates the event management for the terminal
    pub events: TerminalEventHandler,

    // how frequently the input should be polled
    input_tick_rate_ms: u64,
}
impl Tui {
    // creates a new terminal interface that encapsulates the terminal ui backend
    // for the application.
    pub fn new(input_tick_rate_ms: u64) -> Result<Self> {
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
            .context("creating terminal backend interface failed")?;
        let events = TerminalEventHandler::new(input_tick_rate_ms);

        let panic_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic| {
            if let Err(err) = Self::disable() {
                eprintln!("failed to reset the terminal on detected panic: {err}");
            }
            panic_hook(panic);
        }));

        Ok(Self {
            terminal,
            events,
            input_tick_rate_ms,
        })
    }

    // enables the terminal interface
    pub fn enable() -> Result<()> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        execute!(io::stdout(), crossterm::terminal::EnterAlternateScreen)
            .context("unable to enter alternate screen")?;

        Ok(())
    }

    // disables the terminal interface
    pub fn disable() -> Result<()> {
        disable_raw_mode().context("failed to disable raw mode")?;
        execute!(io::stdout(), crossterm::terminal::LeaveAlternateScreen)
            .context("unable to switch to main screen")?;

        Ok(())
    }

    // draws the given frame to the terminal backend
    pub fn draw<T: TerminalRenderable>(&mut self, b: &mut T) -> Result<()> {
        self.terminal.draw(|frame| b.render(frame))?;
        Ok(())
    }

    pub fn process_input<T: TerminalRenderable>(&mut self, b: &mut T) -> ProcessInputResult {
        b.update();

        // read input until the processing function returns something that's not
        // ProcessInputResult::None or we're out of input.
        while let Some(terminal_event) = self.events.get_next_input(Some(self.input_tick_rate_ms)) {
            let result = b.process_input(terminal_event);
            if result != ProcessInputResult::None {
                return result;
            }
        }

        ProcessInputResult::None
    }
}

pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
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

// This is a generic list state, pulled from ratatui's list example, that
// can be used to build out our list selectors.
pub struct StatefulList<T> {
    pub state: ListState,
    pub items: Vec<T>,
}
impl<T> StatefulList<T> {
    pub fn with_items(items: Vec<T>) -> StatefulList<T> {
        StatefulList {
            state: ListState::default(),
            items,
        }
    }

    pub fn next(&mut self) {
        if !self.items.is_empty() {
            let i = match self.state.selected() {
                Some(i) if i + 1 < self.items.len() => i + 1,
                _ => 0,
            };
            self.state.select(Some(i));
        }
    }

    pub fn previous(&mut self) {
        if !self.items.is_empty() {
            let i = match self.state.selected() {
                Some(0) | None => self.items.len() - 1,
                Some(i) => i - 1,
            };
            self.state.select(Some(i));
        }
    }

    pub fn selected_item(&self) -> Option<&T> {
        self.state.selected().and_then(|i| self.items.get(i))
    }
}

// A basic modal dialog box with a configurable title and body text. Long text
// can be scrolled with j/k.
pub struct MessageBoxModalWidget {
    // the title of the border on the modal box
    pub title: String,

    pub text: String,

    // should be set to true after `process_input()` when the user is done reading
    pub is_finished: bool,

    // the percentage of screen width to take up at max
    pub width_pct: u16,

    // the percentage of screen height to take up at max
    pub height_pct: u16,

    scroll: u16,
}
impl MessageBoxModalWidget {
    pub fn new(title: &str, text: &str, width_pct: u16, height_pct: u16) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
            is_finished: false,
            width_pct,
            height_pct,
            scroll: 0,
        }
    }

    pub fn process_input(&mut self, event: TerminalEvent) {
        if let TerminalEvent::Key(key) = event {
            match key.code {
                KeyCode::Esc | KeyCode::Enter => {
                    self.is_finished = true;
                }
                KeyCode::Char('j') | KeyCode::Down => {
                    self.scroll = self.scroll.saturating_add(1);
                }
                KeyCode::Char('k') | KeyCode::Up => {
                    self.scroll = self.scroll.saturating_sub(1);
                }
                _ => {}
            }
        }
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let mut area = centered_rect(self.width_pct, self.height_pct, frame.size());
        let split_width = area.width.saturating_sub(2) as usize;

        let mut msgbox_lines = vec![];
        for text_line in self.text.lines() {
            msgbox_lines.extend(wrap_spans(vec![Span::raw(text_line.to_owned())], split_width));
        }

        // keep the scroll from running past the last line
        let inner_height = area.height.saturating_sub(2);
        let max_scroll = (msgbox_lines.len() as u16).saturating_sub(inner_height);
        self.scroll = self.scroll.min(max_scroll);

        // size the box to the number of lines, accounting for the border
        area.height = std::cmp::min(area.height, 2 + msgbox_lines.len() as u16);

        let textarea = Paragraph::new(msgbox_lines)
            .scroll((self.scroll, 0))
            .block(
                Block::default()
                    .border_style(Style::default().fg(Color::Cyan))
                    .title(self.title.as_str())
                    .borders(Borders::ALL),
            );

        frame.render_widget(Clear, area);
        frame.render_widget(textarea, area);
    }
}

// A modal list of strings the user can pick one entry from.
pub struct ListPickerModalWidget {
    pub title: String,
    list: StatefulList<String>,

    // set once the user closes the picker
    pub is_finished: bool,

    // the entry chosen with enter; None if the picker was cancelled
    pub chosen: Option<String>,
}
impl ListPickerModalWidget {
    pub fn new(title: &str, items: Vec<String>) -> Self {
        let mut list = StatefulList::with_items(items);
        list.next();
        Self {
            title: title.to_owned(),
            list,
            is_finished: false,
            chosen: None,
        }
    }

    pub fn process_input(&mut self, event: TerminalEvent) {
        if let TerminalEvent::Key(key) = event {
            match key.code {
                KeyCode::Esc => {
                    self.is_finished = true;
                }
                KeyCode::Enter => {
                    self.chosen = self.list.selected_item().cloned();
                    self.is_finished = true;
                }
                KeyCode::Char('j') | KeyCode::Down => self.list.next(),
                KeyCode::Char('k') | KeyCode::Up => self.list.previous(),
                _ => {}
            }
        }
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let mut area = centered_rect(60, 50, frame.size());
        area.height = std::cmp::min(area.height, 2 + self.list.items.len().max(1) as u16);

        let block = Block::default()
            .border_style(Style::default().fg(Color::Cyan))
            .title(self.title.as_str())
            .borders(Borders::ALL);

        frame.render_widget(Clear, area);
        if self.list.items.is_empty() {
            let empty = Paragraph::new(Line::from(Span::styled(
                "<Nothing here yet>",
                Style::default().fg(Color::Rgb(100, 100, 100)),
            )))
            .block(block);
            frame.render_widget(empty, area);
            return;
        }

        let items: Vec<ListItem> = self
            .list
            .items
            .iter()
            .map(|entry| ListItem::new(Line::from(entry.as_str())))
            .collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, area, &mut self.list.state);
    }
}

// Word-wraps a sequence of styled spans to `max_width` display columns, keeping each
// piece's style. Whitespace at the start of a wrapped line is dropped, and a word
// wider than the whole line is broken between graphemes.
pub fn wrap_spans(spans: Vec<Span<'static>>, max_width: usize) -> Vec<Line<'static>> {
    let max_width = max_width.max(1);
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0;

    for span in spans {
        let style = span.style;
        for word in span.content.split_word_bounds() {
            let word_width = UnicodeWidthStr::width(word);
            let is_space = word.chars().all(char::is_whitespace);

            if current_width + word_width <= max_width {
                if !(is_space && current_width == 0 && !lines.is_empty()) {
                    push_fragment(&mut current, word, style);
                    current_width += word_width;
                }
                continue;
            }

            if is_space {
                lines.push(Line::from(std::mem::take(&mut current)));
                current_width = 0;
                continue;
            }

            if word_width <= max_width {
                lines.push(Line::from(std::mem::take(&mut current)));
                push_fragment(&mut current, word, style);
                current_width = word_width;
                continue;
            }

            // too wide for any line; spill it grapheme by grapheme
            for grapheme in word.graphemes(true) {
                let g_width = UnicodeWidthStr::width(grapheme);
                if current_width + g_width > max_width && current_width > 0 {
                    lines.push(Line::from(std::mem::take(&mut current)));
                    current_width = 0;
                }
                push_fragment(&mut current, grapheme, style);
                current_width += g_width;
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}

// appends text to the last span when the style matches so lines don't fragment
fn push_fragment(spans: &mut Vec<Span<'static>>, text: &str, style: Style) {
    match spans.last_mut() {
        Some(last) if last.style == style => {
            let mut joined = last.content.to_string();
            joined.push_str(text);
            last.content = joined.into();
        }
        _ => spans.push(Span::styled(text.to_owned(), style)),
    }
}
