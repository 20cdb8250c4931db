use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use crossterm::event::KeyCode;
use rand::{rngs::ThreadRng, Rng};
use ratatui::{
    prelude::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Clear, Paragraph, Sparkline},
    Frame,
};

use crate::{
    application::ApplicationState,
    config::ConfigurationFile,
    conversation::{Conversation, SessionState},
    markup::{split_blocks, split_inline, Block as MarkupBlock, Inline},
    messages::{Message, MessageSender},
    modes::{Mode, SubMode},
    speech::Speaker,
    tui::{
        wrap_spans, ListPickerModalWidget, MessageBoxModalWidget, ProcessInputResult,
        TerminalEvent, TerminalRenderable,
    },
};

const HELP_TEXT: &str = "j      = select an older message\n\
                         k      = select a newer message\n\
                         r      = type a new message to the tutor (esc to cancel, enter to send)\n\
                         \\n     = typed at the end of a reply, starts a new line\n\
                         [ / ]  = previous / next sub-mode (restarts the conversation)\n\
                         tab    = next mode (restarts the conversation)\n\
                         h      = pick a recent query for this mode\n\
                         d      = show the saved résumé draft\n\
                         s      = read the selected tutor message aloud (OSCE, OET, IELTS)\n\
                         S      = stop reading aloud\n\
                         esc    = back to the mode list";

fn rgb_or(rgb: Option<[u8; 3]>, fallback: Color) -> Color {
    rgb.map_or(fallback, |c| Color::Rgb(c[0], c[1], c[2]))
}

// sparkline color, then the color of the waiting label above it
fn progress_colors(config: &ConfigurationFile) -> (Color, Color) {
    (
        rgb_or(config.progress_primary_rgb, Color::Rgb(10, 242, 10)),
        rgb_or(config.progress_secondary_rgb, Color::Rgb(100, 100, 100)),
    )
}

pub struct ChatState {
    // a copy of the configuration file passed into the UI at creation
    config: ConfigurationFile,

    conversation: Conversation,
    speaker: Speaker,

    // how many messages up from the newest one the selection sits
    message_scroll: usize,

    editing_reply: bool,
    reply_text: String,

    progress_widget: Option<ThinkingSparkline>,

    // contains a modal dialog widget used to show a message or alert to the user
    modal_messagebox: Option<MessageBoxModalWidget>,

    // the list of recent queries, while it is open
    history_picker: Option<ListPickerModalWidget>,
}
impl ChatState {
    // the mode and sub-mode the conversation is currently in
    pub fn current_choice(&self) -> (Mode, Option<SubMode>) {
        (self.conversation.mode(), self.conversation.sub_mode())
    }

    pub fn new(config: ConfigurationFile, conversation: Conversation) -> ChatState {
        let speaker = Speaker::new(config.speech_command.clone());
        ChatState {
            config,
            conversation,
            speaker,
            message_scroll: 0,
            editing_reply: false,
            reply_text: String::new(),
            progress_widget: None,
            modal_messagebox: None,
            history_picker: None,
        }
    }

    fn selected_message(&self) -> Option<&Message> {
        let len = self.conversation.messages().len();
        if self.message_scroll >= len {
            return None;
        }
        self.conversation.messages().get(len - 1 - self.message_scroll)
    }

    fn show_info(&mut self, title: &str, text: &str) {
        self.modal_messagebox = Some(MessageBoxModalWidget::new(title, text, 60, 40));
    }

    fn process_input_for_editing_replies(&mut self, event: TerminalEvent) {
        if let TerminalEvent::Key(key) = event {
            match key.code {
                KeyCode::Esc => {
                    self.editing_reply = false;
                }
                KeyCode::Backspace => {
                    self.reply_text.pop();
                }
                KeyCode::Char(to_insert) => {
                    self.reply_text.push(to_insert);
                }
                KeyCode::Enter => {
                    // a trailing, typed "\n" becomes a real line break instead of sending
                    if self.reply_text.trim_end().ends_with("\\n") {
                        let trimmed_len = self.reply_text.trim_end().len() - 2;
                        self.reply_text.truncate(trimmed_len);
                        self.reply_text.push('\n');
                        return;
                    }

                    if self.conversation.submit(&self.reply_text) {
                        self.reply_text.clear();
                        self.editing_reply = false;
                        self.message_scroll = 0;
                    } else {
                        log::debug!(
                            "Reply not sent (blank text or conversation busy): state={:?}",
                            self.conversation.state()
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn process_input_for_viewing_chat(&mut self, event: TerminalEvent) -> ProcessInputResult {
        let TerminalEvent::Key(key) = event else {
            return ProcessInputResult::None;
        };

        match key.code {
            KeyCode::Esc => {
                self.speaker.stop();
                return ProcessInputResult::ChangeScene(ApplicationState::ModeSelect);
            }
            KeyCode::Char('r') => {
                self.editing_reply = true;
            }
            KeyCode::Char('j') => {
                let len = self.conversation.messages().len();
                self.message_scroll = std::cmp::min(self.message_scroll + 1, len.saturating_sub(1));
            }
            KeyCode::Char('k') => {
                self.message_scroll = self.message_scroll.saturating_sub(1);
            }
            KeyCode::Char(']') | KeyCode::Char('[') => {
                if self.conversation.mode().sub_modes().is_empty() {
                    self.show_info("Information", "This mode has no sub-modes.");
                } else {
                    self.conversation.cycle_sub_mode(key.code == KeyCode::Char(']'));
                    self.message_scroll = 0;
                    self.progress_widget = None;
                }
            }
            KeyCode::Tab | KeyCode::BackTab => {
                let current = self.conversation.mode();
                let index = Mode::ALL.iter().position(|m| *m == current).unwrap_or(0);
                let count = Mode::ALL.len();
                let next = if key.code == KeyCode::Tab {
                    (index + 1) % count
                } else {
                    (index + count - 1) % count
                };
                self.speaker.stop();
                self.conversation.set_mode(Mode::ALL[next]);
                self.message_scroll = 0;
                self.progress_widget = None;
            }
            KeyCode::Char('h') => {
                let entries = self.conversation.history_entries().to_vec();
                let title = format!("Recent {} queries", self.conversation.mode().label());
                self.history_picker = Some(ListPickerModalWidget::new(&title, entries));
            }
            KeyCode::Char('d') => {
                let text = self
                    .conversation
                    .resume_draft()
                    .unwrap_or("No résumé draft has been saved yet. Use Career mode with the Resume Builder sub-mode to create one.")
                    .to_owned();
                self.modal_messagebox = Some(MessageBoxModalWidget::new("Résumé Draft", &text, 80, 80));
            }
            KeyCode::Char('s') => self.speak_selected(),
            KeyCode::Char('S') => self.speaker.stop(),
            KeyCode::Char('?') => {
                self.modal_messagebox =
                    Some(MessageBoxModalWidget::new("Command Reference:", HELP_TEXT, 70, 60));
            }
            _ => {}
        }

        ProcessInputResult::None
    }

    fn speak_selected(&mut self) {
        if !self.conversation.mode().supports_audio() {
            self.show_info("Information", "Reading aloud is available in the OSCE, OET and IELTS modes.");
            return;
        }
        if !self.speaker.is_available() {
            self.show_info(
                "Information",
                "No speech command is configured. Set `speech_command` in the configuration file.",
            );
            return;
        }

        let text = match self.selected_message() {
            Some(m) if m.sender == MessageSender::Ai => m.text.clone(),
            _ => {
                self.show_info("Information", "Select one of the tutor's messages to read it aloud.");
                return;
            }
        };
        if let Err(err) = self.speaker.speak(&text) {
            log::error!("Failed to read the message aloud: {err:#}");
            self.show_info("Error", "The speech command could not be started.");
        }
    }

    // builds the styled lines for one message, name first
    fn message_lines(&self, message: &Message, selected: bool, width: usize) -> Vec<Line<'static>> {
        let text_style = Style::default().fg(rgb_or(self.config.text_rgb, Color::Reset));
        let code_style = Style::default().fg(rgb_or(self.config.code_rgb, Color::Rgb(190, 190, 120)));
        let link_style = text_style.add_modifier(Modifier::UNDERLINED);
        let url_style = Style::default().fg(Color::Rgb(100, 100, 100));

        let (name, name_color) = match message.sender {
            MessageSender::User => (
                self.config.display_name.as_str(),
                rgb_or(self.config.display_name_rgb, Color::Cyan),
            ),
            MessageSender::Ai => (
                self.config.tutor_name.as_str(),
                rgb_or(self.config.tutor_name_rgb, Color::Green),
            ),
        };
        let mut name_style = Style::default().fg(name_color).bold();
        if selected {
            name_style = name_style.add_modifier(Modifier::REVERSED);
        }

        let mut lines = Vec::new();
        let mut name_pending = true;
        let mut take_name = |spans: &mut Vec<Span<'static>>| {
            if name_pending {
                spans.insert(0, Span::styled(format!("{name}: "), name_style));
                name_pending = false;
            }
        };

        for block in split_blocks(&message.text) {
            match block {
                MarkupBlock::Prose(prose) => {
                    for prose_line in prose.lines() {
                        let mut spans = Vec::new();
                        for piece in split_inline(prose_line) {
                            match piece {
                                Inline::Text(t) => spans.push(Span::styled(t, text_style)),
                                Inline::Link { label, url } => {
                                    spans.push(Span::styled(label, link_style));
                                    spans.push(Span::styled(format!(" ({url})"), url_style));
                                }
                            }
                        }
                        take_name(&mut spans);
                        lines.extend(wrap_spans(spans, width));
                    }
                }
                MarkupBlock::Code(code) => {
                    let mut header = Vec::new();
                    take_name(&mut header);
                    if !header.is_empty() {
                        lines.push(Line::from(header));
                    }
                    for code_line in code.lines() {
                        let spans = vec![Span::styled(format!("  {code_line}"), code_style)];
                        lines.extend(wrap_spans(spans, width));
                    }
                }
            }
        }

        // a message with no text still shows who it came from
        let mut leftover = Vec::new();
        take_name(&mut leftover);
        if !leftover.is_empty() {
            lines.push(Line::from(leftover));
        }
        lines
    }

    fn render_chat(&self, frame: &mut Frame, area: Rect) {
        // newest message at the top, right under the reply editor
        let mut chat_lines = vec![];
        let lines_needed = area.height as usize;
        let width = area.width as usize;
        let len = self.conversation.messages().len();

        for (index, message) in self
            .conversation
            .messages()
            .iter()
            .enumerate()
            .rev()
            .skip(self.message_scroll)
        {
            let selected = index == len - 1 - self.message_scroll;
            chat_lines.extend(self.message_lines(message, selected, width));

            if chat_lines.len() >= lines_needed {
                break;
            }

            // potentially add a buffer line if configured to do so
            if self.config.add_visual_buffer_between_messages.unwrap_or(true) {
                chat_lines.push(Line::from(" "));
            }
        }

        let alignment = match &self.config.chat_text_justification {
            Some(justification) => justification.clone().into(),
            None => Alignment::Left,
        };
        frame.render_widget(Paragraph::new(chat_lines).alignment(alignment), area);
    }

    fn render_title(&mut self, frame: &mut Frame, area: Rect) {
        let mode = self.conversation.mode();
        let sub = match self.conversation.sub_mode() {
            Some(s) => s.label().to_owned(),
            None if mode.sub_modes().is_empty() => String::new(),
            None => "General".to_owned(),
        };

        let mut spans = vec![Span::styled(mode.label(), Style::default().bold())];
        if !sub.is_empty() {
            spans.push(Span::raw(format!(" / {sub}")));
        }
        if mode.supports_audio() {
            spans.push(Span::styled("  [audio]", Style::default().fg(Color::Rgb(100, 100, 100))));
        }
        if self.speaker.is_speaking() {
            spans.push(Span::styled("  speaking...", Style::default().fg(Color::LightGreen)));
        }
        spans.push(Span::styled(
            "   (? for help)",
            Style::default().fg(Color::Rgb(100, 100, 100)),
        ));
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_reply_editor(&self, frame: &mut Frame, area: Rect, lines: Vec<Line<'static>>) {
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn reply_editor_lines(&self, width: usize) -> Vec<Line<'static>> {
        let mut editing_reply_lines = vec![];
        if !self.reply_text.is_empty() {
            for reply_line in self.reply_text.lines() {
                editing_reply_lines.extend(wrap_spans(vec![Span::raw(reply_line.to_owned())], width));
            }
        } else {
            editing_reply_lines.push(Line::from(vec![Span::styled(
                "<Type Reply Here>",
                Style::default().fg(Color::Rgb(100, 100, 100)),
            )]));
        }
        if !self.conversation.can_send() {
            editing_reply_lines.push(Line::from(Span::styled(
                "(sending is disabled right now)",
                Style::default().fg(Color::Rgb(100, 100, 100)),
            )));
        }
        editing_reply_lines.push(Line::from("-".repeat(width)));
        editing_reply_lines
    }
}

impl TerminalRenderable for ChatState {
    fn update(&mut self) {
        // make sure to check for finished turns from the chat engine
        self.conversation.poll_engine();
        if !self.conversation.is_loading() {
            self.progress_widget = None;
        }
    }

    fn process_input(&mut self, event: TerminalEvent) -> ProcessInputResult {
        if let Some(msgbox) = self.modal_messagebox.as_mut() {
            msgbox.process_input(event);
            if msgbox.is_finished {
                self.modal_messagebox = None;
            }
        } else if let Some(picker) = self.history_picker.as_mut() {
            picker.process_input(event);
            if picker.is_finished {
                if let Some(chosen) = picker.chosen.take() {
                    self.reply_text = chosen;
                    self.editing_reply = true;
                }
                self.history_picker = None;
            }
        } else if self.editing_reply {
            self.process_input_for_editing_replies(event);
        } else {
            return self.process_input_for_viewing_chat(event);
        }

        ProcessInputResult::None
    }

    fn render(&mut self, frame: &mut Frame) {
        frame.render_widget(Clear, frame.size());

        // use 80% of the frame up to the max width
        let hchunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(10),
                Constraint::Percentage(80),
                Constraint::Percentage(10),
            ])
            .split(frame.size());
        let column_width = hchunks[1].width as usize;

        let reply_lines = if self.editing_reply {
            self.reply_editor_lines(column_width)
        } else {
            Vec::new()
        };
        let loading = self.conversation.is_loading();
        let top_height = if loading {
            ThinkingSparkline::REQUESTED_HEIGHT
        } else {
            reply_lines.len() as u16
        };
        let banner_height = u16::from(self.conversation.banner().is_some());

        let vchunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Max(top_height),
                Constraint::Min(4),
                Constraint::Length(banner_height),
            ])
            .split(hchunks[1]);

        self.render_title(frame, vchunks[0]);

        if loading {
            let label = if self.conversation.is_generating_video() {
                "Waiting for the patient and the scenario video..."
            } else {
                "Waiting for the tutor..."
            };
            let (primary, secondary) = progress_colors(&self.config);
            let widget = self
                .progress_widget
                .get_or_insert_with(|| ThinkingSparkline::new(primary, secondary));
            widget.render(frame, vchunks[1], label);
        } else if self.editing_reply {
            self.render_reply_editor(frame, vchunks[1], reply_lines);
        }

        self.render_chat(frame, vchunks[2]);

        if let Some(banner) = self.conversation.banner() {
            let style = match self.conversation.state() {
                SessionState::Error(_) => Style::default().fg(Color::White).bg(Color::Red),
                _ => Style::default().fg(Color::Red),
            };
            frame.render_widget(Paragraph::new(Span::styled(banner.to_owned(), style)), vchunks[3]);
        }

        // Now render any modal boxes over the chat, only selecting one of them to draw.
        // This mimics the same order that input processing gets called.
        if let Some(msgbox) = self.modal_messagebox.as_mut() {
            msgbox.render(frame);
        } else if let Some(picker) = self.history_picker.as_mut() {
            picker.render(frame);
        }
    }
}

// A small animated sparkline shown while a turn is in flight. The signal shifts by
// one random sample every tick.
struct ThinkingSparkline {
    signal: VecDeque<u64>,
    tick_rate: Duration,
    last_tick: Instant,
    color: Color,
    label_color: Color,
    rng: ThreadRng,
}
impl ThinkingSparkline {
    const REQUESTED_HEIGHT: u16 = 4;

    fn new(color: Color, label_color: Color) -> Self {
        Self {
            signal: VecDeque::new(),
            tick_rate: Duration::from_millis(60),
            last_tick: Instant::now(),
            color,
            label_color,
            rng: rand::thread_rng(),
        }
    }

    // keeps the signal the same width as the area, then advances it if a tick has passed
    fn advance(&mut self, width: usize) {
        while self.signal.len() < width {
            let sample = self.rng.gen_range(0..100);
            self.signal.push_front(sample);
        }
        self.signal.truncate(width);

        while self.last_tick.elapsed() >= self.tick_rate {
            self.signal.pop_back();
            let sample = self.rng.gen_range(0..100);
            self.signal.push_front(sample);
            self.last_tick += self.tick_rate;
        }
    }

    fn render(&mut self, frame: &mut Frame, area: Rect, label: &str) {
        if area.height == 0 {
            return;
        }
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(area);

        frame.render_widget(
            Paragraph::new(Span::styled(label.to_owned(), Style::default().fg(self.label_color))),
            chunks[0],
        );

        self.advance(chunks[1].width as usize);
        let data: Vec<u64> = self.signal.iter().copied().collect();
        let sparkline = Sparkline::default()
            .data(&data)
            .max(100)
            .style(Style::default().fg(self.color));
        frame.render_widget(sparkline, chunks[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparkline_tracks_the_area_width() {
        let mut sparkline = ThinkingSparkline::new(Color::Green, Color::Gray);
        sparkline.advance(30);
        assert_eq!(sparkline.signal.len(), 30);
        sparkline.advance(12);
        assert_eq!(sparkline.signal.len(), 12);
        assert!(sparkline.signal.iter().all(|v| *v < 100));
    }

    #[test]
    fn progress_colors_come_from_the_config() {
        let mut config = ConfigurationFile::default();
        assert_eq!(
            progress_colors(&config),
            (Color::Rgb(10, 242, 10), Color::Rgb(100, 100, 100))
        );

        config.progress_primary_rgb = Some([1, 2, 3]);
        config.progress_secondary_rgb = Some([200, 150, 0]);
        assert_eq!(
            progress_colors(&config),
            (Color::Rgb(1, 2, 3), Color::Rgb(200, 150, 0))
        );
    }
}
