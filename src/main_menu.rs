use crossterm::event::KeyCode;
use ratatui::{
    prelude::{Alignment, Constraint, Direction, Layout},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::{
    application::ApplicationState,
    tui::{ProcessInputResult, TerminalEvent, TerminalRenderable},
};

pub struct MainMenuState {
    // shown under the menu when the chat service couldn't be set up
    startup_warning: Option<String>,
}
impl MainMenuState {
    pub fn new(startup_warning: Option<String>) -> Self {
        Self { startup_warning }
    }
}
impl TerminalRenderable for MainMenuState {
    fn process_input(&mut self, event: TerminalEvent) -> ProcessInputResult {
        if let TerminalEvent::Key(key) = event {
            match key.code {
                KeyCode::Char('q') => return ProcessInputResult::Quit,
                KeyCode::Char('c') => {
                    return ProcessInputResult::ChangeScene(ApplicationState::ModeSelect)
                }
                _ => {}
            }
        }

        ProcessInputResult::None
    }

    fn render(&mut self, frame: &mut Frame) {
        let mut main_title_seq = vec![
            Line::from("Nurse Tutor".bold()),
            Line::from("-----------"),
            Line::from("(c)hat"),
            Line::from(""),
            Line::from("(q)uit"),
        ];
        if let Some(warning) = &self.startup_warning {
            main_title_seq.push(Line::from(""));
            main_title_seq.push(Line::from(Span::styled(
                warning.as_str(),
                Style::default().fg(Color::Red),
            )));
        }

        let hchunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(20),
                Constraint::Percentage(60),
                Constraint::Percentage(20),
            ])
            .split(frame.size());

        let vchunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(20), Constraint::Min(4)])
            .split(hchunks[1]);

        let title = Paragraph::new(main_title_seq).alignment(Alignment::Center);
        frame.render_widget(title, vchunks[1]);
    }
}
