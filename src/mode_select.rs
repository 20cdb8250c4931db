use crossterm::event::KeyCode;
use ratatui::{
    prelude::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style, Stylize},
    text::Line,
    widgets::{List, ListItem, Paragraph},
    Frame,
};

use crate::{
    application::ApplicationState,
    modes::{Mode, SubMode},
    tui::{
        MessageBoxModalWidget, ProcessInputResult, StatefulList, TerminalEvent, TerminalRenderable,
    },
};

// Every selectable (mode, sub-mode) pair in display order: each mode's general
// entry followed by its sub-modes.
pub fn mode_choices() -> Vec<(Mode, Option<SubMode>)> {
    let mut choices = Vec::new();
    for mode in Mode::ALL {
        choices.push((mode, None));
        choices.extend(mode.sub_modes().iter().map(|s| (mode, Some(*s))));
    }
    choices
}

fn choice_label(mode: Mode, sub_mode: Option<SubMode>) -> String {
    match sub_mode {
        None => mode.label().to_owned(),
        Some(s) => format!("    {}", s.label()),
    }
}

pub struct ModeSelectState {
    choices: Vec<(Mode, Option<SubMode>)>,

    // stores the state of the list item to select the mode to chat in
    list_state: StatefulList<String>,

    // contains a modal dialog widget used to show a message or alert to the user
    modal_messagebox: Option<MessageBoxModalWidget>,
}
impl ModeSelectState {
    // builds the selector with the cursor on the given choice, or the first one
    pub fn new(preselect: Option<(Mode, Option<SubMode>)>) -> Self {
        let choices = mode_choices();
        let list_items = choices
            .iter()
            .map(|(mode, sub)| choice_label(*mode, *sub))
            .collect();

        let mut list_state = StatefulList::with_items(list_items);
        let index = preselect
            .and_then(|p| choices.iter().position(|c| *c == p))
            .unwrap_or(0);
        list_state.state.select(Some(index));

        Self {
            choices,
            list_state,
            modal_messagebox: None,
        }
    }
}
impl TerminalRenderable for ModeSelectState {
    fn process_input(&mut self, event: TerminalEvent) -> ProcessInputResult {
        if let Some(modal) = self.modal_messagebox.as_mut() {
            modal.process_input(event);
            if modal.is_finished {
                self.modal_messagebox = None;
            }
        } else if let TerminalEvent::Key(key) = event {
            match key.code {
                KeyCode::Esc => return ProcessInputResult::ChangeScene(ApplicationState::MainMenu),
                KeyCode::Char('k') | KeyCode::Up => self.list_state.previous(),
                KeyCode::Char('j') | KeyCode::Down => self.list_state.next(),
                KeyCode::Char('?') => {
                    let help_strings = "j or down-arrow  = move down\n\
                                        k or up-arrow    = move up\n\
                                        enter            = start a conversation in the selected mode\n\
                                        esc              = go back to main menu\n";
                    let modal = MessageBoxModalWidget::new("Command Reference:", help_strings, 60, 60);
                    self.modal_messagebox = Some(modal);
                }
                KeyCode::Enter => {
                    if let Some((mode, sub_mode)) = self
                        .list_state
                        .state
                        .selected()
                        .and_then(|i| self.choices.get(i))
                    {
                        return ProcessInputResult::ChangeScene(ApplicationState::Chat(*mode, *sub_mode));
                    }
                }
                _ => {}
            }
        }

        ProcessInputResult::None
    }

    fn render(&mut self, frame: &mut Frame) {
        let divider = "----------------";
        let menu_lines = vec![Line::from("Choose a Mode".bold()), Line::from(divider)];

        let items: Vec<ListItem> = self
            .list_state
            .items
            .iter()
            .zip(self.choices.iter())
            .map(|(label, (_, sub))| {
                let style = if sub.is_none() {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(label.as_str())).style(style)
            })
            .collect();
        let max_width = items.iter().map(|i| i.width()).max().unwrap_or(0);

        let items = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::LightGreen)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ");

        // break things up horizontally to create some padding
        let middle_column_size = 3 + max_width.max(divider.len()) as u16;
        let padding_size = frame.size().width.saturating_sub(middle_column_size) / 2;
        let hchunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Max(padding_size),
                Constraint::Min(middle_column_size),
                Constraint::Max(padding_size),
            ])
            .split(frame.size());

        let vchunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Percentage(10),
                Constraint::Max(2),
                Constraint::Min(4),
            ])
            .split(hchunks[1]);

        let title = Paragraph::new(menu_lines).alignment(Alignment::Center);
        frame.render_widget(title, vchunks[1]);
        frame.render_stateful_widget(items, vchunks[2], &mut self.list_state.state);

        if let Some(modal) = self.modal_messagebox.as_mut() {
            modal.render(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_mode_and_its_sub_modes() {
        let choices = mode_choices();
        assert_eq!(choices.len(), 9 + 5 + 5 + 4);
        assert_eq!(choices[0], (Mode::Tutor, None));

        let osce = choices.iter().position(|c| *c == (Mode::Osce, None)).unwrap();
        assert_eq!(choices[osce + 1], (Mode::Osce, Some(SubMode::Adult)));
        assert_eq!(choices[osce + 5], (Mode::Osce, Some(SubMode::LearningDisability)));
        assert!(!choices.contains(&(Mode::Jobs, Some(SubMode::Adult))));
    }

    #[test]
    fn enter_opens_the_selected_choice() {
        use crossterm::event::{KeyEvent, KeyModifiers};

        let mut state = ModeSelectState::new(Some((Mode::Career, Some(SubMode::ResumeBuilder))));
        let enter = TerminalEvent::Key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        let result = state.process_input(enter);
        assert!(
            result
                == ProcessInputResult::ChangeScene(ApplicationState::Chat(
                    Mode::Career,
                    Some(SubMode::ResumeBuilder)
                ))
        );
    }
}
