use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};

use crate::{
    chat::ChatState,
    config::ConfigurationFile,
    conversation::Conversation,
    engine::EngineLink,
    errors::TutorError,
    main_menu::MainMenuState,
    mode_select::ModeSelectState,
    modes::{Mode, SubMode},
    store::KeyValueStore,
    tui::{ProcessInputResult, Tui},
};

// This enumeration indicates what scene is active in the application.
#[derive(Debug, PartialEq)]
pub enum ApplicationState {
    MainMenu,
    ModeSelect,
    Chat(Mode, Option<SubMode>),
}

// This is the main application state object for the app.
pub struct Application<'a> {
    // this is the terminal abstraction used to hide implementation details
    // away from the application.
    terminal: &'a mut Tui,

    // our active configuration file for the app, loaded
    config: ConfigurationFile,

    // the chat engine's channels, or the reason it couldn't be started
    engine: Result<EngineLink, TutorError>,

    // persisted search history and résumé draft
    store: Arc<dyn KeyValueStore>,

    // an enum indicating which state is active in the application
    current_state: ApplicationState,

    // contains the main menu scene's state
    mainmenu_state: MainMenuState,

    // optionally contains the mode selector scene's state
    mode_select_state: Option<ModeSelectState>,

    // optionally contains the chat scene's state
    chat_state: Option<ChatState>,

    // the mode last chatted in, so the selector reopens on it
    last_choice: Option<(Mode, Option<SubMode>)>,
}
impl<'a> Application<'a> {
    // Creates a new Application object.
    pub fn new(
        terminal: &'a mut Tui,
        config: ConfigurationFile,
        engine: Result<EngineLink, TutorError>,
        store: Arc<dyn KeyValueStore>,
    ) -> Application<'a> {
        let startup_warning = engine.as_ref().err().map(|err| err.to_string());
        Application {
            terminal,
            config,
            engine,
            store,
            current_state: ApplicationState::MainMenu,
            mainmenu_state: MainMenuState::new(startup_warning),
            mode_select_state: None,
            chat_state: None,
            last_choice: None,
        }
    }

    // Switches to a new scene, building its state and dropping the states of
    // scenes that are no longer shown. Leaving the chat drops its conversation,
    // which cancels anything still running for it.
    pub fn change_scene(&mut self, new_scene: ApplicationState) {
        log::debug!("Changing scene to {:?}", new_scene);
        match &new_scene {
            ApplicationState::MainMenu => {
                self.chat_state = None;
                self.mode_select_state = None;
            }
            ApplicationState::ModeSelect => {
                if let Some(chat) = self.chat_state.take() {
                    self.last_choice = Some(chat.current_choice());
                }
                self.mode_select_state = Some(ModeSelectState::new(self.last_choice));
            }
            ApplicationState::Chat(mode, sub_mode) => {
                self.mode_select_state = None;
                self.last_choice = Some((*mode, *sub_mode));
                let conversation =
                    Conversation::new(*mode, *sub_mode, self.engine.clone(), self.store.clone());
                self.chat_state = Some(ChatState::new(self.config.clone(), conversation));
            }
        }
        self.current_state = new_scene;
    }

    // Runs the application loop that draws the current application state and then
    // processes the input.
    pub fn run(&mut self, ui_draw_tick_rate: u64) -> Result<()> {
        let draw_tick_rate = Duration::from_millis(ui_draw_tick_rate);
        let mut draw_last_tick = Instant::now();
        loop {
            let perform_draw: bool = draw_tick_rate < draw_last_tick.elapsed();
            let mut proc_result = ProcessInputResult::None;

            match self.current_state {
                ApplicationState::MainMenu => {
                    if perform_draw {
                        self.terminal
                            .draw(&mut self.mainmenu_state)
                            .context("failed to draw the main menu UI")?;
                    }
                    proc_result = self.terminal.process_input(&mut self.mainmenu_state);
                }
                ApplicationState::ModeSelect => {
                    if let Some(mode_select) = self.mode_select_state.as_mut() {
                        if perform_draw {
                            self.terminal
                                .draw(mode_select)
                                .context("failed to draw the mode selector UI")?;
                        }
                        proc_result = self.terminal.process_input(mode_select);
                    }
                }
                ApplicationState::Chat(_, _) => {
                    if let Some(chat_state) = self.chat_state.as_mut() {
                        if perform_draw {
                            self.terminal
                                .draw(chat_state)
                                .context("failed to draw the chat UI")?;
                        }
                        proc_result = self.terminal.process_input(chat_state);
                    }
                }
            };

            if perform_draw {
                draw_last_tick += draw_tick_rate;
            }

            // Based on what the current scene decides, possibly take an action
            match proc_result {
                ProcessInputResult::Quit => {
                    return Ok(());
                }
                ProcessInputResult::ChangeScene(new_scene) => self.change_scene(new_scene),
                ProcessInputResult::None => {}
            }

            // put the loop to sleep
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}
