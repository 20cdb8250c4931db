use std::sync::Arc;

use anyhow::{Context, Result};
use application::{Application, ApplicationState};

use engine::ChatEngine;
use errors::TutorError;
use gemini::GeminiClient;
use modes::{Mode, SubMode};
use simple_logger::SimpleLogger;
use store::{JsonFileStore, KeyValueStore, MemoryStore};
use tui::Tui;

mod application;
mod chat;
mod config;
mod conversation;
mod engine;
mod errors;
mod gemini;
mod history;
mod main_menu;
mod markup;
mod messages;
mod mode_select;
mod modes;
mod session;
mod speech;
mod store;
mod tui;
mod video;

#[cfg(test)]
mod testing;

// This is how long the timeout should be in milliseconds for the terminal's backend
const INPUT_THREAD_READ_TIMEOUT_MS: u64 = 1000 / 4;
const UI_DRAW_TICK_RATE: u64 = 1000 / 30;

fn main() -> Result<()> {
    // parse the command-line arguments
    let cmd_arg_matches = clap::Command::new("nurse_tutor")
        .about("nurse_tutor: a terminal study companion for nursing students.")
        .arg(clap::Arg::new("config-file")
            .short('c')
            .long("config-file")
            .action(clap::ArgAction::Set)
                .value_name("FILE")
                .help("Specifies the configuration file to load instead of searching for config.yaml."))
        .arg(
            clap::Arg::new("mode")
                .short('m')
                .long("mode")
                .action(clap::ArgAction::Set)
                .value_name("MODE")
                .help("Skips the menus and opens a chat in the given mode (e.g. tutor, osce, jobs)."),
        )
        .arg(
            clap::Arg::new("sub-mode")
                .short('s')
                .long("sub-mode")
                .action(clap::ArgAction::Set)
                .value_name("SUB_MODE")
                .requires("mode")
                .help("The sub-mode to open with --mode (e.g. \"Adult\", \"Resume Builder\")."),
        )
        .get_matches();

    SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .with_colors(true)
        .init()
        .context("failed to initialize the logger")?;

    // ***********************************************************************
    // load the configuration file for the application.
    let custom_config_filename: Option<&String> = cmd_arg_matches.get_one::<String>("config-file");
    let config = config::ConfigurationFile::load_config(custom_config_filename);

    // ***********************************************************************
    // open the persisted state, keeping it in memory if the file can't be used.
    let store: Arc<dyn KeyValueStore> = match config.state_file_path() {
        Some(path) => match JsonFileStore::open(&path) {
            Ok(file_store) => {
                log::debug!("Persisting state to {:?}", file_store.path());
                Arc::new(file_store)
            }
            Err(err) => {
                log::warn!("State won't be saved between runs: {err:#}");
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            log::warn!("No data directory found; state won't be saved between runs.");
            Arc::new(MemoryStore::new())
        }
    };

    // ***********************************************************************
    // Spawn the chat engine thread. A missing API key leaves the app usable
    // but every conversation will report the error instead of sending.
    let engine: Result<ChatEngine, TutorError> = config.read_api_key().and_then(|api_key| {
        let client = GeminiClient::new(&config, api_key)
            .map_err(|err| TutorError::Initialization(format!("{err:#}")))?;
        Ok(ChatEngine::spawn(Arc::new(client), config.video_policy()))
    });
    if let Err(err) = &engine {
        log::error!("Chat engine not started: {err}");
    }
    let engine_link = engine.as_ref().map(|e| e.link.clone()).map_err(Clone::clone);

    // ***********************************************************************
    // work out the opening scene from the command line.
    let start_state = match cmd_arg_matches.get_one::<String>("mode") {
        None => ApplicationState::MainMenu,
        Some(mode_name) => {
            let mode = Mode::from_name(mode_name);
            let sub_mode = cmd_arg_matches
                .get_one::<String>("sub-mode")
                .and_then(|label| {
                    let parsed = SubMode::from_label(label).filter(|s| mode.accepts_sub_mode(*s));
                    if parsed.is_none() {
                        log::warn!("Ignoring sub-mode '{label}' since {} doesn't offer it.", mode.label());
                    }
                    parsed
                });
            ApplicationState::Chat(mode, sub_mode)
        }
    };

    // ***********************************************************************
    // setup the terminal and run the loop, hoping to restore terminal on exit.
    let mut tui = Tui::new(INPUT_THREAD_READ_TIMEOUT_MS)
        .context("failed to create the terminal interface")?;
    Tui::enable().context("should have been able to start the terminal interface")?;

    // **********************************************************************
    // run the actual app
    let mut app = Application::new(&mut tui, config.clone(), engine_link, store);
    if start_state != ApplicationState::MainMenu {
        app.change_scene(start_state);
    }
    if let Err(err) = app.run(UI_DRAW_TICK_RATE) {
        log::error!("Application loop failed: {err:#}")
    }
    drop(app);

    // *******************************************************************
    // tell the engine to shut down and wait for the worker thread.
    if let Ok(engine) = engine {
        engine.shutdown();
    }

    // ***************************************************************
    // restore the terminal now that the application is quitting.
    Tui::disable().context("failed to disable the terminal interface")?;

    Ok(())
}
