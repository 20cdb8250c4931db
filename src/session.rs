use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::{
    engine::TurnContext,
    gemini::Turn,
    modes::{resolve_mode_config, Mode, ModeConfig, SubMode},
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// The remote conversation for one (mode, sub-mode) choice. A session is never
// reconfigured: changing the mode builds a new one and drops this one, which also
// disconnects any video polling that was started on its behalf.
pub struct Session {
    id: u64,
    mode: Mode,
    sub_mode: Option<SubMode>,
    config: ModeConfig,
    turns: Vec<Turn>,

    // never sent on; turns hold the receiving end and see a disconnect once
    // the session is dropped
    _cancel_guard: Sender<()>,
    cancel_watch: Receiver<()>,
}
impl Session {
    pub fn new(mode: Mode, sub_mode: Option<SubMode>) -> Self {
        let sub_mode = sub_mode.filter(|s| mode.accepts_sub_mode(*s));
        let (cancel_guard, cancel_watch) = bounded::<()>(1);
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            mode,
            sub_mode,
            config: resolve_mode_config(mode, sub_mode),
            turns: Vec::new(),
            _cancel_guard: cancel_guard,
            cancel_watch,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn sub_mode(&self) -> Option<SubMode> {
        self.sub_mode
    }

    pub fn config(&self) -> &ModeConfig {
        &self.config
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    // snapshots the session for the engine thread
    pub fn begin_turn(&self, message: &str, with_video: bool) -> TurnContext {
        TurnContext {
            session_id: self.id,
            system_prompt: self.config.system_prompt.clone(),
            tools: self.config.tools,
            turns: self.turns.clone(),
            message: message.to_owned(),
            video_cancel: with_video.then(|| self.cancel_watch.clone()),
        }
    }

    // takes the engine's updated copy of the turns, ignoring copies made for another session
    pub fn adopt_turns(&mut self, session_id: u64, turns: Vec<Turn>) -> bool {
        if session_id != self.id {
            return false;
        }
        self.turns = turns;
        true
    }
}
