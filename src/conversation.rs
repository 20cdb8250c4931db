use std::sync::Arc;

use crossbeam::channel::TryRecvError;

use crate::{
    engine::{EngineLink, EngineRequest, EngineResponse, TurnOutcome},
    errors::TutorError,
    gemini::Citation,
    history::{load_resume_draft, save_resume_draft, SearchHistory},
    markup::extract_last_fenced_block,
    messages::{Message, MessageLog},
    modes::{Mode, SubMode},
    session::Session,
    store::KeyValueStore,
};

pub const APOLOGY_MESSAGE: &str =
    "Sorry, I couldn't process your request right now. Please check your connection or API key and try again.";
pub const VIDEO_FAILURE_BANNER: &str =
    "Couldn't generate the video for this scenario, continuing with text only.";
const VIDEO_PLACEHOLDER: &str =
    "Generating a video for your scenario. This can take a few minutes...";

#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Sending,
    Error(String),
}

// The UI side of a chat: the active session, the visible messages and the
// bookkeeping around a turn that is in flight on the engine thread.
pub struct Conversation {
    mode: Mode,
    sub_mode: Option<SubMode>,
    engine: Option<EngineLink>,
    init_error: Option<String>,
    session: Option<Session>,
    messages: MessageLog,
    state: SessionState,
    banner: Option<String>,
    placeholder_id: Option<String>,
    store: Arc<dyn KeyValueStore>,
    history: SearchHistory,
    resume_draft: Option<String>,
}
impl Conversation {
    // `engine` is the error from client setup when the remote service can't be used;
    // the conversation then stays in the Error state and refuses to send.
    pub fn new(
        mode: Mode,
        sub_mode: Option<SubMode>,
        engine: Result<EngineLink, TutorError>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (engine, init_error) = match engine {
            Ok(link) => (Some(link), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let history = SearchHistory::load(store.as_ref());
        let resume_draft = load_resume_draft(store.as_ref());

        let mut conversation = Self {
            mode,
            sub_mode: sub_mode.filter(|s| mode.accepts_sub_mode(*s)),
            engine,
            init_error,
            session: None,
            messages: MessageLog::new(),
            state: SessionState::Uninitialized,
            banner: None,
            placeholder_id: None,
            store,
            history,
            resume_draft,
        };
        conversation.reinitialize();
        conversation
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn sub_mode(&self) -> Option<SubMode> {
        self.sub_mode
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.state == SessionState::Sending
    }

    // true while the first OSCE turn is also waiting on its scenario video
    pub fn is_generating_video(&self) -> bool {
        self.is_loading() && self.placeholder_id.is_some()
    }

    pub fn can_send(&self) -> bool {
        self.state == SessionState::Ready && self.session.is_some()
    }

    pub fn history_entries(&self) -> &[String] {
        self.history.entries_for(self.mode)
    }

    pub fn resume_draft(&self) -> Option<&str> {
        self.resume_draft.as_deref()
    }

    // Drops the current session and starts a fresh one for the current mode and
    // sub-mode. Any turn still in flight for the old session gets ignored when it
    // comes back, and its video polling is cancelled by the drop.
    pub fn reinitialize(&mut self) {
        self.session = None;
        self.messages.clear();
        self.banner = None;
        self.placeholder_id = None;

        match &self.engine {
            Some(_) => {
                let session = Session::new(self.mode, self.sub_mode);
                self.messages
                    .push(Message::ai(&session.config().welcome_message));
                log::debug!(
                    "Started session {} for mode {} ({:?})",
                    session.id(),
                    session.mode().name(),
                    session.sub_mode()
                );
                self.session = Some(session);
                self.state = SessionState::Ready;
            }
            None => {
                let message = self
                    .init_error
                    .clone()
                    .unwrap_or_else(|| "The chat service could not be started.".to_owned());
                log::debug!("Chat session could not be initialized: {message}");
                self.banner = Some(message.clone());
                self.state = SessionState::Error(message);
            }
        }
    }

    // switches presets; the sub-mode never carries over to another mode
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.sub_mode = None;
        self.reinitialize();
    }

    pub fn set_sub_mode(&mut self, sub_mode: Option<SubMode>) {
        self.sub_mode = sub_mode.filter(|s| self.mode.accepts_sub_mode(*s));
        self.reinitialize();
    }

    // Steps through "no sub-mode" followed by each of the mode's sub-modes, wrapping
    // at either end. Does nothing for modes without sub-modes.
    pub fn cycle_sub_mode(&mut self, forward: bool) {
        let subs = self.mode.sub_modes();
        if subs.is_empty() {
            return;
        }
        let choices = subs.len() + 1;
        let current = match self.sub_mode {
            None => 0,
            Some(s) => subs.iter().position(|x| *x == s).map_or(0, |i| i + 1),
        };
        let next = if forward {
            (current + 1) % choices
        } else {
            (current + choices - 1) % choices
        };
        self.set_sub_mode(if next == 0 { None } else { Some(subs[next - 1]) });
    }

    // Starts a turn with the user's text. Returns false, changing nothing, when the
    // text is blank or the conversation can't send right now.
    pub fn submit(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || !self.can_send() {
            return false;
        }
        let (Some(session), Some(engine)) = (&self.session, &self.engine) else {
            return false;
        };

        // decided before the user's message is appended: only the welcome is present
        let with_video = self.mode.is_clinical_simulation() && self.messages.len() == 1;
        let context = session.begin_turn(text, with_video);

        self.messages.push(Message::user(text));
        if with_video {
            let placeholder = Message::ai(VIDEO_PLACEHOLDER);
            self.placeholder_id = Some(placeholder.id.clone());
            self.messages.push(placeholder);
        }

        self.history.record(self.mode, text);
        if let Err(err) = self.history.save(self.store.as_ref()) {
            log::warn!("Failed to persist the search history: {err}");
        }

        self.state = SessionState::Sending;
        self.banner = None;

        if let Err(err) = engine.send(EngineRequest::SendMessage(context)) {
            log::error!("Failed to hand the message to the chat engine: {err}");
            self.fail_turn();
        }
        true
    }

    // Applies anything the engine has finished. Meant to be called every UI tick.
    pub fn poll_engine(&mut self) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        loop {
            match engine.try_recv() {
                Ok(EngineResponse::TurnComplete(outcome)) => self.apply_outcome(outcome),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.is_loading() {
                        log::error!("Chat engine went away while a message was in flight.");
                        self.fail_turn();
                    }
                    break;
                }
            }
        }
    }

    fn apply_outcome(&mut self, outcome: TurnOutcome) {
        let Some(session) = self.session.as_mut() else {
            log::debug!("Dropping a turn outcome with no active session.");
            return;
        };
        if session.id() != outcome.session_id {
            log::debug!(
                "Dropping a stale turn outcome for session {} (active session is {})",
                outcome.session_id,
                session.id()
            );
            return;
        }

        self.state = SessionState::Ready;
        if let Some(id) = self.placeholder_id.take() {
            self.messages.remove_by_id(&id);
        }

        let video_link = match outcome.video {
            Some(Ok(link)) => Some(link),
            Some(Err(TutorError::Cancelled)) | None => None,
            Some(Err(_)) => {
                self.banner = Some(VIDEO_FAILURE_BANNER.to_owned());
                None
            }
        };

        match outcome.reply {
            Ok(reply) => {
                if let Some(turns) = outcome.turns {
                    session.adopt_turns(outcome.session_id, turns);
                    log::trace!("Session {} now holds {} turns", session.id(), session.turns().len());
                }

                let mut text = reply.text;
                if self.mode == Mode::Jobs && !reply.citations.is_empty() {
                    text.push_str(&format_sources(&reply.citations));
                }
                if let Some(link) = &video_link {
                    text.push_str(&format_video_link(link));
                }

                if self.mode == Mode::Career && self.sub_mode == Some(SubMode::ResumeBuilder) {
                    self.capture_resume_draft(&text);
                }
                self.messages.push(Message::ai(&text));
            }
            Err(err) => {
                log::debug!("Turn for '{}' failed: {err}", outcome.user_text);
                self.show_apology();
                if let Some(link) = &video_link {
                    self.messages
                        .push(Message::ai(format_video_link(link).trim_start()));
                }
            }
        }
    }

    fn capture_resume_draft(&mut self, reply_text: &str) {
        let Some(draft) = extract_last_fenced_block(reply_text) else {
            return;
        };
        if let Err(err) = save_resume_draft(self.store.as_ref(), &draft) {
            log::warn!("Failed to persist the résumé draft: {err}");
        }
        self.resume_draft = Some(draft);
    }

    // ends the in-flight turn with the generic apology
    fn fail_turn(&mut self) {
        self.state = SessionState::Ready;
        if let Some(id) = self.placeholder_id.take() {
            self.messages.remove_by_id(&id);
        }
        self.show_apology();
    }

    fn show_apology(&mut self) {
        self.banner = Some(APOLOGY_MESSAGE.to_owned());
        self.messages.push(Message::ai_error(APOLOGY_MESSAGE));
    }
}

pub fn format_sources(citations: &[Citation]) -> String {
    let lines: Vec<String> = citations
        .iter()
        .map(|c| format!("- {}: {}", c.title, c.uri))
        .collect();
    format!("\n\n**Sources from Google Search:**\n{}", lines.join("\n"))
}

fn format_video_link(link: &str) -> String {
    format!("\n\n[Watch the scenario video]({link})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::ChatEngine,
        gemini::{ChatReply, OperationStatus},
        messages::MessageSender,
        modes::resolve_mode_config,
        store::MemoryStore,
        testing::ScriptedBackend,
        video::VideoPolicy,
    };
    use std::time::{Duration, Instant};

    struct Harness {
        backend: Arc<ScriptedBackend>,
        store: Arc<MemoryStore>,
        engine: ChatEngine,
    }
    impl Harness {
        fn new() -> Self {
            let backend = Arc::new(ScriptedBackend::default());
            let policy = VideoPolicy {
                poll_interval: Duration::from_millis(1),
                max_attempts: 3,
            };
            Self {
                engine: ChatEngine::spawn(backend.clone(), policy),
                backend,
                store: Arc::new(MemoryStore::new()),
            }
        }

        fn conversation(&self, mode: Mode, sub_mode: Option<SubMode>) -> Conversation {
            Conversation::new(mode, sub_mode, Ok(self.engine.link.clone()), self.store.clone())
        }
    }

    fn wait_for_reply(conversation: &mut Conversation) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while conversation.is_loading() {
            assert!(Instant::now() < deadline, "timed out waiting for the engine");
            std::thread::sleep(Duration::from_millis(2));
            conversation.poll_engine();
        }
    }

    fn texts(conversation: &Conversation) -> Vec<String> {
        conversation.messages().iter().map(|m| m.text.clone()).collect()
    }

    #[test]
    fn starts_with_exactly_the_welcome_message() {
        let h = Harness::new();
        let conv = h.conversation(Mode::Exam, None);
        assert_eq!(conv.state(), &SessionState::Ready);
        assert!(conv.can_send());
        assert_eq!(conv.messages().len(), 1);
        let welcome = conv.messages().get(0).unwrap();
        assert_eq!(welcome.sender, MessageSender::Ai);
        assert!(welcome.text.contains("Exam Simulator"));
    }

    #[test]
    fn exam_turn_replies_with_more_than_the_welcome() {
        let h = Harness::new();
        h.backend
            .push_reply("Question 1: Which drug class does furosemide belong to?");
        let mut conv = h.conversation(Mode::Exam, None);
        let welcome = conv.messages().get(0).unwrap().text.clone();

        assert!(conv.submit("pharmacology"));
        wait_for_reply(&mut conv);

        assert_eq!(conv.messages().len(), 3);
        assert_eq!(conv.messages().get(1).unwrap().text, "pharmacology");
        let reply = conv.messages().last().unwrap();
        assert_eq!(reply.sender, MessageSender::Ai);
        assert!(!reply.text.trim().is_empty());
        assert_ne!(reply.text, welcome);
        assert_eq!(conv.banner(), None);

        let calls = h.backend.chat_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].message, "pharmacology");
        assert_eq!(calls[0].system_prompt, resolve_mode_config(Mode::Exam, None).system_prompt);
    }

    #[test]
    fn missing_credential_is_an_error_state() {
        let store = Arc::new(MemoryStore::new());
        let mut conv = Conversation::new(
            Mode::Tutor,
            None,
            Err(TutorError::Initialization("API_KEY environment variable not set.".into())),
            store,
        );
        assert_eq!(
            conv.state(),
            &SessionState::Error("API_KEY environment variable not set.".into())
        );
        assert_eq!(conv.banner(), Some("API_KEY environment variable not set."));
        assert!(conv.messages().is_empty());
        assert!(!conv.can_send());
        assert!(!conv.submit("hello"));
        assert!(conv.messages().is_empty());

        conv.set_mode(Mode::Jobs);
        assert!(matches!(conv.state(), SessionState::Error(_)));
        assert!(conv.messages().is_empty());
    }

    #[test]
    fn mode_and_sub_mode_changes_reset_to_one_welcome() {
        let h = Harness::new();
        let mut conv = h.conversation(Mode::Tutor, None);
        assert!(conv.submit("what is triage?"));
        wait_for_reply(&mut conv);
        assert_eq!(conv.messages().len(), 3);

        conv.set_mode(Mode::Osce);
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.sub_mode(), None);

        conv.set_sub_mode(Some(SubMode::Mental));
        assert_eq!(conv.messages().len(), 1);
        assert!(conv.messages().get(0).unwrap().text.contains("mental health nursing"));

        conv.set_mode(Mode::NmcCbt);
        assert_eq!(conv.sub_mode(), None);
        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn sub_mode_cycle_wraps_through_none() {
        let h = Harness::new();
        let mut conv = h.conversation(Mode::Career, None);
        conv.cycle_sub_mode(true);
        assert_eq!(conv.sub_mode(), Some(SubMode::InterviewPrep));
        conv.cycle_sub_mode(false);
        assert_eq!(conv.sub_mode(), None);
        conv.cycle_sub_mode(false);
        assert_eq!(conv.sub_mode(), Some(SubMode::Specialization));

        let mut tutor = h.conversation(Mode::Tutor, None);
        tutor.cycle_sub_mode(true);
        assert_eq!(tutor.sub_mode(), None);
    }

    #[test]
    fn a_turn_appends_user_then_ai_and_keeps_context() {
        let h = Harness::new();
        h.backend.push_reply("A fever is...");
        h.backend.push_reply("Treat by...");
        let mut conv = h.conversation(Mode::Tutor, None);

        assert!(!conv.submit("   "));
        assert!(conv.submit("  what is a fever? "));
        assert!(conv.is_loading());
        assert!(!conv.can_send());
        assert!(!conv.submit("second message while loading"));
        assert_eq!(conv.messages().last().unwrap().text, "what is a fever?");

        wait_for_reply(&mut conv);
        assert_eq!(conv.state(), &SessionState::Ready);
        assert_eq!(conv.messages().last().unwrap().text, "A fever is...");
        assert_eq!(conv.history_entries(), ["what is a fever?"]);

        assert!(conv.submit("how is it treated?"));
        wait_for_reply(&mut conv);
        let calls = h.backend.chat_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].history.is_empty());
        assert_eq!(calls[1].history.len(), 2);
        assert_eq!(calls[1].history[1].text, "A fever is...");
        assert_eq!(conv.history_entries(), ["how is it treated?", "what is a fever?"]);
        assert!(h.store.get("search_history").is_some());
    }

    #[test]
    fn jobs_replies_list_their_sources() {
        let h = Harness::new();
        h.backend.push_chat(Ok(ChatReply {
            text: "Found two roles.".into(),
            citations: vec![
                Citation { title: "SiteA".into(), uri: "https://a".into() },
                Citation { title: "SiteB".into(), uri: "https://b".into() },
            ],
        }));
        let mut conv = h.conversation(Mode::Jobs, None);
        conv.submit("ICU nurse jobs in Nairobi");
        wait_for_reply(&mut conv);

        assert_eq!(
            conv.messages().last().unwrap().text,
            "Found two roles.\n\n**Sources from Google Search:**\n- SiteA: https://a\n- SiteB: https://b"
        );
        assert_eq!(h.backend.chat_calls()[0].tools, Some(crate::modes::ToolDeclaration::GoogleSearch));
    }

    #[test]
    fn citations_are_ignored_outside_jobs() {
        let h = Harness::new();
        h.backend.push_chat(Ok(ChatReply {
            text: "Answer.".into(),
            citations: vec![Citation { title: "SiteA".into(), uri: "https://a".into() }],
        }));
        let mut conv = h.conversation(Mode::Tutor, None);
        conv.submit("question");
        wait_for_reply(&mut conv);
        assert_eq!(conv.messages().last().unwrap().text, "Answer.");
    }

    #[test]
    fn failure_shows_an_apology_and_keeps_the_session_usable() {
        let h = Harness::new();
        h.backend.push_chat(Err(TutorError::RemoteCall("503".into())));
        h.backend.push_reply("Back online.");
        let mut conv = h.conversation(Mode::Nclex, None);

        conv.submit("prioritization question");
        wait_for_reply(&mut conv);
        assert_eq!(conv.banner(), Some(APOLOGY_MESSAGE));
        let last = conv.messages().last().unwrap();
        assert_eq!(last.text, APOLOGY_MESSAGE);
        assert!(last.id.ends_with("-error"));
        assert!(conv.can_send());

        conv.submit("try again");
        assert_eq!(conv.banner(), None);
        wait_for_reply(&mut conv);
        assert_eq!(conv.messages().last().unwrap().text, "Back online.");
        // the failed exchange is not part of the remote context
        assert!(h.backend.chat_calls()[1].history.is_empty());
    }

    #[test]
    fn first_osce_message_also_produces_a_video() {
        let h = Harness::new();
        h.backend.push_reply("Ouch, my chest hurts.");
        h.backend.push_poll(Ok(OperationStatus {
            done: true,
            video_uri: Some("https://video/abc".into()),
        }));
        let mut conv = h.conversation(Mode::Osce, Some(SubMode::Adult));

        conv.submit("65 year old man with chest pain");
        assert_eq!(conv.messages().len(), 3);
        assert_eq!(conv.messages().last().unwrap().text, VIDEO_PLACEHOLDER);

        wait_for_reply(&mut conv);
        assert_eq!(
            texts(&conv)[1..],
            [
                "65 year old man with chest pain".to_owned(),
                "Ouch, my chest hurts.\n\n[Watch the scenario video](https://video/abc)".to_owned(),
            ]
        );
        assert_eq!(conv.banner(), None);

        conv.submit("where does it hurt?");
        wait_for_reply(&mut conv);
        assert_eq!(h.backend.video_prompts().len(), 1);
    }

    #[test]
    fn video_failure_falls_back_to_text_with_a_banner() {
        let h = Harness::new();
        h.backend.push_reply("I feel dizzy.");
        let mut conv = h.conversation(Mode::Osce, None);

        conv.submit("dizzy teenager");
        wait_for_reply(&mut conv);
        assert_eq!(conv.banner(), Some(VIDEO_FAILURE_BANNER));
        assert_eq!(texts(&conv)[1..], ["dizzy teenager".to_owned(), "I feel dizzy.".to_owned()]);
    }

    #[test]
    fn no_video_outside_osce() {
        let h = Harness::new();
        let mut conv = h.conversation(Mode::Oet, None);
        conv.submit("speaking roleplay");
        wait_for_reply(&mut conv);
        assert!(h.backend.video_prompts().is_empty());
    }

    #[test]
    fn resume_builder_saves_the_last_fenced_block() {
        let h = Harness::new();
        h.backend
            .push_reply("Here it is:\n```markdown\n# Ada Obi\nRegistered Nurse\n```\nWant changes?");
        let mut conv = h.conversation(Mode::Career, Some(SubMode::ResumeBuilder));
        assert_eq!(conv.resume_draft(), None);

        conv.submit("build my résumé");
        wait_for_reply(&mut conv);
        assert_eq!(conv.resume_draft(), Some("# Ada Obi\nRegistered Nurse"));
        assert_eq!(
            h.store.get("resume_draft").as_deref(),
            Some("# Ada Obi\nRegistered Nurse")
        );

        let reopened = h.conversation(Mode::Career, None);
        assert_eq!(reopened.resume_draft(), Some("# Ada Obi\nRegistered Nurse"));
    }

    #[test]
    fn other_career_sub_modes_leave_the_draft_alone() {
        let h = Harness::new();
        h.backend.push_reply("```\nnot a resume\n```");
        let mut conv = h.conversation(Mode::Career, Some(SubMode::InterviewPrep));
        conv.submit("mock interview");
        wait_for_reply(&mut conv);
        assert_eq!(conv.resume_draft(), None);
    }

    #[test]
    fn outcomes_for_a_replaced_session_are_discarded() {
        let h = Harness::new();
        h.backend.set_chat_delay(Duration::from_millis(50));
        h.backend.push_reply("late reply");
        let mut conv = h.conversation(Mode::Tutor, None);

        conv.submit("question");
        conv.set_mode(Mode::Exam);
        assert_eq!(conv.state(), &SessionState::Ready);

        let until = Instant::now() + Duration::from_millis(300);
        while Instant::now() < until {
            conv.poll_engine();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(conv.messages().len(), 1);
        assert!(conv.messages().get(0).unwrap().text.contains("Exam Simulator"));
    }

    #[test]
    fn dead_engine_fails_the_turn_immediately() {
        let h = Harness::new();
        let link = h.engine.link.clone();
        let Harness { engine, store, .. } = h;
        engine.shutdown();

        let mut conv = Conversation::new(Mode::Tutor, None, Ok(link), store);
        assert!(conv.submit("hello?"));
        assert!(!conv.is_loading());
        assert_eq!(conv.banner(), Some(APOLOGY_MESSAGE));
        assert_eq!(conv.messages().last().unwrap().text, APOLOGY_MESSAGE);
    }
}
