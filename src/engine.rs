use std::{sync::Arc, thread};

use crossbeam::channel::{bounded, Receiver, SendError, Sender, TryRecvError};

use crate::{
    errors::{TutorError, TutorResult},
    gemini::{ChatReply, ChatRequest, GenerativeBackend, Turn, TurnRole},
    modes::ToolDeclaration,
    video::{generate_scenario_video, VideoPolicy},
};

pub enum EngineRequest {
    SendMessage(TurnContext),
    ImmediateShutdown,
}

pub enum EngineResponse {
    TurnComplete(TurnOutcome),
}

// A snapshot of the session taken when the user sends a message. The engine
// works on this copy and hands an updated one back; the UI's session is never
// touched from the worker thread.
pub struct TurnContext {
    pub session_id: u64,
    pub system_prompt: String,
    pub tools: Option<ToolDeclaration>,
    pub turns: Vec<Turn>,
    pub message: String,

    // present only when this turn should also produce a scenario video. The
    // sending half lives with the session so dropping it stops the polling.
    pub video_cancel: Option<Receiver<()>>,
}

// The single terminal result for a dispatched turn.
pub struct TurnOutcome {
    pub session_id: u64,
    pub user_text: String,
    pub reply: TutorResult<ChatReply>,

    // the prior turns plus this exchange; only set when the reply succeeded
    pub turns: Option<Vec<Turn>>,

    // None when no video was requested for the turn
    pub video: Option<TutorResult<String>>,
}

// The UI side of the engine's channels. Cheap to clone so every conversation
// can hold one while the application keeps the thread handle.
#[derive(Clone)]
pub struct EngineLink {
    send_to_server: Sender<EngineRequest>,
    recv_on_client: Receiver<EngineResponse>,
}
impl EngineLink {
    pub fn send(&self, request: EngineRequest) -> Result<(), SendError<EngineRequest>> {
        self.send_to_server.send(request)
    }

    pub fn try_recv(&self) -> Result<EngineResponse, TryRecvError> {
        self.recv_on_client.try_recv()
    }
}

pub struct ChatEngine {
    pub link: EngineLink,
    pub handle: thread::JoinHandle<()>,
}
impl ChatEngine {
    pub fn spawn(backend: Arc<dyn GenerativeBackend>, video_policy: VideoPolicy) -> ChatEngine {
        let (send_to_server, recv_on_server) = bounded::<EngineRequest>(10);
        let (send_to_client, recv_on_client) = bounded::<EngineResponse>(10);

        let handle = thread::spawn(move || {
            loop {
                // BLOCK UNTIL NEW REQUEST
                let request = match recv_on_server.recv() {
                    Ok(r) => r,
                    Err(_) => {
                        log::debug!("Chat engine request channel closed; stopping the engine thread.");
                        return;
                    }
                };

                let result = match request {
                    EngineRequest::ImmediateShutdown => {
                        return;
                    }
                    EngineRequest::SendMessage(context) => EngineResponse::TurnComplete(
                        process_turn(backend.as_ref(), &video_policy, context),
                    ),
                };

                // SEND THE RESULT FROM THE SERVER
                if let Err(err) = send_to_client.send(result) {
                    log::error!("Chat engine thread's send failed: {}", err);
                }
                log::trace!("One job-cycle complete in the chat engine thread.");
            }
        });

        ChatEngine {
            link: EngineLink {
                send_to_server,
                recv_on_client,
            },
            handle,
        }
    }

    // asks the worker to stop and waits for it
    pub fn shutdown(self) {
        if let Err(err) = self.link.send(EngineRequest::ImmediateShutdown) {
            log::warn!("Chat engine was already gone at shutdown: {}", err);
        }
        if self.handle.join().is_err() {
            log::error!("Chat engine thread panicked before shutdown.");
        }
    }
}

// Runs one turn to completion. When a video is wanted it runs on a scoped helper
// thread next to the text reply and both are joined before the outcome is built.
pub fn process_turn(
    backend: &dyn GenerativeBackend,
    video_policy: &VideoPolicy,
    context: TurnContext,
) -> TurnOutcome {
    let TurnContext {
        session_id,
        system_prompt,
        tools,
        mut turns,
        message,
        video_cancel,
    } = context;

    let request = ChatRequest {
        system_prompt: &system_prompt,
        tools,
        history: &turns,
        message: &message,
    };

    let (reply, video) = match &video_cancel {
        None => (send_chat_logged(backend, &request), None),
        Some(cancel) => thread::scope(|scope| {
            let video_job = scope
                .spawn(|| generate_scenario_video(backend, &message, video_policy, cancel));
            let reply = send_chat_logged(backend, &request);
            let video = video_job.join().unwrap_or_else(|_| {
                log::error!("Video generation helper thread panicked.");
                Err(TutorError::RemoteCall("video generation stopped unexpectedly".to_owned()))
            });
            (reply, Some(video))
        }),
    };

    if let Some(Err(err)) = &video {
        log::log!(
            turn_failure_level(err),
            "Scenario video not produced for session {session_id}: {err}"
        );
    }

    let updated_turns = match &reply {
        Ok(r) => {
            turns.push(Turn {
                role: TurnRole::User,
                text: message.clone(),
            });
            turns.push(Turn {
                role: TurnRole::Model,
                text: r.text.clone(),
            });
            Some(turns)
        }
        Err(_) => None,
    };

    TurnOutcome {
        session_id,
        user_text: message,
        reply,
        turns: updated_turns,
        video,
    }
}

fn send_chat_logged(backend: &dyn GenerativeBackend, request: &ChatRequest) -> TutorResult<ChatReply> {
    backend.send_chat(request).map_err(|err| {
        log::log!(turn_failure_level(&err), "Chat request failed: {err}");
        err
    })
}

// Remote failures during a turn already reach the user as a banner or apology, and
// stderr shares the terminal with the UI, so they stay below the default log level.
fn turn_failure_level(err: &TutorError) -> log::Level {
    match err {
        TutorError::Cancelled => log::Level::Trace,
        _ => log::Level::Debug,
    }
}
