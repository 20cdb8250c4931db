// A scripted stand-in for the remote service used by the unit tests. Queued results are
// handed out in order; once a queue runs dry a harmless default is returned.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
    time::Duration,
};

use crate::{
    errors::TutorResult,
    gemini::{ChatReply, ChatRequest, GenerativeBackend, OperationHandle, OperationStatus, Turn},
    modes::ToolDeclaration,
    video::PatientDetails,
};

// an owned copy of a chat call, kept for assertions
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedChat {
    pub system_prompt: String,
    pub tools: Option<ToolDeclaration>,
    pub history: Vec<Turn>,
    pub message: String,
}

#[derive(Default)]
pub struct ScriptedBackend {
    chat_results: Mutex<VecDeque<TutorResult<ChatReply>>>,
    chat_calls: Mutex<Vec<RecordedChat>>,
    chat_delay: Mutex<Option<Duration>>,
    extraction: Mutex<Option<TutorResult<PatientDetails>>>,
    video_start: Mutex<Option<TutorResult<OperationHandle>>>,
    video_prompts: Mutex<Vec<String>>,
    poll_results: Mutex<VecDeque<TutorResult<OperationStatus>>>,
    polls: AtomicU32,
}
impl ScriptedBackend {
    pub fn push_chat(&self, result: TutorResult<ChatReply>) {
        self.chat_results.lock().unwrap().push_back(result);
    }

    pub fn push_reply(&self, text: &str) {
        self.push_chat(Ok(ChatReply {
            text: text.to_owned(),
            citations: Vec::new(),
        }));
    }

    pub fn set_chat_delay(&self, delay: Duration) {
        *self.chat_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_extraction(&self, result: TutorResult<PatientDetails>) {
        *self.extraction.lock().unwrap() = Some(result);
    }

    pub fn set_video_start(&self, result: TutorResult<OperationHandle>) {
        *self.video_start.lock().unwrap() = Some(result);
    }

    pub fn push_poll(&self, result: TutorResult<OperationStatus>) {
        self.poll_results.lock().unwrap().push_back(result);
    }

    pub fn chat_calls(&self) -> Vec<RecordedChat> {
        self.chat_calls.lock().unwrap().clone()
    }

    pub fn video_prompts(&self) -> Vec<String> {
        self.video_prompts.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}
impl GenerativeBackend for ScriptedBackend {
    fn send_chat(&self, request: &ChatRequest) -> TutorResult<ChatReply> {
        self.chat_calls.lock().unwrap().push(RecordedChat {
            system_prompt: request.system_prompt.to_owned(),
            tools: request.tools,
            history: request.history.to_vec(),
            message: request.message.to_owned(),
        });
        let delay = *self.chat_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.chat_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ChatReply {
                    text: format!("reply to: {}", request.message),
                    citations: Vec::new(),
                })
            })
    }

    fn extract_patient_details(&self, _description: &str) -> TutorResult<PatientDetails> {
        self.extraction
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(PatientDetails::default()))
    }

    fn start_video_generation(&self, prompt: &str) -> TutorResult<OperationHandle> {
        self.video_prompts.lock().unwrap().push(prompt.to_owned());
        self.video_start
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(OperationHandle("operations/test".to_owned())))
    }

    fn poll_operation(&self, _handle: &OperationHandle) -> TutorResult<OperationStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.poll_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(OperationStatus::default()))
    }
}
