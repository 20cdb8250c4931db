use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};
use serde::Deserialize;

use crate::{
    errors::{TutorError, TutorResult},
    gemini::{GenerativeBackend, OperationHandle},
};

pub const DEFAULT_POLL_INTERVAL_S: u64 = 10;
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 18;

// The patient facts pulled out of the student's scenario description.
// Every field is a plain string and empty when unknown.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PatientDetails {
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default, rename = "chiefComplaint")]
    pub chief_complaint: String,
}
impl PatientDetails {
    // the non-empty fields joined for use inside a sentence
    fn joined(&self) -> String {
        [&self.age, &self.gender, &self.chief_complaint]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<&str>>()
            .join(", ")
    }
}

// How often, and how many times, the video operation gets checked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}
impl Default for VideoPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_S),
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

// Builds the text prompt for the video model from whatever patient facts were found.
pub fn compose_video_prompt(details: &PatientDetails, user_text: &str) -> String {
    let user_text = user_text.trim();
    let joined = details.joined();
    if joined.is_empty() {
        format!(
            "A realistic, short video for a nursing OSCE simulation, filmed in a hospital or clinic setting \
             with a patient actor. The scenario is: '{user_text}'"
        )
    } else {
        format!(
            "A realistic, short video for a nursing OSCE simulation, filmed in a hospital or clinic setting, \
             depicting a patient: {joined}. The patient should look and behave consistently with these details. \
             Original user request for context: '{user_text}'"
        )
    }
}

// Checks the operation every `poll_interval` until it finishes, the attempt budget runs
// out, or the cancel channel fires or disconnects. Waiting happens on the cancel channel
// so a dropped session stops the loop at the next wait.
pub fn wait_for_video(
    backend: &dyn GenerativeBackend,
    handle: &OperationHandle,
    policy: &VideoPolicy,
    cancel: &Receiver<()>,
) -> TutorResult<String> {
    let mut attempts: u32 = 0;
    while attempts < policy.max_attempts {
        match cancel.recv_timeout(policy.poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::debug!("Video polling for {:?} cancelled after {attempts} attempts", handle);
                return Err(TutorError::Cancelled);
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        attempts += 1;
        let status = backend.poll_operation(handle)?;
        log::trace!(
            "Video operation {:?} poll {}/{}: done={}",
            handle,
            attempts,
            policy.max_attempts,
            status.done
        );
        if status.done {
            return status.video_uri.ok_or(TutorError::MissingResult);
        }
    }

    Err(TutorError::Timeout { attempts })
}

// Runs the whole video side of a first OSCE turn and returns a link the student can open.
// Extraction problems are not errors: the prompt just falls back to the raw description.
pub fn generate_scenario_video(
    backend: &dyn GenerativeBackend,
    user_text: &str,
    policy: &VideoPolicy,
    cancel: &Receiver<()>,
) -> TutorResult<String> {
    let details = backend.extract_patient_details(user_text).unwrap_or_else(|err| {
        log::debug!("Patient detail extraction failed, continuing without details: {err}");
        PatientDetails::default()
    });

    let prompt = compose_video_prompt(&details, user_text);
    log::debug!("Requesting scenario video with prompt: {prompt}");

    let handle = backend.start_video_generation(&prompt)?;
    let uri = wait_for_video(backend, &handle, policy, cancel)?;
    Ok(backend.playable_video_link(&uri))
}
