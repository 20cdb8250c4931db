use thiserror::Error;

// The failure taxonomy for talking to the remote services. Every one of these is
// caught where it happens and turned into a banner, an apology message in the chat,
// or a silent default; none of them should ever take the UI down.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TutorError {
    // missing credential or unusable client; the session can't be created
    #[error("{0}")]
    Initialization(String),

    // network or API failure on chat, extraction or video calls
    #[error("remote call failed: {0}")]
    RemoteCall(String),

    // the video operation did not finish within the polling budget
    #[error("video generation did not complete after {attempts} polling attempts")]
    Timeout { attempts: u32 },

    // the video operation finished but carried no download uri
    #[error("video generation completed without a result uri")]
    MissingResult,

    // a response body could not be understood
    #[error("could not parse the response: {0}")]
    Parse(String),

    // the session that requested the work went away
    #[error("the request was cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for TutorError {
    fn from(err: reqwest::Error) -> Self {
        TutorError::RemoteCall(err.to_string())
    }
}

impl From<serde_json::Error> for TutorError {
    fn from(err: serde_json::Error) -> Self {
        TutorError::Parse(err.to_string())
    }
}

pub type TutorResult<T> = std::result::Result<T, TutorError>;
