use std::sync::atomic::{AtomicU64, Ordering};

// counter mixed into message ids so two messages created in the same millisecond differ
static MESSAGE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// identifies the 'speaker' of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageSender {
    User,
    Ai,
}

// One entry in the conversation. Messages are never edited after they are created.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: MessageSender,
}
impl Message {
    pub fn user(text: &str) -> Self {
        Self::with_suffix(text, MessageSender::User, "user")
    }

    pub fn ai(text: &str) -> Self {
        Self::with_suffix(text, MessageSender::Ai, "ai")
    }

    // an AI message carrying an error apology
    pub fn ai_error(text: &str) -> Self {
        Self::with_suffix(text, MessageSender::Ai, "error")
    }

    fn with_suffix(text: &str, sender: MessageSender, suffix: &str) -> Self {
        let seq = MESSAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!(
                "{}-{}-{}",
                chrono::Utc::now().timestamp_millis(),
                seq,
                suffix
            ),
            text: text.to_owned(),
            sender,
        }
    }
}

// The ordered, append-only list of messages shown for the active session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageLog {
    items: Vec<Message>,
}
impl MessageLog {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    // adds a new message to the end of the log
    pub fn push(&mut self, message: Message) {
        self.items.push(message);
    }

    // removes the message with the given id, if present. only used to retire
    // transient placeholders; real messages stay put.
    pub fn remove_by_id(&mut self, id: &str) -> Option<Message> {
        let index = self.items.iter().position(|m| m.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.items.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.items.iter()
    }
}
