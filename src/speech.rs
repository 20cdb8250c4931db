use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};

use crate::markup::strip_for_speech;

// Reads text aloud through an external text-to-speech program. Only one utterance
// plays at a time; starting a new one stops the old one.
pub struct Speaker {
    command: Option<Vec<String>>,
    current: Option<Child>,
}
impl Speaker {
    pub fn new(command: Option<Vec<String>>) -> Self {
        let command = command.filter(|c| c.first().is_some_and(|program| !program.trim().is_empty()));
        Self {
            command,
            current: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.command.is_some()
    }

    // Speaks the message with its markup removed. Does nothing when no speech
    // program is configured or nothing readable is left.
    pub fn speak(&mut self, message_text: &str) -> Result<()> {
        self.stop();

        let Some((program, leading_args)) = self.command.as_ref().and_then(|c| c.split_first()) else {
            log::debug!("No speech command configured; skipping playback.");
            return Ok(());
        };
        let plain = strip_for_speech(message_text);
        if plain.is_empty() {
            return Ok(());
        }

        let child = Command::new(program)
            .args(leading_args)
            .arg(&plain)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Attempting to start the speech command '{program}'"))?;
        self.current = Some(child);
        Ok(())
    }

    // stops the utterance in progress, if any
    pub fn stop(&mut self) {
        if let Some(mut child) = self.current.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(err) = child.kill() {
                    log::warn!("Failed to stop the speech command: {err}");
                }
            }
            let _ = child.wait();
        }
    }

    pub fn is_speaking(&mut self) -> bool {
        match self.current.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            _ => false,
        }
    }
}
impl Drop for Speaker {
    fn drop(&mut self) {
        self.stop();
    }
}
