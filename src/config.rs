use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;
use ratatui::prelude::Alignment;
use serde::Deserialize;

use crate::{
    errors::{TutorError, TutorResult},
    video::{VideoPolicy, DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_S},
};

pub const CURRENT_VERSION: u16 = 1;
pub const APPLICATION_CONFIG_FOLDER_NAME: &str = "nurse_tutor";
pub const STATE_FILE_NAME: &str = "state.json";

#[derive(Deserialize, PartialEq, Debug, Clone)]
pub enum Justification {
    Left,
    Right,
    Center,
}
impl From<Justification> for Alignment {
    fn from(value: Justification) -> Self {
        match value {
            Justification::Center => Alignment::Center,
            Justification::Left => Alignment::Left,
            Justification::Right => Alignment::Right,
        }
    }
}

// Every field has a default so a config file only needs the settings it changes.
#[derive(Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct ConfigurationFile {
    // version number for the file which should be incremented on breaking changes
    pub version: u16,

    // the name shown above the student's own messages
    pub display_name: String,

    // the name shown above the AI's messages
    pub tutor_name: String,

    pub display_name_rgb: Option<[u8; 3]>,
    pub tutor_name_rgb: Option<[u8; 3]>,

    // the color for the body text of every message
    pub text_rgb: Option<[u8; 3]>,

    // the color used for preformatted (fenced) blocks
    pub code_rgb: Option<[u8; 3]>,

    // the foreground RGB color of the 'primary' element in the progress bar
    pub progress_primary_rgb: Option<[u8; 3]>,

    // the color of the label shown above the progress bar
    pub progress_secondary_rgb: Option<[u8; 3]>,

    // optional setting to determine how the text should be justified.
    pub chat_text_justification: Option<Justification>,

    // optional setting to add a blank line between messages to aid in visually grouping them.
    pub add_visual_buffer_between_messages: Option<bool>,

    // the environment variable holding the API key for the generative service
    pub api_key_env_var: String,

    pub api_base_url: String,
    pub chat_model: String,

    // the model used for pulling structured patient details out of a scenario
    pub extraction_model: String,

    pub video_model: String,

    // the number of seconds to wait for any single remote call before erroring
    pub remote_timeout_s: u64,

    // how long to wait between checks on a video generation job, and how many checks to make
    pub video_poll_interval_s: u64,
    pub video_poll_max_attempts: u32,

    // the program (and leading arguments) used to read replies aloud; the text to
    // speak is passed as the final argument. e.g. ["espeak-ng", "-v", "en-gb"]
    pub speech_command: Option<Vec<String>>,

    // where the search history and résumé draft are kept; defaults to the platform data folder
    pub state_file: Option<String>,
}

impl Default for ConfigurationFile {
    fn default() -> Self {
        ConfigurationFile {
            version: CURRENT_VERSION,
            display_name: "You".to_owned(),
            tutor_name: "Tutor".to_owned(),
            display_name_rgb: None,
            tutor_name_rgb: None,
            text_rgb: None,
            code_rgb: None,
            progress_primary_rgb: None,
            progress_secondary_rgb: None,
            chat_text_justification: None,
            add_visual_buffer_between_messages: None,
            api_key_env_var: "API_KEY".to_owned(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            chat_model: "gemini-2.5-flash".to_owned(),
            extraction_model: "gemini-2.5-flash".to_owned(),
            video_model: "veo-2.0-generate-001".to_owned(),
            remote_timeout_s: 120,
            video_poll_interval_s: DEFAULT_POLL_INTERVAL_S,
            video_poll_max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            speech_command: None,
            state_file: None,
        }
    }
}

impl ConfigurationFile {
    // loads the configuration file by using the alternative path specified or by searching
    // common locations for the config file to load.
    // if those fail to find a file, then a new configuration object is constructed with defaults and returned.
    pub fn load_config(alt_config_filepath: Option<&String>) -> ConfigurationFile {
        let filepath: Option<PathBuf> = locate_config_file("config.yaml", alt_config_filepath);

        // if we found a file, deserialize it as yaml
        if let Some(found_file) = filepath {
            match std::fs::read_to_string(&found_file) {
                Ok(plain_string) => {
                    match serde_yaml::from_str::<ConfigurationFile>(plain_string.as_str()) {
                        Ok(cfg) => {
                            log::debug!("Loaded configuration from {:?}", found_file);
                            return cfg;
                        }
                        Err(err) => {
                            log::error!(
                                "Failed to deserialize the configuration file ({:?}): {}",
                                found_file,
                                err
                            );
                        }
                    };
                }
                Err(err) => log::error!(
                    "Failed to load the configuration file ({:?}): {}",
                    found_file,
                    err
                ),
            };
        }

        // if we made it here, no config file was found, or if it was found, it could not be deserialized as yaml.
        log::warn!(
            "Using a default configuration file from memory since none were located to be read."
        );
        Default::default()
    }

    // reads the API key from the configured environment variable
    pub fn read_api_key(&self) -> TutorResult<String> {
        check_api_key(&self.api_key_env_var, std::env::var(&self.api_key_env_var).ok())
    }

    // the polling limits for video generation; a zero interval or ceiling falls back to the default
    pub fn video_policy(&self) -> VideoPolicy {
        let defaults = VideoPolicy::default();
        VideoPolicy {
            poll_interval: match self.video_poll_interval_s {
                0 => defaults.poll_interval,
                s => Duration::from_secs(s),
            },
            max_attempts: match self.video_poll_max_attempts {
                0 => defaults.max_attempts,
                n => n,
            },
        }
    }

    // the configured state file, or `{data dir}/nurse_tutor/state.json`
    pub fn state_file_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.state_file {
            return Some(PathBuf::from(path));
        }
        BaseDirs::new().map(|base_dirs| {
            base_dirs
                .data_dir()
                .join(APPLICATION_CONFIG_FOLDER_NAME)
                .join(STATE_FILE_NAME)
        })
    }
}

fn check_api_key(var_name: &str, value: Option<String>) -> TutorResult<String> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_owned()),
        _ => Err(TutorError::Initialization(format!(
            "{var_name} environment variable not set."
        ))),
    }
}

// loads a configuration file in the following order:
//  1) alternate path provided as parameter
//  2) 'platform' config folder (e.g. /home/alice/.config or C:\Users\Alice\AppData\Roaming or /Users/Alice/Library/Application Support)
//  3) next to the binary in the working folder
pub fn locate_config_file(filename: &str, alt_path: Option<&String>) -> Option<PathBuf> {
    let mut filepath: Option<PathBuf> = None;

    // specified alternate config file
    if let Some(alt) = alt_path {
        let p = Path::new(alt.as_str());
        if p.exists() {
            filepath = Some(p.to_path_buf());
        } else {
            log::warn!("The configuration file given on the command line was not found: {alt}");
        }
    }

    // try the 'platform' config file location
    if filepath.is_none() {
        if let Some(base_dirs) = BaseDirs::new() {
            let p = Path::new(&base_dirs.config_dir())
                .join(APPLICATION_CONFIG_FOLDER_NAME)
                .join(filename);
            if p.exists() {
                filepath = Some(p);
            }
        }
    }

    // last attempt, look parallel next to the executable
    if filepath.is_none() {
        let p = Path::new(filename);
        if p.exists() {
            filepath = Some(p.to_path_buf());
        }
    }

    filepath
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_the_defaults() {
        let cfg: ConfigurationFile = serde_yaml::from_str(
            "display_name: Amina\nchat_model: gemini-2.0-flash\nchat_text_justification: Center\n",
        )
        .unwrap();
        assert_eq!(cfg.display_name, "Amina");
        assert_eq!(cfg.chat_model, "gemini-2.0-flash");
        assert_eq!(cfg.chat_text_justification, Some(Justification::Center));
        assert_eq!(cfg.api_key_env_var, "API_KEY");
        assert_eq!(cfg.video_poll_max_attempts, 18);
        assert_eq!(cfg.video_model, ConfigurationFile::default().video_model);
    }

    #[test]
    fn explicit_config_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "tutor_name: Sister Grace\nspeech_command: [espeak-ng, -v, en-gb]\n").unwrap();
        let path_str = path.to_string_lossy().to_string();

        let cfg = ConfigurationFile::load_config(Some(&path_str));
        assert_eq!(cfg.tutor_name, "Sister Grace");
        assert_eq!(
            cfg.speech_command,
            Some(vec!["espeak-ng".to_owned(), "-v".to_owned(), "en-gb".to_owned()])
        );
    }

    #[test]
    fn unreadable_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "version: [this is not a number").unwrap();
        let path_str = path.to_string_lossy().to_string();

        assert_eq!(ConfigurationFile::load_config(Some(&path_str)), ConfigurationFile::default());
    }

    #[test]
    fn video_policy_uses_configured_limits() {
        let cfg = ConfigurationFile {
            video_poll_interval_s: 3,
            video_poll_max_attempts: 5,
            ..Default::default()
        };
        assert_eq!(
            cfg.video_policy(),
            VideoPolicy {
                poll_interval: Duration::from_secs(3),
                max_attempts: 5
            }
        );

        let zeroed = ConfigurationFile {
            video_poll_interval_s: 0,
            video_poll_max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(zeroed.video_policy(), VideoPolicy::default());
    }

    #[test]
    fn missing_api_key_is_an_initialization_error() {
        assert_eq!(
            check_api_key("API_KEY", None),
            Err(TutorError::Initialization("API_KEY environment variable not set.".into()))
        );
        assert!(check_api_key("API_KEY", Some("  ".into())).is_err());
        assert_eq!(check_api_key("API_KEY", Some("abc123\n".into())), Ok("abc123".to_owned()));
    }

    #[test]
    fn explicit_state_file_wins() {
        let cfg = ConfigurationFile {
            state_file: Some("/tmp/tutor-state.json".into()),
            ..Default::default()
        };
        assert_eq!(cfg.state_file_path(), Some(PathBuf::from("/tmp/tutor-state.json")));
    }
}
