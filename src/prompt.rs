//! Blocking operator prompts.

use dialoguer::{Confirm, Input};

use crate::error::Result;

pub trait Prompt: Send + Sync {
    fn ask_text(&self, label: &str) -> Result<String>;

    fn ask_confirm(&self, label: &str) -> Result<bool>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask_text(&self, label: &str) -> Result<String> {
        let answer = Input::<String>::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()?;
        Ok(answer.trim().to_owned())
    }

    fn ask_confirm(&self, label: &str) -> Result<bool> {
        Ok(Confirm::new().with_prompt(label).default(true).interact()?)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned answers and records every label it was asked.
    #[derive(Default)]
    pub struct ScriptedPrompt {
        texts: Mutex<VecDeque<String>>,
        confirms: Mutex<VecDeque<bool>>,
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedPrompt {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn text(self, answer: &str) -> Self {
            self.texts.lock().unwrap().push_back(answer.to_owned());
            self
        }

        pub fn confirm(self, answer: bool) -> Self {
            self.confirms.lock().unwrap().push_back(answer);
            self
        }

        pub fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    impl Prompt for ScriptedPrompt {
        fn ask_text(&self, label: &str) -> Result<String> {
            self.asked.lock().unwrap().push(label.to_owned());
            self.texts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Prompt(format!("unexpected prompt: {}", label)))
        }

        fn ask_confirm(&self, label: &str) -> Result<bool> {
            self.asked.lock().unwrap().push(label.to_owned());
            self.confirms
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Prompt(format!("unexpected confirm: {}", label)))
        }
    }

    #[test]
    fn test_scripted_prompt_replays() {
        let prompt = ScriptedPrompt::new().text("123").confirm(false);
        assert_eq!(prompt.ask_text("Depot 1: ").unwrap(), "123");
        assert!(!prompt.ask_confirm("Try again?").unwrap());
        assert!(prompt.ask_text("again").is_err());
        assert_eq!(prompt.asked(), vec!["Depot 1: ", "Try again?", "again"]);
    }
}
