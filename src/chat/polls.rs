// src/chat/polls.rs
//! Poll creation and voting

use thiserror::Error;

use crate::models::{MessageAuthor, PollDetails, PollOption};

pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("{0:?} has already voted on this poll")]
    AlreadyVoted(MessageAuthor),
    #[error("poll has no option {0}")]
    UnknownOption(String),
    #[error("poll has no options")]
    NoOptions,
}

/// Trim the question and options, dropping blank options. `None` when the
/// question is blank or the number of remaining options is outside 2..=5.
pub fn validate_poll(question: &str, options: &[String]) -> Option<(String, Vec<String>)> {
    let question = question.trim();
    let options: Vec<String> = options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if question.is_empty() || options.len() < MIN_POLL_OPTIONS || options.len() > MAX_POLL_OPTIONS {
        return None;
    }
    Some((question.to_string(), options))
}

impl PollDetails {
    /// Fresh poll with zero votes, option ids `opt-0`, `opt-1`, ...
    pub fn new(question: &str, options: &[String]) -> Self {
        PollDetails {
            question: question.to_string(),
            options: options
                .iter()
                .enumerate()
                .map(|(i, text)| PollOption {
                    id: format!("opt-{}", i),
                    text: text.clone(),
                    votes: 0,
                })
                .collect(),
            voters: Vec::new(),
        }
    }

    pub fn has_voted(&self, voter: MessageAuthor) -> bool {
        self.voters.contains(&voter)
    }

    /// Count one vote. Fails without touching the poll if `voter` already
    /// voted or `option_id` does not exist.
    pub fn vote(&mut self, option_id: &str, voter: MessageAuthor) -> Result<(), PollError> {
        if self.has_voted(voter) {
            return Err(PollError::AlreadyVoted(voter));
        }
        let option = self
            .options
            .iter_mut()
            .find(|o| o.id == option_id)
            .ok_or_else(|| PollError::UnknownOption(option_id.to_string()))?;
        option.votes += 1;
        self.voters.push(voter);
        Ok(())
    }

    pub fn total_votes(&self) -> u32 {
        self.options.iter().map(|o| o.votes).sum()
    }

    /// Share of the votes held by an option, 0 when nobody voted
    pub fn percentage(&self, option: &PollOption) -> u32 {
        match self.total_votes() {
            0 => 0,
            total => ((option.votes as f64 / total as f64) * 100.0).round() as u32,
        }
    }

    /// Pick an option id at random
    pub fn random_option_id(&self) -> Result<String, PollError> {
        use rand::seq::SliceRandom;

        self.options
            .choose(&mut rand::thread_rng())
            .map(|o| o.id.clone())
            .ok_or(PollError::NoOptions)
    }
}
