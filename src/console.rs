use tracing::debug;

use crate::{serial_session::SerialSession, transcript::Transcript};

pub const REPEAT_SUFFIX: &str = " -- Repeat detected, try again";
pub const NO_RESPONSE: &str = "No response";

/// True when any character shows up more than once in `input`.
pub fn has_repeat(input: &str) -> bool {
    let mut seen = std::collections::HashSet::new();
    !input.chars().all(|c| seen.insert(c))
}

/// What happened to the outgoing half of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Rejected by the duplicate-character guard; nothing hit the wire.
    Repeat,
    /// The transport refused the write.
    Failed,
}

/// Single owner of the serial session and the transcript it feeds.
#[derive(Debug)]
pub struct Console {
    session: SerialSession,
    transcript: Transcript,
}

impl Console {
    pub fn new(session: SerialSession, transcript: Transcript) -> Self {
        Self {
            session,
            transcript,
        }
    }

    pub fn session(&self) -> &SerialSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SerialSession {
        &mut self.session
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// Log `input` and write it unless it repeats a character.
    pub fn send(&mut self, input: &str) -> SendOutcome {
        if has_repeat(input) {
            self.transcript.record(&format!("{input}{REPEAT_SUFFIX}"));
            return SendOutcome::Repeat;
        }
        self.transcript.record(input);
        if self.session.send(input) {
            debug!("sent {input:?}");
            SendOutcome::Sent
        } else {
            SendOutcome::Failed
        }
    }

    /// Read one burst and log each line, or the placeholder when nothing came back.
    pub fn receive(&mut self) -> Vec<String> {
        let lines: Vec<String> = match self.session.receive() {
            Some(data) if !data.is_empty() => data
                .trim_matches('\n')
                .split('\n')
                .map(str::to_string)
                .collect(),
            _ => vec![NO_RESPONSE.to_string()],
        };
        for line in &lines {
            self.transcript.record(line);
        }
        lines
    }

    /// One send+receive cycle, as driven by the command line and the preset runner.
    pub fn exchange(&mut self, input: &str) -> SendOutcome {
        let outcome = self.send(input);
        self.receive();
        outcome
    }

    /// Session teardown: closing marker, then release the port.
    pub fn shutdown(&mut self) {
        self.transcript.end_session();
        self.session.close();
    }
}
