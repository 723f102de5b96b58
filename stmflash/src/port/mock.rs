//! Scripted port for engine tests.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::port::{LineSettings, Port, Signals};

/// Port that replays queued responses and records everything sent to it.
#[derive(Debug, Default)]
pub(crate) struct MockPort {
    pub responses: VecDeque<Vec<u8>>,
    pub written: Vec<Vec<u8>>,
    pub signals: Vec<Signals>,
    pub settings: Option<LineSettings>,
    pub open: bool,
    pub open_count: usize,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn respond(&mut self, bytes: &[u8]) -> &mut Self {
        self.responses.push_back(bytes.to_vec());
        self
    }

    /// Queue `n` single-byte ACK responses.
    pub fn ack(&mut self, n: usize) -> &mut Self {
        for _ in 0..n {
            self.respond(&[crate::protocol::ACK]);
        }
        self
    }

    /// All writes concatenated.
    pub fn bytes_written(&self) -> Vec<u8> {
        self.written.concat()
    }
}

impl Port for MockPort {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self, settings: &LineSettings) -> Result<()> {
        self.open = true;
        self.open_count += 1;
        self.settings = Some(*settings);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        self.responses
            .pop_front()
            .ok_or_else(|| Error::Transport("no scripted response left".to_string()))
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.open {
            return Err(Error::Transport("port closed".to_string()));
        }
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn control(&mut self, signals: &Signals) -> Result<()> {
        self.signals.push(*signals);
        Ok(())
    }
}
