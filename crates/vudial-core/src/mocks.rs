//! In-memory transport and pacer that record what they were asked to do.

use crate::transport::{ConnectionState, Transport, TransportError};
use crate::upload::Pacer;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use vudial_protocol::{Command, Response};

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    Sent(Command),
    Settled(Duration),
}

/// Ordered record shared between a [`MockTransport`] and a [`RecordingPacer`].
#[derive(Debug, Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<TimelineEvent>>>);

impl Timeline {
    pub fn events(&self) -> Vec<TimelineEvent> {
        self.0.lock().clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.0
            .lock()
            .iter()
            .filter_map(|event| match event {
                TimelineEvent::Sent(cmd) => Some(cmd.clone()),
                TimelineEvent::Settled(_) => None,
            })
            .collect()
    }

    fn push(&self, event: TimelineEvent) {
        self.0.lock().push(event);
    }
}

pub struct MockTransport {
    timeline: Timeline,
    replies: VecDeque<Option<Vec<u8>>>,
    fail_at: Option<usize>,
    state: ConnectionState,
}

impl MockTransport {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            replies: VecDeque::new(),
            fail_at: None,
            state: ConnectionState::Connected("mock".into()),
        }
    }

    /// Queue the raw bytes the next `request` decodes; `None` simulates a timeout.
    pub fn push_reply(&mut self, reply: Option<&[u8]>) {
        self.replies.push_back(reply.map(<[u8]>::to_vec));
    }

    /// Make the `index`-th outgoing command (zero based) fail with an I/O error.
    pub fn fail_at(&mut self, index: usize) {
        self.fail_at = Some(index);
    }

    fn transmit(&mut self, command: &Command) -> Result<(), TransportError> {
        if !self.state.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let index = self.timeline.commands().len();
        if self.fail_at == Some(index) {
            self.state = ConnectionState::Failed("write failed".into());
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed").into());
        }
        self.timeline.push(TimelineEvent::Sent(command.clone()));
        Ok(())
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> bool {
        self.state = ConnectionState::Connected("mock".into());
        true
    }

    fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    fn send(&mut self, command: &Command) -> Result<(), TransportError> {
        self.transmit(command)
    }

    fn request(&mut self, command: &Command) -> Result<Option<Response>, TransportError> {
        self.transmit(command)?;
        match self.replies.pop_front().flatten() {
            Some(bytes) => Ok(Some(Response::parse(&bytes)?)),
            None => Ok(None),
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.clone()
    }
}

/// Pacer that records delays instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingPacer {
    timeline: Timeline,
}

impl RecordingPacer {
    pub fn new(timeline: Timeline) -> Self {
        Self { timeline }
    }
}

impl Pacer for RecordingPacer {
    fn settle(&mut self, delay: Duration) {
        self.timeline.push(TimelineEvent::Settled(delay));
    }
}
