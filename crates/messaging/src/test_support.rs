//! Recording fakes shared by unit tests.

use std::sync::{Mutex, PoisonError};

use dispatchbus_core::{CommandMessage, DeliveryOptions, EventMessage};

use crate::logger::{Logger, Severity};
use crate::outbound::{DeliveryError, OutboundDeliveryContext};

#[derive(Debug, Clone)]
pub enum Sent {
    Command(CommandMessage),
    Event(EventMessage),
}

#[derive(Debug, Default)]
pub struct RecordingOutbound {
    calls: Mutex<Vec<Sent>>,
}

impl RecordingOutbound {
    pub fn calls(&self) -> Vec<Sent> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn events(&self) -> Vec<EventMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Sent::Event(e) => Some(e),
                Sent::Command(_) => None,
            })
            .collect()
    }
}

impl OutboundDeliveryContext for RecordingOutbound {
    fn send(&self, command: CommandMessage, _options: DeliveryOptions) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Sent::Command(command));
        Ok(())
    }

    fn publish(&self, event: EventMessage, _options: DeliveryOptions) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Sent::Event(event));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl RecordingLogger {
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, severity: Severity, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((severity, message.to_string()));
    }
}
