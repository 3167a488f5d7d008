use log::info;
use std::sync::Arc;

use super::driver::{SerialDriver, SerialError, SerialEvent, SerialLink};

/// Externally visible connection state of the serial session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialStatus {
    Closed,
    Opening,
    Open,
    Closing,
}

enum State {
    Closed,
    Opening,
    Open(SerialLink),
    Closing,
}

/// Owns the single serial session and its state machine.
///
/// Transitions: Closed -> Opening -> Open -> Closing -> Closed. A failed
/// open falls straight back to Closed. The session object only exists while
/// the state is Open.
pub struct SerialSessionManager {
    driver: Arc<dyn SerialDriver>,
    state: State,
}

impl SerialSessionManager {
    pub fn new(driver: Arc<dyn SerialDriver>) -> Self {
        Self {
            driver,
            state: State::Closed,
        }
    }

    pub fn status(&self) -> SerialStatus {
        match self.state {
            State::Closed => SerialStatus::Closed,
            State::Opening => SerialStatus::Opening,
            State::Open(_) => SerialStatus::Open,
            State::Closing => SerialStatus::Closing,
        }
    }

    /// Name of the currently open port, if any.
    pub fn port_name(&self) -> Option<&str> {
        match &self.state {
            State::Open(link) => Some(link.port_name()),
            _ => None,
        }
    }

    /// Opens a session on the given port. Only legal from Closed.
    pub async fn connect(&mut self, port: &str, baud_rate: u32) -> Result<(), SerialError> {
        if !matches!(self.state, State::Closed) {
            return Err(SerialError::AlreadyActive);
        }

        self.state = State::Opening;
        match self.driver.open(port, baud_rate).await {
            Ok(link) => {
                info!("serial opened on {}", port);
                self.state = State::Open(link);
                Ok(())
            }
            Err(e) => {
                self.state = State::Closed;
                Err(e)
            }
        }
    }

    /// Closes the open session and discards it. Only legal from Open.
    pub async fn disconnect(&mut self) -> Result<(), SerialError> {
        let previous = std::mem::replace(&mut self.state, State::Closing);
        match previous {
            State::Open(link) => {
                let result = link.close().await;
                self.state = State::Closed;
                info!("serial closed");
                result
            }
            other => {
                self.state = other;
                Err(SerialError::NotOpen)
            }
        }
    }

    /// Drains one pending event from the open link, if any.
    pub fn poll_event(&mut self) -> Option<SerialEvent> {
        match &mut self.state {
            State::Open(link) => link.poll_event(),
            _ => None,
        }
    }
}
