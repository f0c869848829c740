//! The lifecycle contract shared by every kind of card session.

use crate::apdu::{CommandApdu, ResponseApdu};
use crate::session::Result;

/// State of a session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionState {
    #[default]
    Stopped,
    Started,
}

/// A session with a card, whatever carries the APDUs.
pub trait CardService {
    /// Opens the session. Does nothing when already open.
    fn open(&mut self) -> Result<()>;

    fn state(&self) -> SessionState;

    /// Whether there is an open session with the card.
    fn is_open(&self) -> bool {
        self.state() == SessionState::Started
    }

    /// Sends an APDU to the card, then receives the response including its status word.
    fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu>;

    /// Closes the session. Never fails, and does nothing when already closed.
    fn close(&mut self);

    fn name(&self) -> String;

    fn atr(&self) -> Result<Vec<u8>>;

    fn is_extended_length_supported(&self) -> bool;
}
