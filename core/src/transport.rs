//! Contracts the session requires from the terminal it talks through.
//!
//! A [`Terminal`] hands out a [`Connection`] to the inserted card, and the connection hands out
//! the basic [`Channel`] that APDUs travel on. Implementations live outside of this crate's core;
//! a PC/SC backed one is available in [`crate::pcsc`] with the `pcsc` feature.

use std::error::Error as StdError;

/// A fault raised by the underlying transport.
/// The diagnostic text of the original fault is kept as-is.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct TransportError {
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    /// Wraps an arbitrary fault or message.
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[cfg(feature = "pcsc")]
impl From<pcsc::Error> for TransportError {
    fn from(e: pcsc::Error) -> Self {
        Self::new(e)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Protocol to negotiate with the card on connect.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Protocol {
    /// Accepts whatever the card offers: T=0, T=1 or contactless.
    #[default]
    Any,
    T0,
    T1,
    Raw,
}

/// A physical or virtual terminal (reader) a card can be inserted into or touched to.
pub trait Terminal {
    type Connection: Connection;

    /// Human readable name of the terminal, stable over its lifetime.
    fn name(&self) -> String;

    /// Connects to the card currently in the terminal.
    fn connect(&self, protocol: Protocol) -> Result<Self::Connection>;

    /// Determines whether a card is present in the terminal right now.
    fn is_card_present(&self) -> Result<bool>;
}

/// A live connection to a card.
pub trait Connection {
    type Channel: Channel;

    /// Gets the basic (default) logical channel, if the card exposes one.
    fn basic_channel(&self) -> Option<Self::Channel>;

    /// Answer-To-Reset bytes the card returned when connected.
    fn atr(&self) -> Vec<u8>;

    /// Disconnects from the card, resetting it only when `reset` is set.
    fn disconnect(self, reset: bool) -> Result<()>;

    /// Sends a control command to the terminal driver, bypassing the logical channel.
    fn transmit_control_command(&self, code: u32, data: &[u8]) -> Result<Vec<u8>>;
}

/// A logical channel APDUs are exchanged on.
pub trait Channel {
    /// Transmits raw command octets, then receives raw response octets including the status word.
    fn transmit(&self, command: &[u8]) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_keeps_text() {
        let e = TransportError::new("reader unplugged");

        assert_eq!("reader unplugged", e.to_string());
        assert!(StdError::source(&e).is_some());
    }

    #[test]
    fn test_protocol_defaults_to_any() {
        assert_eq!(Protocol::Any, Protocol::default());
    }
}
