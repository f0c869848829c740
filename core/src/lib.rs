//! A crate to hold a session with a smart card through a terminal.
//!
//! The heart of the crate is [`TerminalSession`]: it connects to the card in a [`Terminal`],
//! exchanges [`CommandApdu`]s for [`ResponseApdu`]s over the basic channel, and disconnects again.
//! Terminals are pluggable through the traits in [`transport`]; a PC/SC implementation lives in
//! [`pcsc`] behind the `pcsc` feature.

mod log;

#[cfg(feature = "pcsc")]
pub mod pcsc;

pub mod apdu;
pub mod observer;
pub mod service;
pub mod session;
pub mod transport;

pub use self::apdu::{ApduError, CommandApdu, ResponseApdu};
pub use self::observer::{ExchangeObserver, ObserverId};
pub use self::service::{CardService, SessionState};
pub use self::session::{Error, Result, TerminalSession};
pub use self::transport::{Channel, Connection, Protocol, Terminal, TransportError};
