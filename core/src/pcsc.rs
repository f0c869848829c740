//! PC/SC support for cardsession library.
//! Can be enabled by turning `pcsc` feature on.
//!
//! ## What is PC/SC?
//! PC/SC (Personal Computer/Smart Card) is an abstraction layer for communicating with Smart Cards
//! from Windows. Using this layer, applications can connect to any devices that supports PC/SC,
//! without depending on their driver implementation. Windows and macOS supports PC/SC by themselves,
//! Linux also supports by installing pcsc-lite shared library.
//!
//! ## Supported platform
//! Linux, Windows and macOS are supported by pcsc-rust, backend of this implementation.
//! Refer the documentation of pcsc-rust for details:
//! <https://github.com/bluetech/pcsc-rust>
//!
//! ## Usage
//! ```rust,no_run
//! use cardsession::pcsc::Context;
//! use cardsession::{CommandApdu, ResponseApdu, TerminalSession};
//!
//! let ctx = Context::try_new().unwrap();
//! let terminal = ctx.open().unwrap();
//!
//! let mut session = TerminalSession::new(&terminal);
//! session.add_observer(|seq: u64, command: &CommandApdu, response: &ResponseApdu| {
//!     println!("#{} {} => {}", seq, command, response)
//! });
//!
//! session.open().unwrap();
//! let response = session
//!     .transmit(&CommandApdu::new([0x00, 0xA4, 0x04, 0x00]))
//!     .unwrap();
//! println!("SW: {:04X}", response.status_word());
//! session.close();
//! ```

use std::ffi::{CStr, CString, NulError};
use std::mem::{self, ManuallyDrop};
use std::sync::Arc;
use std::time::Duration;

use pcsc::{
    Card, Disposition, Protocols, ReaderState, Scope, ShareMode, State, MAX_BUFFER_SIZE,
    MAX_BUFFER_SIZE_EXTENDED,
};

use crate::log::debug;
use crate::transport::{self, Protocol, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    PcscError(#[from] pcsc::Error),

    #[error("Reader not found on PC/SC service")]
    ReaderNotFound,

    #[error("Reader name must not contain a NUL character: {0}")]
    InvalidReaderName(#[from] NulError),
}

pub type Result<T> = std::result::Result<T, Error>;

// `pcsc::Card` disconnects with SCARD_RESET_CARD when dropped. The handle is therefore never
// dropped: it is released through `disconnect(LeaveCard)`, or forgotten when the card is gone or
// the disconnect failed, leaving the handle to be reclaimed with the context.
type CardHandle = ManuallyDrop<Card>;

fn protocols(protocol: Protocol) -> Protocols {
    match protocol {
        Protocol::Any => Protocols::ANY,
        Protocol::T0 => Protocols::T0,
        Protocol::T1 => Protocols::T1,
        Protocol::Raw => Protocols::RAW,
    }
}

// `reset == false` is SCARD_LEAVE_CARD. Some platform bindings have been seen to invert this
// flag, check the disposition against the driver in use.
fn disposition(reset: bool) -> Disposition {
    match reset {
        true => Disposition::ResetCard,
        _ => Disposition::LeaveCard,
    }
}

/// PC/SC context.
#[derive(Clone)]
pub struct Context {
    ctx: pcsc::Context,
}

impl Context {
    /// Creates a PC/SC context in user scope.
    pub fn try_new() -> Result<Self> {
        Ok(Self {
            ctx: pcsc::Context::establish(Scope::User).map_err(Error::PcscError)?,
        })
    }

    /// Lists the readers known to the PC/SC service.
    pub fn readers(&self) -> Result<Vec<PcscTerminal>> {
        let mut buf = [0u8; 2048];

        match self.ctx.list_readers(&mut buf) {
            Ok(readers) => Ok(readers.map(|r| PcscTerminal::new(self, r)).collect()),
            Err(pcsc::Error::NoReadersAvailable) => Ok(vec![]),
            Err(e) => Err(Error::PcscError(e)),
        }
    }

    /// Finds the first reader.
    pub fn open(&self) -> Result<PcscTerminal> {
        self.readers()?
            .into_iter()
            .next()
            .ok_or(Error::ReaderNotFound)
    }

    /// Finds a reader by its name.
    pub fn terminal(&self, name: &str) -> Result<PcscTerminal> {
        let name = CString::new(name)?;

        self.readers()?
            .into_iter()
            .find(|t| t.reader == name)
            .ok_or(Error::ReaderNotFound)
    }
}

/// A reader attached to the PC/SC service.
pub struct PcscTerminal {
    ctx: pcsc::Context,
    reader: CString,
}

impl PcscTerminal {
    fn new(ctx: &Context, reader: &CStr) -> Self {
        debug!("Found reader: {}", reader.to_str().unwrap_or_default());

        Self {
            ctx: ctx.ctx.clone(),
            reader: reader.to_owned(),
        }
    }
}

impl transport::Terminal for PcscTerminal {
    type Connection = PcscConnection;

    fn name(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }

    fn connect(&self, protocol: Protocol) -> transport::Result<PcscConnection> {
        let card = ManuallyDrop::new(self.ctx.connect(
            &self.reader,
            ShareMode::Shared,
            protocols(protocol),
        )?);

        let atr = match card.status2_owned() {
            Ok(status) => status.atr().to_vec(),
            Err(e) => {
                if let Err((card, _)) =
                    ManuallyDrop::into_inner(card).disconnect(Disposition::LeaveCard)
                {
                    mem::forget(card);
                }

                return Err(e.into());
            }
        };

        debug!("Connected to your card");

        Ok(PcscConnection {
            card: Arc::new(card),
            atr,
        })
    }

    fn is_card_present(&self) -> transport::Result<bool> {
        let mut states = [ReaderState::new(self.reader.clone(), State::UNAWARE)];
        self.ctx.get_status_change(Duration::ZERO, &mut states)?;

        Ok(states[0].event_state().contains(State::PRESENT))
    }
}

/// A card connected through PC/SC.
/// Dropping it without `disconnect` leaves the card as it is.
pub struct PcscConnection {
    card: Arc<CardHandle>,
    atr: Vec<u8>,
}

impl transport::Connection for PcscConnection {
    type Channel = PcscChannel;

    fn basic_channel(&self) -> Option<PcscChannel> {
        Some(PcscChannel {
            card: Arc::clone(&self.card),
        })
    }

    fn atr(&self) -> Vec<u8> {
        self.atr.clone()
    }

    fn disconnect(self, reset: bool) -> transport::Result<()> {
        let card = Arc::try_unwrap(self.card)
            .map_err(|_| TransportError::new("A channel to the card is still in use"))?;

        ManuallyDrop::into_inner(card)
            .disconnect(disposition(reset))
            .map_err(|(card, e)| {
                mem::forget(card);
                TransportError::from(e)
            })
    }

    fn transmit_control_command(&self, code: u32, data: &[u8]) -> transport::Result<Vec<u8>> {
        let mut rx = [0u8; MAX_BUFFER_SIZE];
        let rx = self.card.control(code.into(), data, &mut rx)?;

        Ok(Vec::from(rx))
    }
}

/// The basic channel of a card connected through PC/SC.
pub struct PcscChannel {
    card: Arc<CardHandle>,
}

impl transport::Channel for PcscChannel {
    fn transmit(&self, tx: &[u8]) -> transport::Result<Vec<u8>> {
        let mut rx = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];
        let rx = self.card.transmit(tx, &mut rx)?;

        Ok(Vec::from(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocols() {
        assert_eq!(Protocols::ANY, protocols(Protocol::Any));
        assert_eq!(Protocols::T0, protocols(Protocol::T0));
        assert_eq!(Protocols::T1, protocols(Protocol::T1));
        assert_eq!(Protocols::RAW, protocols(Protocol::Raw));
        assert_eq!(Protocols::ANY, protocols(Protocol::default()));
    }

    #[test]
    fn test_disposition_leaves_card_unless_reset() {
        assert!(matches!(disposition(false), Disposition::LeaveCard));
        assert!(matches!(disposition(true), Disposition::ResetCard));
    }

    #[test]
    fn test_card_handle_is_never_dropped() {
        assert!(!mem::needs_drop::<CardHandle>());
    }
}
