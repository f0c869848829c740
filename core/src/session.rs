//! Session with a card reached through a [`Terminal`].
//!
//! A session starts stopped. `open` connects to the card and picks its basic channel, `transmit`
//! exchanges APDUs over that channel, and `close` lets go of the card again. Every successful
//! exchange is counted and reported to the registered [`ExchangeObserver`]s.

use std::fmt::{Display, Formatter};
use std::time::Instant;

use crate::apdu::{ApduError, CommandApdu, ResponseApdu};
use crate::log::{debug, info, warn};
use crate::observer::{ExchangeObserver, ObserverId, Observers};
use crate::service::{CardService, SessionState};
use crate::transport::{Channel, Connection, Protocol, Terminal, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not connect to the card: {0}")]
    Connection(#[source] TransportError),

    #[error("Connected to the card, but no channel is available")]
    ChannelUnavailable,

    #[error("The session is not open")]
    NotConnected,

    #[error("Error occurred while exchanging an APDU: {0}")]
    Transmit(#[source] TransportError),

    #[error("The card returned a malformed response: {0}")]
    MalformedResponse(#[source] ApduError),

    #[error("Error occurred while sending a control command: {0}")]
    ControlCommand(#[source] TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;

type CloseListener = Box<dyn Fn(&TransportError) + Send>;

struct Live<C: Connection> {
    connection: C,
    channel: C::Channel,
}

/// A session with the card inserted in a terminal.
///
/// The terminal is borrowed, so it outlives the session. `open`, `transmit` and `close` take
/// `&mut self`; share a session between threads by wrapping it in a `Mutex`.
pub struct TerminalSession<'t, T: Terminal> {
    terminal: &'t T,
    live: Option<Live<T::Connection>>,
    state: SessionState,
    last_active_time: Option<Instant>,
    exchange_count: u64,
    observers: Observers,
    close_listener: Option<CloseListener>,
}

impl<'t, T: Terminal> TerminalSession<'t, T> {
    /// Creates a stopped session on the terminal.
    pub fn new(terminal: &'t T) -> Self {
        Self {
            terminal,
            live: None,
            state: SessionState::Stopped,
            last_active_time: None,
            exchange_count: 0,
            observers: Observers::default(),
            close_listener: None,
        }
    }

    /// Connects to the card with any protocol it offers, then picks its basic channel.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        debug!("Connecting to the card in {}", self.terminal.name());

        let connection = self
            .terminal
            .connect(Protocol::Any)
            .map_err(Error::Connection)?;
        let channel = connection
            .basic_channel()
            .ok_or(Error::ChannelUnavailable)?;

        debug!("ATR: {}", hex::encode(connection.atr()));

        self.live = Some(Live {
            connection,
            channel,
        });
        self.state = SessionState::Started;
        self.last_active_time = Some(Instant::now());

        info!("Opened session with {}", self.terminal.name());

        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Started
    }

    /// Sends an APDU to the card, then receives the response.
    ///
    /// Counters, observers and the activity time are only touched once a well-formed response
    /// came back.
    pub fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        let live = self.live.as_ref().ok_or(Error::NotConnected)?;

        debug!("TX: {}", command);

        let rx = live
            .channel
            .transmit(command.as_bytes())
            .map_err(Error::Transmit)?;
        let response = ResponseApdu::new(rx).map_err(Error::MalformedResponse)?;

        debug!("RX: {}", response);

        self.exchange_count += 1;
        self.observers.notify(self.exchange_count, command, &response);
        self.last_active_time = Some(Instant::now());

        Ok(response)
    }

    /// Gets the Answer-To-Reset of the connected card.
    pub fn atr(&self) -> Result<Vec<u8>> {
        self.live
            .as_ref()
            .map(|live| live.connection.atr())
            .ok_or(Error::NotConnected)
    }

    /// Sends a control command to the terminal driver, e.g. to drive a PIN pad.
    pub fn transmit_control_command(&self, code: u32, data: &[u8]) -> Result<Vec<u8>> {
        let live = self.live.as_ref().ok_or(Error::NotConnected)?;

        debug!("CTL {:#X}: {}", code, hex::encode(data));

        live.connection
            .transmit_control_command(code, data)
            .map_err(Error::ControlCommand)
    }

    /// Always reports support for extended length APDUs.
    /// The ATR is not inspected, so this is an approximation rather than a guarantee.
    pub fn is_extended_length_supported(&self) -> bool {
        true
    }

    /// Closes the session with the card.
    ///
    /// The card is disconnected without a reset, and only when it is still present: some
    /// drivers hang when asked to disconnect a card that is gone. Faults on the way are logged
    /// and handed to the close listener, and the session ends up stopped regardless.
    pub fn close(&mut self) {
        if let Some(Live {
            connection,
            channel,
        }) = self.live.take()
        {
            drop(channel);

            match self.terminal.is_card_present() {
                Ok(true) => {
                    if let Err(e) = connection.disconnect(false) {
                        self.report_close_fault(e);
                    }
                }
                Ok(false) => {
                    debug!("Card is gone, skipping disconnect");
                }
                Err(e) => self.report_close_fault(e),
            }

            info!("Closed session with {}", self.terminal.name());
        }

        self.state = SessionState::Stopped;
    }

    /// Registers an observer, called after each successful exchange.
    pub fn add_observer<O>(&mut self, observer: O) -> ObserverId
    where
        O: ExchangeObserver + Send + 'static,
    {
        self.observers.add(Box::new(observer))
    }

    /// Deregisters an observer. Returns false if it was not registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Sets a listener receiving the faults `close` swallows.
    pub fn set_close_listener<F>(&mut self, listener: F)
    where
        F: Fn(&TransportError) + Send + 'static,
    {
        self.close_listener = Some(Box::new(listener));
    }

    /// The terminal used by this session.
    pub fn terminal(&self) -> &'t T {
        self.terminal
    }

    pub fn name(&self) -> String {
        format!("Terminal [ {} ]", self.terminal.name())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of successful exchanges so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchange_count
    }

    /// When the session was opened or last exchanged an APDU, whichever is later.
    pub fn last_active_time(&self) -> Option<Instant> {
        self.last_active_time
    }

    fn report_close_fault(&self, e: TransportError) {
        warn!("Disconnect failed, ignoring: {}", e);

        if let Some(listener) = &self.close_listener {
            listener(&e);
        }
    }
}

impl<'t, T: Terminal> CardService for TerminalSession<'t, T> {
    fn open(&mut self) -> Result<()> {
        TerminalSession::open(self)
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        TerminalSession::transmit(self, command)
    }

    fn close(&mut self) {
        TerminalSession::close(self)
    }

    fn name(&self) -> String {
        TerminalSession::name(self)
    }

    fn atr(&self) -> Result<Vec<u8>> {
        TerminalSession::atr(self)
    }

    fn is_extended_length_supported(&self) -> bool {
        TerminalSession::is_extended_length_supported(self)
    }
}

impl<'t, T: Terminal> Display for TerminalSession<'t, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TerminalSession [{}]", self.terminal.name())
    }
}

impl<'t, T: Terminal> Drop for TerminalSession<'t, T> {
    fn drop(&mut self) {
        self.close();
    }
}
