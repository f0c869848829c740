mod exchange;

use clap::{ArgAction, Parser, Subcommand};
use dialoguer::Select;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cardsession::pcsc::{Context, PcscTerminal};
use cardsession::{CommandApdu, Terminal, TerminalSession};

use crate::exchange::Printer;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Error occurred on communicating with PC/SC: {0}")]
    Pcsc(#[from] cardsession::pcsc::Error),

    #[error("{0}")]
    Session(#[from] cardsession::Error),

    #[error("Could not decode the hex string: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Could not read the selection: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid control code: {0}")]
    ControlCode(String),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Name of the reader to use. Asks interactively when omitted and several are attached.
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Prints exchanges as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    /// Raises the log level; repeat for more.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lists the readers and whether a card is present in them.
    Readers,

    #[command(flatten)]
    Card(CardCommand),
}

/// Commands run within a session with the card.
#[derive(Subcommand)]
enum CardCommand {
    /// Prints the ATR of the card.
    Atr,

    /// Transmits APDUs written in hex, one argument each.
    Send {
        #[arg(required = true)]
        apdus: Vec<String>,
    },

    /// Selects an application by its AID written in hex.
    Select { aid: String },

    /// Sends a control command to the reader driver.
    Control {
        /// Function number passed to SCARD_CTL_CODE, decimal or 0x-prefixed hex.
        code: String,

        /// Command data written in hex.
        data: Option<String>,

        /// Uses CODE as-is instead of passing it to SCARD_CTL_CODE.
        #[arg(long)]
        raw: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context::try_new()?;

    match cli.command {
        Command::Readers => list_readers(&ctx),
        Command::Card(command) => {
            let terminal = select_terminal(&ctx, cli.reader.as_deref())?;

            run_in_session(&terminal, command, cli.json)
        }
    }
}

fn run_in_session(terminal: &PcscTerminal, command: CardCommand, json: bool) -> Result<()> {
    let mut session = TerminalSession::new(terminal);
    session.add_observer(Printer::new(json));
    session.set_close_listener(|e| debug!("Ignored a fault while closing: {}", e));
    session.open()?;

    let result = match command {
        CardCommand::Atr => session
            .atr()
            .map(|atr| println!("{}", hex::encode_upper(atr)))
            .map_err(Error::from),
        CardCommand::Send { apdus } => apdus.iter().try_for_each(|apdu| {
            let command = CommandApdu::new(hex::decode(apdu)?);

            session.transmit(&command).map(|_| ()).map_err(Error::from)
        }),
        CardCommand::Select { aid } => {
            let aid = hex::decode(aid)?;

            session
                .transmit(&select_command(&aid))
                .map(|_| ())
                .map_err(Error::from)
        }
        CardCommand::Control { code, data, raw } => control_code(&code, raw).and_then(|code| {
            let data = hex::decode(data.unwrap_or_default())?;

            session
                .transmit_control_command(code, &data)
                .map(|rx| println!("{}", hex::encode_upper(rx)))
                .map_err(Error::from)
        }),
    };

    info!("{} exchange(s) with {}", session.exchange_count(), session.name());
    session.close();

    result
}

/// Builds a SELECT by DF name, asking for the FCI.
fn select_command(aid: &[u8]) -> CommandApdu {
    CommandApdu::from(apdu::Command::from(apdu::command::select_file(0x04, 0x00, aid)))
}

fn list_readers(ctx: &Context) -> Result<()> {
    for terminal in ctx.readers()? {
        let present = match terminal.is_card_present() {
            Ok(true) => "card present",
            Ok(false) => "empty",
            Err(_) => "unknown",
        };

        println!("{}\t{}", terminal.name(), present);
    }

    Ok(())
}

fn select_terminal(ctx: &Context, name: Option<&str>) -> Result<PcscTerminal> {
    if let Some(name) = name {
        return Ok(ctx.terminal(name)?);
    }

    let mut terminals = ctx.readers()?;
    match terminals.len() {
        0 => Err(cardsession::pcsc::Error::ReaderNotFound.into()),
        1 => Ok(terminals.remove(0)),
        _ => {
            let names = terminals.iter().map(|t| t.name()).collect::<Vec<_>>();
            let index = Select::new()
                .with_prompt("Select a reader")
                .items(&names)
                .default(0)
                .interact()?;

            Ok(terminals.swap_remove(index))
        }
    }
}

fn control_code(code: &str, raw: bool) -> Result<u32> {
    let parsed = match code.strip_prefix("0x").or_else(|| code.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => code.parse::<u32>(),
    }
    .map_err(|e| Error::ControlCode(format!("{}: {}", code, e)))?;

    match raw {
        true => Ok(parsed),
        _ => u32::try_from(pcsc::ctl_code(parsed.into()))
            .map_err(|_| Error::ControlCode(format!("{} is out of range", code))),
    }
}
