use serde::Serialize;
use tracing::warn;

use cardsession::{CommandApdu, ExchangeObserver, ResponseApdu};

#[derive(Serialize)]
struct Exchange<'a> {
    sequence: u64,
    command: &'a CommandApdu,
    response: &'a ResponseApdu,
    status_word: String,
}

/// Prints every exchange to stdout, either human readable or as JSON lines.
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Renders one exchange, or nothing if it could not be serialized.
    fn render(
        &self,
        sequence: u64,
        command: &CommandApdu,
        response: &ResponseApdu,
    ) -> Option<String> {
        let status_word = format!("{:04X}", response.status_word());

        match self.json {
            true => serde_json::to_string(&Exchange {
                sequence,
                command,
                response,
                status_word,
            })
            .map_err(|e| warn!("Could not serialize the exchange: {}", e))
            .ok(),
            _ => Some(format!(
                "#{} > {}\n#{} < {} (SW {})",
                sequence,
                command,
                sequence,
                hex::encode_upper(response.data()),
                status_word,
            )),
        }
    }
}

impl ExchangeObserver for Printer {
    fn on_exchange(&self, sequence: u64, command: &CommandApdu, response: &ResponseApdu) {
        if let Some(line) = self.render(sequence, command, response) {
            println!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> (CommandApdu, ResponseApdu) {
        (
            CommandApdu::new([0x00, 0xB0, 0x00, 0x00, 0x02]),
            ResponseApdu::new([0xCA, 0xFE, 0x90, 0x00]).unwrap(),
        )
    }

    #[test]
    fn test_render_text() {
        let (command, response) = exchange();

        assert_eq!(
            Some("#3 > 00B0000002\n#3 < CAFE (SW 9000)".to_owned()),
            Printer::new(false).render(3, &command, &response),
        );
    }

    #[test]
    fn test_render_json() {
        let (command, response) = exchange();
        let line = Printer::new(true).render(1, &command, &response).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(1, value["sequence"]);
        assert_eq!(serde_json::json!([0, 176, 0, 0, 2]), value["command"]);
        assert_eq!(serde_json::json!([202, 254, 144, 0]), value["response"]);
        assert_eq!("9000", value["status_word"]);
    }
}
