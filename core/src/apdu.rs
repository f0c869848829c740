//! Command and response APDUs as plain byte sequences.
//! The layout of the octets is opaque here, except for the trailing status word of a response.

use std::fmt::{Display, Formatter};

const SW_LEN: usize = 2;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ApduError {
    #[error("Response APDU must carry a 2-octet status word, got {0} octet(s)")]
    TooShort(usize),
}

pub type Result<T> = std::result::Result<T, ApduError>;

/// An APDU command to be transmitted.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CommandApdu(Vec<u8>);

impl CommandApdu {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for CommandApdu {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for CommandApdu {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<::apdu::Command<'_>> for CommandApdu {
    fn from(command: ::apdu::Command<'_>) -> Self {
        Self(Vec::from(command))
    }
}

impl Display for CommandApdu {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}

/// An APDU response received from the card, always ending with a status word.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<u8>", into = "Vec<u8>")
)]
pub struct ResponseApdu(Vec<u8>);

impl ResponseApdu {
    /// Wraps the octets, rejecting them if no status word fits.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        match bytes.len() {
            n if n < SW_LEN => Err(ApduError::TooShort(n)),
            _ => Ok(Self(bytes)),
        }
    }

    /// Body of the response, excluding the status word.
    pub fn data(&self) -> &[u8] {
        &self.0[..self.0.len() - SW_LEN]
    }

    pub fn sw1(&self) -> u8 {
        self.0[self.0.len() - 2]
    }

    pub fn sw2(&self) -> u8 {
        self.0[self.0.len() - 1]
    }

    pub fn status_word(&self) -> u16 {
        u16::from_be_bytes([self.sw1(), self.sw2()])
    }

    /// Determines whether the status word indicates success or not.
    pub fn is_success(&self) -> bool {
        matches!((self.sw1(), self.sw2()), (0x90, 0x00) | (0x91, 0x00))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl TryFrom<Vec<u8>> for ResponseApdu {
    type Error = ApduError;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::new(bytes)
    }
}

impl From<ResponseApdu> for Vec<u8> {
    fn from(response: ResponseApdu) -> Self {
        response.0
    }
}

impl<'a> From<&'a ResponseApdu> for ::apdu::Response<'a> {
    fn from(response: &'a ResponseApdu) -> Self {
        response.as_bytes().into()
    }
}

impl Display for ResponseApdu {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_splits_status_word() {
        let response = ResponseApdu::new(vec![0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();

        assert_eq!(&[0x01, 0x02, 0x03], response.data());
        assert_eq!(0x9000, response.status_word());
        assert!(response.is_success());
    }

    #[test]
    fn test_response_status_word_only() {
        let response = ResponseApdu::new(vec![0x6A, 0x82]).unwrap();

        assert!(response.data().is_empty());
        assert_eq!((0x6A, 0x82), (response.sw1(), response.sw2()));
        assert!(!response.is_success());
    }

    #[test]
    fn test_response_too_short() {
        assert_eq!(Err(ApduError::TooShort(1)), ResponseApdu::new(vec![0x90]));
        assert_eq!(Err(ApduError::TooShort(0)), ResponseApdu::new(vec![]));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(
            CommandApdu::new([0x00, 0xA4, 0x04, 0x00]),
            CommandApdu::from(vec![0x00, 0xA4, 0x04, 0x00]),
        );
        assert_ne!(
            ResponseApdu::new(vec![0x90, 0x00]).unwrap(),
            ResponseApdu::new(vec![0x91, 0x00]).unwrap(),
        );
    }

    #[test]
    fn test_command_from_apdu_crate() {
        let command = CommandApdu::from(::apdu::Command::new(0x00, 0xA4, 0x04, 0x00));

        assert_eq!(&[0x00, 0xA4, 0x04, 0x00], command.as_bytes());
    }

    #[test]
    fn test_response_into_apdu_crate() {
        let response = ResponseApdu::new([0xCA, 0xFE, 0x6A, 0x82]).unwrap();
        let converted = ::apdu::Response::from(&response);

        assert_eq!(&[0xCA, 0xFE], converted.payload);
        assert_eq!((0x6A, 0x82), converted.trailer);
    }

    #[test]
    fn test_display_as_hex() {
        let command = CommandApdu::new([0x00, 0xB0, 0x00, 0x0A]);

        assert_eq!("00B0000A", command.to_string());
    }
}
