/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-level encoding of wire messages and journal entries.
//!
//! Both directions use [borsh](https://docs.rs/borsh). A message that fails to decode is never
//! retried: the caller logs and drops it.

use std::{
    fmt::{self, Display, Formatter},
    io,
};

use borsh::{BorshDeserialize, BorshSerialize};

#[derive(Debug)]
pub enum CodecError {
    /// The value could not be serialized.
    EncodingError(io::Error),

    /// The bytes are not a valid encoding of the expected type, or have trailing garbage.
    DecodingError(io::Error),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::EncodingError(err) => write!(f, "encoding failed: {}", err),
            CodecError::DecodingError(err) => write!(f, "decoding failed: {}", err),
        }
    }
}

pub fn encode<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    value.try_to_vec().map_err(CodecError::EncodingError)
}

pub fn decode<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, CodecError> {
    T::try_from_slice(bytes).map_err(CodecError::DecodingError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        networking::messages::Message,
        paxos::messages::PaxosMessage,
        types::data_types::SequenceNumber,
    };

    #[test]
    fn truncated_message_fails_to_decode() {
        let bytes = encode(&Message::from(PaxosMessage::prepare(SequenceNumber::new(7)))).unwrap();

        assert!(matches!(
            decode::<Message>(&bytes[..bytes.len() - 1]),
            Err(CodecError::DecodingError(_))
        ));
        assert!(matches!(
            decode::<Message>(&[0xff, 0x00]),
            Err(CodecError::DecodingError(_))
        ));
    }
}
