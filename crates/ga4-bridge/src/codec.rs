//! CBOR encoding for queue payloads.

use crate::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value as CBOR.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(buf)
}

/// Decode a CBOR payload.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    if bytes.is_empty() {
        return Err(Error::Codec("empty payload".into()));
    }
    ciborium::from_reader(bytes).map_err(|e| Error::Codec(e.to_string()))
}
