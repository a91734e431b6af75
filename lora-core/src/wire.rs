//! Framing: length-prefix (4 bytes LE) + raw field bytes.

use crate::error::Failure;

const LEN_SIZE: usize = 4;
const MAX_FIELD_LEN: u32 = 1024 * 1024; // 1 MiB

/// Append one field to `out`: 4 bytes LE length + bytes.
pub fn put_field(out: &mut Vec<u8>, field: &[u8]) -> Result<(), FieldEncodeError> {
    let len = u32::try_from(field.len()).map_err(|_| FieldEncodeError::TooLarge)?;
    if len > MAX_FIELD_LEN {
        return Err(FieldEncodeError::TooLarge);
    }
    out.reserve(LEN_SIZE + field.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(field);
    Ok(())
}

/// Error encoding a field (size limit).
#[derive(Debug, thiserror::Error)]
pub enum FieldEncodeError {
    #[error("field too large")]
    TooLarge,
}

/// Read one field from the front of `bytes`. Returns the field and the number of bytes consumed.
pub fn take_field(bytes: &[u8]) -> Result<(&[u8], usize), FieldDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FieldDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FIELD_LEN as usize {
        return Err(FieldDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FieldDecodeError::NeedMore);
    }
    Ok((&bytes[LEN_SIZE..LEN_SIZE + len], LEN_SIZE + len))
}

/// Error decoding a field (truncated input or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FieldDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("field too large")]
    TooLarge,
}

impl From<FieldEncodeError> for Failure {
    fn from(e: FieldEncodeError) -> Self {
        Failure::Structural(e.to_string())
    }
}

impl From<FieldDecodeError> for Failure {
    fn from(e: FieldDecodeError) -> Self {
        Failure::Structural(e.to_string())
    }
}
