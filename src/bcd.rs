use crate::error::{Gt06Error, Result};

/// Decode a single BCD-encoded byte into its decimal value (0–99).
///
/// The GT06 position timestamp packs one decimal digit pair per byte.
pub fn decode_bcd_byte(byte: u8) -> Result<u8> {
    let high = byte >> 4;
    let low = byte & 0x0F;
    if high > 9 || low > 9 {
        return Err(Gt06Error::InvalidBcd(byte));
    }
    Ok(high * 10 + low)
}

/// Encode a decimal value (0–99) into a single BCD byte.
pub fn encode_bcd_byte(value: u8) -> Result<u8> {
    if value > 99 {
        return Err(Gt06Error::InvalidBcd(value));
    }
    Ok((value / 10) << 4 | (value % 10))
}
