//! CRC-8 used to seal outgoing variable-frame commands.

/// Generator polynomial.
pub const CRC8_POLYNOMIAL: u8 = 0x8C;

/// CRC-8 over `data`: polynomial `0x8C`, initial value `0`, MSB-first,
/// computed bit by bit without a lookup table.
#[must_use]
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| {
        let mut crc = crc ^ byte;
        for _ in 0..8 {
            crc = if crc & 0x80 == 0 {
                crc << 1
            } else {
                (crc << 1) ^ CRC8_POLYNOMIAL
            };
        }
        crc
    })
}
