/// CRC16 (Modbus flavour): seed `0xFFFF`, reflected polynomial `0xA001`, processed LSB-first.
pub fn crc16(data: &[u8]) -> u16 {
    const POLYNOMIAL: u16 = 0xA001;

    let mut crc = 0xFFFFu16;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 == 0 {
                crc >>= 1;
            } else {
                crc = (crc >> 1) ^ POLYNOMIAL;
            }
        }
    }
    crc
}

/// Joins two bytes into a big-endian `u16` (`a` is the high byte).
#[inline]
pub fn merge8(a: u8, b: u8) -> u16 {
    u16::from_be_bytes([a, b])
}

#[inline]
pub fn merge8_i16(a: u8, b: u8) -> i16 {
    i16::from_be_bytes([a, b])
}

/// Splits a `u16` into `(high, low)`.
#[inline]
pub fn split16(value: u16) -> (u8, u8) {
    let [hi, lo] = value.to_be_bytes();
    (hi, lo)
}
