//! Checksums for persisted records

/// CRC32 update (IEEE 802.3 polynomial), used by the postcard records
pub fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;
    let mut crc = crc;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Rolling multiply-xor checksum of the mapping table record
///
/// `sum = sum * 33 ^ byte`, wrapping.
pub fn checksum33(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |sum, &b| sum.wrapping_mul(33) ^ b as u32)
}
