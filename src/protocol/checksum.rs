//! # Navdata Checksum
//!
//! The checksum option (tag 0xFFFF) closes a navdata packet. Its value is the
//! wrapping byte sum of every byte preceding the option, header included.

/// Calculate the navdata checksum
///
/// # Arguments
///
/// * `data` - Packet bytes up to (not including) the checksum option
///
/// # Returns
///
/// * `u32` - Wrapping sum of all bytes
///
/// # Examples
///
/// ```
/// use drone_link::protocol::checksum::navdata_checksum;
///
/// assert_eq!(navdata_checksum(&[0x01, 0x02, 0xFF]), 0x102);
/// ```
pub fn navdata_checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |sum, &byte| sum.wrapping_add(byte as u32))
}

/// Check a received checksum against the bytes it covers
pub fn verify_checksum(data: &[u8], received: u32) -> bool {
    navdata_checksum(data) == received
}
