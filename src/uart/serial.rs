//! One-byte header framing over the UART write/notify characteristics.
//!
//! Every write and every notification carries a leading header byte that
//! tags the payload type. Only user-data payloads are handed to the
//! application; control payloads with other headers pass by unnoticed.
use bytes::{BufMut, Bytes, BytesMut};

/// Header byte tagging an application (user-data) payload.
pub const HEADER_USER_DATA: u8 = 0x01;
/// Bytes the header adds to each write.
pub const HEADER_LEN: usize = 1;

/// Stateless adapter between transport writes/notifications and application payloads.
#[derive(Debug, Clone, Copy)]
pub struct SerialChannel {
    max_write_len: usize,
}

impl SerialChannel {
    /// `max_write_len` is the transport's negotiated maximum write size for the device.
    pub fn new(max_write_len: usize) -> Self {
        Self { max_write_len }
    }

    /// Largest payload that fits into a single write once the header is added.
    pub fn max_payload(&self) -> usize {
        self.max_write_len.saturating_sub(HEADER_LEN)
    }

    pub fn fits(&self, payload: &[u8]) -> bool {
        payload.len() <= self.max_payload()
    }

    /// Prefix `payload` with the user-data header. Never fragments.
    pub fn wrap_outbound(&self, payload: &[u8]) -> Bytes {
        if !self.fits(payload) {
            log::warn!(
                "outbound payload of {} bytes exceeds max payload {}",
                payload.len(),
                self.max_payload()
            );
        }
        let mut out = BytesMut::with_capacity(payload.len() + HEADER_LEN);
        out.put_u8(HEADER_USER_DATA);
        out.put_slice(payload);
        out.freeze()
    }

    /// Strip the header from an inbound notification.
    ///
    /// Returns `None` for empty buffers and for payloads tagged with any other header.
    pub fn unwrap_inbound<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        match bytes.split_first() {
            Some((&HEADER_USER_DATA, payload)) => Some(payload),
            Some((&other, _)) => {
                log::trace!("ignoring payload with header 0x{:02x}", other);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_unwraps_user_data() {
        let ch = SerialChannel::new(20);
        assert_eq!(&ch.wrap_outbound(&[0xAA, 0xBB])[..], &[0x01, 0xAA, 0xBB]);
        assert_eq!(ch.unwrap_inbound(&[0x01, 0xAA, 0xBB]), Some(&[0xAA, 0xBB][..]));
    }

    #[test]
    fn ignores_foreign_headers_and_empty_buffers() {
        let ch = SerialChannel::new(20);
        assert_eq!(ch.unwrap_inbound(&[0x02, 0xAA]), None);
        assert_eq!(ch.unwrap_inbound(&[]), None);
        assert_eq!(ch.unwrap_inbound(&[0x01]), Some(&[][..]));
    }

    #[test]
    fn max_payload_leaves_room_for_header() {
        assert_eq!(SerialChannel::new(20).max_payload(), 19);
        assert_eq!(SerialChannel::new(0).max_payload(), 0);
        assert!(!SerialChannel::new(3).fits(&[1, 2, 3]));
    }
}
