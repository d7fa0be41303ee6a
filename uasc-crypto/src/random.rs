use rand::RngCore;
use uasc_types::ByteString;

/// Fills `data` with cryptographically secure random bytes.
pub fn bytes(data: &mut [u8]) {
    rand::thread_rng().fill_bytes(data);
}

/// Generates `length` random bytes, wrapped as a [`ByteString`] — the shape
/// nonces and the anonymous-session authentication token are carried in.
pub fn byte_string(length: usize) -> ByteString {
    let mut data = vec![0u8; length];
    bytes(&mut data);
    ByteString::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_string_has_requested_length() {
        let bs = byte_string(32);
        assert_eq!(bs.as_bytes().len(), 32);
    }

    #[test]
    fn successive_calls_differ() {
        assert_ne!(byte_string(32), byte_string(32));
    }
}
