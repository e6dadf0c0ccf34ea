//! Property-Based Tests for the Wire Codec
//!
//! # Test Properties
//!
//! 1. **Roundtrip**: decode(encode(msg)) = msg for requests and responses
//! 2. **Fixed size**: every encoding has exactly the declared length
//! 3. **Length check**: any other length is rejected

#![cfg(test)]

use proptest::prelude::*;

use super::{
    decode_request, decode_response, encode_request, encode_response, Response, REQUEST_LEN,
    RESPONSE_LEN,
};

fn response_strategy() -> impl Strategy<Value = Response> {
    (any::<u32>(), any::<bool>(), any::<u32>())
        .prop_map(|(key, valid, value)| Response { key, valid, value })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: request encode/decode is the identity.
    #[test]
    fn prop_request_roundtrip(key in any::<u32>()) {
        let bytes = encode_request(key);
        prop_assert_eq!(bytes.len(), REQUEST_LEN);
        prop_assert_eq!(decode_request(&bytes)?, key);
    }

    /// Property: response encode/decode is the identity.
    #[test]
    fn prop_response_roundtrip(response in response_strategy()) {
        let bytes = encode_response(response.key, response.valid, response.value);
        prop_assert_eq!(bytes.len(), RESPONSE_LEN);
        prop_assert_eq!(
            decode_response(&bytes)?,
            (response.key, response.valid, response.value)
        );
    }

    /// Property: datagrams of any other size never decode.
    #[test]
    fn prop_wrong_length_rejected(data in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(decode_request(&data).is_ok(), data.len() == REQUEST_LEN);
        prop_assert_eq!(decode_response(&data).is_ok(), data.len() == RESPONSE_LEN);
    }
}
