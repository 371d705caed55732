#![no_main]

use libfuzzer_sys::fuzz_target;
use timerperf::{decode, encode, Decoder};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must re-encode to the same bytes
    if let Ok(events) = decode(data) {
        if let Ok(decoder) = Decoder::new(data) {
            let again = encode(&events, decoder.endian()).unwrap();
            assert_eq!(again, data);
        }
    }
});
