#![no_main]

use kadstore_dht::{RecordCodec, ValueData};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Records read back from disk must never crash the decoder
    if let Ok(vd) = ValueData::decode(data) {
        // Whatever decodes must encode back to the same bytes
        assert_eq!(vd.encode(), data);
        let _ = vd.creator();
        let _ = vd.to_string();
    }
});
