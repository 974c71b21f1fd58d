#![no_main]
use libfuzzer_sys::fuzz_target;
use kvreplay::trace::{decode_record, Trace};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the format version, the rest is a framed entry
    let version = u32::from(data[0] % 4);
    if let Ok((trace, _)) = Trace::decode(&data[1..]) {
        let _ = trace.parse_header();
        let _ = decode_record(&trace, version);
    }
});
