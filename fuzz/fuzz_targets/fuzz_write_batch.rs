#![no_main]
use libfuzzer_sys::fuzz_target;
use bytes::Bytes;
use kvreplay::WriteBatch;

fuzz_target!(|data: &[u8]| {
    // Anything that parses must survive a re-serialization unchanged
    if let Ok(batch) = WriteBatch::from_rep(Bytes::copy_from_slice(data)) {
        let reparsed = WriteBatch::from_rep(batch.rep()).unwrap();
        assert_eq!(reparsed, batch);
    }
});
