//! Carves arbitrary bytes with a chunk size taken from the first input byte
//! and checks that the result matches a single-window scan.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_carve -- -max_len=4096
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_core::memory::{MemorySink, SliceSource};
use sift_core::{Carver, ScanConfig, SignatureTable};

fn carve(data: &[u8], chunk: usize) -> Vec<(u64, u64, Vec<u8>)> {
    let carver = Carver::new(
        SignatureTable::default(),
        ScanConfig::default().with_chunk_size(chunk),
    )
    .unwrap();
    let sink = MemorySink::new();
    let report = carver.scan(&mut SliceSource::new(data), &sink).unwrap();
    report
        .extracted
        .iter()
        .zip(sink.blobs())
        .map(|(e, blob)| (e.start, e.end, blob.data))
        .collect()
}

fuzz_target!(|input: &[u8]| {
    let Some((&first, data)) = input.split_first() else {
        return;
    };
    let chunk = 8 + first as usize;

    let small = carve(data, chunk);
    let whole = carve(data, data.len().max(8));
    assert_eq!(small, whole);

    let mut previous_end = 0;
    for (start, end, bytes) in &small {
        assert!(*start >= previous_end && start < end);
        assert_eq!(&data[*start as usize..*end as usize], bytes.as_slice());
        previous_end = *end;
    }
});
