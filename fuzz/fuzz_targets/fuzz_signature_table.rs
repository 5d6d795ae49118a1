//! Feeds arbitrary text to the signature table loader; it must reject or
//! accept without panicking. Accepted tables must build a carver and carve
//! a few bytes built from their own markers.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_core::memory::SliceSource;
use sift_core::{Carver, ScanConfig, SignatureTable};

fuzz_target!(|input: &[u8]| {
    let Ok(text) = std::str::from_utf8(input) else {
        return;
    };
    if let Ok(table) = SignatureTable::from_json(text) {
        let config = ScanConfig::default().with_chunk_size(table.max_start_len());
        let mut data = vec![0u8; 3];
        for spec in table.lookup() {
            data.extend_from_slice(spec.start_marker());
            data.push(0x01);
            data.extend_from_slice(spec.end_rule().marker());
            data.extend_from_slice(&[0x02; 4]);
        }

        let carver = Carver::new(table, config).unwrap();
        let mut source = SliceSource::new(data.clone());
        let outcome = carver
            .carve(&mut source, |_, artifact| {
                assert!(artifact.start() < artifact.end());
                assert!(artifact.end() <= data.len() as u64);
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome.bytes_scanned, data.len() as u64);
    }
});
