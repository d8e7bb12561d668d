//! Fuzz target for .eln archive reading.
//!
//! Archives handed to `verify` may come from anywhere; opening and verifying
//! one must return an error, never panic.

#![no_main]

use eln_archive::ArchiveReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut reader) = ArchiveReader::from_bytes(data.to_vec()) {
        let _ = reader.verify_all();
    }
});
