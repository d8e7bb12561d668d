//! Fuzz target for export config parsing and validation.

#![no_main]

use eln_config::{validate_config, ExportConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = ExportConfig::from_json_str(text) {
            let _ = validate_config(&config);
        }
    }
});
