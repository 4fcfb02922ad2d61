#![no_main]

use libfuzzer_sys::fuzz_target;
use writebench::size::ByteSize;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Must never panic; a successful parse must format without panicking too
        if let Ok(size) = ByteSize::parse(input) {
            let _ = size.to_string();
        }
    }
});
