#![no_main]

use libfuzzer_sys::fuzz_target;
use timerperf::trace_text::DumpLine;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(Some(line)) = DumpLine::parse(input) {
            let _ = line.message();
        }
    }
});
