//! Fuzz target for media frame file name patterns.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tatorsync::transfer::format_frame_pattern;

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 || data.len() > 64 * 1024 {
        return;
    }

    let (frame, pattern) = data.split_at(8);
    let frame = u64::from_le_bytes(frame.try_into().unwrap_or_default());
    let Ok(pattern) = std::str::from_utf8(pattern) else {
        return;
    };

    let _ = format_frame_pattern(pattern, frame);
});
