// Copyright (c) 2026 Meetlink
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The relay decision table must classify any WS text frame without
    // panicking.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = meetlink::networking::relay::classify_frame(s, "fuzz-peer", "meet-fuzzroom23456", 0);
    }
});
