// Copyright (c) 2026 Meetlink
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Packet text arrives from paste buffers and QR scans; decoding must
    // never panic, whatever the input. Decryption is covered by unit tests.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = meetlink::core::codec::envelope::decode_packet(s);
    }
});
