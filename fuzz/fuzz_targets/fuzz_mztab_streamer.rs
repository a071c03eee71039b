#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

use qpx::mztab::MzTabStreamer;

fuzz_target!(|data: &[u8]| {
    // Any input must produce lines or errors, never a panic
    let mut streamer = MzTabStreamer::new(Cursor::new(data.to_vec()));
    for _ in 0..10_000 {
        match streamer.next_line() {
            Ok(Some(_line)) => {}
            Ok(None) => break,
            // Row errors do not end iteration; keep going like a skip policy
            Err(e) if e.is_recoverable() => {}
            Err(_) => break,
        }
    }
});
