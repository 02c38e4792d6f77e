#![no_main]

use libfuzzer_sys::fuzz_target;
use ticketd::registry::EngineUri;

fuzz_target!(|data: &[u8]| {
    // Arbitrary URIs must parse or fail cleanly, never panic
    let uri = String::from_utf8_lossy(data);
    if let Ok(parsed) = EngineUri::parse(&uri) {
        let _ = parsed.dsn();
        let _ = parsed.engine_config();
    }
});
