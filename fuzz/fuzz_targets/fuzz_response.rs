#![no_main]

use libfuzzer_sys::fuzz_target;
use jobwire::config::ClientConfig;
use jobwire::ResponseParser;

fuzz_target!(|data: &[u8]| {
    // Fuzz the full response state machine; returned files stay in memory
    let config = ClientConfig {
        cache_byte_limit: 0,
        max_body_length: 64 * 1024,
        ..ClientConfig::default()
    };
    let _ = ResponseParser::new(data, &config).parse();
});
