#![no_main]

use libfuzzer_sys::fuzz_target;
use jobwire::{decode_params, encode_params, Param};

fuzz_target!(|data: &[u8]| {
    // Fuzz parameter block decoding - test for panics on hostile offsets
    if let Ok(entries) = decode_params(data) {
        // Re-encoding must not panic; non-finite doubles are refused
        let params: Vec<Param> = entries
            .into_iter()
            .map(|(name, value)| Param { name, value })
            .collect();
        let _ = encode_params(&params);
    }
});
