#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Binary sniffing must accept any bytes; gram extraction any text
    let _ = gramdex::utils::is_binary(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let grams = gramdex::utils::extract_grams(text);
        assert!(grams.windows(2).all(|w| w[0] < w[1]));
        let _ = gramdex::query::find_line_matches(text, "ab", 0, 16);
    }
});
