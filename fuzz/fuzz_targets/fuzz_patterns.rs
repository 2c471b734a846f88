#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct PatternInput {
    patterns: Vec<String>,
    candidate: String,
}

fuzz_target!(|input: PatternInput| {
    // Invalid globs fall back to suffix matching and never panic
    let set = gramdex::utils::PatternSet::new(&input.patterns);
    let _ = set.is_match(&input.candidate);
    let _ = set.matches_path(std::path::Path::new(&input.candidate));
});
