#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(set) = searchrepo::expr::parse_field_includes(s)
    {
        // rendering must reparse to the same tree
        let again = searchrepo::expr::parse_field_includes(&set.to_string()).unwrap();
        assert_eq!(again.to_paths(), set.to_paths());
    }
});
