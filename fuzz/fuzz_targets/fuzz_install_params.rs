#![no_main]

use libfuzzer_sys::fuzz_target;
use tekdt_ais::catalog::is_newer;
use tekdt_ais::worker::process::split_install_params;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        for token in split_install_params(s) {
            assert!(!token.is_empty() || s.contains('"'));
        }
        // Version comparison must be a strict order
        if let Some((a, b)) = s.split_once('|') {
            assert!(!(is_newer(a, b) && is_newer(b, a)));
        }
    }
});
