#![no_main]

use libfuzzer_sys::fuzz_target;
use tekdt_ais::catalog::client::parse_catalog;
use tekdt_ais::config::AppConfig;

fuzz_target!(|data: &[u8]| {
    // Neither the local configuration nor the remote catalog may panic on
    // arbitrary input
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let config = AppConfig::from_value(value);
        let _ = config.selected_for_install();
        let _ = config.max_parallel_downloads();

        // Whatever was loaded, including entries that did not decode, must
        // come back identical after a save
        let written = serde_json::to_value(&config).expect("config serializes");
        assert_eq!(AppConfig::from_value(written), config);
    }
    let _ = parse_catalog(data);
});
