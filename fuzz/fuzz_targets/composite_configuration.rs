#![no_main]

use libfuzzer_sys::fuzz_target;
use cairn_composite::CompositeConfiguration;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let config = CompositeConfiguration::parse(text);
        let _ = config.to_properties();
    }
});
