#![no_main]

use libfuzzer_sys::fuzz_target;
use cairn_core::header::{parse_header, parse_imports, parse_requires, Version, VersionRange};

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = std::str::from_utf8(data) {
        let _ = parse_header("Import-Package", value);
        let _ = parse_imports("Import-Package", value);
        let _ = parse_requires("Require-Module", value);
        let _ = VersionRange::parse(value);
        let _ = Version::parse(value);
    }
});
