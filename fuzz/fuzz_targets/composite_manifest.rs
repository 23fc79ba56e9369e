#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use cairn_composite::{build_policy, validate_composite_manifest};
use cairn_core::filter::Filter;
use cairn_core::header::HeaderResolver;
use cairn_core::types::{
    COMPOSITE_MODULE_REQUIRE_POLICY, COMPOSITE_PACKAGE_EXPORT_POLICY,
    COMPOSITE_PACKAGE_IMPORT_POLICY, COMPOSITE_SERVICE_EXPORT_POLICY,
    COMPOSITE_SERVICE_IMPORT_POLICY, MODULE_MANIFEST_VERSION, MODULE_SYMBOLIC_NAME, Manifest,
};

/// 컴포지트 매니페스트 헤더 값
#[derive(Arbitrary, Debug)]
struct FuzzManifest {
    symbolic_name: Option<String>,
    manifest_version: Option<String>,
    import_packages: Option<String>,
    export_packages: Option<String>,
    require_modules: Option<String>,
    import_service: Option<String>,
    export_service: Option<String>,
}

fuzz_target!(|input: FuzzManifest| {
    let mut manifest = Manifest::new();
    let headers = [
        (MODULE_SYMBOLIC_NAME, input.symbolic_name),
        (MODULE_MANIFEST_VERSION, input.manifest_version),
        (COMPOSITE_PACKAGE_IMPORT_POLICY, input.import_packages),
        (COMPOSITE_PACKAGE_EXPORT_POLICY, input.export_packages),
        (COMPOSITE_MODULE_REQUIRE_POLICY, input.require_modules),
        (COMPOSITE_SERVICE_IMPORT_POLICY, input.import_service),
        (COMPOSITE_SERVICE_EXPORT_POLICY, input.export_service),
    ];
    for (name, value) in headers {
        if let Some(value) = value {
            manifest.insert(name, value);
        }
    }

    if validate_composite_manifest(&mut manifest).is_err() {
        return;
    }
    let resolver = HeaderResolver::new();
    let _ = build_policy(&manifest, &resolver, |text| Ok(Filter::parse(text)?));
});
