#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use cairn_core::filter::Filter;
use cairn_core::types::ServiceProperties;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    filter: String,
    /// 매칭 대상 서비스 속성 (최대 8개 사용)
    properties: Vec<(String, String)>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(filter) = Filter::parse(&input.filter) else {
        return;
    };
    let properties = input
        .properties
        .into_iter()
        .take(8)
        .fold(ServiceProperties::new(), |props, (k, v)| props.with(k, v));
    let _ = filter.matches(&properties);
});
