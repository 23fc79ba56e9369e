//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않았으면 기록은 무시됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `cairn_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! metrics::counter!(cairn_core::metrics::COMPOSITES_INSTALLED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 컴포지트 식별자 레이블 키
pub const LABEL_COMPOSITE: &str = "composite";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── 컴포지트 메트릭 ───────────────────────────────────────────────

/// 설치된 컴포지트 수 (counter)
pub const COMPOSITES_INSTALLED_TOTAL: &str = "cairn_composites_installed_total";

/// 제거된 컴포지트 수 (counter)
pub const COMPOSITES_UNINSTALLED_TOTAL: &str = "cairn_composites_uninstalled_total";

/// 연쇄 제거 중 실패한 구성 모듈 수 (counter, label: composite)
pub const CASCADE_FAILURES_TOTAL: &str = "cairn_cascade_failures_total";

/// 컴포지트별 구성 모듈 수 (gauge, label: composite)
pub const CONSTITUENTS: &str = "cairn_constituents";

/// 구조적 업데이트로 교체된 정책 수 (counter, label: result)
pub const POLICY_UPDATES_TOTAL: &str = "cairn_policy_updates_total";

/// 정책 트리 노드 수 (gauge)
pub const POLICY_NODES: &str = "cairn_policy_nodes";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        COMPOSITES_INSTALLED_TOTAL,
        "Total number of composites installed"
    );
    describe_counter!(
        COMPOSITES_UNINSTALLED_TOTAL,
        "Total number of composites uninstalled"
    );
    describe_counter!(
        CASCADE_FAILURES_TOTAL,
        "Constituent uninstall failures during composite teardown"
    );
    describe_gauge!(CONSTITUENTS, "Number of constituents per composite");
    describe_counter!(
        POLICY_UPDATES_TOTAL,
        "Sharing policies replaced by structured update"
    );
    describe_gauge!(POLICY_NODES, "Number of nodes in the sharing policy tree");
}
