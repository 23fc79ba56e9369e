//! 컴포지트 에러 타입
//!
//! [`CompositeError`]는 정책 트리와 컴포지트 호스트에서 발생하는 구조적 에러를 표현합니다.
//! `From<CompositeError> for CairnError` 변환이 구현되어 있어
//! 생명주기 연산에서 `?` 연산자로 전파할 수 있습니다.

use cairn_core::error::{CairnError, LifecycleError};
use cairn_core::types::ModuleId;

use crate::policy::NodeId;

/// 컴포지트 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    /// 부모 컴포지트의 정책 노드가 없음
    #[error("parent composite {parent} of composite {composite} has no policy node")]
    UnknownParent {
        /// 설치 중인 컴포지트
        composite: ModuleId,
        /// 찾지 못한 부모
        parent: ModuleId,
    },

    /// 호스트에 없는 컴포지트
    #[error("composite not found: {0}")]
    UnknownComposite(ModuleId),

    /// 이미 정책 노드를 가진 컴포지트
    #[error("composite {0} already owns a policy node")]
    DuplicateComposite(ModuleId),

    /// 트리에 없는 노드 (이미 분리됨)
    #[error("policy node {0} is not in the tree")]
    NodeNotFound(NodeId),

    /// 루트 노드는 분리할 수 없음
    #[error("the root policy node cannot be detached")]
    RootDetach,
}

impl From<CompositeError> for CairnError {
    fn from(err: CompositeError) -> Self {
        match err {
            CompositeError::UnknownParent { parent, .. } => {
                CairnError::Lifecycle(LifecycleError::NotFound(parent))
            }
            CompositeError::UnknownComposite(id) => {
                CairnError::Lifecycle(LifecycleError::NotFound(id))
            }
            CompositeError::DuplicateComposite(_)
            | CompositeError::NodeNotFound(_)
            | CompositeError::RootDetach => {
                CairnError::Lifecycle(LifecycleError::Failed(err.to_string()))
            }
        }
    }
}
