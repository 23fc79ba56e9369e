//! 공유 정책 -- 컴포지트 간 패키지/서비스 공유 정책과 정책 트리
//!
//! [`SharingPolicy`]는 컴포지트가 부모로부터 무엇을 가져오고 부모에게 무엇을
//! 내보내는지 정의합니다. [`PolicyTree`]는 컴포지트 계층을 따라 정책 노드를
//! 보관하는 아레나입니다.
//!
//! # 트리 구조
//! ```text
//! root (composite 0)
//!  ├── node 1 (composite 3)
//!  │    └── node 3 (composite 7)
//!  └── node 2 (composite 5)
//! ```
//!
//! 트리 변경은 `&mut PolicyTree`를 통해서만 가능하므로 호출자가 변경을 직렬화합니다.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cairn_core::error::CairnError;
use cairn_core::filter::Filter;
use cairn_core::header::{ImportSpec, RequireSpec, Version};
use cairn_core::runtime::DependencyResolver;
use cairn_core::types::{
    COMPOSITE_MODULE_REQUIRE_POLICY, COMPOSITE_PACKAGE_EXPORT_POLICY,
    COMPOSITE_PACKAGE_IMPORT_POLICY, COMPOSITE_SERVICE_EXPORT_POLICY,
    COMPOSITE_SERVICE_IMPORT_POLICY, IMPORT_PACKAGE, MODULE_MANIFEST_VERSION,
    MODULE_SYMBOLIC_NAME, Manifest, ModuleId, REQUIRE_MODULE, ServiceProperties,
};

use crate::error::CompositeError;

// ─── SharingPolicy ───────────────────────────────────────────────────

/// 컴포지트 공유 정책
///
/// 헤더가 없으면 빈 목록 또는 `None`입니다. 서비스 필터가 없으면
/// 해당 방향으로는 어떤 서비스도 공유하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharingPolicy {
    /// 부모로부터 가져올 패키지
    pub import_packages: Vec<ImportSpec>,
    /// 부모에게 내보낼 패키지
    pub export_packages: Vec<ImportSpec>,
    /// 부모에게서 요구할 컴포지트/모듈
    pub require_composites: Vec<RequireSpec>,
    /// 부모로부터 가져올 서비스 필터
    pub import_service: Option<Filter>,
    /// 부모에게 내보낼 서비스 필터
    pub export_service: Option<Filter>,
}

impl SharingPolicy {
    /// 패키지를 부모로부터 가져오는지 확인합니다.
    pub fn imports_package(&self, name: &str, version: &Version) -> bool {
        self.import_packages.iter().any(|s| s.matches(name, version))
    }

    /// 패키지를 부모에게 내보내는지 확인합니다.
    pub fn exports_package(&self, name: &str, version: &Version) -> bool {
        self.export_packages.iter().any(|s| s.matches(name, version))
    }

    /// 부모의 모듈을 요구하는지 확인합니다.
    pub fn requires_composite(&self, symbolic_name: &str, version: &Version) -> bool {
        self.require_composites
            .iter()
            .any(|s| s.matches(symbolic_name, version))
    }

    /// 서비스를 부모로부터 가져오는지 확인합니다.
    pub fn imports_service(&self, properties: &ServiceProperties) -> bool {
        self.import_service
            .as_ref()
            .is_some_and(|f| f.matches(properties))
    }

    /// 서비스를 부모에게 내보내는지 확인합니다.
    pub fn exports_service(&self, properties: &ServiceProperties) -> bool {
        self.export_service
            .as_ref()
            .is_some_and(|f| f.matches(properties))
    }

    /// 아무것도 공유하지 않는 정책인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.import_packages.is_empty()
            && self.export_packages.is_empty()
            && self.require_composites.is_empty()
            && self.import_service.is_none()
            && self.export_service.is_none()
    }
}

impl fmt::Display for SharingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |specs: &[ImportSpec]| {
            specs
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "import=[{}] export=[{}] require=[{}]",
            names(&self.import_packages),
            names(&self.export_packages),
            self.require_composites
                .iter()
                .map(|s| s.symbolic_name.as_str())
                .collect::<Vec<_>>()
                .join(","),
        )?;
        if let Some(filter) = &self.import_service {
            write!(f, " import-service={filter}")?;
        }
        if let Some(filter) = &self.export_service {
            write!(f, " export-service={filter}")?;
        }
        Ok(())
    }
}

/// 컴포지트 매니페스트로부터 공유 정책을 계산합니다.
///
/// 패키지/요구 정책은 직접 파싱하지 않고, 컴포지트 이름을 가진 합성 매니페스트의
/// `Import-Package`/`Require-Module` 헤더에 넣어 의존성 해석 엔진으로 해석합니다.
/// 내보내기 정책도 같은 `Import-Package` 경로로 해석합니다.
/// 서비스 정책은 `compile_filter`로 컴파일합니다.
pub fn build_policy<F>(
    manifest: &Manifest,
    resolver: &dyn DependencyResolver,
    mut compile_filter: F,
) -> Result<SharingPolicy, CairnError>
where
    F: FnMut(&str) -> Result<Filter, CairnError>,
{
    let import_service = manifest
        .get(COMPOSITE_SERVICE_IMPORT_POLICY)
        .map(&mut compile_filter)
        .transpose()?;
    let export_service = manifest
        .get(COMPOSITE_SERVICE_EXPORT_POLICY)
        .map(&mut compile_filter)
        .transpose()?;

    let mut synthetic = Manifest::new();
    synthetic.insert(MODULE_MANIFEST_VERSION, "2");
    if let Some(name) = manifest.get(MODULE_SYMBOLIC_NAME) {
        synthetic.insert(MODULE_SYMBOLIC_NAME, name);
    }
    if let Some(imports) = manifest.get(COMPOSITE_PACKAGE_IMPORT_POLICY) {
        synthetic.insert(IMPORT_PACKAGE, imports);
    }
    if let Some(requires) = manifest.get(COMPOSITE_MODULE_REQUIRE_POLICY) {
        synthetic.insert(REQUIRE_MODULE, requires);
    }
    let resolved = resolver.parse_descriptor(&synthetic)?;

    let export_packages = match manifest.get(COMPOSITE_PACKAGE_EXPORT_POLICY) {
        Some(exports) => {
            synthetic.remove(REQUIRE_MODULE);
            synthetic.insert(IMPORT_PACKAGE, exports);
            resolver.parse_descriptor(&synthetic)?.imports
        }
        None => Vec::new(),
    };

    Ok(SharingPolicy {
        import_packages: resolved.imports,
        export_packages,
        require_composites: resolved.requires,
        import_service,
        export_service,
    })
}

// ─── PolicyTree ──────────────────────────────────────────────────────

/// 정책 노드 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// 원시 값
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 정책 트리 노드
#[derive(Debug, Clone)]
pub struct PolicyNode {
    id: NodeId,
    owner: ModuleId,
    policy: SharingPolicy,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl PolicyNode {
    /// 노드 식별자
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// 노드를 소유한 컴포지트
    pub fn owner(&self) -> ModuleId {
        self.owner
    }

    /// 공유 정책
    pub fn policy(&self) -> &SharingPolicy {
        &self.policy
    }

    /// 부모 노드 (루트와 연결되지 않은 노드는 `None`)
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// 자식 노드 목록
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// 정책 노드 아레나
///
/// 루트 노드는 루트 런타임(컴포지트 `0`)이 소유하며 분리할 수 없습니다.
#[derive(Debug)]
pub struct PolicyTree {
    nodes: HashMap<NodeId, PolicyNode>,
    by_composite: HashMap<ModuleId, NodeId>,
    root: NodeId,
    next_id: u64,
}

impl PolicyTree {
    /// 루트 노드만 가진 트리를 생성합니다.
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            PolicyNode {
                id: root,
                owner: ModuleId::ROOT,
                policy: SharingPolicy::default(),
                parent: None,
                children: Vec::new(),
            },
        );
        let mut by_composite = HashMap::new();
        by_composite.insert(ModuleId::ROOT, root);
        Self {
            nodes,
            by_composite,
            root,
            next_id: 1,
        }
    }

    /// 루트 노드
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// 노드를 조회합니다.
    pub fn node(&self, id: NodeId) -> Option<&PolicyNode> {
        self.nodes.get(&id)
    }

    /// 컴포지트가 소유한 노드를 조회합니다.
    pub fn node_of(&self, composite: ModuleId) -> Option<NodeId> {
        self.by_composite.get(&composite).copied()
    }

    /// 컴포지트의 공유 정책을 조회합니다.
    pub fn policy_of(&self, composite: ModuleId) -> Option<&SharingPolicy> {
        self.node_of(composite)
            .and_then(|id| self.nodes.get(&id))
            .map(PolicyNode::policy)
    }

    /// 노드가 트리에 있는지 확인합니다.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// 루트를 포함한 노드 수
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 루트만 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// 부모 노드
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(PolicyNode::parent)
    }

    /// 자식 노드 목록
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(PolicyNode::children)
            .unwrap_or_default()
    }

    /// 노드에서 루트 방향으로의 경로 (자기 자신 포함)
    ///
    /// 루트에 연결되지 않은 노드는 연결이 끊긴 곳에서 경로가 끝납니다.
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(&id).map(PolicyNode::id);
        while let Some(node) = current {
            path.push(node);
            current = self.parent(node);
        }
        path
    }

    /// 루트로부터의 깊이 (루트는 0)
    pub fn depth(&self, id: NodeId) -> usize {
        self.path_to_root(id).len().saturating_sub(1)
    }

    /// 노드를 추가합니다.
    ///
    /// `parent`가 주어지면 해당 컴포지트의 노드 아래에 연결합니다.
    /// 컴포지트 `0`은 루트 노드로 해석됩니다.
    pub fn insert(
        &mut self,
        owner: ModuleId,
        policy: SharingPolicy,
        parent: Option<ModuleId>,
    ) -> Result<NodeId, CompositeError> {
        if self.by_composite.contains_key(&owner) {
            return Err(CompositeError::DuplicateComposite(owner));
        }
        let parent_node = match parent {
            Some(parent) => Some(self.node_of(parent).ok_or(CompositeError::UnknownParent {
                composite: owner,
                parent,
            })?),
            None => None,
        };

        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            PolicyNode {
                id,
                owner,
                policy,
                parent: parent_node,
                children: Vec::new(),
            },
        );
        self.by_composite.insert(owner, id);

        if let Some(parent_node) = parent_node {
            if let Some(p) = self.nodes.get_mut(&parent_node) {
                p.children.push(id);
            }
            info!(composite_id = %owner, node = %id, parent = %parent_node, "policy node linked");
        } else {
            debug!(composite_id = %owner, node = %id, "policy node created unlinked");
        }
        metrics::gauge!(cairn_core::metrics::POLICY_NODES).set(self.nodes.len() as f64);
        Ok(id)
    }

    /// 노드의 정책을 교체합니다. 노드 식별자와 트리 위치는 유지됩니다.
    pub fn merge(&mut self, id: NodeId, policy: SharingPolicy) -> Result<(), CompositeError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(CompositeError::NodeNotFound(id))?;
        node.policy = policy;
        debug!(composite_id = %node.owner, node = %id, "policy merged in place");
        Ok(())
    }

    /// 노드를 부모의 자식 목록에서 제거하고 트리에서 삭제합니다.
    ///
    /// 남아 있는 자식 노드는 부모 없는 노드가 됩니다.
    pub fn detach(&mut self, id: NodeId) -> Result<PolicyNode, CompositeError> {
        if id == self.root {
            return Err(CompositeError::RootDetach);
        }
        let node = self
            .nodes
            .remove(&id)
            .ok_or(CompositeError::NodeNotFound(id))?;
        self.by_composite.remove(&node.owner);

        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
        if !node.children.is_empty() {
            warn!(
                composite_id = %node.owner,
                orphans = node.children.len(),
                "detached policy node still had children"
            );
            for child in &node.children {
                if let Some(c) = self.nodes.get_mut(child) {
                    c.parent = None;
                }
            }
        }

        info!(composite_id = %node.owner, node = %id, "policy node detached");
        metrics::gauge!(cairn_core::metrics::POLICY_NODES).set(self.nodes.len() as f64);
        Ok(node)
    }

    /// 루트부터 깊이 우선으로 노드를 순회합니다. 연결되지 않은 노드는 제외됩니다.
    pub fn walk(&self) -> Vec<(usize, &PolicyNode)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, self.root)];
        while let Some((depth, id)) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                out.push((depth, node));
                for child in node.children.iter().rev() {
                    stack.push((depth + 1, *child));
                }
            }
        }
        out
    }
}

impl Default for PolicyTree {
    fn default() -> Self {
        Self::new()
    }
}
