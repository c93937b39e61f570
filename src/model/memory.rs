use std::{
    cmp::Ordering as CmpOrdering,
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    actions::{Exploit, ExploitCategory},
    config::ExploitConfig,
    model::ports::{ExploitStore, SessionFactory},
    types::{ActionRequest, Node, Session},
};

/// Exploits known to the simulated world, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryExploitStore {
    by_id: BTreeMap<String, Exploit>,
}

impl InMemoryExploitStore {
    pub fn new(exploits: impl IntoIterator<Item = Exploit>) -> Self {
        Self {
            by_id: exploits
                .into_iter()
                .map(|exploit| (exploit.id.clone(), exploit))
                .collect(),
        }
    }

    pub fn from_config(exploits: &[ExploitConfig]) -> Self {
        Self::new(exploits.iter().map(|exploit| Exploit {
            id: exploit.id.clone(),
            service: exploit.service.clone(),
            min_version: exploit.min_version.clone(),
            max_version: exploit.max_version.clone(),
            category: exploit.category,
        }))
    }
}

impl ExploitStore for InMemoryExploitStore {
    fn get(&self, id: &str) -> Option<Exploit> {
        self.by_id.get(id).cloned()
    }

    fn evaluate(
        &self,
        exploit: &Exploit,
        request: &ActionRequest,
        node: &Node,
    ) -> Result<(), String> {
        if exploit.category != ExploitCategory::Phishing
            && !request.dst_service.is_empty()
            && request.dst_service != exploit.service
        {
            return Err(format!(
                "exploit '{}' targets '{}', not '{}'",
                exploit.id, exploit.service, request.dst_service
            ));
        }

        let Some(service) = node.service(&exploit.service) else {
            return Err(format!(
                "node '{}' does not run '{}'",
                node.id, exploit.service
            ));
        };

        if let Some(min_version) = &exploit.min_version
            && compare_versions(&service.version, min_version) == CmpOrdering::Less
        {
            return Err(format!(
                "'{}' {} is older than {}",
                service.name, service.version, min_version
            ));
        }
        if let Some(max_version) = &exploit.max_version
            && compare_versions(&service.version, max_version) == CmpOrdering::Greater
        {
            return Err(format!(
                "'{}' {} is newer than {}",
                service.name, service.version, max_version
            ));
        }

        Ok(())
    }
}

/// Numeric, component-wise comparison; missing components count as zero.
pub fn compare_versions(lhs: &str, rhs: &str) -> CmpOrdering {
    let lhs = version_components(lhs);
    let rhs = version_components(rhs);
    let width = lhs.len().max(rhs.len());
    (0..width)
        .map(|index| {
            let left = lhs.get(index).copied().unwrap_or(0);
            let right = rhs.get(index).copied().unwrap_or(0);
            left.cmp(&right)
        })
        .find(|ordering| *ordering != CmpOrdering::Equal)
        .unwrap_or(CmpOrdering::Equal)
}

fn version_components(version: &str) -> Vec<u64> {
    version
        .split(|ch: char| !ch.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

/// Hands out sessions with increasing ids, owned by the requesting service.
#[derive(Debug)]
pub struct SequentialSessionFactory {
    next_id: AtomicU64,
}

impl Default for SequentialSessionFactory {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl SessionFactory for SequentialSessionFactory {
    fn create_session(&self, request: &ActionRequest) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Session::new(request.src_service.clone(), id).with_path(request.src_ip, Some(request.dst_ip))
    }
}
