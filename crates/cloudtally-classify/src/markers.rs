//! Managed-cluster tag markers.

use std::collections::BTreeMap;

/// Tag fragments that identify capacity owned by a container-orchestration
/// control plane.
pub const DEFAULT_CLUSTER_MARKERS: &[&str] = &[
    "kubernetes.io/cluster/",
    "k8s.io/cluster-autoscaler/",
    "eks:cluster-name",
    "eks:nodegroup-name",
    "alpha.eksctl.io/cluster-name",
    "alpha.eksctl.io/nodegroup-name",
];

/// Case-insensitive matcher over tag keys and values.
#[derive(Debug, Clone)]
pub struct ClusterMarkers {
    markers: Vec<String>,
}

impl ClusterMarkers {
    /// Create a matcher from custom marker fragments.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Whether any tag key or value contains a marker.
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.iter()
            .any(|(key, value)| self.matches_text(key) || self.matches_text(value))
    }

    fn matches_text(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let text = text.to_lowercase();
        self.markers.iter().any(|m| text.contains(m.as_str()))
    }
}

impl Default for ClusterMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER_MARKERS)
    }
}
