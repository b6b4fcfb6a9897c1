//! Target Resolver
//!
//! Pure function from an inventory snapshot to "which monitor do we watch"
//! and "which monitors do we pause". Holds no state between calls.

use kuma_connect::{Inventory, Monitor, MonitorId};
use std::fmt;
use thiserror::Error;

/// How the set of dependent monitors is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// Direct children of the group monitor with this name
    Group(String),
    /// Every monitor carrying a tag with this name
    Tag(String),
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelector::Group(name) => write!(f, "group \"{}\"", name),
            TargetSelector::Tag(name) => write!(f, "tag \"{}\"", name),
        }
    }
}

/// Non-fatal problems found while resolving
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionWarning {
    #[error("sentinel monitor \"{0}\" not found")]
    SentinelNotFound(String),

    #[error("group \"{0}\" not found")]
    GroupNotFound(String),

    #[error("{count} monitors are named \"{name}\"; watching id {chosen}")]
    DuplicateSentinel {
        name: String,
        count: usize,
        chosen: MonitorId,
    },

    #[error("{count} groups are named \"{name}\"; using id {chosen}")]
    DuplicateGroup {
        name: String,
        count: usize,
        chosen: MonitorId,
    },

    #[error("sentinel monitor {0} matches the target selector and will be paused along with its targets")]
    SentinelIsTarget(MonitorId),

    #[error("no monitors match {0}")]
    NoTargets(TargetSelector),
}

/// Outcome of resolving one inventory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Monitor whose heartbeats drive suppression
    pub sentinel_id: Option<MonitorId>,

    /// Monitors to pause/resume, ascending id order
    pub target_ids: Vec<MonitorId>,

    pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
    /// True once a sentinel has been located
    pub fn is_watching(&self) -> bool {
        self.sentinel_id.is_some()
    }
}

/// Resolve the sentinel and its dependent monitors from an inventory
///
/// - No sentinel: nothing is watched and the target set is empty.
/// - Sentinel but no group: the sentinel is watched, the target set is empty.
/// - Name collisions resolve to the lowest id, with a warning.
pub fn resolve(inventory: &Inventory, sentinel_name: &str, selector: &TargetSelector) -> Resolution {
    let mut resolution = Resolution::default();

    let sentinel = match pick_unique(inventory.monitors().filter(|m| m.name == sentinel_name)) {
        Some((sentinel, count)) => {
            if count > 1 {
                resolution.warnings.push(ResolutionWarning::DuplicateSentinel {
                    name: sentinel_name.to_string(),
                    count,
                    chosen: sentinel.id,
                });
            }
            sentinel
        }
        None => {
            resolution
                .warnings
                .push(ResolutionWarning::SentinelNotFound(sentinel_name.to_string()));
            return resolution;
        }
    };
    resolution.sentinel_id = Some(sentinel.id);

    let target_ids: Vec<MonitorId> = match selector {
        TargetSelector::Group(group_name) => {
            let groups = inventory
                .monitors()
                .filter(|m| m.name == *group_name && m.is_group());
            let group = match pick_unique(groups) {
                Some((group, count)) => {
                    if count > 1 {
                        resolution.warnings.push(ResolutionWarning::DuplicateGroup {
                            name: group_name.clone(),
                            count,
                            chosen: group.id,
                        });
                    }
                    group
                }
                None => {
                    resolution
                        .warnings
                        .push(ResolutionWarning::GroupNotFound(group_name.clone()));
                    return resolution;
                }
            };
            inventory
                .monitors()
                .filter(|m| m.parent == Some(group.id))
                .map(|m| m.id)
                .collect()
        }
        TargetSelector::Tag(tag) => inventory
            .monitors()
            .filter(|m| m.has_tag(tag))
            .map(|m| m.id)
            .collect(),
    };
    resolution.target_ids = target_ids;

    // A paused sentinel stops sending heartbeats, so nothing would resume it
    if resolution.target_ids.contains(&sentinel.id) {
        resolution
            .warnings
            .push(ResolutionWarning::SentinelIsTarget(sentinel.id));
    }

    if resolution.target_ids.is_empty() {
        resolution
            .warnings
            .push(ResolutionWarning::NoTargets(selector.clone()));
    }

    resolution
}

/// First match in id order, plus how many matched
fn pick_unique<'a>(mut matches: impl Iterator<Item = &'a Monitor>) -> Option<(&'a Monitor, usize)> {
    let first = matches.next()?;
    Some((first, 1 + matches.count()))
}
