//! Permission resolution over a snapshot of the group forest
//!
//! Resolution is branch-local: each membership is resolved on its own by
//! walking its ancestor chain from the root down to the member group. At every
//! level the node's grants are added and then its negations removed, so the
//! most specific node has the last word for its branch. The per-branch results
//! are unioned, and per-account grants are added last without any negation.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{error, warn};

use super::Group;
use crate::error::{Error, Result};
use crate::permissions::WILDCARD;

/// Groups keyed by name
pub type GroupMap = HashMap<String, Group>;

/// Who a permission query is about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// Group memberships, primary first
    pub groups: Vec<String>,
    /// Grants attached directly to the account
    pub permissions: Vec<String>,
    /// Bypasses every check (the server console)
    pub superuser: bool,
}

impl Principal {
    pub fn new(groups: Vec<String>, permissions: Vec<String>) -> Self {
        Self {
            groups,
            permissions,
            superuser: false,
        }
    }

    pub fn superuser() -> Self {
        Self {
            groups: Vec::new(),
            permissions: Vec::new(),
            superuser: true,
        }
    }
}

/// Ancestor chain of `start`, member group first and root last
///
/// Fails with `CyclicReference` if a name repeats on the walk. A parent name
/// that no longer resolves ends the chain. A missing `start` yields an empty
/// chain.
pub fn ancestor_chain<'a>(groups: &'a GroupMap, start: &str) -> Result<Vec<&'a Group>> {
    let mut chain: Vec<&Group> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = groups.get(start);

    while let Some(group) = current {
        if !visited.insert(group.name.as_str()) {
            let mut path: Vec<&str> = chain.iter().map(|g| g.name.as_str()).collect();
            path.push(group.name.as_str());
            let path = path.join(" -> ");
            error!("Group parent chain contains a cycle: {}", path);
            return Err(Error::CyclicReference(path));
        }
        chain.push(group);

        current = match group.parent.as_deref() {
            Some(parent) => {
                let next = groups.get(parent);
                if next.is_none() {
                    warn!("Group {} has unknown parent {}", group.name, parent);
                }
                next
            }
            None => None,
        };
    }

    Ok(chain)
}

/// Effective permissions of a single group
pub fn resolve_group(groups: &GroupMap, name: &str) -> Result<BTreeSet<String>> {
    let chain = ancestor_chain(groups, name)?;
    let mut perms = BTreeSet::new();

    for group in chain.iter().rev() {
        perms.extend(group.permissions.iter().cloned());
        for negated in &group.negated_permissions {
            perms.remove(negated);
        }
    }

    Ok(perms)
}

/// Effective permissions of a principal
pub fn resolve_principal(groups: &GroupMap, principal: &Principal) -> Result<BTreeSet<String>> {
    let mut perms = BTreeSet::new();

    for name in &principal.groups {
        if !groups.contains_key(name) {
            warn!("Skipping unknown group membership {}", name);
            continue;
        }
        perms.extend(resolve_group(groups, name)?);
    }
    perms.extend(principal.permissions.iter().cloned());

    if principal.superuser {
        perms.insert(WILDCARD.to_string());
    }

    Ok(perms)
}

/// Membership test against a resolved set
///
/// `*` satisfies any query except a query for `*` itself, which only checks
/// for the literal wildcard grant.
pub fn set_allows(perms: &BTreeSet<String>, permission: &str) -> bool {
    if permission == WILDCARD {
        return perms.contains(WILDCARD);
    }
    perms.contains(permission) || perms.contains(WILDCARD)
}

/// Whether parenting `name` under `parent` would close a loop
pub fn would_cycle(groups: &GroupMap, name: &str, parent: &str) -> Result<bool> {
    if name == parent {
        return Ok(true);
    }
    let chain = ancestor_chain(groups, parent)?;
    Ok(chain.iter().any(|g| g.name == name))
}

/// Whether any membership, or any ancestor of one, is in `allowed`
pub fn in_any_group(groups: &GroupMap, memberships: &[String], allowed: &[String]) -> Result<bool> {
    if allowed.is_empty() {
        return Ok(false);
    }
    for name in memberships {
        if allowed.contains(name) {
            return Ok(true);
        }
        for group in ancestor_chain(groups, name)? {
            if allowed.contains(&group.name) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
