//! Roster snapshots imported from the external roster source.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{ArticleId, ParticipantId, Role, canonicalize_username};
use crate::{Error, Result};

/// One person listed in a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// External identifier (wiki username).
    #[serde(alias = "username", alias = "id")]
    pub external_id: String,
    /// Display name; falls back to the external id when empty.
    #[serde(default, alias = "name")]
    pub display_name: String,
}

impl RosterEntry {
    /// Creates a roster entry.
    #[must_use]
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Returns the canonical form of the external id.
    #[must_use]
    pub fn canonical_id(&self) -> String {
        canonicalize_username(&self.external_id)
    }
}

/// The full roster of one course at one point in time.
///
/// Maps each role to the ordered list of people holding it. The snapshot is
/// authoritative: anyone not listed loses the role on reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterSnapshot {
    roles: BTreeMap<Role, Vec<RosterEntry>>,
}

impl RosterSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry under a role.
    #[must_use]
    pub fn with_entry(mut self, role: Role, entry: RosterEntry) -> Self {
        self.roles.entry(role).or_default().push(entry);
        self
    }

    /// Parses a snapshot from JSON of the form
    /// `{"student": [{"external_id": "...", "display_name": "..."}], ...}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the JSON is malformed, a role name
    /// is unknown, or an entry has an empty external id.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<RosterEntry>> = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("malformed roster snapshot: {e}")))?;

        let mut snapshot = Self::new();
        for (role_name, entries) in raw {
            let role = Role::parse(&role_name).ok_or_else(|| {
                Error::InvalidInput(format!("unknown roster role '{role_name}'"))
            })?;
            for entry in entries {
                if entry.canonical_id().is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "roster entry under '{role_name}' has an empty external id"
                    )));
                }
                snapshot = snapshot.with_entry(role, entry);
            }
        }
        Ok(snapshot)
    }

    /// Returns the entries listed for a role, in roster order.
    #[must_use]
    pub fn entries_for(&self, role: Role) -> &[RosterEntry] {
        self.roles.get(&role).map_or(&[], Vec::as_slice)
    }

    /// Iterates over every `(role, entry)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &RosterEntry)> {
        self.roles
            .iter()
            .flat_map(|(role, entries)| entries.iter().map(move |e| (*role, e)))
    }

    /// Total number of `(role, entry)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.values().map(Vec::len).sum()
    }

    /// Returns `true` if the snapshot lists nobody.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A role to grant to someone who does not currently hold it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterAddition {
    /// Canonical username.
    pub username: String,
    /// Display name from the roster.
    pub display_name: String,
    /// Role to grant.
    pub role: Role,
}

/// A membership to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRemoval {
    /// The participant losing the role.
    pub participant_id: ParticipantId,
    /// Canonical username.
    pub username: String,
    /// Role being removed.
    pub role: Role,
}

/// A membership whose role is rewritten in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    /// The participant.
    pub participant_id: ParticipantId,
    /// Canonical username.
    pub username: String,
    /// Role currently held.
    pub from: Role,
    /// Role after the change.
    pub to: Role,
}

/// Difference between current memberships and a roster snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    /// Memberships to create.
    pub additions: Vec<RosterAddition>,
    /// Memberships to delete.
    pub removals: Vec<RosterRemoval>,
    /// Memberships to update in place.
    pub role_changes: Vec<RoleChange>,
}

impl RosterDiff {
    /// Returns `true` if applying the diff would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty() && self.role_changes.is_empty()
    }

    /// Participants who stop being students once the diff is applied.
    #[must_use]
    pub fn departing_students(&self) -> BTreeSet<String> {
        let removed = self
            .removals
            .iter()
            .filter(|r| r.role == Role::Student)
            .map(|r| r.username.clone());
        let demoted = self
            .role_changes
            .iter()
            .filter(|c| c.from == Role::Student)
            .map(|c| c.username.clone());
        removed.chain(demoted).collect()
    }
}

/// Everything one reconciliation writes, applied as a single unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterChangeSet {
    /// Membership changes.
    pub diff: RosterDiff,
    /// Article associations dropped because only departing students edited them.
    pub cascaded_articles: Vec<ArticleId>,
}

impl RosterChangeSet {
    /// Returns `true` if there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty() && self.cascaded_articles.is_empty()
    }
}
