//! Organisational data export: users, organizations, roles, and groups
//! written as YAML files under `_data/`.
//!
//! Every major static site generator reads such files natively (Jekyll via
//! `_data/`, Hugo via `data/`, Astro via content collections), so the
//! knowledge base articles can link authors and owning groups without a
//! second API consumer.
//!
//! All four collections are plain paginate-map-serialize pipelines over
//! `?expand=true` endpoints. Expansion makes Zammad resolve integer id
//! references to names inline, so records carry both `organization_id`
//! (for joins) and `organization` (for display).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use kbmirror_client::ZammadClient;
use kbmirror_shared::{MirrorError, Result};

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

/// A user as the API sends it. Only the exported fields are modeled; each
/// tolerates null as well as absence.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRecord {
    pub id: Option<u64>,
    pub login: Option<String>,
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub active: Option<bool>,
    pub organization_id: Option<u64>,
    /// Organization name, resolved by `?expand=true`.
    pub organization: Option<String>,
    pub role_ids: Option<Vec<u64>>,
    /// Role names, resolved by `?expand=true`.
    pub roles: Option<Vec<String>>,
    /// Expanded group membership as a name-to-access map. A `BTreeMap`
    /// keeps the exported order deterministic across runs.
    pub groups: Option<BTreeMap<String, String>>,
    pub last_login: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationRecord {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub note: Option<String>,
    pub domain: Option<String>,
    pub active: Option<bool>,
    pub member_ids: Option<Vec<u64>>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleRecord {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub note: Option<String>,
    pub active: Option<bool>,
    pub default_at_signup: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupRecord {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub note: Option<String>,
    pub active: Option<bool>,
    pub email: Option<String>,
    pub follow_up_possible: Option<String>,
    pub follow_up_assignment: Option<bool>,
    pub shared_drafts: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Exported records
// ---------------------------------------------------------------------------

/// One group membership entry in `users.yml`.
///
/// Zammad's raw form is `{"group_id": "access"}` keyed by stringified ids,
/// which is useless without a second lookup; the expanded name-to-access
/// map is normalized into this list form instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAccess {
    pub group: String,
    pub access: String,
}

/// One row of `users.yml`. Field order here is the output order.
#[derive(Debug, Clone, Serialize)]
pub struct UserExport {
    pub id: u64,
    pub login: Option<String>,
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub active: Option<bool>,
    pub organization_id: Option<u64>,
    pub organization: Option<String>,
    pub role_ids: Vec<u64>,
    pub roles: Vec<String>,
    pub group_access: Vec<GroupAccess>,
    pub last_login: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl UserExport {
    /// Returns `None` for records without an id and for Zammad's internal
    /// system actor (login `-`), which is not a real account.
    fn from_record(record: UserRecord) -> Option<Self> {
        let id = record.id?;
        if record.login.as_deref() == Some("-") {
            return None;
        }
        Some(Self {
            id,
            login: record.login,
            email: record.email,
            firstname: record.firstname,
            lastname: record.lastname,
            active: record.active,
            organization_id: record.organization_id,
            organization: record.organization,
            role_ids: record.role_ids.unwrap_or_default(),
            roles: record.roles.unwrap_or_default(),
            group_access: record
                .groups
                .unwrap_or_default()
                .into_iter()
                .map(|(group, access)| GroupAccess { group, access })
                .collect(),
            last_login: record.last_login,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// One row of `organizations.yml`. Membership is stored as a count only;
/// the full list is available by joining on `organization_id` in
/// `users.yml`.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationExport {
    pub id: u64,
    pub name: Option<String>,
    pub note: Option<String>,
    pub domain: Option<String>,
    pub active: Option<bool>,
    pub member_count: usize,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl OrganizationExport {
    fn from_record(record: OrganizationRecord) -> Option<Self> {
        Some(Self {
            id: record.id?,
            name: record.name,
            note: none_if_empty(record.note),
            domain: none_if_empty(record.domain),
            active: record.active,
            member_count: record.member_ids.map_or(0, |ids| ids.len()),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// One row of `roles.yml`.
#[derive(Debug, Clone, Serialize)]
pub struct RoleExport {
    pub id: u64,
    pub name: Option<String>,
    pub note: Option<String>,
    pub active: Option<bool>,
    pub default_at_signup: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RoleExport {
    fn from_record(record: RoleRecord) -> Option<Self> {
        Some(Self {
            id: record.id?,
            name: record.name,
            note: none_if_empty(record.note),
            active: record.active,
            // Older Zammad versions send null here rather than false
            default_at_signup: record.default_at_signup.unwrap_or(false),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// One row of `groups.yml`.
#[derive(Debug, Clone, Serialize)]
pub struct GroupExport {
    pub id: u64,
    pub name: Option<String>,
    pub note: Option<String>,
    pub active: Option<bool>,
    pub email: Option<String>,
    pub follow_up_possible: Option<String>,
    pub follow_up_assignment: Option<bool>,
    pub shared_drafts: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl GroupExport {
    fn from_record(record: GroupRecord) -> Option<Self> {
        Some(Self {
            id: record.id?,
            name: record.name,
            note: none_if_empty(record.note),
            active: record.active,
            email: none_if_empty(record.email),
            follow_up_possible: record.follow_up_possible,
            follow_up_assignment: record.follow_up_assignment,
            shared_drafts: record.shared_drafts,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Collapse empty strings to `None` so they serialize as null rather than
/// as `''`.
fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Exporters
// ---------------------------------------------------------------------------

/// Counts from a full directory export.
#[derive(Debug, Clone, Default)]
pub struct DirectorySummary {
    pub users: usize,
    pub organizations: usize,
    pub roles: usize,
    pub groups: usize,
}

/// Export all four collections to `_data/` under the output root.
///
/// This is independent of any knowledge base, which is why it runs before
/// the KB walk: a wrong kb_id must not cost the organisational data.
#[instrument(skip_all)]
pub async fn export_directory(client: &ZammadClient, out_root: &Path) -> Result<DirectorySummary> {
    Ok(DirectorySummary {
        users: export_users(client, out_root).await?,
        organizations: export_organizations(client, out_root).await?,
        roles: export_roles(client, out_root).await?,
        groups: export_groups(client, out_root).await?,
    })
}

pub async fn export_users(client: &ZammadClient, out_root: &Path) -> Result<usize> {
    let raw: Vec<UserRecord> = client.fetch_all_pages("/users", "users").await?;
    let users: Vec<UserExport> = raw.into_iter().filter_map(UserExport::from_record).collect();
    write_yaml(out_root, "users.yml", &users)?;
    info!(count = users.len(), "users exported");
    Ok(users.len())
}

pub async fn export_organizations(client: &ZammadClient, out_root: &Path) -> Result<usize> {
    let raw: Vec<OrganizationRecord> = client
        .fetch_all_pages("/organizations", "organizations")
        .await?;
    let orgs: Vec<OrganizationExport> = raw
        .into_iter()
        .filter_map(OrganizationExport::from_record)
        .collect();
    write_yaml(out_root, "organizations.yml", &orgs)?;
    info!(count = orgs.len(), "organizations exported");
    Ok(orgs.len())
}

pub async fn export_roles(client: &ZammadClient, out_root: &Path) -> Result<usize> {
    let raw: Vec<RoleRecord> = client.fetch_all_pages("/roles", "roles").await?;
    let roles: Vec<RoleExport> = raw.into_iter().filter_map(RoleExport::from_record).collect();
    write_yaml(out_root, "roles.yml", &roles)?;
    info!(count = roles.len(), "roles exported");
    Ok(roles.len())
}

pub async fn export_groups(client: &ZammadClient, out_root: &Path) -> Result<usize> {
    let raw: Vec<GroupRecord> = client.fetch_all_pages("/groups", "groups").await?;
    let groups: Vec<GroupExport> = raw.into_iter().filter_map(GroupExport::from_record).collect();
    write_yaml(out_root, "groups.yml", &groups)?;
    info!(count = groups.len(), "groups exported");
    Ok(groups.len())
}

fn write_yaml<T: Serialize>(out_root: &Path, filename: &str, data: &T) -> Result<()> {
    let dir = out_root.join("_data");
    std::fs::create_dir_all(&dir).map_err(|e| MirrorError::io(&dir, e))?;

    let yaml = serde_yaml::to_string(data)
        .map_err(|e| MirrorError::Serialize(format!("{filename}: {e}")))?;

    let path = dir.join(filename);
    std::fs::write(&path, yaml).map_err(|e| MirrorError::io(&path, e))?;

    let shown = format!("_data/{filename}");
    info!(path = %shown, "wrote");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
