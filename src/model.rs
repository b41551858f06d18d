use serde::{Deserialize, Deserializer};

pub type GroupId = u64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Private,
    #[serde(other)]
    Unknown,
}

impl Visibility {
    pub fn label(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Internal => "internal",
            Visibility::Private => "private",
            Visibility::Unknown => "unknown",
        }
    }
}

/// A group or subgroup as the backend returns it.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visibility: Visibility,
    #[serde(default, deserialize_with = "null_as_default")]
    pub web_url: String,
    #[serde(default)]
    pub subgroups_count: Option<u64>,
    #[serde(default)]
    pub full_path: Option<String>,
    #[serde(default)]
    pub parent_id: Option<GroupId>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Namespace {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_path: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<Namespace>,
    #[serde(default)]
    pub path_with_namespace: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visibility: Visibility,
    #[serde(default, deserialize_with = "null_as_default")]
    pub star_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub forks_count: u64,
    #[serde(default)]
    pub last_activity_at: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub web_url: String,
}

impl Project {
    /// Namespace path for display, falling back to the project's own path.
    pub fn namespace_path(&self) -> Option<&str> {
        self.namespace
            .as_ref()
            .and_then(|ns| {
                [ns.full_path.as_str(), ns.name.as_str()]
                    .into_iter()
                    .find(|value| !value.is_empty())
            })
            .or(self.path_with_namespace.as_deref())
    }
}

/// Backend response wrapper: `{ success, error, <payload field> }`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupsPayload {
    #[serde(default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubgroupsPayload {
    #[serde(default)]
    pub subgroups: Vec<Group>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectsPayload {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "configured")]
    pub gitlab_configured: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_decodes_with_missing_optional_fields() {
        let group: Group = serde_json::from_str(r#"{"id":1,"name":"Core"}"#).expect("decode");
        assert_eq!(group.id, 1);
        assert_eq!(group.name, "Core");
        assert_eq!(group.visibility, Visibility::Public);
        assert!(group.description.is_none());
        assert!(group.web_url.is_empty());
    }

    #[test]
    fn group_ignores_nested_backend_fields() {
        let json = r#"{
            "id": 7,
            "name": "backend",
            "visibility": "private",
            "description": null,
            "level": 1,
            "subgroups": [{"id": 8, "name": "deep"}]
        }"#;
        let group: Group = serde_json::from_str(json).expect("decode");
        assert_eq!(group.visibility, Visibility::Private);
        assert!(group.description.is_none());
    }

    #[test]
    fn project_null_counts_become_zero() {
        let json = r#"{
            "id": 10,
            "name": "api",
            "star_count": null,
            "forks_count": 3,
            "visibility": "secret",
            "namespace": {"id": 1, "name": "Core", "full_path": "core"}
        }"#;
        let project: Project = serde_json::from_str(json).expect("decode");
        assert_eq!(project.star_count, 0);
        assert_eq!(project.forks_count, 3);
        assert_eq!(project.visibility, Visibility::Unknown);
        assert_eq!(project.namespace_path(), Some("core"));
    }

    #[test]
    fn project_namespace_falls_back_to_path_with_namespace() {
        let json = r#"{"id": 1, "name": "web", "path_with_namespace": "core/web"}"#;
        let project: Project = serde_json::from_str(json).expect("decode");
        assert_eq!(project.namespace_path(), Some("core/web"));
    }

    #[test]
    fn health_accepts_either_configured_field() {
        let json = r#"{"status":"healthy","timestamp":"2024-01-01T00:00:00","gitlab_configured":true}"#;
        let health: Health = serde_json::from_str(json).expect("decode");
        assert!(health.gitlab_configured);

        let json = r#"{"success":true,"status":"degraded","configured":true,"source":"env"}"#;
        let health: Health = serde_json::from_str(json).expect("decode");
        assert_eq!(health.status, "degraded");
        assert!(health.gitlab_configured);
    }

    #[test]
    fn envelope_reads_failure_payload() {
        let json = r#"{"success": false, "error": "GitLab not configured"}"#;
        let envelope: Envelope<GroupsPayload> = serde_json::from_str(json).expect("decode");
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_deref(), Some("GitLab not configured"));
        assert!(envelope.payload.groups.is_empty());
    }
}
