use crate::{
    loader::{NodeKind, TreeLoader, ancestry},
    model::{GroupId, Project},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowKind {
    Group(GroupId),
    Project { parent: GroupId, index: usize },
    /// Spinner under an expanded node whose children are on the way.
    Loading(GroupId),
    /// Inline fetch error for the node.
    Error(GroupId),
    /// Loaded node without subgroups or projects.
    Empty(GroupId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeRow {
    pub kind: RowKind,
    pub depth: usize,
}

impl TreeRow {
    /// The group node this row belongs to.
    pub fn owner(&self) -> GroupId {
        match self.kind {
            RowKind::Group(id)
            | RowKind::Loading(id)
            | RowKind::Error(id)
            | RowKind::Empty(id)
            | RowKind::Project { parent: id, .. } => id,
        }
    }

    /// The group whose row sits above this one in the tree.
    pub fn parent(&self, loader: &TreeLoader) -> Option<GroupId> {
        match self.kind {
            RowKind::Group(id) => loader.node(id).and_then(|node| node.parent),
            _ => Some(self.owner()),
        }
    }
}

pub fn visible_rows(loader: &TreeLoader) -> Vec<TreeRow> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    for &root in loader.roots() {
        walk_visible(loader, root, 0, &mut path, &mut out);
    }
    out
}

fn walk_visible(
    loader: &TreeLoader,
    id: GroupId,
    depth: usize,
    path: &mut Vec<GroupId>,
    out: &mut Vec<TreeRow>,
) {
    let Some(node) = loader.node(id) else {
        return;
    };
    out.push(TreeRow {
        kind: RowKind::Group(id),
        depth,
    });
    if !node.expanded {
        return;
    }

    let depth = depth + 1;
    if node.loading {
        out.push(TreeRow {
            kind: RowKind::Loading(id),
            depth,
        });
        return;
    }
    if node.error.is_some() {
        out.push(TreeRow {
            kind: RowKind::Error(id),
            depth,
        });
        return;
    }
    let Some(children) = loader.children(id) else {
        return;
    };
    if children.is_empty() {
        out.push(TreeRow {
            kind: RowKind::Empty(id),
            depth,
        });
        return;
    }

    path.push(id);
    for &child in &children.subgroups {
        // a subgroup listed under its own descendant would recurse forever
        if path.contains(&child) {
            continue;
        }
        walk_visible(loader, child, depth, path, out);
    }
    path.pop();
    for index in 0..children.projects.len() {
        out.push(TreeRow {
            kind: RowKind::Project { parent: id, index },
            depth,
        });
    }
}

pub fn project_at(loader: &TreeLoader, parent: GroupId, index: usize) -> Option<&Project> {
    loader.children(parent)?.projects.get(index)
}

pub fn row_name<'a>(loader: &'a TreeLoader, row: &TreeRow) -> Option<&'a str> {
    match row.kind {
        RowKind::Group(id) => loader.node(id).map(|node| node.group.name.as_str()),
        RowKind::Project { parent, index } => {
            project_at(loader, parent, index).map(|project| project.name.as_str())
        }
        _ => None,
    }
}

pub fn row_url<'a>(loader: &'a TreeLoader, row: &TreeRow) -> Option<&'a str> {
    let url = match row.kind {
        RowKind::Group(id) => loader.node(id).map(|node| node.group.web_url.as_str()),
        RowKind::Project { parent, index } => {
            project_at(loader, parent, index).map(|project| project.web_url.as_str())
        }
        _ => None,
    };
    url.filter(|url| !url.is_empty())
}

pub fn filter_rows(rows: &[TreeRow], loader: &TreeLoader, query: &str) -> Vec<TreeRow> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return rows.to_vec();
    }
    rows.iter()
        .copied()
        .filter(|row| {
            row_name(loader, row)
                .map(|name| fuzzy_match(&needle, &name.to_lowercase()))
                .unwrap_or(false)
        })
        .collect()
}

fn fuzzy_match(needle: &str, haystack: &str) -> bool {
    let mut needle_chars = needle.chars();
    let mut current = needle_chars.next();
    for ch in haystack.chars() {
        match current {
            Some(target) if ch == target => {
                current = needle_chars.next();
                if current.is_none() {
                    return true;
                }
            }
            None => return true,
            _ => {}
        }
    }
    current.is_none()
}

pub fn details(loader: &TreeLoader, row: &TreeRow) -> Vec<String> {
    match row.kind {
        RowKind::Project { parent, index } => match project_at(loader, parent, index) {
            Some(project) => project_details(project),
            None => vec!["No selection".to_string()],
        },
        _ => group_details(loader, row.owner()),
    }
}

fn group_details(loader: &TreeLoader, id: GroupId) -> Vec<String> {
    let Some(node) = loader.node(id) else {
        return vec!["No selection".to_string()];
    };
    let group = &node.group;
    let kind = match node.kind {
        NodeKind::Group => "Group",
        NodeKind::Subgroup => "Subgroup",
    };
    let path = group.full_path.clone().unwrap_or_else(|| {
        ancestry(loader, id)
            .iter()
            .filter_map(|id| loader.node(*id).map(|node| node.group.name.clone()))
            .collect::<Vec<_>>()
            .join(" / ")
    });

    let mut lines = vec![
        format!("Name: {}", group.name),
        format!("ID: {}", node.id),
        format!("Kind: {kind}"),
        format!("Path: {path}"),
        format!("Visibility: {}", group.visibility.label()),
        format!("URL: {}", group.web_url),
    ];
    if let Some(description) = group.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("Description: {description}"));
    }
    if let Some(parent_id) = group.parent_id {
        lines.push(format!("Parent ID: {parent_id}"));
    }
    if let Some(count) = group.subgroups_count {
        lines.push(format!("Subgroups (reported): {count}"));
    }

    let state = if node.loading {
        "loading".to_string()
    } else if let Some(err) = &node.error {
        format!("failed: {err}")
    } else if let Some(children) = loader.children(id) {
        format!(
            "{} subgroup(s), {} project(s)",
            children.subgroups.len(),
            children.projects.len()
        )
    } else {
        "not loaded".to_string()
    };
    lines.push(format!("Children: {state}"));
    lines
}

fn project_details(project: &Project) -> Vec<String> {
    let mut lines = vec![
        format!("Name: {}", project.name),
        "Kind: Project".to_string(),
    ];
    if let Some(namespace) = project.namespace_path() {
        lines.push(format!("Namespace: {namespace}"));
    }
    lines.push(format!("Visibility: {}", project.visibility.label()));
    lines.push(format!("Stars: {}", project.star_count));
    lines.push(format!("Forks: {}", project.forks_count));
    if let Some(branch) = &project.default_branch {
        lines.push(format!("Default branch: {branch}"));
    }
    if let Some(last_activity) = &project.last_activity_at {
        lines.push(format!("Last activity: {last_activity}"));
    }
    if let Some(description) = project.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("Description: {description}"));
    }
    lines.push(format!("URL: {}", project.web_url));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::api::FetchError;
    use crate::loader::tests::{MockSource, group, loader_with, project};

    fn names(loader: &TreeLoader, rows: &[TreeRow]) -> Vec<String> {
        rows.iter()
            .map(|row| match row.kind {
                RowKind::Loading(_) => "<loading>".to_string(),
                RowKind::Error(_) => "<error>".to_string(),
                RowKind::Empty(_) => "<empty>".to_string(),
                _ => row_name(loader, row).unwrap_or_default().to_string(),
            })
            .collect()
    }

    #[test]
    fn collapsed_nodes_hide_children() {
        let source = Arc::new(MockSource::with_groups(vec![group(1, "core")]));
        source.set_children(1, Vec::new(), vec![project(10, "api")]);
        let (mut loader, spawner) = loader_with(source);

        loader.expand(1);
        spawner.run_all();
        loader.poll();
        loader.collapse(1);

        let rows = visible_rows(&loader);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, RowKind::Group(1));
    }

    #[test]
    fn expanded_core_shows_single_project_and_no_subgroups() {
        let source = Arc::new(MockSource::with_groups(vec![group(1, "Core")]));
        source.set_children(1, Vec::new(), vec![project(10, "api")]);
        let (mut loader, spawner) = loader_with(source);

        loader.expand(1);
        spawner.run_all();
        loader.poll();

        let rows = visible_rows(&loader);
        assert_eq!(names(&loader, &rows), vec!["Core", "api"]);
        assert_eq!(
            rows[1],
            TreeRow {
                kind: RowKind::Project {
                    parent: 1,
                    index: 0
                },
                depth: 1,
            }
        );
        assert!(!rows.iter().any(|row| matches!(row.kind, RowKind::Group(id) if id != 1)));
    }

    #[test]
    fn subgroups_render_before_projects_in_backend_order() {
        let source = Arc::new(MockSource::with_groups(vec![group(1, "root")]));
        source.set_children(
            1,
            vec![group(3, "zeta"), group(2, "alpha")],
            vec![project(20, "b-proj"), project(21, "a-proj")],
        );
        let (mut loader, spawner) = loader_with(source);

        loader.expand(1);
        spawner.run_all();
        loader.poll();

        let rows = visible_rows(&loader);
        assert_eq!(
            names(&loader, &rows),
            vec!["root", "zeta", "alpha", "b-proj", "a-proj"]
        );
    }

    #[test]
    fn placeholder_rows_track_node_state() {
        let source = Arc::new(MockSource::with_groups(vec![
            group(1, "busy"),
            group(2, "broken"),
            group(3, "bare"),
        ]));
        source.fail_subgroups(2, FetchError::Network("refused".to_string()));
        let (mut loader, spawner) = loader_with(source);

        loader.expand(1);
        loader.expand(2);
        loader.expand(3);
        spawner.run_last();
        spawner.run_last();
        loader.poll();

        let rows = visible_rows(&loader);
        assert_eq!(
            names(&loader, &rows),
            vec!["busy", "<loading>", "broken", "<error>", "bare", "<empty>"]
        );
        assert_eq!(rows[1].depth, 1);
        assert_eq!(rows[3].owner(), 2);
    }

    #[test]
    fn nested_subgroups_indent_by_level() {
        let source = Arc::new(MockSource::with_groups(vec![group(1, "a")]));
        source.set_children(1, vec![group(2, "b")], Vec::new());
        source.set_children(2, Vec::new(), vec![project(30, "deep")]);
        let (mut loader, spawner) = loader_with(source);

        loader.expand(1);
        spawner.run_all();
        loader.poll();
        loader.expand(2);
        spawner.run_all();
        loader.poll();

        let rows = visible_rows(&loader);
        let depths: Vec<usize> = rows.iter().map(|row| row.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
        assert_eq!(rows[2].parent(&loader), Some(2));
        assert_eq!(rows[1].parent(&loader), Some(1));
        assert_eq!(rows[0].parent(&loader), None);
    }

    #[test]
    fn cyclic_subgroup_is_not_walked_twice() {
        let source = Arc::new(MockSource::with_groups(vec![group(1, "a")]));
        source.set_children(1, vec![group(2, "b")], Vec::new());
        source.set_children(2, vec![group(1, "a")], Vec::new());
        let (mut loader, spawner) = loader_with(source);

        loader.expand(1);
        spawner.run_all();
        loader.poll();
        loader.expand(2);
        spawner.run_all();
        loader.poll();

        let rows = visible_rows(&loader);
        assert_eq!(names(&loader, &rows), vec!["a", "b"]);
    }

    #[test]
    fn filter_rows_matches_query_case_insensitive() {
        let source = Arc::new(MockSource::with_groups(vec![group(1, "Platform")]));
        source.set_children(1, Vec::new(), vec![project(10, "API"), project(11, "web")]);
        let (mut loader, spawner) = loader_with(source);

        loader.expand(1);
        spawner.run_all();
        loader.poll();

        let rows = visible_rows(&loader);
        let filtered = filter_rows(&rows, &loader, "api");
        assert_eq!(names(&loader, &filtered), vec!["API"]);
        assert_eq!(filter_rows(&rows, &loader, "  ").len(), rows.len());
    }

    #[test]
    fn filter_rows_matches_fuzzy_subsequence_and_drops_placeholders() {
        let source = Arc::new(MockSource::with_groups(vec![
            group(1, "gitlab"),
            group(2, "other"),
        ]));
        let (mut loader, _spawner) = loader_with(source);
        loader.expand(2);

        let rows = visible_rows(&loader);
        let filtered = filter_rows(&rows, &loader, "glb");
        assert_eq!(names(&loader, &filtered), vec!["gitlab"]);
        let filtered = filter_rows(&rows, &loader, "o");
        assert_eq!(names(&loader, &filtered), vec!["other"]);
    }

    #[test]
    fn group_details_include_metadata_and_state() {
        let mut core = group(1, "core");
        core.description = Some("Core services".to_string());
        let source = Arc::new(MockSource::with_groups(vec![core]));
        source.set_children(1, vec![group(2, "backend")], vec![project(10, "api")]);
        let (mut loader, spawner) = loader_with(source);

        let row = TreeRow {
            kind: RowKind::Group(1),
            depth: 0,
        };
        let lines = details(&loader, &row);
        assert!(lines.iter().any(|line| line == "Name: core"));
        assert!(lines.iter().any(|line| line == "Kind: Group"));
        assert!(lines.iter().any(|line| line == "Visibility: private"));
        assert!(lines.iter().any(|line| line == "Description: Core services"));
        assert!(lines.iter().any(|line| line == "Children: not loaded"));

        loader.expand(1);
        spawner.run_all();
        loader.poll();
        let lines = details(&loader, &row);
        assert!(lines
            .iter()
            .any(|line| line == "Children: 1 subgroup(s), 1 project(s)"));

        let sub = TreeRow {
            kind: RowKind::Group(2),
            depth: 1,
        };
        assert!(details(&loader, &sub).iter().any(|line| line == "Kind: Subgroup"));
    }

    #[test]
    fn project_details_include_counts_and_activity() {
        let mut api = project(10, "api");
        api.star_count = 4;
        api.forks_count = 2;
        api.last_activity_at = Some("2024-01-01T00:00:00Z".to_string());
        let source = Arc::new(MockSource::with_groups(vec![group(1, "core")]));
        source.set_children(1, Vec::new(), vec![api]);
        let (mut loader, spawner) = loader_with(source);

        loader.expand(1);
        spawner.run_all();
        loader.poll();

        let row = TreeRow {
            kind: RowKind::Project {
                parent: 1,
                index: 0,
            },
            depth: 1,
        };
        let lines = details(&loader, &row);
        assert!(lines.iter().any(|line| line == "Kind: Project"));
        assert!(lines.iter().any(|line| line == "Stars: 4"));
        assert!(lines.iter().any(|line| line == "Forks: 2"));
        assert!(lines.iter().any(|line| line == "Default branch: main"));
        assert!(lines
            .iter()
            .any(|line| line == "Last activity: 2024-01-01T00:00:00Z"));
        assert_eq!(row_url(&loader, &row), Some("https://gitlab.example.com/api"));
    }
}
