use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, mpsc},
    thread,
};

use tracing::{debug, info, warn};

use crate::{
    api::{FetchError, GroupSource},
    model::{Group, GroupId, Project},
};

pub trait TaskSpawner {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        thread::spawn(task);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Subgroup,
}

#[derive(Clone, Debug)]
pub struct TreeNode {
    pub id: GroupId,
    pub kind: NodeKind,
    pub parent: Option<GroupId>,
    pub group: Group,
    pub expanded: bool,
    pub loading: bool,
    pub loaded: bool,
    pub error: Option<String>,
    generation: u64,
}

impl TreeNode {
    fn new(group: Group, kind: NodeKind, parent: Option<GroupId>) -> Self {
        Self {
            id: group.id,
            kind,
            parent,
            group,
            expanded: false,
            loading: false,
            loaded: false,
            error: None,
            generation: 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Children {
    pub subgroups: Vec<GroupId>,
    pub projects: Vec<Project>,
}

impl Children {
    pub fn is_empty(&self) -> bool {
        self.subgroups.is_empty() && self.projects.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expansion {
    Cached,
    Fetching,
    InFlight,
    UnknownNode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { subgroups: usize, projects: usize },
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadEvent {
    pub node_id: GroupId,
    pub outcome: LoadOutcome,
    /// Whether the node was still expanded when the result landed.
    pub visible: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub groups: usize,
    pub subgroups: usize,
    pub projects: usize,
    pub loading: usize,
}

type ChildrenResult = Result<(Vec<Group>, Vec<Project>), FetchError>;

struct Completion {
    node_id: GroupId,
    generation: u64,
    result: ChildrenResult,
}

pub fn list_top_level_groups(source: &dyn GroupSource) -> Result<Vec<Group>, FetchError> {
    match source.top_level_groups() {
        Ok(groups) => {
            info!(count = groups.len(), "loaded top-level groups");
            Ok(groups)
        }
        Err(err) => {
            warn!(error = %err, "failed to load top-level groups");
            Err(err)
        }
    }
}

pub struct TreeLoader {
    source: Arc<dyn GroupSource>,
    spawner: Box<dyn TaskSpawner>,
    roots: Vec<GroupId>,
    nodes: HashMap<GroupId, TreeNode>,
    children: HashMap<GroupId, Children>,
    sender: mpsc::Sender<Completion>,
    receiver: mpsc::Receiver<Completion>,
}

impl TreeLoader {
    pub fn new(
        source: Arc<dyn GroupSource>,
        spawner: Box<dyn TaskSpawner>,
        groups: Vec<Group>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let mut loader = Self {
            source,
            spawner,
            roots: Vec::with_capacity(groups.len()),
            nodes: HashMap::new(),
            children: HashMap::new(),
            sender,
            receiver,
        };
        for group in groups {
            let id = group.id;
            if let Some(node) = loader.nodes.get_mut(&id) {
                node.group = group;
                continue;
            }
            loader
                .nodes
                .insert(id, TreeNode::new(group, NodeKind::Group, None));
            loader.roots.push(id);
        }
        loader
    }

    pub fn roots(&self) -> &[GroupId] {
        &self.roots
    }

    pub fn node(&self, id: GroupId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn children(&self, id: GroupId) -> Option<&Children> {
        self.children.get(&id)
    }

    pub fn is_busy(&self) -> bool {
        self.nodes.values().any(|node| node.loading)
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            groups: self.roots.len(),
            subgroups: self
                .nodes
                .values()
                .filter(|node| node.kind == NodeKind::Subgroup)
                .count(),
            projects: self.children.values().map(|c| c.projects.len()).sum(),
            loading: self.nodes.values().filter(|node| node.loading).count(),
        }
    }

    pub fn expand(&mut self, id: GroupId) -> Expansion {
        let Some(node) = self.nodes.get_mut(&id) else {
            return Expansion::UnknownNode;
        };
        node.expanded = true;
        if node.loaded {
            return Expansion::Cached;
        }
        if node.loading {
            debug!(node = id, "expand joined in-flight fetch");
            return Expansion::InFlight;
        }
        self.start_fetch(id);
        Expansion::Fetching
    }

    pub fn collapse(&mut self, id: GroupId) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.expanded => {
                node.expanded = false;
                true
            }
            _ => false,
        }
    }

    /// Drops cached children for one node, or for every node when `id` is
    /// `None`. Expanded nodes re-fetch right away.
    pub fn refresh(&mut self, id: Option<GroupId>) {
        let targets: Vec<GroupId> = match id {
            Some(id) if self.nodes.contains_key(&id) => vec![id],
            Some(_) => return,
            None => self.nodes.keys().copied().collect(),
        };

        let mut refetch = Vec::new();
        for target in targets {
            self.children.remove(&target);
            if let Some(node) = self.nodes.get_mut(&target) {
                node.generation += 1;
                node.loaded = false;
                node.loading = false;
                node.error = None;
                if node.expanded {
                    refetch.push(target);
                }
            }
        }
        info!(node = ?id, refetch = refetch.len(), "cache invalidated");
        for target in refetch {
            self.start_fetch(target);
        }
    }

    pub fn poll(&mut self) -> Vec<LoadEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.receiver.try_recv() {
            if let Some(event) = self.apply(completion) {
                events.push(event);
            }
        }
        events
    }

    fn start_fetch(&mut self, id: GroupId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.loading = true;
        node.error = None;
        let generation = node.generation;
        debug!(node = id, generation, "fetching children");

        let source = Arc::clone(&self.source);
        let sender = self.sender.clone();
        self.spawner.spawn(Box::new(move || {
            let result = fetch_children(source.as_ref(), id);
            let _ = sender.send(Completion {
                node_id: id,
                generation,
                result,
            });
        }));
    }

    fn apply(&mut self, completion: Completion) -> Option<LoadEvent> {
        let Completion {
            node_id,
            generation,
            result,
        } = completion;
        let node = self.nodes.get_mut(&node_id)?;
        if node.generation != generation {
            debug!(node = node_id, generation, "dropping stale fetch result");
            return None;
        }
        node.loading = false;
        let visible = node.expanded;

        match result {
            Ok((subgroups, projects)) => {
                node.loaded = true;
                node.error = None;
                let children = self.store_children(node_id, subgroups, projects);
                info!(
                    node = node_id,
                    subgroups = children.subgroups.len(),
                    projects = children.projects.len(),
                    "children loaded"
                );
                let outcome = LoadOutcome::Loaded {
                    subgroups: children.subgroups.len(),
                    projects: children.projects.len(),
                };
                Some(LoadEvent {
                    node_id,
                    outcome,
                    visible,
                })
            }
            Err(err) => {
                warn!(node = node_id, error = %err, "children failed to load");
                node.loaded = false;
                node.error = Some(err.to_string());
                Some(LoadEvent {
                    node_id,
                    outcome: LoadOutcome::Failed(err.to_string()),
                    visible,
                })
            }
        }
    }

    fn store_children(
        &mut self,
        parent: GroupId,
        subgroups: Vec<Group>,
        projects: Vec<Project>,
    ) -> &Children {
        let mut children = Children::default();

        for group in subgroups {
            let id = group.id;
            if !children.subgroups.contains(&id) {
                children.subgroups.push(id);
            }
            match self.nodes.get_mut(&id) {
                Some(existing) => existing.group = group,
                None => {
                    self.nodes
                        .insert(id, TreeNode::new(group, NodeKind::Subgroup, Some(parent)));
                }
            }
        }

        for project in projects {
            match children.projects.iter_mut().find(|p| p.id == project.id) {
                Some(existing) => *existing = project,
                None => children.projects.push(project),
            }
        }

        let dropped: Vec<GroupId> = self
            .nodes
            .values()
            .filter(|node| node.parent == Some(parent) && !children.subgroups.contains(&node.id))
            .map(|node| node.id)
            .collect();
        self.prune(dropped);

        self.children.insert(parent, children);
        &self.children[&parent]
    }

    fn prune(&mut self, ids: Vec<GroupId>) {
        let mut stack = ids;
        while let Some(id) = stack.pop() {
            if self.nodes.remove(&id).is_none() {
                continue;
            }
            self.children.remove(&id);
            debug!(node = id, "subgroup no longer listed, dropped");
            stack.extend(
                self.nodes
                    .values()
                    .filter(|node| node.parent == Some(id))
                    .map(|node| node.id),
            );
        }
    }
}

fn fetch_children(source: &dyn GroupSource, id: GroupId) -> ChildrenResult {
    let subgroups = source.subgroups(id)?;
    let projects = source.projects(id)?;
    Ok((subgroups, projects))
}

/// Ids on the path from a root down to `id`, inclusive.
pub fn ancestry(loader: &TreeLoader, id: GroupId) -> Vec<GroupId> {
    let mut path = vec![id];
    let mut seen = HashSet::from([id]);
    let mut current = loader.node(id).and_then(|node| node.parent);
    while let Some(parent) = current {
        if !seen.insert(parent) {
            break;
        }
        path.push(parent);
        current = loader.node(parent).and_then(|node| node.parent);
    }
    path.reverse();
    path
}
