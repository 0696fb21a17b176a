use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// The four ranked tiers of the curriculum catalog, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Level,
    Track,
    Unit,
    Chapter,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Level => "level",
            NodeKind::Track => "track",
            NodeKind::Unit => "unit",
            NodeKind::Chapter => "chapter",
        }
    }

    pub fn parse(s: &str) -> Option<NodeKind> {
        match s {
            "level" => Some(NodeKind::Level),
            "track" => Some(NodeKind::Track),
            "unit" => Some(NodeKind::Unit),
            "chapter" => Some(NodeKind::Chapter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogNode {
    pub id: String,
    pub name: String,
    pub parent_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError(pub String);

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch failed: {}", self.0)
    }
}

impl std::error::Error for FetchError {}

/// The one capability the selector consumes from its environment. Child
/// lookups are synchronous; objective fetches run through the pending /
/// complete protocol on the selector so slow results can be discarded.
pub trait CatalogSource {
    fn fetch_children(
        &self,
        kind: NodeKind,
        parent_id: &str,
    ) -> Result<Vec<CatalogNode>, FetchError>;
}

/// Candidate nodes for one rank, plus the recoverable error for the last
/// fetch of this list. An error never clears ancestor selections; retry is
/// re-invoking the same select operation.
#[derive(Debug, Clone, Default)]
pub struct CandidateList {
    pub nodes: Vec<CatalogNode>,
    pub error: Option<String>,
}

impl CandidateList {
    fn clear(&mut self) {
        self.nodes.clear();
        self.error = None;
    }
}

/// Observable state of the chapter objective fetch.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ObjectivesState {
    #[default]
    Idle,
    Loading {
        chapter_id: String,
    },
    Ready(Vec<Objective>),
    Failed {
        chapter_id: String,
        message: String,
    },
}

/// A fetch the host must service, tagged with the chapter it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectiveFetchRequest {
    pub chapter_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    pub level_id: Option<String>,
    pub track_id: Option<String>,
    pub unit_id: Option<String>,
    pub chapter_id: Option<String>,
    pub objective_ids: Vec<String>,
}

type SnapshotObserver = Box<dyn FnMut(&SelectionSnapshot)>;

/// Cascading Level -> Track -> Unit -> Chapter selection with a per-chapter
/// objective multi-select. Selecting at rank R unconditionally invalidates
/// every selection below R, even when the id did not change.
#[derive(Default)]
pub struct HierarchySelector {
    level_id: Option<String>,
    track_id: Option<String>,
    unit_id: Option<String>,
    chapter_id: Option<String>,
    selected_objectives: BTreeSet<String>,

    pub tracks: CandidateList,
    pub units: CandidateList,
    pub chapters: CandidateList,
    objectives: ObjectivesState,
    objective_cache: HashMap<String, Vec<Objective>>,

    observer: Option<SnapshotObserver>,
    last_emitted: Option<SelectionSnapshot>,
}

impl HierarchySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: SnapshotObserver) {
        self.observer = Some(observer);
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            level_id: self.level_id.clone(),
            track_id: self.track_id.clone(),
            unit_id: self.unit_id.clone(),
            chapter_id: self.chapter_id.clone(),
            objective_ids: self.selected_objectives.iter().cloned().collect(),
        }
    }

    pub fn objectives(&self) -> &ObjectivesState {
        &self.objectives
    }

    pub fn selected_chapter(&self) -> Option<&str> {
        self.chapter_id.as_deref()
    }

    /// Suppresses emissions whose snapshot is structurally identical to the
    /// previous one; callers re-render on every emission and must not loop.
    fn emit(&mut self) {
        let snap = self.snapshot();
        if self.last_emitted.as_ref() == Some(&snap) {
            return;
        }
        if let Some(observer) = self.observer.as_mut() {
            observer(&snap);
        }
        self.last_emitted = Some(snap);
    }

    fn clear_below_level(&mut self) {
        self.track_id = None;
        self.tracks.clear();
        self.clear_below_track();
    }

    fn clear_below_track(&mut self) {
        self.unit_id = None;
        self.units.clear();
        self.clear_below_unit();
    }

    fn clear_below_unit(&mut self) {
        self.chapter_id = None;
        self.chapters.clear();
        self.selected_objectives.clear();
        self.objectives = ObjectivesState::Idle;
    }

    fn fetch_into(
        source: &dyn CatalogSource,
        kind: NodeKind,
        parent_id: Option<&str>,
        list: &mut CandidateList,
    ) {
        list.clear();
        let Some(parent_id) = parent_id else {
            return;
        };
        match source.fetch_children(kind, parent_id) {
            Ok(nodes) => list.nodes = nodes,
            Err(FetchError(message)) => list.error = Some(message),
        }
    }

    pub fn select_level(&mut self, source: &dyn CatalogSource, id: Option<&str>) {
        self.level_id = id.map(str::to_string);
        self.clear_below_level();
        Self::fetch_into(source, NodeKind::Track, id, &mut self.tracks);
        self.emit();
    }

    pub fn select_track(&mut self, source: &dyn CatalogSource, id: Option<&str>) {
        self.track_id = id.map(str::to_string);
        self.clear_below_track();
        Self::fetch_into(source, NodeKind::Unit, id, &mut self.units);
        self.emit();
    }

    pub fn select_unit(&mut self, source: &dyn CatalogSource, id: Option<&str>) {
        self.unit_id = id.map(str::to_string);
        self.clear_below_unit();
        Self::fetch_into(source, NodeKind::Chapter, id, &mut self.chapters);
        self.emit();
    }

    /// Selects a chapter and resets the objective set. Returns the fetch the
    /// host must service when the chapter's objectives are not cached yet;
    /// cached chapters are served without touching the source.
    pub fn select_chapter(&mut self, id: Option<&str>) -> Option<ObjectiveFetchRequest> {
        self.chapter_id = id.map(str::to_string);
        self.selected_objectives.clear();

        let request = match id {
            None => {
                self.objectives = ObjectivesState::Idle;
                None
            }
            Some(chapter_id) => {
                if let Some(cached) = self.objective_cache.get(chapter_id) {
                    self.objectives = ObjectivesState::Ready(cached.clone());
                    None
                } else {
                    self.objectives = ObjectivesState::Loading {
                        chapter_id: chapter_id.to_string(),
                    };
                    Some(ObjectiveFetchRequest {
                        chapter_id: chapter_id.to_string(),
                    })
                }
            }
        };
        self.emit();
        request
    }

    /// Resolution point for an objective fetch. Returns false when the result
    /// was discarded because the chapter is no longer the active selection.
    /// Successful stale results still warm the cache; failures are never
    /// cached so a reselect retries.
    pub fn complete_objectives(
        &mut self,
        chapter_id: &str,
        result: Result<Vec<Objective>, FetchError>,
    ) -> bool {
        let current = self.chapter_id.as_deref() == Some(chapter_id);
        match result {
            Ok(objectives) => {
                self.objective_cache
                    .insert(chapter_id.to_string(), objectives.clone());
                if current {
                    self.objectives = ObjectivesState::Ready(objectives);
                }
            }
            Err(FetchError(message)) => {
                if current {
                    self.objectives = ObjectivesState::Failed {
                        chapter_id: chapter_id.to_string(),
                        message,
                    };
                }
            }
        }
        current
    }

    /// Flips membership of the objective in the selection set. Silent no-op
    /// when no chapter is selected; the host disables the control instead of
    /// expecting an error here. Returns whether the set changed.
    pub fn toggle_objective(&mut self, id: &str) -> bool {
        if self.chapter_id.is_none() {
            return false;
        }
        if !self.selected_objectives.remove(id) {
            self.selected_objectives.insert(id.to_string());
        }
        self.emit();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory catalog that counts fetches and can be told to fail.
    #[derive(Default)]
    struct FakeCatalog {
        children: HashMap<(NodeKind, String), Vec<CatalogNode>>,
        fail_kinds: RefCell<Vec<NodeKind>>,
        fetch_count: RefCell<usize>,
    }

    impl FakeCatalog {
        fn with_tree() -> Self {
            let mut children: HashMap<(NodeKind, String), Vec<CatalogNode>> = HashMap::new();
            children.insert(
                (NodeKind::Track, "L1".to_string()),
                vec![node("T1", "Sciences", "L1"), node("T2", "Lettres", "L1")],
            );
            children.insert(
                (NodeKind::Track, "L2".to_string()),
                vec![node("T3", "Sciences", "L2")],
            );
            children.insert(
                (NodeKind::Unit, "T1".to_string()),
                vec![node("U1", "Algebra", "T1")],
            );
            children.insert(
                (NodeKind::Chapter, "U1".to_string()),
                vec![node("C1", "Equations", "U1"), node("C2", "Fractions", "U1")],
            );
            Self {
                children,
                ..Self::default()
            }
        }

        fn fetches(&self) -> usize {
            *self.fetch_count.borrow()
        }
    }

    fn node(id: &str, name: &str, parent: &str) -> CatalogNode {
        CatalogNode {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: parent.to_string(),
        }
    }

    impl CatalogSource for FakeCatalog {
        fn fetch_children(
            &self,
            kind: NodeKind,
            parent_id: &str,
        ) -> Result<Vec<CatalogNode>, FetchError> {
            *self.fetch_count.borrow_mut() += 1;
            if self.fail_kinds.borrow().contains(&kind) {
                return Err(FetchError("connection reset".to_string()));
            }
            Ok(self
                .children
                .get(&(kind, parent_id.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn objective(id: &str, text: &str) -> Objective {
        Objective {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    fn selected_down_to_unit(catalog: &FakeCatalog) -> HierarchySelector {
        let mut sel = HierarchySelector::new();
        sel.select_level(catalog, Some("L1"));
        sel.select_track(catalog, Some("T1"));
        sel.select_unit(catalog, Some("U1"));
        sel
    }

    #[test]
    fn selecting_level_populates_track_candidates() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = HierarchySelector::new();
        sel.select_level(&catalog, Some("L1"));
        let names: Vec<&str> = sel.tracks.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Sciences", "Lettres"]);
        assert!(sel.tracks.error.is_none());
        assert_eq!(catalog.fetches(), 1);
    }

    #[test]
    fn reselecting_an_ancestor_invalidates_every_descendant() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = selected_down_to_unit(&catalog);
        let _ = sel.select_chapter(Some("C1"));
        sel.complete_objectives("C1", Ok(vec![objective("O1", "Solve for x")]));
        sel.toggle_objective("O1");

        sel.select_level(&catalog, Some("L2"));

        let snap = sel.snapshot();
        assert_eq!(snap.level_id.as_deref(), Some("L2"));
        assert_eq!(snap.track_id, None);
        assert_eq!(snap.unit_id, None);
        assert_eq!(snap.chapter_id, None);
        assert!(snap.objective_ids.is_empty());
        assert!(sel.units.nodes.is_empty());
        assert!(sel.chapters.nodes.is_empty());
        assert_eq!(sel.objectives(), &ObjectivesState::Idle);
    }

    #[test]
    fn reselecting_same_level_still_clears_descendants() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = selected_down_to_unit(&catalog);
        sel.select_level(&catalog, Some("L1"));
        let snap = sel.snapshot();
        assert_eq!(snap.level_id.as_deref(), Some("L1"));
        assert_eq!(snap.track_id, None);
        assert_eq!(snap.unit_id, None);
    }

    #[test]
    fn chapter_selection_issues_fetch_once_then_hits_cache() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = selected_down_to_unit(&catalog);

        let req = sel.select_chapter(Some("C1")).expect("fetch request");
        assert_eq!(req.chapter_id, "C1");
        assert!(matches!(sel.objectives(), ObjectivesState::Loading { .. }));
        sel.complete_objectives("C1", Ok(vec![objective("O1", "Solve for x")]));
        assert!(matches!(sel.objectives(), ObjectivesState::Ready(_)));

        // Away and back: the revisit must not issue a second fetch.
        let req2 = sel.select_chapter(Some("C2")).expect("fetch request");
        sel.complete_objectives(&req2.chapter_id, Ok(vec![]));
        let revisit = sel.select_chapter(Some("C1"));
        assert!(revisit.is_none(), "cached chapter must be a cache hit");
        match sel.objectives() {
            ObjectivesState::Ready(list) => assert_eq!(list.len(), 1),
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn stale_objective_result_is_discarded() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = selected_down_to_unit(&catalog);

        let c1 = sel.select_chapter(Some("C1")).expect("fetch C1");
        // User moves on before C1 resolves.
        let _c2 = sel.select_chapter(Some("C2")).expect("fetch C2");

        let applied = sel.complete_objectives(&c1.chapter_id, Ok(vec![objective("O1", "Old")]));
        assert!(!applied, "stale result must be reported as discarded");
        assert!(
            matches!(sel.objectives(), ObjectivesState::Loading { chapter_id } if chapter_id == "C2"),
            "C2 stays in flight, never overwritten by C1's late result"
        );

        sel.complete_objectives("C2", Ok(vec![objective("O2", "New")]));
        match sel.objectives() {
            ObjectivesState::Ready(list) => assert_eq!(list[0].id, "O2"),
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn failed_fetch_scopes_error_to_that_list_only() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = HierarchySelector::new();
        sel.select_level(&catalog, Some("L1"));
        sel.select_track(&catalog, Some("T1"));

        catalog.fail_kinds.borrow_mut().push(NodeKind::Chapter);
        sel.select_unit(&catalog, Some("U1"));

        // The selection survives; only the chapter list carries the error.
        assert_eq!(sel.snapshot().unit_id.as_deref(), Some("U1"));
        assert!(sel.chapters.nodes.is_empty());
        assert_eq!(sel.chapters.error.as_deref(), Some("connection reset"));
        assert!(sel.units.error.is_none());
        assert!(!sel.units.nodes.is_empty());

        // Retry is re-invoking the same selection.
        catalog.fail_kinds.borrow_mut().clear();
        sel.select_unit(&catalog, Some("U1"));
        assert!(sel.chapters.error.is_none());
        assert_eq!(sel.chapters.nodes.len(), 2);
    }

    #[test]
    fn objective_fetch_failure_is_recoverable_by_reselect() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = selected_down_to_unit(&catalog);

        let req = sel.select_chapter(Some("C1")).expect("fetch request");
        sel.complete_objectives(&req.chapter_id, Err(FetchError("timeout".to_string())));
        assert!(matches!(
            sel.objectives(),
            ObjectivesState::Failed { message, .. } if message == "timeout"
        ));

        // Failures are not cached: reselecting issues a fresh fetch.
        let retry = sel.select_chapter(Some("C1"));
        assert!(retry.is_some());
    }

    #[test]
    fn double_toggle_restores_the_objective_set() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = selected_down_to_unit(&catalog);
        let req = sel.select_chapter(Some("C1")).expect("fetch request");
        sel.complete_objectives(&req.chapter_id, Ok(vec![objective("O5", "Expand")]));

        sel.toggle_objective("O5");
        assert_eq!(sel.snapshot().objective_ids, vec!["O5".to_string()]);
        sel.toggle_objective("O5");
        assert!(sel.snapshot().objective_ids.is_empty());
    }

    #[test]
    fn toggle_without_chapter_is_silent_noop() {
        let catalog = FakeCatalog::with_tree();
        let mut sel = HierarchySelector::new();
        sel.select_level(&catalog, Some("L1"));
        assert!(!sel.toggle_objective("O1"));
        assert!(sel.snapshot().objective_ids.is_empty());
    }

    #[test]
    fn observer_sees_each_mutation_once_and_no_duplicates() {
        let catalog = FakeCatalog::with_tree();
        let seen: Rc<RefCell<Vec<SelectionSnapshot>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut sel = HierarchySelector::new();
        sel.subscribe(Box::new(move |snap| sink.borrow_mut().push(snap.clone())));

        sel.select_level(&catalog, Some("L1"));
        sel.select_track(&catalog, Some("T1"));
        // Same structural snapshot: selecting the same track again after no
        // intermediate change must be suppressed.
        sel.select_track(&catalog, Some("T1"));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].track_id.as_deref(), Some("T1"));
    }
}
