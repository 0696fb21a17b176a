use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Plan lists are 1-based in this domain: the first item carries order 1.
pub const BASE_ORDER: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Sequence,
    Activity,
    Evaluation,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Sequence => "sequence",
            ItemKind::Activity => "activity",
            ItemKind::Evaluation => "evaluation",
        }
    }

    pub fn parse(s: &str) -> Option<ItemKind> {
        match s {
            "sequence" => Some(ItemKind::Sequence),
            "activity" => Some(ItemKind::Activity),
            "evaluation" => Some(ItemKind::Evaluation),
            _ => None,
        }
    }
}

impl Serialize for ItemKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// One entry in a chapter plan. `source_id` points at the master record the
/// entry was copied from; removing the entry never touches the master.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedItem {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_date: Option<String>,
    pub order: i64,
}

/// Insert payload; the list assigns the id when none is supplied.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub id: Option<String>,
    pub kind: ItemKind,
    pub title: String,
    pub source_id: Option<String>,
    pub planned_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanListError {
    /// The caller referenced an item id that is not in the list.
    ItemNotFound(String),
    /// A reorder payload added, dropped, or duplicated ids.
    InvalidPermutation(String),
}

impl fmt::Display for PlanListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanListError::ItemNotFound(id) => write!(f, "no plan item with id {}", id),
            PlanListError::InvalidPermutation(msg) => write!(f, "invalid permutation: {}", msg),
        }
    }
}

impl std::error::Error for PlanListError {}

impl PlanListError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanListError::ItemNotFound(_) => "item_not_found",
            PlanListError::InvalidPermutation(_) => "invalid_permutation",
        }
    }
}

type ListObserver = Box<dyn FnMut(&[OrderedItem])>;

/// Ordered chapter plan. After every successful mutation the order fields
/// form the contiguous run BASE_ORDER..=len matching array position, and the
/// full list is pushed to the observer. Failed operations leave the list
/// untouched.
#[derive(Default)]
pub struct OrderedItemList {
    items: Vec<OrderedItem>,
    selected_id: Option<String>,
    observer: Option<ListObserver>,
}

impl OrderedItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(mut items: Vec<OrderedItem>) -> Self {
        for (i, item) in items.iter_mut().enumerate() {
            item.order = BASE_ORDER + i as i64;
        }
        Self {
            items,
            selected_id: None,
            observer: None,
        }
    }

    pub fn items(&self) -> &[OrderedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn subscribe(&mut self, observer: ListObserver) {
        self.observer = Some(observer);
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|it| it.id == id)
    }

    fn renumber(&mut self) {
        for (i, item) in self.items.iter_mut().enumerate() {
            item.order = BASE_ORDER + i as i64;
        }
    }

    fn notify(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.items);
        }
    }

    /// Appends (or inserts at `position`, clamped to the tail) and returns the
    /// id the item ended up with. A missing or colliding caller id is replaced
    /// with a fresh UUID so ids stay unique within the list.
    pub fn insert(&mut self, new: NewItem, position: Option<usize>) -> String {
        let id = match new.id {
            Some(id) if !id.is_empty() && self.position_of(&id).is_none() => id,
            _ => Uuid::new_v4().to_string(),
        };
        let item = OrderedItem {
            id: id.clone(),
            kind: new.kind,
            title: new.title,
            source_id: new.source_id,
            planned_date: new.planned_date,
            order: 0,
        };
        let at = position.unwrap_or(self.items.len()).min(self.items.len());
        self.items.insert(at, item);
        self.renumber();
        self.notify();
        id
    }

    /// Removes the item and shifts the tracked selection to the item now at
    /// the removed position (last item when the tail was removed, null when
    /// the list emptied). Returns the removed item.
    pub fn remove(&mut self, id: &str) -> Result<OrderedItem, PlanListError> {
        let Some(at) = self.position_of(id) else {
            return Err(PlanListError::ItemNotFound(id.to_string()));
        };
        let removed = self.items.remove(at);
        self.renumber();
        if self.selected_id.as_deref() == Some(id) {
            self.selected_id = if self.items.is_empty() {
                None
            } else {
                let follow = at.min(self.items.len() - 1);
                Some(self.items[follow].id.clone())
            };
        }
        self.notify();
        Ok(removed)
    }

    /// Swaps the item with its previous neighbour. Returns false (and emits
    /// nothing) when the item is already first.
    pub fn move_up(&mut self, id: &str) -> Result<bool, PlanListError> {
        let Some(at) = self.position_of(id) else {
            return Err(PlanListError::ItemNotFound(id.to_string()));
        };
        if at == 0 {
            return Ok(false);
        }
        self.items.swap(at - 1, at);
        self.renumber();
        self.notify();
        Ok(true)
    }

    /// Swaps the item with its next neighbour. Returns false when already last.
    pub fn move_down(&mut self, id: &str) -> Result<bool, PlanListError> {
        let Some(at) = self.position_of(id) else {
            return Err(PlanListError::ItemNotFound(id.to_string()));
        };
        if at + 1 >= self.items.len() {
            return Ok(false);
        }
        self.items.swap(at, at + 1);
        self.renumber();
        self.notify();
        Ok(true)
    }

    /// Replaces the list order wholesale from a drag-resolved id sequence.
    /// The payload must be exactly a permutation of the current ids; anything
    /// added, dropped, or duplicated is rejected and the list stays as it was.
    pub fn reorder(&mut self, id_order: &[String]) -> Result<(), PlanListError> {
        if id_order.len() != self.items.len() {
            return Err(PlanListError::InvalidPermutation(format!(
                "expected {} ids, got {}",
                self.items.len(),
                id_order.len()
            )));
        }
        let mut seen: Vec<&str> = Vec::with_capacity(id_order.len());
        for id in id_order {
            if seen.contains(&id.as_str()) {
                return Err(PlanListError::InvalidPermutation(format!(
                    "duplicate id {}",
                    id
                )));
            }
            if self.position_of(id).is_none() {
                return Err(PlanListError::InvalidPermutation(format!(
                    "unknown id {}",
                    id
                )));
            }
            seen.push(id);
        }

        self.items.sort_by_key(|it| {
            id_order
                .iter()
                .position(|id| *id == it.id)
                .unwrap_or(usize::MAX)
        });
        self.renumber();
        self.notify();
        Ok(())
    }

    /// External selected-item tracking for the host UI.
    pub fn select(&mut self, id: Option<&str>) -> Result<(), PlanListError> {
        match id {
            None => {
                self.selected_id = None;
                Ok(())
            }
            Some(id) => {
                if self.position_of(id).is_none() {
                    return Err(PlanListError::ItemNotFound(id.to_string()));
                }
                self.selected_id = Some(id.to_string());
                Ok(())
            }
        }
    }
}
