use super::Annotation;

/// In-memory authoritative copy of the persisted drawings for the
/// active symbol. Mutations are applied only after the backend has
/// confirmed them, so this never runs ahead of the server.
///
/// Order is creation order; the last element is topmost for hit-tests.
#[derive(Debug, Default, Clone)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    selected: Option<i64>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// Swap in a freshly fetched list, e.g. after a symbol reload.
    pub fn replace_all(&mut self, mut annotations: Vec<Annotation>) {
        annotations.sort_by_key(|a| (a.created_at, a.id));
        self.annotations = annotations;
        self.reconcile_selection();
    }

    /// Record a server-confirmed creation.
    pub fn apply_created(&mut self, annotation: Annotation) {
        self.annotations.retain(|a| a.id != annotation.id);
        self.annotations.push(annotation);
    }

    /// Record a server-confirmed update, replacing the stored copy.
    pub fn apply_updated(&mut self, annotation: Annotation) {
        if let Some(slot) = self
            .annotations
            .iter_mut()
            .find(|a| a.id == annotation.id)
        {
            *slot = annotation;
        } else {
            log::warn!("update confirmed for unknown drawing {}", annotation.id);
        }
    }

    /// Record a server-confirmed deletion.
    pub fn apply_deleted(&mut self, id: i64) {
        self.annotations.retain(|a| a.id != id);
        self.reconcile_selection();
    }

    pub fn select(&mut self, id: Option<i64>) {
        self.selected = id;
        self.reconcile_selection();
    }

    pub fn selected_id(&self) -> Option<i64> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Annotation> {
        self.selected.and_then(|id| self.get(id))
    }

    // Selection must never dangle after a delete or reload.
    fn reconcile_selection(&mut self) {
        if let Some(id) = self.selected {
            if self.get(id).is_none() {
                self.selected = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationKind, DrawingPoint, Style};

    fn hline(id: i64, created_at: u64) -> Annotation {
        Annotation {
            id,
            symbol: "BTCUSDT".to_owned(),
            kind: AnnotationKind::HLine,
            points: vec![DrawingPoint::new(1_000, 100.0)],
            style: Style::defaults_for(AnnotationKind::HLine),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn replace_all_sorts_by_creation() {
        let mut store = AnnotationStore::new();
        store.replace_all(vec![hline(2, 20), hline(1, 10)]);
        let ids: Vec<i64> = store.as_slice().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn update_replaces_in_place() {
        let mut store = AnnotationStore::new();
        store.apply_created(hline(1, 10));

        let mut updated = hline(1, 10);
        updated.points[0].price = 150.0;
        updated.updated_at = 30;
        store.apply_updated(updated);

        let stored = store.get(1).unwrap();
        assert_eq!(stored.points[0].price, 150.0);
        assert_eq!(stored.updated_at, 30);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn selection_clears_when_target_is_deleted() {
        let mut store = AnnotationStore::new();
        store.apply_created(hline(1, 10));
        store.select(Some(1));
        assert_eq!(store.selected_id(), Some(1));

        store.apply_deleted(1);
        assert_eq!(store.selected_id(), None);
    }

    #[test]
    fn selecting_missing_id_is_a_no_op() {
        let mut store = AnnotationStore::new();
        store.select(Some(7));
        assert_eq!(store.selected_id(), None);
    }
}
