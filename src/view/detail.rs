/// Single-asset detail view
///
/// Previous/next come from the item order the grid cached on its last
/// successful fetch, so the detail view never refetches the listing.
use tracing::{error, info};

use super::controller::Command;
use super::navigation::{Location, NavigationSurface};
use super::sorting::local_day;
use crate::state::cache::{ItemOrderCache, SidebarPreference};
use crate::state::data::Item;
use crate::state::error::RemoteError;
use crate::state::store::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Previous,
    Next,
}

pub struct DetailView<S> {
    item_id: String,
    item: Option<Item>,
    previous: Option<String>,
    next: Option<String>,
    loading: bool,
    error: Option<String>,
    sidebar_open: bool,
    order_cache: ItemOrderCache<S>,
    sidebar: SidebarPreference<S>,
}

impl<S: KeyValueStore + Clone> DetailView<S> {
    /// Start showing `id`; the returned command loads it
    pub fn open(id: impl Into<String>, store: S) -> (Self, Command) {
        let sidebar = SidebarPreference::new(store.clone());
        let view = DetailView {
            item_id: id.into(),
            item: None,
            previous: None,
            next: None,
            loading: true,
            error: None,
            sidebar_open: sidebar.load(),
            order_cache: ItemOrderCache::new(store),
            sidebar,
        };
        let command = Command::RetrieveItem {
            id: view.item_id.clone(),
        };
        (view, command)
    }
}

impl<S: KeyValueStore> DetailView<S> {
    /// Handle a retrieval. Results for any other asset are ignored.
    pub fn on_retrieved(&mut self, id: &str, result: Result<Item, RemoteError>) {
        if id != self.item_id {
            return;
        }
        self.loading = false;

        match result {
            Ok(item) => {
                let (previous, next) = self.order_cache.neighbors(&item.id);
                self.previous = previous;
                self.next = next;
                self.error = None;
                info!("🔍 Showing asset {}", item.id);
                self.item = Some(item);
            }
            Err(err) => {
                error!("Error fetching asset {}: {}", id, err);
                self.error = Some(format!("Failed to load asset details for ID: {}", id));
                self.item = None;
                self.previous = None;
                self.next = None;
            }
        }
    }

    /// Move to a neighbour, pushing a history entry for it
    pub fn step<N: NavigationSurface>(&mut self, step: Step, nav: &mut N) -> Option<Command> {
        let target = match step {
            Step::Previous => self.previous.clone(),
            Step::Next => self.next.clone(),
        }?;

        nav.push(Location::asset(target.clone()));
        Some(self.show(target))
    }

    /// Re-target the view at `id` (e.g. after back/forward)
    pub fn show(&mut self, id: String) -> Command {
        self.item_id = id;
        self.item = None;
        self.previous = None;
        self.next = None;
        self.loading = true;
        self.error = None;
        Command::RetrieveItem {
            id: self.item_id.clone(),
        }
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
        self.sidebar.save(self.sidebar_open);
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn item(&self) -> Option<&Item> {
        self.item.as_ref()
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    /// Label/value pairs for the metadata sidebar
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        let Some(item) = &self.item else {
            return Vec::new();
        };

        let mut rows = vec![("Filename", item.filename.clone())];
        let taken = match (local_day(item), item.local_datetime.as_deref()) {
            (Some(_), Some(raw)) => raw.to_string(),
            _ => "Unknown".to_string(),
        };
        rows.push(("Taken", taken));
        rows.push(("Imported file date", item.file_created_at.clone()));
        rows.push(("Size", format_bytes(item.byte_size)));
        if let Some(score) = item.quality_score() {
            rows.push(("Quality", format!("{:.2}", score)));
        }
        rows
    }
}

fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::cache::SIDEBAR_OPEN_KEY;
    use crate::state::store::MemoryStore;
    use crate::view::navigation::{History, Route};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            filename: format!("{}.jpg", id),
            local_datetime: Some("2024-06-01T12:00:00+02:00".to_string()),
            file_created_at: "2024-06-01T12:00:00+02:00".to_string(),
            metrics: None,
            byte_size: 2048,
        }
    }

    fn store_with_order(ids: &[&str]) -> Rc<MemoryStore> {
        let store = Rc::new(MemoryStore::new());
        let order: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        ItemOrderCache::new(Rc::clone(&store)).save(&order);
        store
    }

    #[test]
    fn test_open_requests_item() {
        let (view, command) = DetailView::open("id2", Rc::new(MemoryStore::new()));
        assert_eq!(command, Command::RetrieveItem { id: "id2".to_string() });
        assert!(view.is_loading());
        assert_eq!(view.item_id(), "id2");
    }

    #[test]
    fn test_neighbors_from_cached_order() {
        let store = store_with_order(&["id1", "id2", "id3"]);
        let (mut view, _) = DetailView::open("id2", store);
        view.on_retrieved("id2", Ok(item("id2")));

        assert_eq!(view.previous(), Some("id1"));
        assert_eq!(view.next(), Some("id3"));
        assert!(!view.is_loading());
        assert_eq!(view.error(), None);
    }

    #[test]
    fn test_failure_clears_neighbors() {
        let store = store_with_order(&["id1", "id2", "id3"]);
        let (mut view, _) = DetailView::open("id2", store);
        view.on_retrieved(
            "id2",
            Err(RemoteError::NotFound("asset 'id2'".to_string())),
        );

        assert_eq!(view.error(), Some("Failed to load asset details for ID: id2"));
        assert_eq!(view.previous(), None);
        assert_eq!(view.next(), None);
        assert!(view.item().is_none());
    }

    #[test]
    fn test_result_for_other_asset_is_ignored() {
        let (mut view, _) = DetailView::open("id2", Rc::new(MemoryStore::new()));
        view.on_retrieved("id9", Ok(item("id9")));
        assert!(view.is_loading());
        assert!(view.item().is_none());
    }

    #[test]
    fn test_step_pushes_history() {
        let store = store_with_order(&["id1", "id2", "id3"]);
        let mut nav = History::new(Location::asset("id2"));
        let (mut view, _) = DetailView::open("id2", store);
        view.on_retrieved("id2", Ok(item("id2")));

        let command = view.step(Step::Next, &mut nav);
        assert_eq!(command, Some(Command::RetrieveItem { id: "id3".to_string() }));
        assert_eq!(nav.current().route, Route::Asset("id3".to_string()));
        assert_eq!(nav.len(), 2);

        view.on_retrieved("id3", Ok(item("id3")));
        assert_eq!(view.next(), None);
        assert_eq!(view.step(Step::Next, &mut nav), None);
        assert_eq!(nav.len(), 2);
    }

    #[test]
    fn test_sidebar_preference_persists() {
        let store = Rc::new(MemoryStore::new());
        let (mut view, _) = DetailView::open("id1", Rc::clone(&store));
        assert!(!view.is_sidebar_open());

        view.toggle_sidebar();
        assert_eq!(store.get(SIDEBAR_OPEN_KEY).unwrap().as_deref(), Some("true"));

        let (reopened, _) = DetailView::open("id2", Rc::clone(&store));
        assert!(reopened.is_sidebar_open());
    }

    #[test]
    fn test_metadata_rows() {
        let (mut view, _) = DetailView::open("a", Rc::new(MemoryStore::new()));
        let mut scored = item("a");
        scored.local_datetime = Some("garbage".to_string());
        scored.metrics = Some(BTreeMap::from([("quality".to_string(), 0.875)]));
        view.on_retrieved("a", Ok(scored));

        let rows = view.metadata();
        assert!(rows.contains(&("Taken", "Unknown".to_string())));
        assert!(rows.contains(&("Size", "2.0 KB".to_string())));
        assert!(rows.contains(&("Quality", "0.88".to_string())));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
