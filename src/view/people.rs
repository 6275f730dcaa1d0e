/// People pages: everyone recognised in the library, and one person's photos
///
/// Face recognition itself runs outside the app; these views only list the
/// people it found, let the user name them and show the items they are in.
use std::collections::HashMap;
use tracing::{error, info};

use super::controller::Command;
use super::params::SortMode;
use super::sorting::sort_items;
use crate::state::cache::ItemOrderCache;
use crate::state::data::{Item, Person};
use crate::state::error::RemoteError;
use crate::state::store::KeyValueStore;

/// A name being typed for one person
#[derive(Debug, Clone, PartialEq, Eq)]
struct Draft {
    person_id: String,
    name: String,
}

#[derive(Debug, Default)]
pub struct PeopleView {
    people: Vec<Person>,
    loading: bool,
    error: Option<String>,
    draft: Option<Draft>,
    /// Names shown before an optimistic rename, restored if it fails
    before_rename: HashMap<String, Option<String>>,
}

impl PeopleView {
    pub fn open() -> (Self, Command) {
        let mut view = PeopleView::default();
        let command = view.reload();
        (view, command)
    }

    pub fn reload(&mut self) -> Command {
        self.loading = true;
        Command::LoadPeople
    }

    pub fn on_loaded(&mut self, result: Result<Vec<Person>, RemoteError>) {
        self.loading = false;
        match result {
            Ok(people) => {
                info!("👥 Loaded {} people", people.len());
                self.people = people;
                self.error = None;
            }
            Err(err) => {
                error!("Error fetching people: {}", err);
                self.people.clear();
                self.error = Some("Failed to load people.".to_string());
            }
        }
    }

    /// Begin editing `id`'s name, starting from the current one
    pub fn start_edit(&mut self, id: &str) {
        let Some(person) = self.people.iter().find(|p| p.id == id) else {
            return;
        };
        self.draft = Some(Draft {
            person_id: person.id.clone(),
            name: person.name.clone().unwrap_or_default(),
        });
    }

    pub fn edit_draft(&mut self, name: String) {
        if let Some(draft) = &mut self.draft {
            draft.name = name;
        }
    }

    pub fn cancel_edit(&mut self) {
        self.draft = None;
    }

    /// Commit the draft. The new name shows immediately and is rolled back
    /// if the save fails. A blank name clears it; an unchanged one is a no-op.
    pub fn save(&mut self) -> Option<Command> {
        let draft = self.draft.take()?;
        let name = draft.name.trim();
        let person = self.people.iter_mut().find(|p| p.id == draft.person_id)?;

        if person.name.as_deref().unwrap_or("") == name {
            return None;
        }

        self.before_rename
            .entry(person.id.clone())
            .or_insert_with(|| person.name.clone());
        person.name = (!name.is_empty()).then(|| name.to_string());
        self.error = None;

        Some(Command::RenamePerson {
            id: draft.person_id.clone(),
            name: name.to_string(),
        })
    }

    pub fn on_renamed(&mut self, id: &str, result: Result<Person, RemoteError>) {
        let previous = self.before_rename.remove(id);
        match result {
            Ok(updated) => {
                info!("Person {} renamed to {}", id, updated.display_name());
                if let Some(person) = self.people.iter_mut().find(|p| p.id == id) {
                    *person = updated;
                }
            }
            Err(err) => {
                error!("Error updating person {}: {}", id, err);
                if let (Some(previous), Some(person)) =
                    (previous, self.people.iter_mut().find(|p| p.id == id))
                {
                    person.name = previous;
                }
                self.error = Some("Failed to update person. Reverting changes.".to_string());
            }
        }
    }

    pub fn people(&self) -> &[Person] {
        &self.people
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// (person id, draft name) while a name is being edited
    pub fn draft(&self) -> Option<(&str, &str)> {
        self.draft
            .as_ref()
            .map(|d| (d.person_id.as_str(), d.name.as_str()))
    }
}

/// One person's page: their name and every item they appear in, newest first
pub struct PersonView<S> {
    person_id: String,
    person: Option<Person>,
    items: Vec<Item>,
    loading: bool,
    error: Option<String>,
    order_cache: ItemOrderCache<S>,
}

impl<S: KeyValueStore> PersonView<S> {
    pub fn open(id: impl Into<String>, store: S) -> (Self, Command) {
        let view = PersonView {
            person_id: id.into(),
            person: None,
            items: Vec::new(),
            loading: true,
            error: None,
            order_cache: ItemOrderCache::new(store),
        };
        let command = Command::LoadPerson {
            id: view.person_id.clone(),
        };
        (view, command)
    }

    /// Results for any other person are ignored.
    ///
    /// The item order is cached so the detail view can step through this
    /// person's photos.
    pub fn on_loaded(&mut self, id: &str, result: Result<(Person, Vec<Item>), RemoteError>) {
        if id != self.person_id {
            return;
        }
        self.loading = false;

        match result {
            Ok((person, mut items)) => {
                sort_items(&mut items, SortMode::ByDate);
                let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
                self.order_cache.save(&ids);
                info!("📷 Showing {} assets of {}", items.len(), person.display_name());
                self.person = Some(person);
                self.items = items;
                self.error = None;
            }
            Err(err) => {
                error!("Error fetching person {}: {}", id, err);
                self.error = Some(match err {
                    RemoteError::NotFound(_) => "Person not found.".to_string(),
                    _ => "Failed to load person.".to_string(),
                });
                self.person = None;
                self.items.clear();
                self.order_cache.clear();
            }
        }
    }

    pub fn person_id(&self) -> &str {
        &self.person_id
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn title(&self) -> &str {
        match &self.person {
            Some(person) => person.display_name(),
            None => "Person",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::MemoryStore;
    use std::rc::Rc;

    fn person(id: &str, name: Option<&str>, item_count: i64) -> Person {
        Person {
            id: id.to_string(),
            name: name.map(str::to_string),
            item_count,
        }
    }

    fn item(id: &str, date: &str) -> Item {
        Item {
            id: id.to_string(),
            filename: format!("{}.jpg", id),
            local_datetime: Some(date.to_string()),
            file_created_at: date.to_string(),
            metrics: None,
            byte_size: 1,
        }
    }

    fn loaded() -> PeopleView {
        let (mut view, command) = PeopleView::open();
        assert_eq!(command, Command::LoadPeople);
        assert!(view.is_loading());
        view.on_loaded(Ok(vec![person("1", Some("Ada"), 4), person("2", None, 2)]));
        view
    }

    #[test]
    fn test_load_failure_shows_message() {
        let (mut view, _) = PeopleView::open();
        view.on_loaded(Err(RemoteError::Transport("offline".to_string())));

        assert!(!view.is_loading());
        assert!(view.people().is_empty());
        assert_eq!(view.error(), Some("Failed to load people."));

        view.reload();
        view.on_loaded(Ok(vec![person("1", None, 1)]));
        assert_eq!(view.error(), None);
    }

    #[test]
    fn test_rename_shows_new_name_at_once() {
        let mut view = loaded();
        view.start_edit("2");
        assert_eq!(view.draft(), Some(("2", "")));

        view.edit_draft("  Grace ".to_string());
        let command = view.save();
        assert_eq!(
            command,
            Some(Command::RenamePerson {
                id: "2".to_string(),
                name: "Grace".to_string()
            })
        );
        assert_eq!(view.people()[1].display_name(), "Grace");
        assert_eq!(view.draft(), None);

        view.on_renamed("2", Ok(person("2", Some("Grace"), 2)));
        assert_eq!(view.people()[1].name.as_deref(), Some("Grace"));
        assert_eq!(view.error(), None);
    }

    #[test]
    fn test_failed_rename_reverts() {
        let mut view = loaded();
        view.start_edit("1");
        view.edit_draft("Lovelace".to_string());
        view.save();
        assert_eq!(view.people()[0].display_name(), "Lovelace");

        view.on_renamed("1", Err(RemoteError::Transport("locked".to_string())));
        assert_eq!(view.people()[0].name.as_deref(), Some("Ada"));
        assert_eq!(view.error(), Some("Failed to update person. Reverting changes."));
    }

    #[test]
    fn test_unchanged_or_cancelled_edit_sends_nothing() {
        let mut view = loaded();
        view.start_edit("1");
        view.edit_draft(" Ada ".to_string());
        assert_eq!(view.save(), None);

        view.start_edit("1");
        view.edit_draft("Someone".to_string());
        view.cancel_edit();
        assert_eq!(view.save(), None);
        assert_eq!(view.people()[0].display_name(), "Ada");

        view.start_edit("404");
        assert_eq!(view.draft(), None);
    }

    #[test]
    fn test_blank_name_clears_it() {
        let mut view = loaded();
        view.start_edit("1");
        view.edit_draft("   ".to_string());

        let command = view.save();
        assert_eq!(
            command,
            Some(Command::RenamePerson {
                id: "1".to_string(),
                name: String::new()
            })
        );
        assert_eq!(view.people()[0].display_name(), "Unnamed Person");
    }

    #[test]
    fn test_person_items_are_sorted_and_cached() {
        let store = Rc::new(MemoryStore::new());
        let (mut view, command) = PersonView::open("1", Rc::clone(&store));
        assert_eq!(command, Command::LoadPerson { id: "1".to_string() });
        assert_eq!(view.title(), "Person");

        view.on_loaded("9", Ok((person("9", None, 0), vec![])));
        assert!(view.is_loading());

        view.on_loaded(
            "1",
            Ok((
                person("1", Some("Ada"), 2),
                vec![
                    item("old", "2023-01-01T00:00:00Z"),
                    item("new", "2024-01-01T00:00:00Z"),
                ],
            )),
        );

        assert_eq!(view.title(), "Ada");
        let ids: Vec<&str> = view.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(ItemOrderCache::new(store).load(), vec!["new", "old"]);
    }

    #[test]
    fn test_missing_person() {
        let store = Rc::new(MemoryStore::new());
        ItemOrderCache::new(Rc::clone(&store)).save(&["stale".to_string()]);
        let (mut view, _) = PersonView::open("5", Rc::clone(&store));

        view.on_loaded("5", Err(RemoteError::NotFound("person '5'".to_string())));
        assert_eq!(view.error(), Some("Person not found."));
        assert!(view.items().is_empty());
        assert!(ItemOrderCache::new(store).load().is_empty());
    }
}
