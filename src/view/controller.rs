//! View-state controller for the album/search grid.
//!
//! Keeps three things consistent: the `ViewState`, the query string of the
//! current location, and the fetched item list (plus its cached order).
//! It never talks to the data source itself: every transition returns the
//! `Command`s the host has to run, and completions come back as `Event`s.
//!
//! Item fetches and album reloads are tagged with a `FetchTicket`. Only the
//! most recently issued ticket may change the item or album list; anything
//! older is dropped.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

use super::navigation::NavigationSurface;
use super::params::{SortMode, ViewState};
use super::sorting::{group_items, sort_items, ItemGroup};
use crate::state::cache::ItemOrderCache;
use crate::state::data::{Collection, Item, ItemFilter, Person};
use crate::state::error::{ErrorBoard, ErrorScope, RemoteError, ViewError};
use crate::state::store::KeyValueStore;

/// Name given to albums created from the "New Album" button
pub const DEFAULT_COLLECTION_NAME: &str = "Untitled Album";

/// Identifies one issued item fetch or album reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

/// Hands out increasing tickets and remembers the latest one
#[derive(Debug, Default)]
struct TicketCounter {
    issued: u64,
    latest: Option<FetchTicket>,
}

impl TicketCounter {
    fn issue(&mut self) -> FetchTicket {
        self.issued += 1;
        let ticket = FetchTicket(self.issued);
        self.latest = Some(ticket);
        ticket
    }

    fn is_latest(&self, ticket: FetchTicket) -> bool {
        self.latest == Some(ticket)
    }
}

/// Lifecycle of a mounted grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    /// URL has been read; waiting for the first collections load
    Initializing,
    Ready,
    Fetching,
}

/// A file picked for upload, already read into memory
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

enum UploadFailure {
    /// Creating one of the items failed; later files were not attempted
    Create(RemoteError),
    /// Every item was created but attaching them to the album failed
    Attach(RemoteError),
}

/// An upload in flight. Files go up one at a time, then the created items
/// are attached to `attach_to` in one call.
struct UploadBatch {
    /// Shared prefix of the device asset IDs of this batch
    batch: i64,
    requested: usize,
    pending: VecDeque<UploadFile>,
    created: Vec<Item>,
    attach_to: Option<String>,
}

impl UploadBatch {
    /// The next file to send, numbered by its position in the batch
    fn next_command(&mut self) -> Option<Command> {
        let file = self.pending.pop_front()?;
        Some(Command::UploadItem {
            batch: self.batch,
            index: self.created.len(),
            file,
        })
    }
}

/// How far the current upload has got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub uploaded: usize,
    pub total: usize,
}

/// Work the host must perform on the controller's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadCollections {
        ticket: FetchTicket,
    },
    FetchItems {
        ticket: FetchTicket,
        filter: ItemFilter,
    },
    RetrieveItem {
        id: String,
    },
    CreateCollection {
        name: String,
    },
    RenameCollection {
        id: String,
        name: String,
    },
    DeleteCollection {
        id: String,
    },
    /// Create the `index`th item of an upload batch
    UploadItem {
        batch: i64,
        index: usize,
        file: UploadFile,
    },
    AttachItems {
        collection_id: String,
        item_ids: Vec<String>,
    },
    LoadPeople,
    RenamePerson {
        id: String,
        name: String,
    },
    /// The person and every item they appear in
    LoadPerson {
        id: String,
    },
}

/// Everything that can happen to the grid: user intents, location changes
/// and completions of earlier commands
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Mounted,
    /// The location changed out of band (back/forward)
    ExternalNavigation,
    SelectCollection(Option<String>),
    ChangeSort(SortMode),
    ToggleStack,
    Search(String),
    ClearSearch,
    CreateCollection,
    RenameCollection { id: String, name: String },
    DeleteCollection(String),
    UploadRequested(Vec<UploadFile>),

    CollectionsLoaded {
        ticket: FetchTicket,
        result: Result<Vec<Collection>, RemoteError>,
    },
    ItemsFetched {
        ticket: FetchTicket,
        result: Result<Vec<Item>, RemoteError>,
    },
    ItemRetrieved {
        id: String,
        result: Result<Item, RemoteError>,
    },
    CollectionCreated(Result<Collection, RemoteError>),
    CollectionRenamed {
        id: String,
        result: Result<Collection, RemoteError>,
    },
    CollectionDeleted {
        id: String,
        result: Result<(), RemoteError>,
    },
    ItemUploaded {
        index: usize,
        result: Result<Item, RemoteError>,
    },
    ItemsAttached(Result<(), RemoteError>),

    PeopleLoaded(Result<Vec<Person>, RemoteError>),
    PersonRenamed {
        id: String,
        result: Result<Person, RemoteError>,
    },
    PersonLoaded {
        id: String,
        result: Result<(Person, Vec<Item>), RemoteError>,
    },
}

pub struct ViewStateController<S> {
    state: ViewState,
    phase: Phase,

    collections: Vec<Collection>,
    /// Released once the first collections load completes, either way
    collections_loaded: bool,
    loading_collections: bool,
    collection_loads: TicketCounter,

    items: Vec<Item>,
    loading_items: bool,
    fetches: TicketCounter,

    upload: Option<UploadBatch>,
    errors: ErrorBoard,
    order_cache: ItemOrderCache<S>,
}

impl<S: KeyValueStore> ViewStateController<S> {
    pub fn new(order_cache: ItemOrderCache<S>) -> Self {
        ViewStateController {
            state: ViewState::default(),
            phase: Phase::Uninitialized,
            collections: Vec::new(),
            collections_loaded: false,
            loading_collections: false,
            collection_loads: TicketCounter::default(),
            items: Vec::new(),
            loading_items: false,
            fetches: TicketCounter::default(),
            upload: None,
            errors: ErrorBoard::default(),
            order_cache,
        }
    }

    /// Apply one event. State and location are both updated before this
    /// returns, so a later read of the surface sees the new query.
    pub fn dispatch<N: NavigationSurface>(&mut self, event: Event, nav: &mut N) -> Vec<Command> {
        match event {
            Event::Mounted if self.phase == Phase::Uninitialized => self.mount(nav),
            Event::Mounted | Event::ExternalNavigation => self.reread_location(nav),
            Event::SelectCollection(id) => self.select_collection(id, nav),
            Event::ChangeSort(mode) => self.change_sort(mode, nav),
            Event::ToggleStack => {
                self.state.stack = !self.state.stack;
                self.write_location(nav);
                Vec::new()
            }
            Event::Search(query) => self.search(&query, nav),
            Event::ClearSearch => self.clear_search(nav),
            Event::CreateCollection => {
                self.errors.clear(ErrorScope::Mutation);
                vec![Command::CreateCollection {
                    name: DEFAULT_COLLECTION_NAME.to_string(),
                }]
            }
            Event::RenameCollection { id, name } => self.rename_collection(id, &name),
            Event::DeleteCollection(id) => {
                self.errors.clear(ErrorScope::Mutation);
                vec![Command::DeleteCollection { id }]
            }
            Event::UploadRequested(files) => self.upload(files),

            Event::CollectionsLoaded { ticket, result } => self.collections_loaded(ticket, result),
            Event::ItemsFetched { ticket, result } => {
                self.items_fetched(ticket, result);
                Vec::new()
            }
            Event::ItemRetrieved { id, .. } => {
                debug!("Grid ignoring retrieval of asset {}", id);
                Vec::new()
            }
            Event::CollectionCreated(result) => self.collection_created(result, nav),
            Event::CollectionRenamed { id, result } => self.collection_renamed(&id, result),
            Event::CollectionDeleted { id, result } => self.collection_deleted(&id, result, nav),
            Event::ItemUploaded { index, result } => self.item_uploaded(index, result),
            Event::ItemsAttached(result) => {
                self.finish_upload(result.err().map(UploadFailure::Attach))
            }

            Event::PeopleLoaded(_) | Event::PersonRenamed { .. } | Event::PersonLoaded { .. } => {
                debug!("Grid ignoring people completion");
                Vec::new()
            }
        }
    }

    // ========== Location sync ==========

    fn mount<N: NavigationSurface>(&mut self, nav: &mut N) -> Vec<Command> {
        let raw = nav.query();
        self.state = ViewState::from_query(&raw);
        self.canonicalize(&raw, nav);

        self.phase = Phase::Initializing;
        info!("🖼️  Grid mounted at ?{}", self.state.to_query());

        vec![self.load_collections()]
    }

    /// Pull the location into the state, touching only fields that differ
    fn reread_location<N: NavigationSurface>(&mut self, nav: &mut N) -> Vec<Command> {
        let raw = nav.query();
        let parsed = ViewState::from_query(&raw);
        let mut refetch = false;

        if parsed.collection_id != self.state.collection_id {
            self.state.collection_id = parsed.collection_id;
            refetch = true;
        }
        if parsed.search_query != self.state.search_query {
            self.state.search_query = parsed.search_query;
            refetch = true;
        }
        if parsed.sort_mode != self.state.sort_mode {
            self.state.sort_mode = parsed.sort_mode;
            refetch = true;
        }
        if parsed.stack != self.state.stack {
            self.state.stack = parsed.stack;
        }

        self.canonicalize(&raw, nav);

        if refetch {
            self.fetch_items()
        } else {
            Vec::new()
        }
    }

    fn canonicalize<N: NavigationSurface>(&self, raw: &str, nav: &mut N) {
        let canonical = self.state.to_query();
        if raw.strip_prefix('?').unwrap_or(raw) != canonical {
            nav.replace_query(&canonical);
        }
    }

    fn write_location<N: NavigationSurface>(&self, nav: &mut N) {
        nav.replace_query(&self.state.to_query());
    }

    // ========== User intents ==========

    fn select_collection<N: NavigationSurface>(
        &mut self,
        id: Option<String>,
        nav: &mut N,
    ) -> Vec<Command> {
        if id == self.state.collection_id && self.state.search_query.is_none() {
            return Vec::new();
        }

        self.state.collection_id = id;
        self.state.search_query = None;
        self.write_location(nav);
        self.fetch_items()
    }

    fn change_sort<N: NavigationSurface>(&mut self, mode: SortMode, nav: &mut N) -> Vec<Command> {
        if mode == self.state.sort_mode {
            return Vec::new();
        }

        self.state.sort_mode = mode;
        self.write_location(nav);
        self.fetch_items()
    }

    fn search<N: NavigationSurface>(&mut self, query: &str, nav: &mut N) -> Vec<Command> {
        let query = query.trim();
        if query.is_empty() || self.state.search_query.as_deref() == Some(query) {
            return Vec::new();
        }

        self.state.search_query = Some(query.to_string());
        self.state.collection_id = None;
        self.write_location(nav);
        self.fetch_items()
    }

    fn clear_search<N: NavigationSurface>(&mut self, nav: &mut N) -> Vec<Command> {
        if self.state.search_query.take().is_none() {
            return Vec::new();
        }

        self.write_location(nav);
        self.fetch_items()
    }

    fn rename_collection(&mut self, id: String, name: &str) -> Vec<Command> {
        let name = name.trim();
        if name.is_empty() {
            self.errors
                .report(&ViewError::mutation("Album name cannot be empty.", None));
            return Vec::new();
        }

        let unchanged = self
            .collections
            .iter()
            .any(|c| c.id == id && c.name == name);
        if unchanged {
            return Vec::new();
        }

        self.errors.clear(ErrorScope::Mutation);
        vec![Command::RenameCollection {
            id,
            name: name.to_string(),
        }]
    }

    fn upload(&mut self, files: Vec<UploadFile>) -> Vec<Command> {
        if files.is_empty() {
            return Vec::new();
        }
        if self.upload.is_some() {
            warn!("Upload already in progress, ignoring {} files", files.len());
            return Vec::new();
        }

        self.errors.clear(ErrorScope::Mutation);
        info!("⏳ Uploading {} files", files.len());

        let mut batch = UploadBatch {
            batch: Utc::now().timestamp_millis(),
            requested: files.len(),
            pending: files.into(),
            created: Vec::new(),
            attach_to: self.state.collection_id.clone(),
        };
        let first = batch.next_command();
        self.upload = Some(batch);
        first.into_iter().collect()
    }

    // ========== Fetching ==========

    fn filter(&self) -> ItemFilter {
        match &self.state.search_query {
            Some(query) => ItemFilter {
                collection_id: None,
                search_query: Some(query.clone()),
                person_id: None,
            },
            None => ItemFilter {
                collection_id: self.state.collection_id.clone(),
                search_query: None,
                person_id: None,
            },
        }
    }

    /// Issue a fetch for the current scope, unless the initial collections
    /// load is still outstanding
    fn fetch_items(&mut self) -> Vec<Command> {
        if !self.collections_loaded {
            debug!("Deferring item fetch until albums have loaded");
            return Vec::new();
        }

        let ticket = self.fetches.issue();
        self.phase = Phase::Fetching;
        self.loading_items = true;
        self.errors.clear(ErrorScope::Items);

        vec![Command::FetchItems {
            ticket,
            filter: self.filter(),
        }]
    }

    /// Reload the album list. Only the newest reload's result is applied.
    fn load_collections(&mut self) -> Command {
        self.loading_collections = true;
        Command::LoadCollections {
            ticket: self.collection_loads.issue(),
        }
    }

    fn collections_loaded(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Collection>, RemoteError>,
    ) -> Vec<Command> {
        if !self.collection_loads.is_latest(ticket) {
            debug!("Discarding stale album load {:?}", ticket);
            return Vec::new();
        }
        self.loading_collections = false;

        match result {
            Ok(collections) => {
                info!("📚 Loaded {} albums", collections.len());
                self.collections = collections;
                self.sort_collections();
                self.errors.clear(ErrorScope::Collections);
            }
            Err(source) => {
                error!("Error fetching albums: {}", source);
                self.errors.report(&ViewError::CollectionsLoad(source));
                self.collections.clear();
            }
        }

        if self.collections_loaded {
            return Vec::new();
        }

        self.collections_loaded = true;
        if self.phase == Phase::Initializing {
            self.phase = Phase::Ready;
        }
        self.fetch_items()
    }

    fn items_fetched(&mut self, ticket: FetchTicket, result: Result<Vec<Item>, RemoteError>) {
        if !self.fetches.is_latest(ticket) {
            debug!(
                "Discarding stale fetch {:?} (latest is {:?})",
                ticket, self.fetches.latest
            );
            return;
        }

        self.loading_items = false;
        self.phase = Phase::Ready;

        match result {
            Ok(mut items) => {
                sort_items(&mut items, self.state.sort_mode);
                let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
                self.order_cache.save(&ids);
                info!("📷 Showing {} assets", items.len());
                self.items = items;
            }
            Err(source) => {
                let err = match &self.state.search_query {
                    Some(query) => ViewError::Search {
                        query: query.clone(),
                        source,
                    },
                    None => ViewError::ItemsLoad {
                        collection_id: self.state.collection_id.clone(),
                        source,
                    },
                };
                error!("Error fetching assets: {:?}", err);
                self.errors.report(&err);
                self.items.clear();
                self.order_cache.clear();
            }
        }
    }

    // ========== Mutation completions ==========

    fn sort_collections(&mut self) {
        self.collections.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    fn collection_created<N: NavigationSurface>(
        &mut self,
        result: Result<Collection, RemoteError>,
        nav: &mut N,
    ) -> Vec<Command> {
        match result {
            Ok(collection) => {
                info!("Album created: {} ({})", collection.name, collection.id);
                let id = collection.id.clone();
                self.collections.push(collection);
                self.sort_collections();

                let mut commands = vec![self.load_collections()];
                commands.extend(self.select_collection(Some(id), nav));
                commands
            }
            Err(source) => {
                error!("Error creating album: {}", source);
                self.errors.report(&ViewError::mutation(
                    format!("Failed to create album \"{}\".", DEFAULT_COLLECTION_NAME),
                    Some(source),
                ));
                Vec::new()
            }
        }
    }

    fn collection_renamed(
        &mut self,
        id: &str,
        result: Result<Collection, RemoteError>,
    ) -> Vec<Command> {
        match result {
            Ok(updated) => {
                info!("Album {} renamed to {}", id, updated.name);
                if let Some(existing) = self.collections.iter_mut().find(|c| c.id == id) {
                    existing.name = updated.name;
                }
                self.sort_collections();
                vec![self.load_collections()]
            }
            Err(source) => {
                error!("Error updating album {}: {}", id, source);
                self.errors.report(&ViewError::mutation(
                    format!("Failed to update album name for ID: {}.", id),
                    Some(source),
                ));
                Vec::new()
            }
        }
    }

    fn collection_deleted<N: NavigationSurface>(
        &mut self,
        id: &str,
        result: Result<(), RemoteError>,
        nav: &mut N,
    ) -> Vec<Command> {
        match result {
            Ok(()) => {
                info!("Album {} deleted", id);
                self.collections.retain(|c| c.id != id);

                let mut commands = vec![self.load_collections()];
                if self.state.collection_id.as_deref() == Some(id) {
                    commands.extend(self.select_collection(None, nav));
                }
                commands
            }
            Err(source) => {
                error!("Error deleting album {}: {}", id, source);
                self.errors.report(&ViewError::mutation(
                    "Failed to delete album.",
                    Some(source),
                ));
                Vec::new()
            }
        }
    }

    fn item_uploaded(&mut self, index: usize, result: Result<Item, RemoteError>) -> Vec<Command> {
        let Some(batch) = self.upload.as_mut() else {
            debug!("Ignoring upload result {} outside a batch", index);
            return Vec::new();
        };
        if index != batch.created.len() {
            debug!("Ignoring out-of-order upload result {}", index);
            return Vec::new();
        }

        let item = match result {
            Ok(item) => item,
            Err(source) => return self.finish_upload(Some(UploadFailure::Create(source))),
        };
        debug!("Uploaded {} as asset {}", item.filename, item.id);
        batch.created.push(item);

        if let Some(next) = batch.next_command() {
            return vec![next];
        }
        let Some(collection_id) = batch.attach_to.clone() else {
            return self.finish_upload(None);
        };
        vec![Command::AttachItems {
            collection_id,
            item_ids: batch.created.iter().map(|item| item.id.clone()).collect(),
        }]
    }

    fn finish_upload(&mut self, failure: Option<UploadFailure>) -> Vec<Command> {
        let Some(batch) = self.upload.take() else {
            debug!("Ignoring upload completion outside a batch");
            return Vec::new();
        };
        let uploaded = batch.created.len();

        match failure {
            None => info!("✅ Upload complete: {} of {} files", uploaded, batch.requested),
            Some(UploadFailure::Create(source)) => {
                error!("Error uploading files: {}", source);
                self.errors.report(&ViewError::mutation(
                    format!(
                        "Failed to upload one or more files ({} of {} uploaded).",
                        uploaded, batch.requested
                    ),
                    Some(source),
                ));
            }
            Some(UploadFailure::Attach(source)) => {
                error!("Uploaded {} files but could not attach them: {}", uploaded, source);
                self.errors
                    .report(&ViewError::PartialUpload { uploaded, source });
            }
        }

        if uploaded > 0 {
            self.fetch_items()
        } else {
            Vec::new()
        }
    }

    // ========== Read access for the UI ==========

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// Sorted according to the current sort mode
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn groups(&self) -> Vec<ItemGroup<'_>> {
        group_items(&self.items, self.state.sort_mode)
    }

    pub fn is_loading_collections(&self) -> bool {
        self.loading_collections
    }

    pub fn is_loading_items(&self) -> bool {
        self.loading_items
    }

    pub fn is_uploading(&self) -> bool {
        self.upload.is_some()
    }

    pub fn upload_progress(&self) -> Option<UploadProgress> {
        self.upload.as_ref().map(|batch| UploadProgress {
            uploaded: batch.created.len(),
            total: batch.requested,
        })
    }

    pub fn errors(&self) -> &ErrorBoard {
        &self.errors
    }

    pub fn selected_collection(&self) -> Option<&Collection> {
        let id = self.state.collection_id.as_deref()?;
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn title(&self) -> String {
        if let Some(collection) = self.selected_collection() {
            return collection.name.clone();
        }
        match &self.state.search_query {
            Some(query) => format!("Search results for \"{}\"", query),
            None => "All Photos".to_string(),
        }
    }
}
