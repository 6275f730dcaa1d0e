use clap::Parser;
use iced::keyboard::{self, key};
use iced::widget::{button, column, container, row, scrollable, text, text_input, Column, Row};
use iced::{Alignment, Element, Length, Subscription, Task, Theme};
use rfd::FileDialog;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod state;
mod view;

use config::Config;
use state::cache::ItemOrderCache;
use state::error::{ErrorScope, RemoteError};
use state::library::Library;
use state::store::{KeyValueStore, MemoryStore, SqliteStore};
use view::controller::{Command, Event, Phase, UploadFile, ViewStateController};
use view::detail::{DetailView, Step};
use view::effects;
use view::navigation::{History, Location, NavigationSurface, Route};
use view::params::SortMode;
use view::people::{PeopleView, PersonView};

/// View-state storage shared by the grid and the pages it opens
type Store = Rc<dyn KeyValueStore>;

/// Items shown per row in the grid
const ROW_LENGTH: usize = 4;

/// Where background tasks find the catalog
#[derive(Debug)]
struct Catalog {
    path: Option<PathBuf>,
    device_id: String,
}

impl Catalog {
    /// Runs on a blocking thread; opens its own connection
    fn execute(&self, command: Command) -> Event {
        let Some(path) = &self.path else {
            return command.fail(RemoteError::Transport(
                "No catalog location is available".to_string(),
            ));
        };

        match Library::open(path) {
            Ok(library) => effects::execute(&library, &self.device_id, command),
            Err(e) => {
                error!("Failed to open catalog at {}: {}", path.display(), e);
                command.fail(e.into())
            }
        }
    }
}

/// The page for the current route. The grid controller lives outside it
/// and keeps its state while other pages are showing.
enum Screen {
    Grid,
    Detail(DetailView<Store>),
    People(PeopleView),
    Person(PersonView<Store>),
}

/// Main application state
struct PhotoBrowser {
    catalog: Arc<Catalog>,
    store: Store,
    history: History,
    grid: ViewStateController<Store>,
    screen: Screen,
    search_input: String,
    rename_input: String,
    /// Album the rename field was last filled from
    rename_for: Option<String>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// Controller events, both user intents and command completions
    Event(Event),
    SearchInput(String),
    SearchSubmit,
    RenameInput(String),
    RenameSubmit,
    AddPhotos,
    FilesRead(Vec<UploadFile>),
    OpenItem(String),
    ShowGrid,
    OpenPeople,
    OpenPerson(String),
    EditPerson(String),
    PersonNameInput(String),
    SavePersonName,
    CancelPersonEdit,
    Step(Step),
    ToggleSidebar,
    Back,
    Forward,
}

impl PhotoBrowser {
    fn new(config: Config) -> (Self, Task<Message>) {
        let library_path = match config.library_path() {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Cannot locate the catalog: {}", e);
                None
            }
        };

        let store: Store = match config.state_path().and_then(|path| SqliteStore::open(&path)) {
            Ok(store) => Rc::new(store),
            Err(e) => {
                warn!("⚠️  View state will not be persisted: {}", e);
                Rc::new(MemoryStore::new())
            }
        };

        info!(
            "🎨 Photo Browser starting with catalog {:?}",
            library_path.as_deref().map(|p| p.display().to_string())
        );
        if let Some(path) = &library_path {
            match Library::open(path).and_then(|library| library.item_count().map_err(Into::into)) {
                Ok(count) => info!("📚 Catalog holds {} assets", count),
                Err(e) => warn!("⚠️  Could not read the catalog: {}", e),
            }
        }

        let mut app = PhotoBrowser {
            catalog: Arc::new(Catalog {
                path: library_path,
                device_id: config.device_id.clone(),
            }),
            grid: ViewStateController::new(ItemOrderCache::new(Rc::clone(&store))),
            store,
            history: History::new(Location::grid(config.initial_query())),
            screen: Screen::Grid,
            search_input: String::new(),
            rename_input: String::new(),
            rename_for: None,
        };

        let task = app.dispatch(Event::Mounted);
        app.search_input = app.grid.state().search_query.clone().unwrap_or_default();
        (app, task)
    }

    fn title(&self) -> String {
        match &self.screen {
            Screen::Grid => format!("{} - Photo Browser", self.grid.title()),
            Screen::Detail(detail) => match detail.item() {
                Some(item) => format!("{} - Photo Browser", item.filename),
                None => "Photo Browser".to_string(),
            },
            Screen::People(_) => "People - Photo Browser".to_string(),
            Screen::Person(person) => format!("{} - Photo Browser", person.title()),
        }
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Event(Event::ItemRetrieved { id, result }) => {
                if let Screen::Detail(detail) = &mut self.screen {
                    detail.on_retrieved(&id, result);
                }
                Task::none()
            }
            Message::Event(Event::PeopleLoaded(result)) => {
                if let Screen::People(people) = &mut self.screen {
                    people.on_loaded(result);
                }
                Task::none()
            }
            Message::Event(Event::PersonRenamed { id, result }) => {
                if let Screen::People(people) = &mut self.screen {
                    people.on_renamed(&id, result);
                }
                Task::none()
            }
            Message::Event(Event::PersonLoaded { id, result }) => {
                if let Screen::Person(person) = &mut self.screen {
                    person.on_loaded(&id, result);
                }
                Task::none()
            }
            Message::Event(event) => self.dispatch(event),
            Message::SearchInput(value) => {
                self.search_input = value;
                Task::none()
            }
            Message::SearchSubmit => {
                if self.search_input.trim().is_empty() {
                    self.dispatch(Event::ClearSearch)
                } else {
                    self.dispatch(Event::Search(self.search_input.clone()))
                }
            }
            Message::RenameInput(value) => {
                self.rename_input = value;
                Task::none()
            }
            Message::RenameSubmit => match self.grid.state().collection_id.clone() {
                Some(id) => self.dispatch(Event::RenameCollection {
                    id,
                    name: self.rename_input.clone(),
                }),
                None => Task::none(),
            },
            Message::AddPhotos => {
                // Show the native file picker
                let picked = FileDialog::new()
                    .set_title("Add Photos")
                    .add_filter(
                        "Images",
                        &["jpg", "jpeg", "png", "heic", "webp", "gif", "tif", "tiff", "dng"],
                    )
                    .pick_files();

                match picked {
                    Some(paths) if !paths.is_empty() => {
                        Task::perform(read_files_async(paths), Message::FilesRead)
                    }
                    _ => Task::none(),
                }
            }
            Message::FilesRead(files) => self.dispatch(Event::UploadRequested(files)),
            Message::OpenItem(id) => {
                self.history.push(Location::asset(id));
                self.location_changed()
            }
            Message::ShowGrid => {
                self.history
                    .push(Location::grid(self.grid.state().to_query()));
                self.location_changed()
            }
            Message::OpenPeople => {
                self.history.push(Location::people());
                self.location_changed()
            }
            Message::OpenPerson(id) => {
                self.history.push(Location::person(id));
                self.location_changed()
            }
            Message::EditPerson(id) => {
                if let Screen::People(people) = &mut self.screen {
                    people.start_edit(&id);
                }
                Task::none()
            }
            Message::PersonNameInput(value) => {
                if let Screen::People(people) = &mut self.screen {
                    people.edit_draft(value);
                }
                Task::none()
            }
            Message::SavePersonName => {
                let command = match &mut self.screen {
                    Screen::People(people) => people.save(),
                    _ => None,
                };
                match command {
                    Some(command) => self.run(command),
                    None => Task::none(),
                }
            }
            Message::CancelPersonEdit => {
                if let Screen::People(people) = &mut self.screen {
                    people.cancel_edit();
                }
                Task::none()
            }
            Message::Step(step) => {
                let command = match &mut self.screen {
                    Screen::Detail(detail) => detail.step(step, &mut self.history),
                    _ => None,
                };
                match command {
                    Some(command) => self.run(command),
                    None => Task::none(),
                }
            }
            Message::ToggleSidebar => {
                if let Screen::Detail(detail) = &mut self.screen {
                    detail.toggle_sidebar();
                }
                Task::none()
            }
            Message::Back => {
                if self.history.back() {
                    self.location_changed()
                } else {
                    Task::none()
                }
            }
            Message::Forward => {
                if self.history.forward() {
                    self.location_changed()
                } else {
                    Task::none()
                }
            }
        }
    }

    /// Feed an event to the grid controller and run what it asks for.
    ///
    /// The grid writes its query into its own history entry, which is not
    /// the current one while another page is showing.
    fn dispatch(&mut self, event: Event) -> Task<Message> {
        let refresh_names = matches!(
            event,
            Event::CollectionsLoaded { .. } | Event::CollectionRenamed { .. }
        );
        let commands = self.grid.dispatch(event, &mut self.history.grid_entry());

        if refresh_names || self.rename_for != self.grid.state().collection_id {
            self.rename_for = self.grid.state().collection_id.clone();
            self.rename_input = self
                .grid
                .selected_collection()
                .map(|c| c.name.clone())
                .unwrap_or_default();
        }

        let tasks: Vec<Task<Message>> = commands.into_iter().map(|c| self.run(c)).collect();
        Task::batch(tasks)
    }

    /// React to the current history entry after back/forward/push
    fn location_changed(&mut self) -> Task<Message> {
        match self.history.current().route.clone() {
            Route::Grid => {
                self.screen = Screen::Grid;
                let task = self.dispatch(Event::ExternalNavigation);
                self.search_input = self.grid.state().search_query.clone().unwrap_or_default();
                task
            }
            Route::Asset(id) => {
                let command = match &mut self.screen {
                    Screen::Detail(detail) => detail.show(id),
                    _ => {
                        let (detail, command) = DetailView::open(id, Rc::clone(&self.store));
                        self.screen = Screen::Detail(detail);
                        command
                    }
                };
                self.run(command)
            }
            Route::People => {
                let (people, command) = PeopleView::open();
                self.screen = Screen::People(people);
                self.run(command)
            }
            Route::Person(id) => {
                let (person, command) = PersonView::open(id, Rc::clone(&self.store));
                self.screen = Screen::Person(person);
                self.run(command)
            }
        }
    }

    /// Run a command on a blocking thread and feed its completion back
    fn run(&self, command: Command) -> Task<Message> {
        let catalog = Arc::clone(&self.catalog);
        Task::perform(
            async move {
                let fallback = command.clone();
                match tokio::task::spawn_blocking(move || catalog.execute(command)).await {
                    Ok(event) => event,
                    Err(e) => {
                        error!("Background task failed: {}", e);
                        fallback.fail(RemoteError::Transport(e.to_string()))
                    }
                }
            },
            Message::Event,
        )
    }

    fn subscription(&self) -> Subscription<Message> {
        if !matches!(self.screen, Screen::Detail(_)) {
            return Subscription::none();
        }

        keyboard::on_key_press(|key, _modifiers| match key {
            keyboard::Key::Named(key::Named::ArrowLeft) => Some(Message::Step(Step::Previous)),
            keyboard::Key::Named(key::Named::ArrowRight) => Some(Message::Step(Step::Next)),
            keyboard::Key::Named(key::Named::Escape) => Some(Message::Back),
            _ => None,
        })
    }

    /// Build the user interface
    fn view(&self) -> Element<'_, Message> {
        let content = match &self.screen {
            Screen::Grid => self.view_grid(),
            Screen::Detail(detail) => self.view_detail(detail),
            Screen::People(people) => self.view_people(people),
            Screen::Person(person) => self.view_person(person),
        };

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(20)
            .into()
    }

    fn view_grid(&self) -> Element<'_, Message> {
        let state = self.grid.state();

        // Album list
        let mut albums = Column::new().spacing(6).width(Length::Fixed(220.0));
        albums = albums.push(text("Albums").size(20));
        albums = albums.push(
            button("All Photos")
                .width(Length::Fill)
                .style(if state.collection_id.is_none() && state.is_browsing() {
                    button::primary
                } else {
                    button::secondary
                })
                .on_press(Message::Event(Event::SelectCollection(None))),
        );
        if self.grid.is_loading_collections() {
            albums = albums.push(text("Loading albums...").size(14));
        }
        for collection in self.grid.collections() {
            let selected = state.collection_id.as_deref() == Some(collection.id.as_str());
            albums = albums.push(
                button(text(format!("{} ({})", collection.name, collection.item_count)))
                    .width(Length::Fill)
                    .style(if selected { button::primary } else { button::secondary })
                    .on_press(Message::Event(Event::SelectCollection(Some(
                        collection.id.clone(),
                    )))),
            );
        }
        albums = albums.push(
            button("New Album")
                .on_press(Message::Event(Event::CreateCollection))
                .padding(8),
        );
        if let Some(message) = self.grid.errors().get(ErrorScope::Collections) {
            albums = albums.push(text(message).size(14));
        }
        albums = albums.push(
            button("People")
                .width(Length::Fill)
                .style(button::secondary)
                .on_press(Message::OpenPeople),
        );

        // Toolbar
        let sort_button = |mode: SortMode| {
            button(text(mode.to_string()))
                .style(if state.sort_mode == mode {
                    button::primary
                } else {
                    button::secondary
                })
                .on_press(Message::Event(Event::ChangeSort(mode)))
        };
        let toolbar = row![
            button("<").on_press_maybe(self.history.can_go_back().then_some(Message::Back)),
            button(">").on_press_maybe(self.history.can_go_forward().then_some(Message::Forward)),
            text_input("Search photos", &self.search_input)
                .on_input(Message::SearchInput)
                .on_submit(Message::SearchSubmit)
                .padding(8)
                .width(Length::Fixed(260.0)),
            button("Clear").on_press_maybe(
                state
                    .search_query
                    .is_some()
                    .then_some(Message::Event(Event::ClearSearch))
            ),
            sort_button(SortMode::ByDate),
            sort_button(SortMode::ByQuality),
            button(if state.stack { "Stack: On" } else { "Stack: Off" })
                .on_press(Message::Event(Event::ToggleStack)),
            button(text(match self.grid.upload_progress() {
                Some(progress) => format!(
                    "Uploading {} of {}...",
                    (progress.uploaded + 1).min(progress.total),
                    progress.total
                ),
                None => "Add Photos".to_string(),
            }))
            .on_press_maybe((!self.grid.is_uploading()).then_some(Message::AddPhotos)),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        // Header with rename/delete when an album is selected
        let mut header = Row::new().spacing(10).align_y(Alignment::Center);
        match self.grid.selected_collection() {
            Some(collection) => {
                header = header
                    .push(
                        text_input("Album name", &self.rename_input)
                            .on_input(Message::RenameInput)
                            .on_submit(Message::RenameSubmit)
                            .size(24)
                            .width(Length::Fixed(360.0)),
                    )
                    .push(
                        button("Delete Album")
                            .style(button::danger)
                            .on_press(Message::Event(Event::DeleteCollection(
                                collection.id.clone(),
                            ))),
                    );
            }
            None => header = header.push(text(self.grid.title()).size(28)),
        }

        let mut main = Column::new().spacing(14).push(toolbar).push(header);
        for scope in [ErrorScope::Items, ErrorScope::Mutation] {
            if let Some(message) = self.grid.errors().get(scope) {
                main = main.push(text(message).size(14));
            }
        }

        if matches!(self.grid.phase(), Phase::Uninitialized | Phase::Initializing) {
            main = main.push(text("Waiting for albums..."));
        } else if self.grid.is_loading_items() {
            main = main.push(text("Loading..."));
        } else if self.grid.items().is_empty() {
            main = main.push(text("No photos here yet."));
        }

        let mut sections = Column::new().spacing(18);
        for group in self.grid.groups() {
            let mut section = Column::new()
                .spacing(8)
                .push(text(group.key.label()).size(18));
            for chunk in group.items.chunks(ROW_LENGTH) {
                let mut line = Row::new().spacing(8);
                for item in chunk {
                    line = line.push(
                        button(text(item.filename.clone()).size(14))
                            .width(Length::Fixed(180.0))
                            .style(button::secondary)
                            .on_press(Message::OpenItem(item.id.clone())),
                    );
                }
                section = section.push(line);
            }
            sections = sections.push(section);
        }
        main = main.push(scrollable(sections).height(Length::Fill));

        row![albums, main].spacing(24).into()
    }

    fn view_people<'a>(&'a self, people: &'a PeopleView) -> Element<'a, Message> {
        let mut body = Column::new()
            .spacing(12)
            .push(row![
                button("Back").on_press_maybe(self.history.can_go_back().then_some(Message::Back)),
                button("All Photos").on_press(Message::ShowGrid),
            ]
            .spacing(10))
            .push(text("People").size(28));

        if people.is_loading() {
            body = body.push(text("Loading people..."));
        }
        if let Some(message) = people.error() {
            body = body.push(text(message).size(14));
        }
        if !people.is_loading() && people.people().is_empty() && people.error().is_none() {
            body = body.push(text("Nobody has been recognised yet."));
        }

        let mut list = Column::new().spacing(8);
        for person in people.people() {
            let line = match people.draft() {
                Some((id, draft)) if id == person.id => row![
                    text_input("Name", draft)
                        .on_input(Message::PersonNameInput)
                        .on_submit(Message::SavePersonName)
                        .width(Length::Fixed(260.0)),
                    button("Save").on_press(Message::SavePersonName),
                    button("Cancel")
                        .style(button::secondary)
                        .on_press(Message::CancelPersonEdit),
                ],
                _ => row![
                    button(text(person.display_name()))
                        .width(Length::Fixed(260.0))
                        .style(button::secondary)
                        .on_press(Message::OpenPerson(person.id.clone())),
                    text(format!("{} photos", person.item_count)).size(14),
                    button("Rename")
                        .style(button::secondary)
                        .on_press(Message::EditPerson(person.id.clone())),
                ],
            };
            list = list.push(line.spacing(10).align_y(Alignment::Center));
        }

        body.push(scrollable(list).height(Length::Fill)).into()
    }

    fn view_person<'a>(&'a self, person: &'a PersonView<Store>) -> Element<'a, Message> {
        let mut body = Column::new()
            .spacing(12)
            .push(row![
                button("Back").on_press_maybe(self.history.can_go_back().then_some(Message::Back)),
                button("People").on_press(Message::OpenPeople),
            ]
            .spacing(10))
            .push(text(person.title()).size(28));

        if person.is_loading() {
            body = body.push(text(format!("Loading person {}...", person.person_id())));
        }
        if let Some(message) = person.error() {
            body = body.push(text(message).size(14));
        }

        let mut grid = Column::new().spacing(8);
        for chunk in person.items().chunks(ROW_LENGTH) {
            let mut line = Row::new().spacing(8);
            for item in chunk {
                line = line.push(
                    button(text(item.filename.clone()).size(14))
                        .width(Length::Fixed(180.0))
                        .style(button::secondary)
                        .on_press(Message::OpenItem(item.id.clone())),
                );
            }
            grid = grid.push(line);
        }

        body.push(scrollable(grid).height(Length::Fill)).into()
    }

    fn view_detail<'a>(&'a self, detail: &'a DetailView<Store>) -> Element<'a, Message> {
        let nav = row![
            button("Back").on_press_maybe(self.history.can_go_back().then_some(Message::Back)),
            button("All Photos").on_press(Message::ShowGrid),
            button("Previous").on_press_maybe(
                detail.previous().map(|_| Message::Step(Step::Previous))
            ),
            button("Next").on_press_maybe(detail.next().map(|_| Message::Step(Step::Next))),
            button(if detail.is_sidebar_open() {
                "Hide Info"
            } else {
                "Show Info"
            })
            .on_press(Message::ToggleSidebar),
        ]
        .spacing(10);

        let mut body = Column::new().spacing(16).push(nav);
        if detail.is_loading() {
            body = body.push(text(format!("Loading asset {}...", detail.item_id())));
        }
        if let Some(message) = detail.error() {
            body = body.push(text(message));
        }
        if let Some(item) = detail.item() {
            body = body.push(text(item.filename.clone()).size(28));
        }

        if !detail.is_sidebar_open() {
            return body.into();
        }

        let mut sidebar = Column::new().spacing(6).width(Length::Fixed(280.0));
        for (label, value) in detail.metadata() {
            sidebar = sidebar.push(column![text(label).size(12), text(value).size(16)]);
        }
        row![body.width(Length::Fill), sidebar].spacing(24).into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Read the picked files off the UI thread; unreadable files are skipped
async fn read_files_async(paths: Vec<PathBuf>) -> Vec<UploadFile> {
    let read = tokio::task::spawn_blocking(move || {
        paths
            .iter()
            .filter_map(|path| match UploadFile::read(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!("⚠️  Skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect::<Vec<_>>()
    })
    .await;

    read.unwrap_or_else(|e| {
        error!("Failed to read picked files: {}", e);
        Vec::new()
    })
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn main() -> iced::Result {
    let config = Config::parse();
    init_tracing(&config);

    iced::application(PhotoBrowser::title, PhotoBrowser::update, PhotoBrowser::view)
        .theme(PhotoBrowser::theme)
        .subscription(PhotoBrowser::subscription)
        .centered()
        .run_with(move || PhotoBrowser::new(config))
}
