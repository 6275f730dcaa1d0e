/// In-app navigation: a browser-like location history
///
/// The grid mirrors its view state into the current location's query
/// string. Programmatic syncs replace the current entry; explicit navigation
/// (opening an asset) pushes a new one. Back/forward move between entries
/// and are the "external" changes the grid has to re-read.
use std::fmt;

/// Route part of a location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The album/search grid at "/"
    Grid,
    /// The detail view at "/asset/<id>"
    Asset(String),
    /// Everyone recognised in the library, at "/people"
    People,
    /// One person's photos at "/people/<id>"
    Person(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub route: Route,
    /// Query string without the leading '?'
    pub query: String,
}

impl Location {
    pub fn grid(query: impl Into<String>) -> Self {
        Location {
            route: Route::Grid,
            query: query.into(),
        }
    }

    pub fn asset(id: impl Into<String>) -> Self {
        Location {
            route: Route::Asset(id.into()),
            query: String::new(),
        }
    }

    pub fn people() -> Self {
        Location {
            route: Route::People,
            query: String::new(),
        }
    }

    pub fn person(id: impl Into<String>) -> Self {
        Location {
            route: Route::Person(id.into()),
            query: String::new(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.route {
            Route::Grid => write!(f, "/")?,
            Route::Asset(id) => write!(f, "/asset/{}", id)?,
            Route::People => write!(f, "/people")?,
            Route::Person(id) => write!(f, "/people/{}", id)?,
        }
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

/// What the controller needs from whatever hosts the navigable location
pub trait NavigationSurface {
    /// Current query string without the leading '?'
    fn query(&self) -> String;
    /// Replace the current query without adding a history entry
    fn replace_query(&mut self, query: &str);
    /// Navigate to a new entry, dropping any forward history
    fn push(&mut self, location: Location);
}

/// Linear history with a cursor, like a browser tab
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<Location>,
    cursor: usize,
}

impl History {
    pub fn new(initial: Location) -> Self {
        History {
            entries: vec![initial],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &Location {
        &self.entries[self.cursor]
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Returns false when there is nothing to go back to
    pub fn back(&mut self) -> bool {
        if !self.can_go_back() {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn forward(&mut self) -> bool {
        if !self.can_go_forward() {
            return false;
        }
        self.cursor += 1;
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The grid's own entry: the current one if it is a grid, otherwise the
    /// closest grid entry behind the cursor.
    ///
    /// The grid keeps receiving completions while another route is showing;
    /// its query writes must not land on that route's entry.
    pub fn grid_entry(&mut self) -> GridEntry<'_> {
        let index = self.entries[..=self.cursor]
            .iter()
            .rposition(|location| location.route == Route::Grid)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|location| location.route == Route::Grid)
            });
        GridEntry {
            history: self,
            index,
        }
    }
}

/// `NavigationSurface` scoped to the grid's entry of a `History`
pub struct GridEntry<'a> {
    history: &'a mut History,
    /// None when no grid entry exists at all
    index: Option<usize>,
}

impl NavigationSurface for GridEntry<'_> {
    fn query(&self) -> String {
        match self.index {
            Some(index) => self.history.entries[index].query.clone(),
            None => String::new(),
        }
    }

    fn replace_query(&mut self, query: &str) {
        match self.index {
            Some(index) => self.history.entries[index].query = query.to_string(),
            None => self.history.push(Location::grid(query)),
        }
    }

    fn push(&mut self, location: Location) {
        self.history.push(location);
        self.index = (self.history.current().route == Route::Grid).then_some(self.history.cursor);
    }
}

impl NavigationSurface for History {
    fn query(&self) -> String {
        self.current().query.clone()
    }

    fn replace_query(&mut self, query: &str) {
        self.entries[self.cursor].query = query.to_string();
    }

    fn push(&mut self, location: Location) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(location);
        self.cursor = self.entries.len() - 1;
    }
}
