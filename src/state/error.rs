/// Error types for the catalog, the view-state store and the controller
///
/// Remote and storage errors are raised by collaborators. `ViewError` is what
/// the controller turns them into: a scoped, human-readable message.
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a `DataSource` call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("rejected: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for RemoteError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => RemoteError::NotFound(err.to_string()),
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RemoteError::Validation(err.to_string())
            }
            other => RemoteError::Transport(other.to_string()),
        }
    }
}

/// Failure of the local key-value store. Never shown to the user.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode value for '{key}'")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Failure to open the on-disk catalog
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("could not determine a data directory for the catalog")]
    NoDataDir,
    #[error("failed to create directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<LibraryError> for RemoteError {
    fn from(err: LibraryError) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/// Which part of the view an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Collections,
    Items,
    Mutation,
}

/// User-visible errors produced by the view-state controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    #[error("Failed to load albums.")]
    CollectionsLoad(#[source] RemoteError),

    #[error("Failed to load assets.{}", album_suffix(.collection_id))]
    ItemsLoad {
        collection_id: Option<String>,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to search for \"{query}\".")]
    Search {
        query: String,
        #[source]
        source: RemoteError,
    },

    #[error("{message}")]
    Mutation {
        message: String,
        #[source]
        source: Option<RemoteError>,
    },

    /// Items were created but attaching them to the album failed.
    /// The created items are kept.
    #[error("{uploaded} items uploaded but not attached to the album.")]
    PartialUpload {
        uploaded: usize,
        #[source]
        source: RemoteError,
    },
}

fn album_suffix(collection_id: &Option<String>) -> String {
    match collection_id {
        Some(id) => format!(" Album ID: {}", id),
        None => String::new(),
    }
}

impl ViewError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            ViewError::CollectionsLoad(_) => ErrorScope::Collections,
            ViewError::ItemsLoad { .. } | ViewError::Search { .. } => ErrorScope::Items,
            ViewError::Mutation { .. } | ViewError::PartialUpload { .. } => ErrorScope::Mutation,
        }
    }

    pub fn mutation(message: impl Into<String>, source: Option<RemoteError>) -> Self {
        ViewError::Mutation {
            message: message.into(),
            source,
        }
    }
}

/// One optional message per scope, so a failure in one scope
/// never clobbers another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBoard {
    collections: Option<String>,
    items: Option<String>,
    mutation: Option<String>,
}

impl ErrorBoard {
    pub fn report(&mut self, error: &ViewError) {
        *self.slot(error.scope()) = Some(error.to_string());
    }

    pub fn clear(&mut self, scope: ErrorScope) {
        *self.slot(scope) = None;
    }

    pub fn get(&self, scope: ErrorScope) -> Option<&str> {
        match scope {
            ErrorScope::Collections => self.collections.as_deref(),
            ErrorScope::Items => self.items.as_deref(),
            ErrorScope::Mutation => self.mutation.as_deref(),
        }
    }

    fn slot(&mut self, scope: ErrorScope) -> &mut Option<String> {
        match scope {
            ErrorScope::Collections => &mut self.collections,
            ErrorScope::Items => &mut self.items,
            ErrorScope::Mutation => &mut self.mutation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_message_mentions_album() {
        let err = ViewError::ItemsLoad {
            collection_id: Some("7".to_string()),
            source: RemoteError::Transport("timeout".to_string()),
        };
        assert_eq!(err.to_string(), "Failed to load assets. Album ID: 7");

        let err = ViewError::ItemsLoad {
            collection_id: None,
            source: RemoteError::Transport("timeout".to_string()),
        };
        assert_eq!(err.to_string(), "Failed to load assets.");
    }

    #[test]
    fn test_board_keeps_scopes_apart() {
        let mut board = ErrorBoard::default();
        board.report(&ViewError::CollectionsLoad(RemoteError::Transport("x".into())));
        board.report(&ViewError::Search {
            query: "cats".to_string(),
            source: RemoteError::Transport("x".into()),
        });

        board.clear(ErrorScope::Items);

        assert_eq!(board.get(ErrorScope::Collections), Some("Failed to load albums."));
        assert_eq!(board.get(ErrorScope::Items), None);
        assert_eq!(board.get(ErrorScope::Mutation), None);
    }

    #[test]
    fn test_partial_upload_message() {
        let err = ViewError::PartialUpload {
            uploaded: 3,
            source: RemoteError::NotFound("album".into()),
        };
        assert_eq!(err.scope(), ErrorScope::Mutation);
        assert_eq!(err.to_string(), "3 items uploaded but not attached to the album.");
    }

    #[test]
    fn test_sqlite_no_rows_is_not_found() {
        let err: RemoteError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }
}
