use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::data::{
    Collection, CollectionUpdate, DeviceMeta, Item, ItemFilter, Person, PersonUpdate,
};
use super::error::{LibraryError, RemoteError};
use super::source::DataSource;

/// Columns selected for every item query, in `row_to_item` order
const ITEM_COLUMNS: &str =
    "i.id, i.filename, i.local_datetime, i.file_created_at, i.metrics_json, length(i.data)";

/// The Library manages the SQLite catalog database.
/// It stores albums, asset bytes and album membership, and serves
/// as the `DataSource` for the desktop shell.
pub struct Library {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl Library {
    /// Open (or create) the catalog at `db_path`.
    ///
    /// `rusqlite::Connection` is opened per caller; background tasks open
    /// their own `Library` rather than sharing the UI thread's.
    pub fn open(db_path: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| LibraryError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        debug!("📁 Catalog opened at: {}", db_path.display());

        let library = Library {
            conn,
            db_path: Some(db_path.to_path_buf()),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Catalog that lives only as long as this value
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, LibraryError> {
        let library = Library {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Get the path where the catalog should be stored by default
    ///
    /// - Linux: ~/.local/share/photo-browser/library.db
    /// - macOS: ~/Library/Application Support/photo-browser/library.db
    /// - Windows: %APPDATA%\photo-browser\library.db
    pub fn default_path() -> Result<PathBuf, LibraryError> {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or(LibraryError::NoDataDir)?;

        path.push("photo-browser");
        path.push("library.db");
        Ok(path)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS collections (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                created_at      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS items (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                device_asset_id  TEXT NOT NULL,
                device_id        TEXT NOT NULL,
                filename         TEXT NOT NULL,
                local_datetime   TEXT,
                file_created_at  TEXT NOT NULL,
                file_modified_at TEXT NOT NULL,
                metrics_json     TEXT,
                data             BLOB NOT NULL,
                imported_at      INTEGER NOT NULL,
                UNIQUE(device_id, device_asset_id)
            );

            CREATE TABLE IF NOT EXISTS collection_items (
                collection_id   INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                item_id         INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                added_at        INTEGER NOT NULL,
                PRIMARY KEY (collection_id, item_id)
            );

            CREATE TABLE IF NOT EXISTS people (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT,
                created_at      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS faces (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id         INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                person_id       INTEGER REFERENCES people(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_faces_person
             ON faces(person_id);

            CREATE INDEX IF NOT EXISTS idx_items_imported_at
             ON items(imported_at DESC);

            CREATE INDEX IF NOT EXISTS idx_collection_items_item
             ON collection_items(item_id);",
        )
    }

    /// Get a count of items in the library
    pub fn item_count(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
    }

    fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
        let id: i64 = row.get(0)?;
        let metrics_json: Option<String> = row.get(4)?;
        let metrics = metrics_json
            .map(|json| serde_json::from_str::<BTreeMap<String, f64>>(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        Ok(Item {
            id: id.to_string(),
            filename: row.get(1)?,
            local_datetime: row.get(2)?,
            file_created_at: row.get(3)?,
            metrics,
            byte_size: row.get(5)?,
        })
    }

    fn query_items<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Item>, RemoteError> {
        let mut stmt = self.conn.prepare(sql)?;
        let items = stmt
            .query_map(params, Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn collection_exists(&self, id: i64) -> rusqlite::Result<bool> {
        self.conn
            .query_row("SELECT 1 FROM collections WHERE id = ?1", [id], |_| Ok(()))
            .optional()
            .map(|row| row.is_some())
    }

    fn get_person(&self, id: i64) -> rusqlite::Result<Option<Person>> {
        self.conn
            .query_row(
                "SELECT p.id, p.name,
                        (SELECT COUNT(DISTINCT f.item_id) FROM faces f WHERE f.person_id = p.id)
                 FROM people p WHERE p.id = ?1",
                [id],
                Self::row_to_person,
            )
            .optional()
    }

    fn row_to_person(row: &Row<'_>) -> rusqlite::Result<Person> {
        Ok(Person {
            id: row.get::<_, i64>(0)?.to_string(),
            name: row.get(1)?,
            item_count: row.get(2)?,
        })
    }

    fn get_collection(&self, id: i64) -> Result<Collection, RemoteError> {
        let collection = self.conn.query_row(
            "SELECT c.id, c.name,
                    (SELECT COUNT(*) FROM collection_items ci WHERE ci.collection_id = c.id)
             FROM collections c WHERE c.id = ?1",
            [id],
            |row| {
                Ok(Collection {
                    id: row.get::<_, i64>(0)?.to_string(),
                    name: row.get(1)?,
                    item_count: row.get(2)?,
                })
            },
        )?;
        Ok(collection)
    }
}

/// Catalog IDs are integers; anything else cannot exist
fn parse_id(kind: &str, id: &str) -> Result<i64, RemoteError> {
    id.parse::<i64>()
        .map_err(|_| RemoteError::NotFound(format!("{} '{}'", kind, id)))
}

fn validated_name(name: &str) -> Result<&str, RemoteError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RemoteError::Validation("album name cannot be empty".to_string()));
    }
    Ok(name)
}

/// Escape LIKE wildcards so a search is a plain substring match
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl DataSource for Library {
    fn list_collections(&self) -> Result<Vec<Collection>, RemoteError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name,
                    (SELECT COUNT(*) FROM collection_items ci WHERE ci.collection_id = c.id)
             FROM collections c
             ORDER BY c.name COLLATE NOCASE, c.id",
        )?;

        let collections = stmt
            .query_map([], |row| {
                Ok(Collection {
                    id: row.get::<_, i64>(0)?.to_string(),
                    name: row.get(1)?,
                    item_count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(collections)
    }

    fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, RemoteError> {
        if let Some(query) = filter.search_query.as_deref() {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM items i
                 WHERE i.filename LIKE ?1 ESCAPE '\\'
                 ORDER BY i.imported_at DESC, i.id DESC"
            );
            return self.query_items(&sql, [like_pattern(query)]);
        }

        match filter.collection_id.as_deref() {
            Some(collection_id) => {
                let id = parse_id("album", collection_id)?;
                if !self.collection_exists(id)? {
                    return Err(RemoteError::NotFound(format!("album '{}'", collection_id)));
                }
                let sql = format!(
                    "SELECT {ITEM_COLUMNS} FROM items i
                     JOIN collection_items ci ON ci.item_id = i.id
                     WHERE ci.collection_id = ?1
                     ORDER BY i.imported_at DESC, i.id DESC"
                );
                self.query_items(&sql, [id])
            }
            None => match filter.person_id.as_deref() {
                Some(person_id) => {
                    let id = parse_id("person", person_id)?;
                    if self.get_person(id)?.is_none() {
                        return Err(RemoteError::NotFound(format!("person '{}'", person_id)));
                    }
                    let sql = format!(
                        "SELECT {ITEM_COLUMNS} FROM items i
                         WHERE i.id IN (SELECT f.item_id FROM faces f WHERE f.person_id = ?1)
                         ORDER BY i.imported_at DESC, i.id DESC"
                    );
                    self.query_items(&sql, [id])
                }
                None => {
                    let sql = format!(
                        "SELECT {ITEM_COLUMNS} FROM items i ORDER BY i.imported_at DESC, i.id DESC"
                    );
                    self.query_items(&sql, [])
                }
            },
        }
    }

    fn retrieve_item(&self, id: &str) -> Result<Item, RemoteError> {
        let item_id = parse_id("asset", id)?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.id = ?1");
        self.conn
            .query_row(&sql, [item_id], Self::row_to_item)
            .optional()?
            .ok_or_else(|| RemoteError::NotFound(format!("asset '{}'", id)))
    }

    fn create_collection(&self, name: &str) -> Result<Collection, RemoteError> {
        let name = validated_name(name)?;
        self.conn.execute(
            "INSERT INTO collections (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().timestamp()],
        )?;

        Ok(Collection {
            id: self.conn.last_insert_rowid().to_string(),
            name: name.to_string(),
            item_count: 0,
        })
    }

    fn update_collection(
        &self,
        id: &str,
        update: &CollectionUpdate,
    ) -> Result<Collection, RemoteError> {
        let collection_id = parse_id("album", id)?;
        let name = validated_name(&update.name)?;

        let changed = self.conn.execute(
            "UPDATE collections SET name = ?1 WHERE id = ?2",
            params![name, collection_id],
        )?;
        if changed == 0 {
            return Err(RemoteError::NotFound(format!("album '{}'", id)));
        }

        self.get_collection(collection_id)
    }

    fn delete_collection(&self, id: &str) -> Result<(), RemoteError> {
        let collection_id = parse_id("album", id)?;
        let changed = self
            .conn
            .execute("DELETE FROM collections WHERE id = ?1", [collection_id])?;
        if changed == 0 {
            return Err(RemoteError::NotFound(format!("album '{}'", id)));
        }
        Ok(())
    }

    fn create_item(&self, bytes: &[u8], meta: &DeviceMeta) -> Result<Item, RemoteError> {
        let metrics_json = meta
            .metrics
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RemoteError::Validation(e.to_string()))?;

        // Uploaded files carry no capture metadata; the file's creation
        // time stands in for the capture time.
        self.conn.execute(
            "INSERT INTO items (device_asset_id, device_id, filename, local_datetime,
                                file_created_at, file_modified_at, metrics_json, data, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                meta.device_asset_id,
                meta.device_id,
                meta.filename,
                meta.file_created_at,
                meta.file_created_at,
                meta.file_modified_at,
                metrics_json,
                bytes,
                Utc::now().timestamp(),
            ],
        )?;

        self.retrieve_item(&self.conn.last_insert_rowid().to_string())
    }

    fn add_items_to_collection(
        &self,
        collection_id: &str,
        item_ids: &[String],
    ) -> Result<(), RemoteError> {
        let album = parse_id("album", collection_id)?;
        let tx = self.conn.unchecked_transaction()?;

        if !self.collection_exists(album)? {
            return Err(RemoteError::NotFound(format!("album '{}'", collection_id)));
        }

        let now = Utc::now().timestamp();
        for item_id in item_ids {
            let item = parse_id("asset", item_id)?;
            let exists = tx
                .query_row("SELECT 1 FROM items WHERE id = ?1", [item], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Err(RemoteError::NotFound(format!("asset '{}'", item_id)));
            }
            tx.execute(
                "INSERT OR IGNORE INTO collection_items (collection_id, item_id, added_at)
                 VALUES (?1, ?2, ?3)",
                params![album, item, now],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_people(&self) -> Result<Vec<Person>, RemoteError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name,
                    (SELECT COUNT(DISTINCT f.item_id) FROM faces f WHERE f.person_id = p.id) AS n
             FROM people p
             ORDER BY n DESC, p.id",
        )?;
        let people = stmt
            .query_map([], Self::row_to_person)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(people)
    }

    fn retrieve_person(&self, id: &str) -> Result<Person, RemoteError> {
        let person_id = parse_id("person", id)?;
        self.get_person(person_id)?
            .ok_or_else(|| RemoteError::NotFound(format!("person '{}'", id)))
    }

    fn update_person(&self, id: &str, update: &PersonUpdate) -> Result<Person, RemoteError> {
        let person_id = parse_id("person", id)?;
        let name = update.name.trim();
        let name = (!name.is_empty()).then_some(name);

        let changed = self.conn.execute(
            "UPDATE people SET name = ?1 WHERE id = ?2",
            params![name, person_id],
        )?;
        if changed == 0 {
            return Err(RemoteError::NotFound(format!("person '{}'", id)));
        }

        self.retrieve_person(id)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::QUALITY_SCORE_KEY;

    fn meta(n: usize, filename: &str) -> DeviceMeta {
        DeviceMeta {
            device_asset_id: format!("test-{}", n),
            device_id: "test-device".to_string(),
            filename: filename.to_string(),
            file_created_at: "2024-03-01T10:00:00+01:00".to_string(),
            file_modified_at: "2024-03-01T10:00:00+01:00".to_string(),
            metrics: None,
        }
    }

    #[test]
    fn test_collection_crud() {
        let library = Library::open_in_memory().unwrap();

        let trips = library.create_collection("  Trips ").unwrap();
        library.create_collection("archive").unwrap();
        assert_eq!(trips.name, "Trips");

        let names: Vec<String> = library
            .list_collections()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["archive", "Trips"]);

        let renamed = library
            .update_collection(&trips.id, &CollectionUpdate { name: "Holidays".to_string() })
            .unwrap();
        assert_eq!(renamed.name, "Holidays");

        library.delete_collection(&trips.id).unwrap();
        assert_eq!(library.list_collections().unwrap().len(), 1);
        assert!(matches!(
            library.delete_collection(&trips.id),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let library = Library::open_in_memory().unwrap();
        assert!(matches!(
            library.create_collection("   "),
            Err(RemoteError::Validation(_))
        ));
    }

    #[test]
    fn test_items_scoped_by_collection_and_search() {
        let library = Library::open_in_memory().unwrap();
        let album = library.create_collection("Beach").unwrap();

        let a = library.create_item(b"aaa", &meta(0, "beach_sunset.jpg")).unwrap();
        let b = library.create_item(b"bbbb", &meta(1, "city.jpg")).unwrap();
        assert_eq!(a.byte_size, 3);
        assert_eq!(a.local_datetime.as_deref(), Some("2024-03-01T10:00:00+01:00"));

        library
            .add_items_to_collection(&album.id, &[a.id.clone()])
            .unwrap();

        let all = library.list_items(&ItemFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let in_album = library
            .list_items(&ItemFilter {
                collection_id: Some(album.id.clone()),
                search_query: None,
                person_id: None,
            })
            .unwrap();
        assert_eq!(in_album, vec![a.clone()]);

        // Search overrides the collection scope
        let found = library
            .list_items(&ItemFilter {
                collection_id: Some(album.id.clone()),
                search_query: Some("CITY".to_string()),
                person_id: None,
            })
            .unwrap();
        assert_eq!(found, vec![b]);

        assert_eq!(library.list_collections().unwrap()[0].item_count, 1);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let library = Library::open_in_memory().unwrap();
        library.create_item(b"x", &meta(0, "100%_done.png")).unwrap();
        library.create_item(b"x", &meta(1, "1000 done.png")).unwrap();

        let found = library
            .list_items(&ItemFilter {
                collection_id: None,
                search_query: Some("%_".to_string()),
                person_id: None,
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].filename, "100%_done.png");
    }

    #[test]
    fn test_attach_to_missing_album_fails() {
        let library = Library::open_in_memory().unwrap();
        let item = library.create_item(b"x", &meta(0, "a.jpg")).unwrap();

        assert!(matches!(
            library.add_items_to_collection("42", &[item.id]),
            Err(RemoteError::NotFound(_))
        ));
        assert!(matches!(
            library.list_items(&ItemFilter {
                collection_id: Some("42".to_string()),
                search_query: None,
                person_id: None,
            }),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn test_metrics_round_trip_through_catalog() {
        let library = Library::open_in_memory().unwrap();
        let mut m = meta(0, "scored.jpg");
        let mut metrics = BTreeMap::new();
        metrics.insert(QUALITY_SCORE_KEY.to_string(), 0.87);
        m.metrics = Some(metrics);

        let item = library.create_item(b"x", &m).unwrap();
        assert_eq!(library.retrieve_item(&item.id).unwrap().quality_score(), Some(0.87));
        assert!(matches!(
            library.retrieve_item("not-an-id"),
            Err(RemoteError::NotFound(_))
        ));
    }

    /// Recognition results arrive from outside the app; tests insert them directly
    fn add_face(library: &Library, item_id: &str, person_id: Option<i64>) {
        library
            .conn
            .execute(
                "INSERT INTO faces (item_id, person_id) VALUES (?1, ?2)",
                params![item_id.parse::<i64>().unwrap(), person_id],
            )
            .unwrap();
    }

    fn add_person(library: &Library, name: Option<&str>) -> i64 {
        library
            .conn
            .execute(
                "INSERT INTO people (name, created_at) VALUES (?1, 0)",
                params![name],
            )
            .unwrap();
        library.conn.last_insert_rowid()
    }

    #[test]
    fn test_people_listing_and_items() {
        let library = Library::open_in_memory().unwrap();
        let a = library.create_item(b"x", &meta(0, "a.jpg")).unwrap();
        let b = library.create_item(b"x", &meta(1, "b.jpg")).unwrap();
        let c = library.create_item(b"x", &meta(2, "c.jpg")).unwrap();

        let ada = add_person(&library, Some("Ada"));
        let unnamed = add_person(&library, None);
        add_face(&library, &a.id, Some(unnamed));
        add_face(&library, &b.id, Some(ada));
        add_face(&library, &c.id, Some(ada));
        // Two faces of the same person in one photo count once
        add_face(&library, &c.id, Some(ada));
        add_face(&library, &a.id, None);

        let people = library.list_people().unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].name.as_deref(), Some("Ada"));
        assert_eq!(people[0].item_count, 2);
        assert_eq!(people[1].name, None);
        assert_eq!(people[1].item_count, 1);

        let mut ids: Vec<String> = library
            .list_items(&ItemFilter::person(ada.to_string()))
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        ids.sort();
        let mut expected = vec![b.id, c.id];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(matches!(
            library.list_items(&ItemFilter::person("99")),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_person_name() {
        let library = Library::open_in_memory().unwrap();
        let id = add_person(&library, None).to_string();

        let named = library
            .update_person(&id, &PersonUpdate { name: "  Grace ".to_string() })
            .unwrap();
        assert_eq!(named.name.as_deref(), Some("Grace"));
        assert_eq!(library.retrieve_person(&id).unwrap(), named);

        let cleared = library
            .update_person(&id, &PersonUpdate { name: "   ".to_string() })
            .unwrap();
        assert_eq!(cleared.name, None);

        assert!(matches!(
            library.update_person("77", &PersonUpdate { name: "X".to_string() }),
            Err(RemoteError::NotFound(_))
        ));
        assert!(matches!(
            library.retrieve_person("nobody"),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn test_catalog_persists_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("library.db");

        {
            let library = Library::open(&path).unwrap();
            library.create_collection("Kept").unwrap();
            library.create_item(b"x", &meta(0, "a.jpg")).unwrap();
        }

        let library = Library::open(&path).unwrap();
        assert_eq!(library.list_collections().unwrap()[0].name, "Kept");
        assert_eq!(library.item_count().unwrap(), 1);
    }
}
