/// Runs controller commands against a data source
///
/// `execute` is synchronous and blocking; the shell calls it from a
/// `spawn_blocking` task with its own catalog connection.
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, warn};

use super::controller::{Command, Event, UploadFile};
use crate::state::data::{CollectionUpdate, DeviceMeta, ItemFilter, PersonUpdate};
use crate::state::error::RemoteError;
use crate::state::source::DataSource;

impl UploadFile {
    /// Read a picked file from disk.
    ///
    /// Platforms without a creation time fall back to the modification time.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let metadata = std::fs::metadata(path)?;

        let modified_at: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        let created_at = metadata
            .created()
            .map(DateTime::from)
            .unwrap_or(modified_at);

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(UploadFile {
            filename,
            bytes,
            created_at,
            modified_at,
        })
    }
}

impl Command {
    /// The completion event for this command when it could not run at all
    /// (catalog unavailable, worker panicked)
    pub fn fail(self, err: RemoteError) -> Event {
        match self {
            Command::LoadCollections { ticket } => Event::CollectionsLoaded {
                ticket,
                result: Err(err),
            },
            Command::FetchItems { ticket, .. } => Event::ItemsFetched {
                ticket,
                result: Err(err),
            },
            Command::RetrieveItem { id } => Event::ItemRetrieved {
                id,
                result: Err(err),
            },
            Command::CreateCollection { .. } => Event::CollectionCreated(Err(err)),
            Command::RenameCollection { id, .. } => Event::CollectionRenamed {
                id,
                result: Err(err),
            },
            Command::DeleteCollection { id } => Event::CollectionDeleted {
                id,
                result: Err(err),
            },
            Command::UploadItem { index, .. } => Event::ItemUploaded {
                index,
                result: Err(err),
            },
            Command::AttachItems { .. } => Event::ItemsAttached(Err(err)),
            Command::LoadPeople => Event::PeopleLoaded(Err(err)),
            Command::RenamePerson { id, .. } => Event::PersonRenamed {
                id,
                result: Err(err),
            },
            Command::LoadPerson { id } => Event::PersonLoaded {
                id,
                result: Err(err),
            },
        }
    }
}

/// Run one command and produce the event that reports its completion
pub fn execute<D: DataSource + ?Sized>(source: &D, device_id: &str, command: Command) -> Event {
    debug!("Executing {:?}", CommandName(&command));

    match command {
        Command::LoadCollections { ticket } => Event::CollectionsLoaded {
            ticket,
            result: source.list_collections(),
        },
        Command::FetchItems { ticket, filter } => Event::ItemsFetched {
            ticket,
            result: source.list_items(&filter),
        },
        Command::RetrieveItem { id } => {
            let result = source.retrieve_item(&id);
            Event::ItemRetrieved { id, result }
        }
        Command::CreateCollection { name } => {
            Event::CollectionCreated(source.create_collection(&name))
        }
        Command::RenameCollection { id, name } => {
            let result = source.update_collection(&id, &CollectionUpdate { name });
            Event::CollectionRenamed { id, result }
        }
        Command::DeleteCollection { id } => {
            let result = source.delete_collection(&id);
            Event::CollectionDeleted { id, result }
        }
        Command::UploadItem { batch, index, file } => {
            let meta = DeviceMeta {
                device_asset_id: format!("desktop-upload-{}-{}", batch, index),
                device_id: device_id.to_string(),
                filename: file.filename.clone(),
                file_created_at: file.created_at.to_rfc3339(),
                file_modified_at: file.modified_at.to_rfc3339(),
                metrics: None,
            };
            let result = source.create_item(&file.bytes, &meta);
            if let Err(err) = &result {
                warn!("⚠️  Failed to upload {}: {}", file.filename, err);
            }
            Event::ItemUploaded { index, result }
        }
        Command::AttachItems {
            collection_id,
            item_ids,
        } => Event::ItemsAttached(source.add_items_to_collection(&collection_id, &item_ids)),
        Command::LoadPeople => Event::PeopleLoaded(source.list_people()),
        Command::RenamePerson { id, name } => {
            let result = source.update_person(&id, &PersonUpdate { name });
            Event::PersonRenamed { id, result }
        }
        Command::LoadPerson { id } => {
            let result = source.retrieve_person(&id).and_then(|person| {
                let items = source.list_items(&ItemFilter::person(id.as_str()))?;
                Ok((person, items))
            });
            Event::PersonLoaded { id, result }
        }
    }
}

/// Logs a command without dumping upload bytes
struct CommandName<'a>(&'a Command);

impl std::fmt::Debug for CommandName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Command::UploadItem { batch, index, file } => f
                .debug_struct("UploadItem")
                .field("batch", batch)
                .field("index", index)
                .field("filename", &file.filename)
                .field("bytes", &file.bytes.len())
                .finish(),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::library::Library;

    fn file(name: &str) -> UploadFile {
        let at = DateTime::parse_from_rfc3339("2024-05-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        UploadFile {
            filename: name.to_string(),
            bytes: name.as_bytes().to_vec(),
            created_at: at,
            modified_at: at,
        }
    }

    fn uploaded(event: Event) -> (usize, String) {
        match event {
            Event::ItemUploaded {
                index,
                result: Ok(item),
            } => (index, item.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_uploaded_items_attach_to_album() {
        let library = Library::open_in_memory().unwrap();
        let album = library.create_collection("Trips").unwrap();

        let mut ids = Vec::new();
        for (index, name) in ["a.jpg", "b.jpg"].into_iter().enumerate() {
            let event = execute(
                &library,
                "desk",
                Command::UploadItem {
                    batch: 1,
                    index,
                    file: file(name),
                },
            );
            let (reported, id) = uploaded(event);
            assert_eq!(reported, index);
            ids.push(id);
        }

        let event = execute(
            &library,
            "desk",
            Command::AttachItems {
                collection_id: album.id.clone(),
                item_ids: ids,
            },
        );
        assert_eq!(event, Event::ItemsAttached(Ok(())));

        let in_album = library.list_items(&ItemFilter {
            collection_id: Some(album.id),
            search_query: None,
            person_id: None,
        });
        assert_eq!(in_album.unwrap().len(), 2);
    }

    #[test]
    fn test_attach_failure_keeps_items() {
        let library = Library::open_in_memory().unwrap();
        let (_, id) = uploaded(execute(
            &library,
            "desk",
            Command::UploadItem {
                batch: 1,
                index: 0,
                file: file("a.jpg"),
            },
        ));

        let event = execute(
            &library,
            "desk",
            Command::AttachItems {
                collection_id: "404".to_string(),
                item_ids: vec![id],
            },
        );
        assert!(matches!(
            event,
            Event::ItemsAttached(Err(RemoteError::NotFound(_)))
        ));
        assert_eq!(library.item_count().unwrap(), 1);
    }

    #[test]
    fn test_rename_and_delete_report_ids() {
        let library = Library::open_in_memory().unwrap();
        let album = library.create_collection("Old").unwrap();

        let event = execute(
            &library,
            "desk",
            Command::RenameCollection {
                id: album.id.clone(),
                name: "New".to_string(),
            },
        );
        match event {
            Event::CollectionRenamed { id, result } => {
                assert_eq!(id, album.id);
                assert_eq!(result.unwrap().name, "New");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let event = execute(
            &library,
            "desk",
            Command::DeleteCollection {
                id: "999".to_string(),
            },
        );
        assert!(matches!(
            event,
            Event::CollectionDeleted { ref id, result: Err(RemoteError::NotFound(_)) } if id == "999"
        ));
    }

    #[test]
    fn test_people_commands_report_missing_person() {
        let library = Library::open_in_memory().unwrap();

        let event = execute(&library, "desk", Command::LoadPeople);
        assert_eq!(event, Event::PeopleLoaded(Ok(vec![])));

        let event = execute(
            &library,
            "desk",
            Command::LoadPerson {
                id: "12".to_string(),
            },
        );
        assert!(matches!(
            event,
            Event::PersonLoaded { ref id, result: Err(RemoteError::NotFound(_)) } if id == "12"
        ));

        let event = execute(
            &library,
            "desk",
            Command::RenamePerson {
                id: "12".to_string(),
                name: "Ada".to_string(),
            },
        );
        assert!(matches!(
            event,
            Event::PersonRenamed { result: Err(RemoteError::NotFound(_)), .. }
        ));
    }

    #[test]
    fn test_failed_command_maps_to_its_completion() {
        let err = RemoteError::Transport("catalog locked".to_string());

        let event = Command::RetrieveItem { id: "3".to_string() }.fail(err.clone());
        assert_eq!(
            event,
            Event::ItemRetrieved {
                id: "3".to_string(),
                result: Err(err.clone())
            }
        );

        let event = Command::UploadItem {
            batch: 9,
            index: 2,
            file: file("a.jpg"),
        }
        .fail(err.clone());
        assert_eq!(
            event,
            Event::ItemUploaded {
                index: 2,
                result: Err(err.clone()),
            }
        );

        let event = Command::LoadPerson { id: "5".to_string() }.fail(err.clone());
        assert_eq!(
            event,
            Event::PersonLoaded {
                id: "5".to_string(),
                result: Err(err),
            }
        );
    }

    #[test]
    fn test_upload_log_omits_bytes() {
        let command = Command::UploadItem {
            batch: 1,
            index: 0,
            file: file("IMG_1.jpg"),
        };
        let logged = format!("{:?}", CommandName(&command));
        assert!(logged.contains("IMG_1.jpg"));
        assert!(!logged.contains("73, 77, 71"));
    }

    #[test]
    fn test_read_upload_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMG_0001.jpg");
        std::fs::write(&path, b"jpeg bytes").unwrap();

        let upload = UploadFile::read(&path).unwrap();
        assert_eq!(upload.filename, "IMG_0001.jpg");
        assert_eq!(upload.bytes, b"jpeg bytes");
        assert!(upload.created_at <= Utc::now());

        assert!(UploadFile::read(&dir.path().join("missing.jpg")).is_err());
    }
}
