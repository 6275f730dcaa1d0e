use super::data::{
    Collection, CollectionUpdate, DeviceMeta, Item, ItemFilter, Person, PersonUpdate,
};
use super::error::RemoteError;

/// Everything the view needs from the photo backend.
///
/// Implementations are free to paginate internally; callers always receive
/// flattened sequences. Every call may fail with a `RemoteError`.
pub trait DataSource {
    fn list_collections(&self) -> Result<Vec<Collection>, RemoteError>;

    /// List items in scope. A search query overrides the collection.
    fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, RemoteError>;

    fn retrieve_item(&self, id: &str) -> Result<Item, RemoteError>;

    fn create_collection(&self, name: &str) -> Result<Collection, RemoteError>;

    fn update_collection(
        &self,
        id: &str,
        update: &CollectionUpdate,
    ) -> Result<Collection, RemoteError>;

    fn delete_collection(&self, id: &str) -> Result<(), RemoteError>;

    fn create_item(&self, bytes: &[u8], meta: &DeviceMeta) -> Result<Item, RemoteError>;

    fn add_items_to_collection(
        &self,
        collection_id: &str,
        item_ids: &[String],
    ) -> Result<(), RemoteError>;

    /// People found by face recognition, most photographed first
    fn list_people(&self) -> Result<Vec<Person>, RemoteError>;

    fn retrieve_person(&self, id: &str) -> Result<Person, RemoteError>;

    fn update_person(&self, id: &str, update: &PersonUpdate) -> Result<Person, RemoteError>;
}
