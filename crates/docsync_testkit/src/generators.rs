//! Property-based test generators using proptest.

use docsync_codec::{Document, Value};
use proptest::prelude::*;

/// Strategy for document ids: short, so independent draws collide.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,2}").expect("Invalid regex")
}

/// Strategy for field names.
pub fn field_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,6}").expect("Invalid regex")
}

/// Strategy for scalar values. Never produces floats.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Integer),
        "[a-z ]{0,12}".prop_map(Value::Text),
    ]
}

/// Strategy for documents with up to four scalar fields.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_strategy(), scalar_strategy(), 0..4).prop_map(Document::from)
}

/// What one id looks like in a replica: present with content on some sides.
#[derive(Debug, Clone)]
pub struct ReplicaEntry {
    /// Document id.
    pub id: String,
    /// Local content.
    pub local: Option<Document>,
    /// Remote content.
    pub remote: Option<Document>,
}

/// Strategy for unsynchronized replica contents, ids unique.
pub fn replica_strategy() -> impl Strategy<Value = Vec<ReplicaEntry>> {
    prop::collection::btree_map(
        id_strategy(),
        (
            prop::option::of(document_strategy()),
            prop::option::of(document_strategy()),
        ),
        0..8,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(id, (local, remote))| ReplicaEntry { id, local, remote })
            .collect()
    })
}
