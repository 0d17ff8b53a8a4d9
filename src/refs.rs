//! Entity references.
//!
//! A reference to a user or recipe can show up either as a bare id or as an
//! object carrying the id (`{"id": ..}` / `{"_id": ..}`), depending on whether
//! the collection was populated. Every membership test goes through this
//! module so equality is always decided on the id alone.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecordRef {
    Id(Uuid),
    Populated {
        #[serde(alias = "_id")]
        id: Uuid,
    },
}

impl RecordRef {
    pub fn id(&self) -> Uuid {
        match self {
            RecordRef::Id(id) | RecordRef::Populated { id } => *id,
        }
    }

    pub fn refers_to(&self, id: Uuid) -> bool {
        self.id() == id
    }
}

impl From<Uuid> for RecordRef {
    fn from(id: Uuid) -> Self {
        RecordRef::Id(id)
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for RecordRef {}

/// References always go out as bare ids.
impl Serialize for RecordRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id().serialize(serializer)
    }
}

pub fn contains<'a, I>(refs: I, id: Uuid) -> bool
where
    I: IntoIterator<Item = &'a RecordRef>,
{
    refs.into_iter().any(|r| r.refers_to(id))
}
