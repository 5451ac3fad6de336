use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use storefront_core::EntityId;

use crate::topic::EntityType;

/// Wire field carrying the change kind.
const EVENT_TYPE_FIELD: &str = "eventType";

/// What happened to the entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "CREATED",
            ChangeKind::Updated => "UPDATED",
            ChangeKind::Deleted => "DELETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(ChangeKind::Created),
            "UPDATED" => Some(ChangeKind::Updated),
            "DELETED" => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

impl core::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full-state snapshot of an entity as carried by a change event.
///
/// The identity is part of the snapshot and is serialized under
/// [`Snapshot::ID_FIELD`] (e.g. `customerId`).
pub trait Snapshot:
    Clone + PartialEq + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Id: EntityId;

    /// Entity type this snapshot describes (selects the topic).
    const ENTITY: EntityType;

    /// Name of the identity field on the wire.
    const ID_FIELD: &'static str;

    fn entity_id(&self) -> Self::Id;
}

/// Reasons a payload cannot be folded into a replica.
///
/// None of these are retried: the consumer logs and discards, and routes
/// [`Rejection::Malformed`] payloads to the dead-letter stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Not a JSON object, or a field has the wrong shape.
    #[error("malformed event payload: {0}")]
    Malformed(String),

    /// The identity field is absent or null.
    #[error("event has no entity identity")]
    MissingIdentity,

    /// `eventType` is absent or not one of CREATED/UPDATED/DELETED.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}

impl Rejection {
    /// A poison payload can never be processed, no matter how often it is redelivered.
    pub fn is_poison(&self) -> bool {
        matches!(self, Rejection::Malformed(_))
    }
}

/// A change to one entity, matched exhaustively by consumers.
///
/// `Deleted` carries the identity plus the pre-delete state when the producer
/// supplied it; consumers must not rely on the trailer being present.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<S: Snapshot> {
    Created(S),
    Updated(S),
    Deleted { id: S::Id, last_known: Option<S> },
}

impl<S: Snapshot> ChangeEvent<S> {
    /// Build an event from a committed snapshot.
    pub fn new(kind: ChangeKind, snapshot: S) -> Self {
        match kind {
            ChangeKind::Created => ChangeEvent::Created(snapshot),
            ChangeKind::Updated => ChangeEvent::Updated(snapshot),
            ChangeKind::Deleted => ChangeEvent::Deleted {
                id: snapshot.entity_id(),
                last_known: Some(snapshot),
            },
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Created(_) => ChangeKind::Created,
            ChangeEvent::Updated(_) => ChangeKind::Updated,
            ChangeEvent::Deleted { .. } => ChangeKind::Deleted,
        }
    }

    pub fn entity_id(&self) -> S::Id {
        match self {
            ChangeEvent::Created(s) | ChangeEvent::Updated(s) => s.entity_id(),
            ChangeEvent::Deleted { id, .. } => *id,
        }
    }

    /// Partition key: the string-encoded entity identity.
    pub fn key(&self) -> String {
        self.entity_id().to_key()
    }

    pub fn snapshot(&self) -> Option<&S> {
        match self {
            ChangeEvent::Created(s) | ChangeEvent::Updated(s) => Some(s),
            ChangeEvent::Deleted { last_known, .. } => last_known.as_ref(),
        }
    }

    /// Encode to the flat wire record.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut fields = match self.snapshot() {
            Some(snapshot) => match serde_json::to_value(snapshot)? {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            None => Map::new(),
        };
        fields.insert(S::ID_FIELD.to_string(), Value::from(self.entity_id().as_i64()));
        fields.insert(EVENT_TYPE_FIELD.to_string(), Value::from(self.kind().as_str()));
        serde_json::to_string(&Value::Object(fields))
    }

    /// Decode a wire record.
    ///
    /// Checks run in the order a consumer must apply them: payload shape,
    /// identity presence, event type, then snapshot fields.
    pub fn from_json(payload: &str) -> Result<Self, Rejection> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| Rejection::Malformed(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(Rejection::Malformed(
                "event payload is not a JSON object".to_string(),
            ));
        };

        let id = match fields.get(S::ID_FIELD) {
            None | Some(Value::Null) => return Err(Rejection::MissingIdentity),
            Some(raw) => raw.as_i64().map(S::Id::from_i64).ok_or_else(|| {
                Rejection::Malformed(format!("{} is not an integer: {raw}", S::ID_FIELD))
            })?,
        };

        let kind = match fields.remove(EVENT_TYPE_FIELD) {
            Some(Value::String(raw)) => {
                ChangeKind::parse(&raw).ok_or(Rejection::UnknownEventType(raw))?
            }
            None | Some(Value::Null) => {
                return Err(Rejection::UnknownEventType("null".to_string()));
            }
            Some(other) => return Err(Rejection::UnknownEventType(other.to_string())),
        };

        match kind {
            ChangeKind::Deleted => Ok(ChangeEvent::Deleted {
                id,
                last_known: serde_json::from_value(Value::Object(fields)).ok(),
            }),
            ChangeKind::Created | ChangeKind::Updated => {
                let snapshot: S = serde_json::from_value(Value::Object(fields))
                    .map_err(|e| Rejection::Malformed(e.to_string()))?;
                Ok(ChangeEvent::new(kind, snapshot))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use storefront_core::ProductId;

    use super::*;
    use crate::schema::ProductSnapshot;

    fn widget() -> ProductSnapshot {
        ProductSnapshot {
            product_id: ProductId::new(7),
            name: "Widget".to_string(),
            quantity: 10,
            price: 2.5,
        }
    }

    #[test]
    fn encodes_flat_record_with_event_type() {
        let json = ChangeEvent::new(ChangeKind::Created, widget()).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["eventType"], "CREATED");
        assert_eq!(value["productId"], 7);
        assert_eq!(value["name"], "Widget");
        assert_eq!(value["quantity"], 10);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let event = ChangeEvent::new(ChangeKind::Updated, widget());
        let decoded = ChangeEvent::<ProductSnapshot>::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn null_identity_is_rejected_before_event_type() {
        let err = ChangeEvent::<ProductSnapshot>::from_json(
            r#"{"eventType":"BOGUS","productId":null,"name":"x","quantity":1,"price":1.0}"#,
        )
        .unwrap_err();
        assert_eq!(err, Rejection::MissingIdentity);
        assert!(!err.is_poison());
    }

    #[test]
    fn missing_identity_is_rejected() {
        let err = ChangeEvent::<ProductSnapshot>::from_json(r#"{"eventType":"CREATED"}"#)
            .unwrap_err();
        assert_eq!(err, Rejection::MissingIdentity);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = ChangeEvent::<ProductSnapshot>::from_json(
            r#"{"eventType":"ARCHIVED","productId":7,"name":"x","quantity":1,"price":1.0}"#,
        )
        .unwrap_err();
        assert_eq!(err, Rejection::UnknownEventType("ARCHIVED".to_string()));
    }

    #[test]
    fn absent_event_type_is_rejected() {
        let err = ChangeEvent::<ProductSnapshot>::from_json(
            r#"{"productId":7,"name":"x","quantity":1,"price":1.0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Rejection::UnknownEventType(_)));
    }

    #[test]
    fn garbage_is_poison() {
        let err = ChangeEvent::<ProductSnapshot>::from_json("not json at all").unwrap_err();
        assert!(err.is_poison());

        let err = ChangeEvent::<ProductSnapshot>::from_json("[1,2,3]").unwrap_err();
        assert!(err.is_poison());
    }

    #[test]
    fn non_integer_identity_is_poison() {
        let err = ChangeEvent::<ProductSnapshot>::from_json(
            r#"{"eventType":"CREATED","productId":"seven","name":"x","quantity":1,"price":1.0}"#,
        )
        .unwrap_err();
        assert!(err.is_poison());
    }

    #[test]
    fn upsert_with_incomplete_snapshot_is_poison() {
        let err = ChangeEvent::<ProductSnapshot>::from_json(
            r#"{"eventType":"UPDATED","productId":7}"#,
        )
        .unwrap_err();
        assert!(err.is_poison());
    }

    #[test]
    fn delete_without_trailer_still_decodes() {
        let event =
            ChangeEvent::<ProductSnapshot>::from_json(r#"{"eventType":"DELETED","productId":7}"#)
                .unwrap();
        assert_eq!(
            event,
            ChangeEvent::Deleted {
                id: ProductId::new(7),
                last_known: None
            }
        );
        assert_eq!(event.key(), "7");
    }

    #[test]
    fn delete_keeps_pre_delete_trailer() {
        let event = ChangeEvent::new(ChangeKind::Deleted, widget());
        assert_eq!(event.snapshot(), Some(&widget()));
        let decoded = ChangeEvent::<ProductSnapshot>::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded.snapshot().map(|s| s.name.as_str()), Some("Widget"));
    }
}
