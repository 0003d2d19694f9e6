//! The One Platform procedures and their argument shapes.
//!
//! Every procedure has one constructor on [`PendingCall`] taking exactly the
//! arguments that procedure accepts, so a call can never be assembled with a
//! misspelled name or the wrong argument list.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};

/// Remote procedure names, serialized as the platform spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Procedure {
    Activate,
    Comment,
    Create,
    Deactivate,
    Drop,
    Flush,
    Grant,
    Info,
    Listing,
    Lookup,
    Map,
    Move,
    Read,
    Record,
    Recordbatch,
    Revoke,
    Share,
    Tag,
    Unmap,
    Update,
    Usage,
    Wait,
    Write,
    Writegroup,
}

impl Procedure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Procedure::Activate => "activate",
            Procedure::Comment => "comment",
            Procedure::Create => "create",
            Procedure::Deactivate => "deactivate",
            Procedure::Drop => "drop",
            Procedure::Flush => "flush",
            Procedure::Grant => "grant",
            Procedure::Info => "info",
            Procedure::Listing => "listing",
            Procedure::Lookup => "lookup",
            Procedure::Map => "map",
            Procedure::Move => "move",
            Procedure::Read => "read",
            Procedure::Record => "record",
            Procedure::Recordbatch => "recordbatch",
            Procedure::Revoke => "revoke",
            Procedure::Share => "share",
            Procedure::Tag => "tag",
            Procedure::Unmap => "unmap",
            Procedure::Update => "update",
            Procedure::Usage => "usage",
            Procedure::Wait => "wait",
            Procedure::Write => "write",
            Procedure::Writegroup => "writegroup",
        }
    }

    /// Long-poll procedures block server-side and must not be cut short by a
    /// client timeout.
    pub fn is_long_poll(&self) -> bool {
        matches!(self, Procedure::Wait)
    }
}

/// How a resource is addressed in call arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    /// A 40-character resource id.
    Rid(String),
    /// An alias under the calling client.
    Alias(String),
    /// The calling client itself.
    Myself,
}

impl ResourceRef {
    pub fn alias(alias: impl Into<String>) -> Self {
        ResourceRef::Alias(alias.into())
    }

    pub fn rid(rid: impl Into<String>) -> Self {
        ResourceRef::Rid(rid.into())
    }

    pub fn to_value(&self) -> Value {
        match self {
            ResourceRef::Rid(rid) => Value::String(rid.clone()),
            ResourceRef::Alias(alias) => json!({ "alias": alias }),
            ResourceRef::Myself => json!({ "alias": "" }),
        }
    }
}

impl Serialize for ResourceRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Read ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    #[default]
    Desc,
    Asc,
}

/// Options for `read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub starttime: Option<i64>,
    pub endtime: Option<i64>,
    pub limit: usize,
    pub sort: Sort,
    /// `"all"`, `"autowindow"` or `"givenwindow"`; omitted when `None`.
    pub selection: Option<String>,
}

impl ReadOptions {
    /// The newest `limit` points.
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(start) = self.starttime {
            map.insert("starttime".into(), start.into());
        }
        if let Some(end) = self.endtime {
            map.insert("endtime".into(), end.into());
        }
        map.insert("limit".into(), self.limit.into());
        map.insert(
            "sort".into(),
            match self.sort {
                Sort::Desc => "desc",
                Sort::Asc => "asc",
            }
            .into(),
        );
        if let Some(selection) = &self.selection {
            map.insert("selection".into(), selection.clone().into());
        }
        Value::Object(map)
    }
}

/// Dataport value format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    String,
    Float,
    Integer,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::String => "string",
            Format::Float => "float",
            Format::Integer => "integer",
        }
    }
}

/// Who may see a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Parent,
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Parent => "parent",
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// A retention bound: either a number or `"infinity"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Limit {
    #[default]
    Infinity,
    Finite(u64),
}

impl Limit {
    pub fn to_value(&self) -> Value {
        match self {
            Limit::Infinity => Value::String("infinity".into()),
            Limit::Finite(n) => (*n).into(),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Infinity => serializer.serialize_str("infinity"),
            Limit::Finite(n) => serializer.serialize_u64(*n),
        }
    }
}

/// Description of a dataport passed to `create`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataportDescription {
    pub name: String,
    pub format: Format,
    pub visibility: Visibility,
    /// Retention by number of points.
    pub count: Limit,
    /// Retention by age in seconds.
    pub duration: Limit,
    /// Preprocessing steps, e.g. `[["add", 1], ["mul", 2]]`.
    pub preprocess: Vec<Value>,
}

impl DataportDescription {
    pub fn to_value(&self) -> Value {
        json!({
            "format": self.format.as_str(),
            "name": self.name,
            "visibility": self.visibility.as_str(),
            "retention": {
                "count": self.count.to_value(),
                "duration": self.duration.to_value(),
            },
            "preprocess": self.preprocess,
        })
    }
}

/// What `lookup` searches by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Alias,
    Owner,
    Shared,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Alias => "alias",
            LookupKind::Owner => "owner",
            LookupKind::Shared => "shared",
        }
    }
}

/// A procedure plus its arguments, not yet numbered.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub procedure: Procedure,
    pub arguments: Vec<Value>,
}

impl PendingCall {
    fn new(procedure: Procedure, arguments: Vec<Value>) -> Self {
        Self {
            procedure,
            arguments,
        }
    }

    pub fn activate(codetype: &str, code: &str) -> Self {
        Self::new(Procedure::Activate, vec![codetype.into(), code.into()])
    }

    pub fn comment(resource: &ResourceRef, visibility: Visibility, text: &str) -> Self {
        Self::new(
            Procedure::Comment,
            vec![resource.to_value(), visibility.as_str().into(), text.into()],
        )
    }

    /// `create` for any resource type with a free-form description.
    pub fn create(kind: &str, description: Value) -> Self {
        Self::new(Procedure::Create, vec![kind.into(), description])
    }

    pub fn create_dataport(description: &DataportDescription) -> Self {
        Self::create("dataport", description.to_value())
    }

    pub fn deactivate(codetype: &str, code: &str) -> Self {
        Self::new(Procedure::Deactivate, vec![codetype.into(), code.into()])
    }

    pub fn drop_resource(resource: &ResourceRef) -> Self {
        Self::new(Procedure::Drop, vec![resource.to_value()])
    }

    pub fn flush(resource: &ResourceRef, options: Option<Value>) -> Self {
        let mut args = vec![resource.to_value()];
        args.extend(options);
        Self::new(Procedure::Flush, args)
    }

    pub fn grant(resource: &ResourceRef, permissions: Value, ttl: Option<u64>) -> Self {
        let mut args = vec![resource.to_value(), permissions];
        args.extend(ttl.map(|ttl| json!({ "ttl": ttl })));
        Self::new(Procedure::Grant, args)
    }

    pub fn info(resource: &ResourceRef, options: Value) -> Self {
        Self::new(Procedure::Info, vec![resource.to_value(), options])
    }

    pub fn listing(resource: &ResourceRef, types: &[&str], options: Value) -> Self {
        Self::new(
            Procedure::Listing,
            vec![resource.to_value(), json!(types), options],
        )
    }

    pub fn lookup(kind: LookupKind, mapping: &str) -> Self {
        Self::new(Procedure::Lookup, vec![kind.as_str().into(), mapping.into()])
    }

    /// Map `alias` onto `rid`.
    pub fn map(rid: &str, alias: &str) -> Self {
        Self::new(
            Procedure::Map,
            vec!["alias".into(), rid.into(), alias.into()],
        )
    }

    pub fn move_resource(
        resource: &ResourceRef,
        destination: &ResourceRef,
        keep_aliases: bool,
    ) -> Self {
        Self::new(
            Procedure::Move,
            vec![
                resource.to_value(),
                destination.to_value(),
                json!({ "aliases": keep_aliases }),
            ],
        )
    }

    pub fn read(resource: &ResourceRef, options: &ReadOptions) -> Self {
        Self::new(Procedure::Read, vec![resource.to_value(), options.to_value()])
    }

    /// `record` with `[timestamp, value]` entries. Non-positive timestamps
    /// are offsets in seconds relative to the time the platform receives the
    /// call.
    pub fn record(resource: &ResourceRef, entries: &[DataPoint]) -> Self {
        Self::new(
            Procedure::Record,
            vec![
                resource.to_value(),
                Value::Array(entries.iter().map(DataPoint::to_value).collect()),
                json!({}),
            ],
        )
    }

    pub fn recordbatch(resource: &ResourceRef, entries: &[DataPoint]) -> Self {
        Self::new(
            Procedure::Recordbatch,
            vec![
                resource.to_value(),
                Value::Array(entries.iter().map(DataPoint::to_value).collect()),
            ],
        )
    }

    pub fn revoke(codetype: &str, code: &str) -> Self {
        Self::new(Procedure::Revoke, vec![codetype.into(), code.into()])
    }

    pub fn share(resource: &ResourceRef, options: Value) -> Self {
        Self::new(Procedure::Share, vec![resource.to_value(), options])
    }

    pub fn tag(resource: &ResourceRef, action: &str, tag: &str) -> Self {
        Self::new(
            Procedure::Tag,
            vec![resource.to_value(), action.into(), tag.into()],
        )
    }

    pub fn unmap(alias: &str) -> Self {
        Self::new(Procedure::Unmap, vec!["alias".into(), alias.into()])
    }

    pub fn update(resource: &ResourceRef, description: Value) -> Self {
        Self::new(Procedure::Update, vec![resource.to_value(), description])
    }

    pub fn usage(resource: &ResourceRef, metric: &str, starttime: i64, endtime: i64) -> Self {
        Self::new(
            Procedure::Usage,
            vec![
                resource.to_value(),
                metric.into(),
                starttime.into(),
                endtime.into(),
            ],
        )
    }

    /// Long-poll until `resource` changes. `options` carries the server-side
    /// timeout in milliseconds (at most five minutes).
    pub fn wait(resource: &ResourceRef, options: Value) -> Self {
        Self::new(Procedure::Wait, vec![resource.to_value(), options])
    }

    pub fn write(resource: &ResourceRef, value: Value) -> Self {
        Self::new(
            Procedure::Write,
            vec![resource.to_value(), value, json!({})],
        )
    }

    /// Write several resources with one shared timestamp.
    pub fn writegroup(entries: &[(ResourceRef, Value)]) -> Self {
        let pairs = entries
            .iter()
            .map(|(resource, value)| json!([resource.to_value(), value]))
            .collect();
        Self::new(Procedure::Writegroup, vec![Value::Array(pairs)])
    }
}

/// A `(timestamp, value)` pair as read from or recorded to a dataport.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub timestamp: i64,
    pub value: Value,
}

impl DataPoint {
    pub fn new(timestamp: i64, value: impl Into<Value>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!([self.timestamp, self.value])
    }

    /// Parse a `[timestamp, value]` pair.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_array()?.as_slice() {
            [timestamp, value] => Some(Self {
                timestamp: timestamp.as_i64()?,
                value: value.clone(),
            }),
            _ => None,
        }
    }

    /// Parse a `read` result: an array of `[timestamp, value]` pairs.
    pub fn list_from_value(value: &Value) -> Option<Vec<Self>> {
        value.as_array()?.iter().map(Self::from_value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedure_names_match_wire_spelling() {
        assert_eq!(
            serde_json::to_value(Procedure::Writegroup).unwrap(),
            json!("writegroup")
        );
        assert_eq!(Procedure::Recordbatch.as_str(), "recordbatch");
        assert!(Procedure::Wait.is_long_poll());
        assert!(!Procedure::Read.is_long_poll());
    }

    #[test]
    fn read_arguments() {
        let call = PendingCall::read(&ResourceRef::alias("temp"), &ReadOptions::latest(3));
        assert_eq!(call.procedure, Procedure::Read);
        assert_eq!(
            call.arguments,
            vec![json!({"alias": "temp"}), json!({"limit": 3, "sort": "desc"})]
        );
    }

    #[test]
    fn ranged_read_carries_bounds() {
        let options = ReadOptions {
            starttime: Some(10),
            endtime: Some(20),
            ..ReadOptions::latest(5)
        };
        let call = PendingCall::read(&ResourceRef::rid("r"), &options);
        assert_eq!(
            call.arguments[1],
            json!({"starttime": 10, "endtime": 20, "limit": 5, "sort": "desc"})
        );
    }

    #[test]
    fn dataport_description_shape() {
        let description = DataportDescription {
            name: "temp".into(),
            format: Format::Float,
            count: Limit::Finite(10),
            ..DataportDescription::default()
        };
        let call = PendingCall::create_dataport(&description);
        assert_eq!(
            call.arguments,
            vec![
                json!("dataport"),
                json!({
                    "format": "float",
                    "name": "temp",
                    "visibility": "parent",
                    "retention": {"count": 10, "duration": "infinity"},
                    "preprocess": [],
                })
            ]
        );
    }

    #[test]
    fn writegroup_pairs_resources_with_values() {
        let call = PendingCall::writegroup(&[
            (ResourceRef::rid("a"), json!(1)),
            (ResourceRef::rid("b"), json!("x")),
        ]);
        assert_eq!(call.arguments, vec![json!([["a", 1], ["b", "x"]])]);
    }

    #[test]
    fn optional_arguments_are_omitted() {
        assert_eq!(PendingCall::flush(&ResourceRef::rid("r"), None).arguments.len(), 1);
        assert_eq!(
            PendingCall::grant(&ResourceRef::Myself, json!({}), Some(60)).arguments[2],
            json!({"ttl": 60})
        );
    }

    #[test]
    fn data_points_parse_from_pairs() {
        let parsed = DataPoint::list_from_value(&json!([[1700000000, 1], [1699999999, "a"]])).unwrap();
        assert_eq!(parsed[0], DataPoint::new(1700000000, 1));
        assert_eq!(parsed[1].value, json!("a"));
        assert!(DataPoint::list_from_value(&json!([[1, 2, 3]])).is_none());
        assert!(DataPoint::list_from_value(&json!("ok")).is_none());
    }
}
