use crate::record::{Record, RecordId, RecordKey, Source};
use crate::{Error, Result};
use ahash::AHashMap;
use serde_json::Value;

/// Whether the engine deduplicates one collection or links two
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Dedup,
    Link,
}

/// The in-memory record collections the engine works over
#[derive(Debug, Clone)]
pub struct Dataset {
    kind: DatasetKind,
    left: Vec<Record>,
    right: Vec<Record>,
    left_index: AHashMap<RecordKey, usize>,
    right_index: AHashMap<RecordKey, usize>,
}

impl Dataset {
    /// A single collection to deduplicate.
    pub fn dedup(records: Vec<Record>) -> Result<Self> {
        let left_index = build_index(&records, Source::Left)?;
        Ok(Self {
            kind: DatasetKind::Dedup,
            left: records,
            right: Vec::new(),
            left_index,
            right_index: AHashMap::new(),
        })
    }

    /// Two collections to link against each other.
    pub fn link(left: Vec<Record>, right: Vec<Record>) -> Result<Self> {
        let left_index = build_index(&left, Source::Left)?;
        let right_index = build_index(&right, Source::Right)?;
        Ok(Self {
            kind: DatasetKind::Link,
            left,
            right,
            left_index,
            right_index,
        })
    }

    /// Parse `{ "<key>": { "<field>": value, ... }, ... }` into records.
    /// Keys come out sorted so ingestion order is stable.
    pub fn records_from_json(value: &Value) -> Result<Vec<Record>> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::configuration("collection must be a JSON object keyed by record key"))?;
        let mut keys: Vec<&String> = object.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|key| Record::from_json(key.as_str(), &object[key]))
            .collect()
    }

    /// Build a dataset from one (dedup) or two (link) JSON collections.
    pub fn from_json(left: &Value, right: Option<&Value>) -> Result<Self> {
        let left = Self::records_from_json(left)?;
        match right {
            Some(right) => Self::link(left, Self::records_from_json(right)?),
            None => Self::dedup(left),
        }
    }

    #[inline]
    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    #[inline]
    pub fn is_linkage(&self) -> bool {
        self.kind == DatasetKind::Link
    }

    /// Records of one side. `Right` is empty for deduplication.
    #[inline]
    pub fn side(&self, source: Source) -> &[Record] {
        match source {
            Source::Left => &self.left,
            Source::Right => &self.right,
        }
    }

    /// The side candidate partners are drawn from: `Right` for linkage,
    /// `Left` again for deduplication.
    #[inline]
    pub fn partner_source(&self) -> Source {
        match self.kind {
            DatasetKind::Dedup => Source::Left,
            DatasetKind::Link => Source::Right,
        }
    }

    pub fn position(&self, id: &RecordId) -> Option<usize> {
        match id.source {
            Source::Left => self.left_index.get(&id.key).copied(),
            Source::Right => self.right_index.get(&id.key).copied(),
        }
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.position(id).map(|i| &self.side(id.source)[i])
    }

    /// Look up a record or fail with [`Error::UnknownRecord`].
    pub fn require(&self, id: &RecordId) -> Result<&Record> {
        self.get(id).ok_or_else(|| Error::UnknownRecord(id.clone()))
    }

    #[inline]
    pub fn id_at(&self, source: Source, index: usize) -> RecordId {
        RecordId::new(source, self.side(source)[index].key.clone())
    }

    /// Every record id in the universe, left side first.
    pub fn record_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.left
            .iter()
            .map(|r| RecordId::new(Source::Left, r.key.clone()))
            .chain(self.right.iter().map(|r| RecordId::new(Source::Right, r.key.clone())))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.left.len() + self.right.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the full comparison space: n·(n-1)/2 or n·m.
    pub fn total_pairs(&self) -> u64 {
        match self.kind {
            DatasetKind::Dedup => {
                let n = self.left.len() as u64;
                n * n.saturating_sub(1) / 2
            }
            DatasetKind::Link => self.left.len() as u64 * self.right.len() as u64,
        }
    }

    /// Reject records lacking a value for any of the given fields.
    pub fn require_fields<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let fields: Vec<&str> = fields.into_iter().collect();
        for source in [Source::Left, Source::Right] {
            for record in self.side(source) {
                for field in &fields {
                    if record.get(field).is_missing() {
                        return Err(Error::MissingField {
                            record: RecordId::new(source, record.key.clone()),
                            field: (*field).to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn build_index(records: &[Record], source: Source) -> Result<AHashMap<RecordKey, usize>> {
    let mut index = AHashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if index.insert(record.key.clone(), i).is_some() {
            return Err(Error::configuration(format!(
                "duplicate record key '{}' in {} collection",
                record.key, source
            )));
        }
    }
    Ok(index)
}
