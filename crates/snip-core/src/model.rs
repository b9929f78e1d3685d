use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The public short identifier of a stored URL.
pub type UrlId = i32;

/// One shortened link.
///
/// On disk a record is a compact JSON array without field names:
/// `[id, original_url, added_by, is_deleted]`. The older three-element form
/// `[id, original_url, added_by]` is still accepted when decoding and means
/// the record is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortenedUrl {
    pub id: UrlId,
    pub original_url: String,
    /// Opaque token of the anonymous owner. Never changes after creation.
    pub added_by: String,
    /// Tombstone flag; only ever moves from `false` to `true`.
    pub is_deleted: bool,
}

impl ShortenedUrl {
    pub fn new(id: UrlId, original_url: impl Into<String>, added_by: impl Into<String>) -> Self {
        Self {
            id,
            original_url: original_url.into(),
            added_by: added_by.into(),
            is_deleted: false,
        }
    }
}

impl Serialize for ShortenedUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&self.id)?;
        tuple.serialize_element(&self.original_url)?;
        tuple.serialize_element(&self.added_by)?;
        tuple.serialize_element(&self.is_deleted)?;
        tuple.end()
    }
}

struct ShortenedUrlVisitor;

impl<'de> Visitor<'de> for ShortenedUrlVisitor {
    type Value = ShortenedUrl;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array [id, original_url, added_by, is_deleted]")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let id = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let original_url = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let added_by = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(2, &self))?;
        let is_deleted = seq.next_element()?.unwrap_or(false);

        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(
                "wrong number of fields in shortened url record: more than 4",
            ));
        }

        Ok(ShortenedUrl {
            id,
            original_url,
            added_by,
            is_deleted,
        })
    }
}

impl<'de> Deserialize<'de> for ShortenedUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(ShortenedUrlVisitor)
    }
}

/// One entry of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequestRecord {
    /// Caller-chosen key echoed back in the matching [`BatchResponseRecord`].
    pub correlation_id: String,
    pub original_url: String,
}

/// The outcome of one [`BatchRequestRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponseRecord {
    pub correlation_id: String,
    pub id: UrlId,
    /// `true` when the URL was already shortened and `id` points at the
    /// existing live record instead of a new one.
    pub duplicate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_as_compact_array() {
        let mut record = ShortenedUrl::new(11, "https://ya.ru/search", "u1");
        record.is_deleted = true;

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"[11,"https://ya.ru/search","u1",true]"#);
    }

    #[test]
    fn escapes_strings_properly() {
        let record = ShortenedUrl::new(1, r#"https://ya.ru/?q="quoted""#, "u1");

        let json = serde_json::to_string(&record).unwrap();
        let back: ShortenedUrl = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn decodes_legacy_three_field_rows() {
        let record: ShortenedUrl = serde_json::from_str(r#"[3,"https://google.com","u2"]"#).unwrap();

        assert_eq!(record, ShortenedUrl::new(3, "https://google.com", "u2"));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(serde_json::from_str::<ShortenedUrl>(r#"[3,"https://google.com"]"#).is_err());
        assert!(
            serde_json::from_str::<ShortenedUrl>(r#"[3,"https://google.com","u2",false,1]"#)
                .is_err()
        );
    }

    #[test]
    fn decodes_snapshot_array() {
        let rows: Vec<ShortenedUrl> = serde_json::from_str(
            r#"[[1,"https://ya.ru","u1",false],[2,"https://google.com","u1",true]]"#,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(!rows[0].is_deleted);
        assert!(rows[1].is_deleted);
    }

    #[test]
    fn batch_request_uses_snake_case_keys() {
        let records: Vec<BatchRequestRecord> =
            serde_json::from_str(r#"[{"correlation_id":"a","original_url":"https://ya.ru"}]"#)
                .unwrap();

        assert_eq!(records[0].correlation_id, "a");
        assert_eq!(records[0].original_url, "https://ya.ru");
    }
}
