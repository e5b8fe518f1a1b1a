use mongodb::bson::{doc, Document};

/// Filter matching a document by its integer `_id`.
pub fn u32_id_filter(id: u32) -> Document {
    doc! { "_id": id }
}

/// Serde helpers for `Option<chrono::DateTime<Utc>>` stored as an optional BSON datetime.
///
/// Use together with `#[serde(default)]` so missing fields read back as `None`.
pub mod optional_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson::DateTime as BsonDateTime;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(BsonDateTime::from_chrono).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<BsonDateTime>::deserialize(deserializer)?;
        Ok(value.map(BsonDateTime::to_chrono))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use mongodb::bson::{from_document, to_document};
    use serde::{Deserialize, Serialize};

    use crate::model::common::now;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stamped {
        #[serde(default, with = "super::optional_datetime")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn optional_datetime_is_a_bson_datetime() {
        let stamped = Stamped { at: Some(now()) };
        let document = to_document(&stamped).unwrap();
        assert!(document.get_datetime("at").is_ok());
        assert_eq!(from_document::<Stamped>(document).unwrap(), stamped);
    }

    #[test]
    fn missing_datetime_reads_as_none() {
        let stamped: Stamped = from_document(mongodb::bson::doc! {}).unwrap();
        assert_eq!(stamped.at, None);
    }
}
