//! The fixed link-table schema and its validation.

use serde::Deserialize;

use linkpub_shared::{LinkPubError, Result};

pub const FIELD_TITLE: &str = "标题";
pub const FIELD_SUMMARY: &str = "简介";
pub const FIELD_CATEGORIES: &str = "类型";
pub const FIELD_SHARER: &str = "分享者";
pub const FIELD_CREATED: &str = "创建日期";
pub const FIELD_COVER: &str = "封面";

/// Bitable field type codes used by the link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    MultiSelect,
    Date,
    Hyperlink,
    Attachment,
}

impl FieldType {
    pub fn code(self) -> i64 {
        match self {
            Self::Text => 1,
            Self::MultiSelect => 4,
            Self::Date => 5,
            Self::Hyperlink => 15,
            Self::Attachment => 17,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::MultiSelect => "multi-select",
            Self::Date => "date",
            Self::Hyperlink => "hyperlink",
            Self::Attachment => "attachment",
        }
    }
}

/// Fields every link table must carry.
pub const EXPECTED_FIELDS: [(&str, FieldType); 6] = [
    (FIELD_TITLE, FieldType::Hyperlink),
    (FIELD_SUMMARY, FieldType::Text),
    (FIELD_CATEGORIES, FieldType::MultiSelect),
    (FIELD_SHARER, FieldType::Text),
    (FIELD_CREATED, FieldType::Date),
    (FIELD_COVER, FieldType::Attachment),
];

/// One field as reported by the list-fields API.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMeta {
    pub field_name: String,
    #[serde(rename = "type")]
    pub field_type: i64,
    #[serde(default)]
    pub field_id: Option<String>,
}

/// Compare the table's fields against [`EXPECTED_FIELDS`].
pub fn validate_fields(fields: &[FieldMeta]) -> Result<()> {
    let problems: Vec<String> = EXPECTED_FIELDS
        .iter()
        .filter_map(|(name, expected)| {
            match fields.iter().find(|f| f.field_name == *name) {
                None => Some(format!("missing field '{name}' ({})", expected.name())),
                Some(f) if f.field_type != expected.code() => Some(format!(
                    "field '{name}' has type {}, expected {} ({})",
                    f.field_type,
                    expected.name(),
                    expected.code()
                )),
                Some(_) => None,
            }
        })
        .collect();

    if problems.is_empty() {
        Ok(())
    } else {
        Err(LinkPubError::SchemaMismatch { problems })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: i64) -> FieldMeta {
        FieldMeta {
            field_name: name.into(),
            field_type: ty,
            field_id: None,
        }
    }

    fn full_schema() -> Vec<FieldMeta> {
        EXPECTED_FIELDS
            .iter()
            .map(|(name, ty)| field(name, ty.code()))
            .collect()
    }

    #[test]
    fn complete_schema_passes() {
        let mut fields = full_schema();
        fields.push(field("备注", 1));
        assert!(validate_fields(&fields).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut fields = full_schema();
        fields.retain(|f| f.field_name != FIELD_COVER);
        fields
            .iter_mut()
            .find(|f| f.field_name == FIELD_CATEGORIES)
            .unwrap()
            .field_type = 3;

        match validate_fields(&fields).unwrap_err() {
            LinkPubError::SchemaMismatch { problems } => {
                assert_eq!(problems.len(), 2);
                assert!(problems.iter().any(|p| p.contains("类型") && p.contains("type 3")));
                assert!(problems.iter().any(|p| p.contains("missing field '封面'")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
