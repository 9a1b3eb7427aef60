//! Feishu Bitable publisher for link records.
//!
//! This crate provides:
//! - [`FeishuPublisher`]: schema check, cover upload and record creation
//! - [`schema`]: the fixed field layout of the link table
//! - [`parse_base_locator`]: app token / table id from a Base URL

mod client;
mod publisher;
pub mod schema;

pub use publisher::{
    BaseLocator, FeishuPublisher, MAX_SUMMARY_CHARS, MAX_TITLE_CHARS, PublishReceipt,
    PublishedRecord, TableInfo, parse_base_locator,
};
pub use schema::{EXPECTED_FIELDS, FieldMeta, FieldType};

/// App scopes the publisher needs.
pub const REQUIRED_SCOPES: [&str; 2] = ["bitable:app", "drive:drive"];
