//! Mapping scalar fields to column storage.

use crate::{ColumnDef, FieldKind, FieldSpec, StorageType};

/// Choose the storage type for a string of at most `max_length` characters.
///
/// 0 means unbounded.
pub fn map_string_storage(max_length: u32) -> StorageType {
    match max_length {
        0 => StorageType::LongText,
        1..=255 => StorageType::VarChar(max_length),
        256..=65535 => StorageType::Text,
        _ => StorageType::LongText,
    }
}

/// Column definition for a scalar field, or `None` for nested messages and
/// repeated fields (those get their own tables).
///
/// Strings outside a union are `NOT NULL` with a default (the declared one,
/// else the empty string); union strings are nullable without a default.
/// Integers are always nullable and carry no default.
pub fn map_field(field: &FieldSpec) -> Option<ColumnDef> {
    map_scalar(&field.kind, field.max_length, field.default.as_deref(), field.in_union)
}

/// Column definition for the `__value__` column of a repeated scalar field.
///
/// Elements are never union members.
pub fn map_element(field: &FieldSpec) -> Option<ColumnDef> {
    match &field.kind {
        FieldKind::Repeated(element) => {
            map_scalar(element, field.max_length, field.default.as_deref(), false)
        }
        _ => None,
    }
}

fn map_scalar(
    kind: &FieldKind,
    max_length: u32,
    default: Option<&str>,
    in_union: bool,
) -> Option<ColumnDef> {
    match kind {
        FieldKind::String if in_union => Some(ColumnDef {
            storage: map_string_storage(max_length),
            nullable: true,
            default: None,
        }),
        FieldKind::String => Some(ColumnDef {
            storage: map_string_storage(max_length),
            nullable: false,
            default: Some(default.unwrap_or_default().to_string()),
        }),
        FieldKind::Int32 => Some(ColumnDef {
            storage: StorageType::Int,
            nullable: true,
            default: None,
        }),
        FieldKind::Message(_) | FieldKind::Repeated(_) => None,
    }
}
