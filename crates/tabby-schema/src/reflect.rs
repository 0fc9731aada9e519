//! Building [`SchemaNode`]s from facet shapes.

use facet::{Facet, Field, Shape, Type, UserType};

use crate::{FieldKind, FieldSpec, SchemaError, SchemaNode};

impl SchemaNode {
    /// Reflect a message type.
    pub fn of<T: Facet<'static>>() -> Result<Self, SchemaError> {
        Self::from_shape(T::SHAPE)
    }

    /// Reflect a message from its shape.
    ///
    /// Structs become messages, `String` and `i32` become scalars, `Vec<T>`
    /// becomes a repeated `T` and `Option<T>` makes the field a union member.
    pub fn from_shape(shape: &'static Shape) -> Result<Self, SchemaError> {
        let mut stack = Vec::new();
        reflect_message(shape, &mut stack)
    }
}

/// Full logical name of a message shape: the `tabby::message` attribute, or
/// the type identifier.
pub fn message_name(shape: &'static Shape) -> &'static str {
    shape_get_tabby_attr_str(shape, "message").unwrap_or(shape.type_identifier)
}

fn reflect_message(
    shape: &'static Shape,
    stack: &mut Vec<&'static Shape>,
) -> Result<SchemaNode, SchemaError> {
    let full_name = message_name(shape);

    let struct_type = match &shape.ty {
        Type::User(UserType::Struct(s)) => s,
        _ => {
            return Err(SchemaError::NotAMessage {
                type_name: shape.to_string(),
            });
        }
    };

    if stack.iter().any(|s| *s == shape) {
        return Err(SchemaError::Recursive {
            message: full_name.to_string(),
        });
    }
    stack.push(shape);

    let mut node = SchemaNode::new(full_name);
    for (index, field) in struct_type.fields.iter().enumerate() {
        let (inner_shape, optional) = unwrap_option(field.shape.get());

        let tag = match field_get_tabby_attr_str(field, "tag") {
            Some(value) => parse_attr(full_name, field, "tag", value)?,
            None => index as u32 + 1,
        };
        let max_length = match field_get_tabby_attr_str(field, "max_len") {
            Some(value) => parse_attr(full_name, field, "max_len", value)?,
            None => 0,
        };

        let kind = reflect_kind(full_name, field.name, inner_shape, stack)?;
        node.fields.push(FieldSpec {
            name: field.name.to_string(),
            tag,
            kind,
            max_length,
            default: field_get_tabby_attr_str(field, "default").map(str::to_string),
            in_union: optional || field_has_tabby_attr(field, "oneof"),
        });
    }

    stack.pop();

    node.validate()?;
    Ok(node)
}

fn reflect_kind(
    message: &str,
    field: &str,
    shape: &'static Shape,
    stack: &mut Vec<&'static Shape>,
) -> Result<FieldKind, SchemaError> {
    if shape == String::SHAPE {
        return Ok(FieldKind::String);
    }
    if shape == i32::SHAPE {
        return Ok(FieldKind::Int32);
    }

    if matches!(&shape.def, facet::Def::List(_))
        && let Some(inner) = shape.inner
    {
        let element = reflect_kind(message, field, inner, stack)?;
        if matches!(element, FieldKind::Repeated(_)) {
            return Err(SchemaError::NestedRepeated {
                message: message.to_string(),
                field: field.to_string(),
            });
        }
        return Ok(FieldKind::Repeated(Box::new(element)));
    }

    if let Type::User(UserType::Struct(_)) = &shape.ty {
        return reflect_message(shape, stack).map(FieldKind::Message);
    }

    Err(SchemaError::UnsupportedType {
        message: message.to_string(),
        field: field.to_string(),
        type_name: shape.to_string(),
    })
}

fn parse_attr(
    message: &str,
    field: &Field,
    attr: &'static str,
    value: &str,
) -> Result<u32, SchemaError> {
    value
        .trim()
        .parse()
        .map_err(|_| SchemaError::InvalidAttr {
            message: message.to_string(),
            field: field.name.to_string(),
            attr,
            value: value.to_string(),
        })
}

/// Unwrap `Option<T>` to `T`, reporting whether it was optional.
fn unwrap_option(shape: &'static Shape) -> (&'static Shape, bool) {
    if shape.decl_id == Option::<()>::SHAPE.decl_id
        && let Some(inner) = shape.inner
    {
        return (inner, true);
    }
    (shape, false)
}

fn shape_get_tabby_attr_str(shape: &Shape, key: &str) -> Option<&'static str> {
    shape.attributes.iter().find_map(|attr| {
        if attr.ns == Some("tabby") && attr.key == key {
            attr.get_as::<&str>().copied()
        } else {
            None
        }
    })
}

fn field_has_tabby_attr(field: &Field, key: &str) -> bool {
    field
        .attributes
        .iter()
        .any(|attr| attr.ns == Some("tabby") && attr.key == key)
}

fn field_get_tabby_attr_str(field: &Field, key: &str) -> Option<&'static str> {
    field.attributes.iter().find_map(|attr| {
        if attr.ns == Some("tabby") && attr.key == key {
            attr.get_as::<&str>().copied()
        } else {
            None
        }
    })
}
