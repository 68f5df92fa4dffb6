//! Conversions between Lua values and [`FieldValue`] / [`Entity`]

use super::fields::{FieldError, FieldValue};
use crate::ecs::Entity;
use crate::foundation::math::Vec3;
use mlua::{Lua, Table, Value};

/// Entity ids cross into Lua as a single integer
pub fn entity_to_lua(entity: Entity) -> i64 {
    entity.to_bits() as i64
}

/// Inverse of [`entity_to_lua`]
pub fn entity_from_lua(id: i64) -> Entity {
    Entity::from_bits(id as u64)
}

/// Convert a field value into a Lua value; vectors become `{x=, y=, z=}`
pub fn to_lua(lua: &Lua, value: FieldValue) -> mlua::Result<Value> {
    Ok(match value {
        FieldValue::Bool(b) => Value::Boolean(b),
        FieldValue::Int(i) => Value::Integer(i),
        FieldValue::Number(n) => Value::Number(n),
        FieldValue::Vec3(v) => Value::Table(vec3_table(lua, v)?),
        FieldValue::Text(s) => Value::String(lua.create_string(&s)?),
    })
}

/// Convert a Lua value into a field value.
///
/// Tables are read as vectors, either `{x=, y=, z=}` or `{1, 2, 3}`.
pub fn from_lua(value: Value, field: &str) -> mlua::Result<FieldValue> {
    match value {
        Value::Boolean(b) => Ok(FieldValue::Bool(b)),
        Value::Integer(i) => Ok(FieldValue::Int(i)),
        Value::Number(n) => Ok(FieldValue::Number(n)),
        Value::String(s) => Ok(FieldValue::Text(s.to_string_lossy().into())),
        Value::Table(t) => table_to_vec3(&t, field).map(FieldValue::Vec3),
        other => Err(mlua::Error::external(FieldError::TypeMismatch {
            field: field.to_string(),
            expected: "boolean, number, string or vector",
            found: other.type_name(),
        })),
    }
}

/// Build a `{x=, y=, z=}` table
pub fn vec3_table(lua: &Lua, v: Vec3) -> mlua::Result<Table> {
    let table = lua.create_table_with_capacity(0, 3)?;
    table.raw_set("x", v.x)?;
    table.raw_set("y", v.y)?;
    table.raw_set("z", v.z)?;
    Ok(table)
}

/// Read a vector table in either named or array form
pub fn table_to_vec3(table: &Table, field: &str) -> mlua::Result<Vec3> {
    let named: (Option<f32>, Option<f32>, Option<f32>) =
        (table.raw_get("x")?, table.raw_get("y")?, table.raw_get("z")?);
    if let (Some(x), Some(y), Some(z)) = named {
        return Ok(Vec3::new(x, y, z));
    }
    let indexed: (Option<f32>, Option<f32>, Option<f32>) = (table.raw_get(1)?, table.raw_get(2)?, table.raw_get(3)?);
    if let (Some(x), Some(y), Some(z)) = indexed {
        return Ok(Vec3::new(x, y, z));
    }
    Err(mlua::Error::external(FieldError::TypeMismatch {
        field: field.to_string(),
        expected: "vec3",
        found: "table",
    }))
}
