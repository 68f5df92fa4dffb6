//! Lua scripting
//!
//! Scripts reach the engine only through the `engine` table:
//!
//! | function | effect |
//! |---|---|
//! | `spawnEntity{prefab=, position=, parent=, name=}` | queue a spawn, returns the new id |
//! | `destroyEntity(id)` | queue a destroy |
//! | `getField(id, "component.field")` | read a whitelisted field |
//! | `setField(id, "component.field", value)` | write a whitelisted field |
//! | `emitEvent(name, {key = value})` | raise an event, dispatched at end of frame |
//!
//! plus the read-only values `engine.self`, `engine.dt`, `engine.time` and
//! `engine.input`.

pub mod budget;
pub mod bridge;
pub mod error;
pub mod fields;
pub mod marshal;
mod sandbox;

pub use bridge::{Prefab, ScriptBridge, ScriptFrame, ScriptPassReport};
pub use budget::{Exhausted, ScriptBudget};
pub use error::ScriptError;
pub use fields::{FieldAccess, FieldError, FieldValue, FieldWhitelist, Reflect};
