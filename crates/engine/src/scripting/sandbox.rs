//! Lua state construction
//!
//! Only the `table`, `string` and `math` libraries are opened. Every script
//! gets an environment of its own holding a curated copy of the base library
//! and private copies of the library tables, so nothing one script assigns is
//! visible to another. The shared string metatable is locked.
//!
//! The instruction hook never fires while a C library function runs, so the
//! string functions that can run unbounded in C are wrapped: pattern calls
//! reject patterns whose backtracking could explode on the given subject, and
//! `string.rep` is capped. The state as a whole runs under a memory limit.

use crate::config::ScriptingConfig;
use mlua::{Function, Lua, LuaOptions, MultiValue, StdLib, Table, Value};

/// Base-library functions scripts may use
const SAFE_GLOBALS: &[&str] = &[
    "assert", "error", "getmetatable", "ipairs", "next", "pairs", "pcall", "rawequal", "rawget", "rawlen",
    "rawset", "select", "setmetatable", "tonumber", "tostring", "type", "xpcall", "_VERSION",
];

/// Libraries copied into each environment
const SAFE_LIBRARIES: &[&str] = &["math", "string", "table"];

/// String functions that run Lua patterns
const PATTERN_FUNCTIONS: &[&str] = &["find", "match", "gmatch", "gsub"];

/// Estimated matcher steps one pattern call may take
const MAX_PATTERN_STEPS: f64 = 1e8;

/// Create a Lua state with only the safe standard libraries loaded
pub fn create_state(config: &ScriptingConfig) -> mlua::Result<Lua> {
    let lua = Lua::new_with(StdLib::TABLE | StdLib::STRING | StdLib::MATH, LuaOptions::default())?;

    let string: Table = lua.globals().raw_get("string")?;
    guard_string_library(&lua, &string, config.max_string_bytes)?;
    let string_meta: Table = lua.load("return getmetatable('')").eval()?;
    string_meta.raw_set("__index", string)?;
    string_meta.raw_set("__metatable", false)?;

    if config.max_memory_bytes > 0 {
        lua.set_memory_limit(config.max_memory_bytes)?;
    }
    Ok(lua)
}

/// Build the template environments are copied from.
///
/// The template itself is never handed to a script.
pub fn build_sandbox(lua: &Lua) -> mlua::Result<Table> {
    let globals = lua.globals();
    let sandbox = lua.create_table()?;
    for name in SAFE_GLOBALS.iter().chain(SAFE_LIBRARIES) {
        let value: Value = globals.raw_get(*name)?;
        if value.is_nil() {
            log::warn!("Lua state is missing '{name}'");
            continue;
        }
        sandbox.raw_set(*name, value)?;
    }
    Ok(sandbox)
}

/// Fresh per-script environment populated from `sandbox`
pub fn script_environment(lua: &Lua, sandbox: &Table) -> mlua::Result<Table> {
    let env = lua.create_table()?;
    for pair in sandbox.pairs::<String, Value>() {
        let (name, value) = pair?;
        let value = match value {
            Value::Table(library) => Value::Table(copy_table(lua, &library)?),
            other => other,
        };
        env.raw_set(name, value)?;
    }
    Ok(env)
}

fn copy_table(lua: &Lua, source: &Table) -> mlua::Result<Table> {
    let copy = lua.create_table()?;
    for pair in source.pairs::<Value, Value>() {
        let (key, value) = pair?;
        copy.raw_set(key, value)?;
    }
    Ok(copy)
}

fn guard_string_library(lua: &Lua, string: &Table, max_string_bytes: usize) -> mlua::Result<()> {
    for &name in PATTERN_FUNCTIONS {
        let original: Function = string.raw_get(name)?;
        let guarded = lua.create_function(move |_, args: MultiValue| {
            check_pattern(name, &args)?;
            original.call::<MultiValue>(args)
        })?;
        string.raw_set(name, guarded)?;
    }

    let rep: Function = string.raw_get("rep")?;
    let guarded = lua.create_function(move |_, args: MultiValue| {
        let size = rep_size(&args);
        if size.is_nan() || size > max_string_bytes as f64 {
            return Err(mlua::Error::RuntimeError(format!(
                "string.rep: result would exceed {max_string_bytes} bytes"
            )));
        }
        rep.call::<MultiValue>(args)
    })?;
    string.raw_set("rep", guarded)
}

fn check_pattern(name: &str, args: &MultiValue) -> mlua::Result<()> {
    let mut values = args.iter();
    let (Some(subject), Some(Value::String(pattern))) = (values.next(), values.next()) else {
        return Ok(());
    };
    let plain = values.nth(1).is_some_and(|flag| !matches!(flag, Value::Nil | Value::Boolean(false)));
    if name == "find" && plain {
        return Ok(());
    }

    let subject_len = byte_len(subject);
    let pattern = pattern.as_bytes();
    if pattern_steps(&pattern, subject_len) > MAX_PATTERN_STEPS {
        return Err(mlua::Error::RuntimeError(format!(
            "string.{name}: pattern too complex for a {subject_len} byte subject"
        )));
    }
    Ok(())
}

/// Worst case of Lua's backtracking matcher, roughly: every start position
/// times the ways the quantified items can split the subject between them
fn pattern_steps(pattern: &[u8], subject_len: usize) -> f64 {
    let n = subject_len as f64;
    let splits = (1..=count_quantifiers(pattern)).fold(1.0, |acc, i| {
        let i = f64::from(i);
        acc * (n - 1.0 + i) / i
    });
    n.max(1.0) * splits
}

/// Quantified single-character items (`x*`, `%d+`, `[a-z]-`, `.?`)
fn count_quantifiers(pattern: &[u8]) -> u32 {
    let mut count = 0;
    let mut i = 0;
    while i < pattern.len() {
        let item_end = match pattern[i] {
            b'%' => match pattern.get(i + 1) {
                Some(b'b') => {
                    i += 4;
                    continue;
                }
                Some(b'f') => {
                    i = skip_set(pattern, i + 2);
                    continue;
                }
                Some(_) => i + 2,
                None => break,
            },
            b'[' => skip_set(pattern, i),
            b'(' | b')' | b'^' | b'$' => {
                i += 1;
                continue;
            }
            _ => i + 1,
        };
        if matches!(pattern.get(item_end), Some(b'*' | b'+' | b'-' | b'?')) {
            count += 1;
            i = item_end + 1;
        } else {
            i = item_end;
        }
    }
    count
}

/// Index just past the set starting at `start` (which holds `[`)
fn skip_set(pattern: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    if pattern.get(i) == Some(&b'^') {
        i += 1;
    }
    if pattern.get(i) == Some(&b']') {
        i += 1;
    }
    while i < pattern.len() {
        match pattern[i] {
            b'%' => i += 2,
            b']' => return i + 1,
            _ => i += 1,
        }
    }
    pattern.len()
}

fn rep_size(args: &MultiValue) -> f64 {
    let mut values = args.iter();
    let unit = values.next().map_or(0, byte_len) as f64;
    let count = values.next().map_or(0.0, repeat_count).max(0.0);
    let separator = values.next().map_or(0, byte_len) as f64;
    unit * count + separator * (count - 1.0).max(0.0)
}

fn repeat_count(value: &Value) -> f64 {
    match value {
        Value::Integer(n) => *n as f64,
        Value::Number(n) => *n,
        Value::String(text) => text
            .to_str()
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(f64::INFINITY),
        _ => 0.0,
    }
}

fn byte_len(value: &Value) -> usize {
    match value {
        Value::String(text) => text.as_bytes().len(),
        // tostring of any number fits
        Value::Integer(_) | Value::Number(_) => 32,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn environment(lua: &Lua) -> Table {
        let sandbox = build_sandbox(lua).unwrap();
        script_environment(lua, &sandbox).unwrap()
    }

    fn run<T: mlua::FromLuaMulti>(source: &str) -> mlua::Result<T> {
        let lua = create_state(&ScriptingConfig::default())?;
        let env = environment(&lua);
        lua.load(source).set_environment(env).eval()
    }

    #[test]
    fn test_safe_libraries_available() {
        let value: Value = run("return math.floor(2.5) + #string.rep('a', 3) + select('#', table.unpack({1, 2}))").unwrap();
        assert_eq!(value, Value::Integer(7));
    }

    #[test]
    fn test_host_escape_hatches_are_hidden() {
        for name in ["load", "loadstring", "dofile", "loadfile", "require", "collectgarbage", "print", "os", "io", "debug"] {
            let value: Value = run(&format!("return {name}")).unwrap();
            assert!(value.is_nil(), "{name} should not be reachable");
        }
    }

    #[test]
    fn test_environments_share_nothing_writable() {
        let lua = create_state(&ScriptingConfig::default()).unwrap();
        let first = environment(&lua);
        let second = environment(&lua);

        lua.load(
            r#"
            counter = 1
            ipairs = nil
            string.upper = nil
            table.insert = nil
            "#,
        )
        .set_environment(first)
        .exec()
        .unwrap();
        let seen: String = lua
            .load(
                r#"
                assert(counter == nil and ipairs and table.insert)
                assert(getmetatable(_ENV) == nil)
                return string.upper('ok')
                "#,
            )
            .set_environment(second)
            .eval()
            .unwrap();
        assert_eq!(seen, "OK");
    }

    #[test]
    fn test_string_metatable_is_locked() {
        let locked: Value = run("return getmetatable('')").unwrap();
        assert_eq!(locked, Value::Boolean(false));
        let upper: String = run("return ('abc'):upper()").unwrap();
        assert_eq!(upper, "ABC");
    }

    #[test]
    fn test_explosive_pattern_is_rejected_quickly() {
        let started = Instant::now();
        let matched: bool = run(
            r#"
            local subject, pattern = string.rep("a", 26), string.rep("a*", 26) .. "b"
            local direct = pcall(string.find, subject, pattern)
            local method = pcall(function() return subject:match(pattern) end)
            local global = pcall(string.gsub, subject, pattern, "")
            return direct or method or global
            "#,
        )
        .unwrap();
        assert!(!matched);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_ordinary_patterns_still_work() {
        let value: String = run(
            r#"
            local key, val = ("speed=12"):match("(%w+)=(%w+)")
            local _, spaces = string.gsub("a b c", "%s", "")
            local plain = string.find("a*b", "*", 1, true)
            local words = 0
            for _ in ("one two three"):gmatch("%a+") do words = words + 1 end
            return key .. val .. spaces .. plain .. words
            "#,
        )
        .unwrap();
        assert_eq!(value, "speed12223");
    }

    #[test]
    fn test_rep_is_capped() {
        let config = ScriptingConfig {
            max_string_bytes: 1024,
            ..ScriptingConfig::default()
        };
        let lua = create_state(&config).unwrap();
        let env = environment(&lua);
        let (capped, small): (bool, i64) = lua
            .load(r#"return pcall(string.rep, "ab", 1000), #string.rep("ab", 100, ",")"#)
            .set_environment(env)
            .eval()
            .unwrap();
        assert!(!capped);
        assert_eq!(small, 299);
    }

    #[test]
    fn test_memory_limit_enforced() {
        let config = ScriptingConfig {
            max_memory_bytes: 2 * 1024 * 1024,
            ..ScriptingConfig::default()
        };
        let lua = create_state(&config).unwrap();
        let env = environment(&lua);
        let err = lua
            .load("local t = {} for i = 1, 1000000 do t[i] = { i } end")
            .set_environment(env)
            .exec()
            .unwrap_err();
        assert!(matches!(err, mlua::Error::MemoryError(_)), "unexpected error: {err}");
    }

    #[test]
    fn test_quantifier_count() {
        assert_eq!(count_quantifiers(b"%d+"), 1);
        assert_eq!(count_quantifiers(b"^[a-z]*%.x?$"), 2);
        assert_eq!(count_quantifiers(b"%bxy.-"), 1);
        assert_eq!(count_quantifiers(b"a%*[%]]"), 0);
        assert_eq!(count_quantifiers("a*".repeat(26).as_bytes()), 26);
    }
}
