//! Lua sandbox creation
//!
//! Configuration files are evaluated in a restricted Lua state with no
//! filesystem, network, process or module loading access. Only the `table`,
//! `string` and `math` libraries are loaded, plus the `conveyor` helper module.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};

/// Strategy kinds that get a `conveyor.<kind>{...}` constructor
const STRATEGY_KINDS: [&str; 4] = ["container", "kubernetes", "swarm", "ecs"];

/// Create a restricted Lua sandbox for configuration files
///
/// # Security
/// This sandbox prevents:
/// - File system access (`io`, `dofile`, `loadfile`)
/// - Process execution and environment access (`os`)
/// - Loading external modules via `require()`
///
/// # Example
/// ```no_run
/// use conveyor_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let config: mlua::Table = lua
///     .load(r#"return conveyor.define { image = "shop/web" }"#)
///     .eval()?;
/// let image: String = config.get("image")?;
/// assert_eq!(image, "shop/web");
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )?;

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;
    lua.globals().set("load", mlua::Nil)?;

    register_conveyor_module(&lua)?;

    Ok(lua)
}

/// Register the `conveyor` helper module
///
/// - `conveyor.define(config)` returns the table as-is
/// - `conveyor.container{...}`, `conveyor.kubernetes{...}`, `conveyor.swarm{...}`
///   and `conveyor.ecs{...}` return the table with `kind` set
fn register_conveyor_module(lua: &Lua) -> LuaResult<()> {
    let conveyor = lua.create_table()?;

    let define_fn = lua.create_function(|_, definition: Table| Ok(definition))?;
    conveyor.set("define", define_fn)?;

    for kind in STRATEGY_KINDS {
        let strategy_fn = lua.create_function(move |lua, options: Value| {
            let table = match options {
                Value::Table(table) => table,
                Value::Nil => lua.create_table()?,
                other => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "conveyor.{} expects a table, got {}",
                        kind,
                        other.type_name()
                    )));
                }
            };
            table.set("kind", kind)?;
            Ok(table)
        })?;
        conveyor.set(kind, strategy_fn)?;
    }

    lua.globals().set("conveyor", conveyor)?;

    Ok(())
}
