//! Time primitives.
//!
//! `time.sleep(seconds)` is the suspending operation available to evaluated
//! code: it yields the request's coroutine back to the service loop, so other
//! connections keep being served while it waits. It only works inside an
//! evaluation (which always runs as a coroutine), and only at the top level
//! of it: inside a coroutine created by the code itself (`coroutine.wrap`,
//! `coroutine.create`) the yield lands in that coroutine instead of the
//! service loop, and the call fails with "coroutine is non-resumable".
//!
//! ```lua
//! time.sleep(0.5)
//! return time.now()
//! ```

use std::time::Duration;

use anyhow::{anyhow, Result};
use mlua::Lua;

/// Register the global `time` table.
///
/// - `time.sleep(seconds)` - Suspend the current evaluation
/// - `time.now()` - Seconds since the Unix epoch, with sub-second precision
///
/// # Errors
///
/// Returns an error if Lua table or function creation fails.
pub fn register(lua: &Lua) -> Result<()> {
    let time_table = lua
        .create_table()
        .map_err(|e| anyhow!("Failed to create time table: {e}"))?;

    let sleep_fn = lua
        .create_async_function(|_, seconds: f64| async move {
            let duration =
                Duration::try_from_secs_f64(seconds.max(0.0)).map_err(mlua::Error::external)?;
            tokio::time::sleep(duration).await;
            Ok::<_, mlua::Error>(())
        })
        .map_err(|e| anyhow!("Failed to create time.sleep function: {e}"))?;

    time_table
        .set("sleep", sleep_fn)
        .map_err(|e| anyhow!("Failed to set time.sleep: {e}"))?;

    let now_fn = lua
        .create_function(|_, ()| {
            let now = chrono::Utc::now();
            Ok(now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0)
        })
        .map_err(|e| anyhow!("Failed to create time.now function: {e}"))?;

    time_table
        .set("now", now_fn)
        .map_err(|e| anyhow!("Failed to set time.now: {e}"))?;

    lua.globals()
        .set("time", time_table)
        .map_err(|e| anyhow!("Failed to register time table globally: {e}"))?;

    Ok(())
}
