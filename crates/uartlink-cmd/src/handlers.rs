//! Built-in core commands.

use crate::callbacks::MAX_CALLBACK_NAME_LEN;
use crate::error::Result;
use crate::ids;
use crate::packet::Request;
use crate::table::CommandTable;

/// Register the core commands (`null`, `noop`, `is_ready`, `reset`,
/// `cb_add`) into `table`.
pub fn register_core(table: &mut CommandTable) -> Result<()> {
    table.register_fn(ids::NULL, "null", |_req| 0)?;
    table.register_fn(ids::NOOP, "noop", |_req| 1)?;
    table.register_fn(ids::IS_READY, "is_ready", |_req| 1)?;
    table.register_fn(ids::RESET, "reset", reset)?;
    table.register_fn(ids::CB_ADD, "cb_add", cb_add)?;
    Ok(())
}

/// A table holding only the core commands.
pub fn core_table() -> Result<CommandTable> {
    let mut table = CommandTable::new();
    register_core(&mut table)?;
    Ok(table)
}

fn reset(req: &mut Request<'_>) -> u32 {
    tracing::info!(cleared = req.callbacks.len(), "mcu reset, callbacks cleared");
    req.callbacks.clear();
    1
}

/// One argument, the callback name; the packet value is the token.
fn cb_add(req: &mut Request<'_>) -> u32 {
    if req.header.argc != 1 || req.header.value == 0 {
        return 0;
    }
    let len = match req.args.next_arg_len() {
        Ok(len) if len <= MAX_CALLBACK_NAME_LEN => len,
        _ => return 0,
    };
    let mut name = [0u8; MAX_CALLBACK_NAME_LEN];
    if req.args.pop_arg(&mut name[..len]).is_err() {
        return 0;
    }
    let name = String::from_utf8_lossy(&name[..len]);
    match req.callbacks.add(&name, req.header.value) {
        Ok(()) => {
            tracing::debug!(%name, token = req.header.value, "callback registered");
            1
        }
        Err(err) => {
            tracing::warn!(%name, error = %err, "callback not registered");
            0
        }
    }
}
