//! Process exit codes. Scripts depend on these.

use litmus_core::{EngineError, ErrorKind};

pub const SUCCESS: i32 = 0;
/// The run finished but did not complete cleanly (failed, cancelled, or a case failed).
pub const RUN_NOT_CLEAN: i32 = 1;
/// Bad config, template or arguments.
pub const CONFIG_ERROR: i32 = 2;
pub const NOT_FOUND: i32 = 3;
/// Conflicting state: duplicate id, run locked by another worker, wrong run state.
pub const CONFLICT: i32 = 4;
pub const INTERNAL_ERROR: i32 = 5;

pub fn for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Config | ErrorKind::TemplateResolution => CONFIG_ERROR,
        ErrorKind::NotFound => NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::RunLocked | ErrorKind::InvalidState => CONFLICT,
        _ => INTERNAL_ERROR,
    }
}

pub fn for_error(e: &anyhow::Error) -> i32 {
    if let Some(engine) = e.downcast_ref::<EngineError>() {
        return for_kind(engine.kind());
    }
    if e.downcast_ref::<litmus_core::errors::ConfigError>().is_some() {
        return CONFIG_ERROR;
    }
    INTERNAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_by_kind() {
        let e = anyhow::Error::new(EngineError::not_found("run", "r1"));
        assert_eq!(for_error(&e), NOT_FOUND);
        let e = anyhow::Error::new(EngineError::RunLocked("r1".into()));
        assert_eq!(for_error(&e), CONFLICT);
        let e = anyhow::Error::new(litmus_core::errors::ConfigError("bad".into()));
        assert_eq!(for_error(&e), CONFIG_ERROR);
        assert_eq!(for_error(&anyhow::anyhow!("boom")), INTERNAL_ERROR);
    }
}
