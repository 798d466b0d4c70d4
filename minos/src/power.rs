//! Power control.

static HOOK: spin::Once<fn()> = spin::Once::new();

/// Registers the platform power-off routine. Effective once.
pub fn register(hook: fn()) {
    HOOK.call_once(|| hook);
}

/// Powers the machine off.
///
/// On real hardware the registered hook does not return. With no hook
/// registered this is a no-op beyond the log line, which keeps early-boot
/// failures diagnosable.
pub fn off() {
    log::info!("power off requested");
    if let Some(hook) = HOOK.get() {
        hook();
    }
}
