//! Command observation hooks.
//!
//! A hook is an observer notified synchronously when a device command is
//! issued and when a request completes. Hooks may read the request but
//! never mutate it or the simulator. Tracers and visualisers live here;
//! the simulation produces identical timing with or without them.

use crate::config::Config;
use crate::mem::request::Request;

/// Observer interface for issued and completed commands.
pub trait Hook {
    fn name(&self) -> &str;

    /// Called once at setup with the resolved configuration.
    fn init(&mut self, _config: &Config) {}

    /// Called just before a command is forwarded to the memory.
    fn issue_hook(&mut self, _req: &Request) {}

    /// Called when a command's completion is delivered.
    fn complete_hook(&mut self, _req: &Request) {}
}

/// The set of registered hooks, notified in registration order.
#[derive(Default)]
pub struct HookBus {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookBus {
    pub fn new() -> HookBus {
        HookBus::default()
    }

    pub fn add(&mut self, hook: Box<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn issue(&mut self, req: &Request) {
        for hook in &mut self.hooks {
            hook.issue_hook(req);
        }
    }

    pub fn complete(&mut self, req: &Request) {
        for hook in &mut self.hooks {
            hook.complete_hook(req);
        }
    }
}

/// Prints every issued command and completed request to stdout.
pub struct RequestTracer;

impl Hook for RequestTracer {
    fn name(&self) -> &str {
        "RequestTracer"
    }

    fn issue_hook(&mut self, req: &Request) {
        println!(
            "[Trace] issue {} {:#x} ch {} rk {} bk {} row {}",
            req.op, req.addr.physical, req.addr.channel, req.addr.rank, req.addr.bank, req.addr.row
        );
    }

    fn complete_hook(&mut self, req: &Request) {
        println!(
            "[Trace] complete {} {:#x} at cycle {}",
            req.op, req.addr.physical, req.completion_cycle
        );
    }
}

/// Builds the hook named in the config's `Hooks` list.
///
/// Returns `None` for unknown names; the caller warns and continues.
pub fn create_hook(name: &str) -> Option<Box<dyn Hook>> {
    match name {
        "RequestTracer" => Some(Box::new(RequestTracer)),
        _ => None,
    }
}
