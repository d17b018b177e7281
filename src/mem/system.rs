//! Memory system root.
//!
//! The root owns one controller per channel, the address translator, the
//! event queue that carries the simulation clock, and the hook bus.
//! Incoming requests are decoded and routed to their channel's
//! controller; `cycle` advances every component in lockstep, one tick at
//! a time, delivering due events between ticks.

use crate::config::{Config, Params, SharedParams};
use crate::error::SimError;
use crate::hooks::{create_hook, Hook, HookBus};
use crate::mem::controller::{create_controller, MemoryController};
use crate::mem::event_queue::{EventPayload, EventQueue};
use crate::mem::request::{Owner, Request};
use crate::mem::translator::AddressTranslator;

pub struct MemorySystem {
    params: SharedParams,
    translator: AddressTranslator,
    controllers: Vec<Box<dyn MemoryController>>,
    event_queue: EventQueue,
    hooks: HookBus,
    /// Completed external requests awaiting pickup by the driver.
    completed: Vec<Request>,
}

impl MemorySystem {
    /// Builds the full component tree from a parsed configuration.
    pub fn new(config: &Config) -> Result<MemorySystem, SimError> {
        let params: SharedParams = std::rc::Rc::new(Params::from_config(config)?);
        let translator = AddressTranslator::new(&params)?;

        let mut event_queue = EventQueue::new();
        let mut controllers = Vec::with_capacity(params.channels as usize);
        for channel in 0..params.channels as usize {
            controllers.push(create_controller(params.clone(), channel, &mut event_queue)?);
        }

        let mut hooks = HookBus::new();
        for name in config.hooks() {
            match create_hook(&name) {
                Some(mut hook) => {
                    println!("[System] created hook '{}'", name);
                    hook.init(config);
                    hooks.add(hook);
                }
                None => println!("[System] warning: could not create a hook named '{}'", name),
            }
        }

        Ok(MemorySystem {
            params,
            translator,
            controllers,
            event_queue,
            hooks,
            completed: Vec::new(),
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    pub fn current_cycle(&self) -> u64 {
        self.event_queue.current_cycle()
    }

    pub fn add_hook(&mut self, hook: Box<dyn Hook>) {
        self.hooks.add(hook);
    }

    /// Accepts an external transaction, decoding its address and routing
    /// it to the owning channel's controller.
    ///
    /// Returns the request unchanged when that controller's queue is
    /// full; the producer retries after cycling.
    pub fn issue_command(&mut self, mut req: Request) -> Result<(), Request> {
        req.addr = self.translator.translate(req.addr.physical);
        req.owner = Owner::External;

        let channel = req.addr.channel as usize;
        let now = self.event_queue.current_cycle();
        self.controllers[channel].issue_command(req, now)
    }

    /// Advances the whole tree by `steps` memory cycles.
    pub fn cycle(&mut self, steps: u64) -> Result<(), SimError> {
        for _ in 0..steps {
            for controller in &mut self.controllers {
                controller.cycle(&mut self.event_queue, &mut self.hooks)?;
            }

            for event in self.event_queue.advance() {
                match event.payload {
                    EventPayload::Completion(mut req) => {
                        req.completion_cycle = event.cycle;
                        self.hooks.complete(&req);
                        let handed_back = self.controllers[event.channel]
                            .request_complete(req, &mut self.event_queue);
                        if let Some(req) = handed_back {
                            self.completed.push(req);
                        }
                    }
                    EventPayload::RefreshPulse { rank, group } => {
                        self.controllers[event.channel].refresh_pulse(
                            rank,
                            group,
                            &mut self.event_queue,
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Takes every external request completed since the last call.
    pub fn drain_completed(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.completed)
    }

    /// True when no transaction or device command remains in flight.
    pub fn is_idle(&self) -> bool {
        self.controllers.iter().all(|c| c.pending() == 0)
    }

    /// Prints stats for every channel, advancing each interval counter.
    pub fn print_stats(&mut self) {
        for controller in &mut self.controllers {
            controller.print_stats();
        }
    }
}
