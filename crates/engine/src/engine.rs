//! Main loop

use crate::context::EngineContext;
use crate::scene::{FrameReport, FrameSource, ShutdownSignal};

/// Owns a context and drives it until shut down
pub struct Engine {
    context: EngineContext,
    shutdown: ShutdownSignal,
}

impl Engine {
    /// Engine driving `context`
    pub fn new(context: EngineContext) -> Self {
        Self {
            context,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Signal that stops [`Engine::run`]; clones share the flag
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Get the engine context
    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Get mutable access to the engine context
    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.context
    }

    /// Give the context back
    pub fn into_context(self) -> EngineContext {
        self.context
    }

    /// Step frames from `source` until the shutdown signal is raised.
    ///
    /// `on_frame` sees every report after its frame completes. Returns the
    /// number of frames run.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        mut on_frame: impl FnMut(&EngineContext, &FrameReport),
    ) -> u64 {
        log::info!("Starting main loop...");
        let mut frames = 0;
        while !self.shutdown.is_raised() {
            let input = source.next_frame();
            let report = self.context.step(&input);
            on_frame(&self.context, &report);
            frames += 1;
        }
        log::info!("Main loop stopped after {frames} frames");
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::render::RecordingBackend;
    use crate::scene::FixedFrameSource;

    fn engine() -> Engine {
        let context = EngineContext::new(EngineConfig::default(), Box::new(RecordingBackend::new())).unwrap();
        Engine::new(context)
    }

    #[test]
    fn test_run_stops_on_signal() {
        let mut engine = engine();
        let signal = engine.shutdown_signal();
        let mut source = FixedFrameSource::new(0.01);

        let frames = engine.run(&mut source, |_, report| {
            if report.frame == 4 {
                signal.raise();
            }
        });
        assert_eq!(frames, 5);
        assert_eq!(engine.context().frame_count(), 5);
    }

    #[test]
    fn test_raised_before_run_runs_nothing() {
        let mut engine = engine();
        engine.shutdown_signal().raise();
        assert_eq!(engine.run(&mut FixedFrameSource::new(0.01), |_, _| {}), 0);
    }

    #[test]
    fn test_script_event_can_stop_the_loop() {
        let mut engine = engine();
        let signal = engine.shutdown_signal();
        let context = engine.context_mut();
        let entity = context.world.create();
        context
            .attach_script(
                entity,
                "quitter",
                "function on_update(self) if engine.time > 0.025 then engine.emitEvent('quit') end end",
            )
            .unwrap();
        context.events.register_handler(
            "quit",
            Box::new(move |_: &crate::events::Event| {
                signal.raise();
                true
            }),
        );

        let frames = engine.run(&mut FixedFrameSource::new(0.01), |_, _| {});
        assert_eq!(frames, 4);
    }
}
