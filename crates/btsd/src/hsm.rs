//! Minimal state machine engine shared by the profile session machines.
//!
//! A machine owns an [`HsmCore`] that tracks the current and previous
//! state. Transitions always run `on_exit(current)` before
//! `on_enter(next)`, and `on_enter` can consult
//! [`StateMachine::previous_state`] to tell an initial entry from a return.

use std::fmt;

#[derive(Debug, Clone)]
pub struct HsmCore<S> {
    current: S,
    previous: Option<S>,
}

impl<S: Copy> HsmCore<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            previous: None,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn previous(&self) -> Option<S> {
        self.previous
    }
}

/// A state machine driven with a per-dispatch context `C`.
pub trait StateMachine<C> {
    type State: Copy + Eq + fmt::Debug;
    type Event;

    fn core(&self) -> &HsmCore<Self::State>;
    fn core_mut(&mut self) -> &mut HsmCore<Self::State>;

    fn on_enter(&mut self, ctx: &mut C, state: Self::State);
    fn on_exit(&mut self, ctx: &mut C, state: Self::State);

    /// Handles `event` in `state`. Returns false when the event was not
    /// consumed.
    fn process(&mut self, ctx: &mut C, state: Self::State, event: Self::Event) -> bool;

    fn state(&self) -> Self::State {
        self.core().current()
    }

    fn previous_state(&self) -> Option<Self::State> {
        self.core().previous()
    }

    /// Enters the initial state without a previous state.
    fn start(&mut self, ctx: &mut C) {
        let initial = self.state();
        self.on_enter(ctx, initial);
    }

    fn transition_to(&mut self, ctx: &mut C, next: Self::State) {
        let current = self.state();
        self.on_exit(ctx, current);
        let core = self.core_mut();
        core.previous = Some(current);
        core.current = next;
        self.on_enter(ctx, next);
    }

    fn dispatch(&mut self, ctx: &mut C, event: Self::Event) -> bool {
        let state = self.state();
        self.process(ctx, state, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Off,
        On,
    }

    struct Switch {
        core: HsmCore<Light>,
    }

    impl StateMachine<Vec<String>> for Switch {
        type State = Light;
        type Event = &'static str;

        fn core(&self) -> &HsmCore<Light> {
            &self.core
        }

        fn core_mut(&mut self) -> &mut HsmCore<Light> {
            &mut self.core
        }

        fn on_enter(&mut self, log: &mut Vec<String>, state: Light) {
            log.push(format!("enter {state:?} from {:?}", self.previous_state()));
        }

        fn on_exit(&mut self, log: &mut Vec<String>, state: Light) {
            log.push(format!("exit {state:?}"));
        }

        fn process(&mut self, log: &mut Vec<String>, state: Light, event: &'static str) -> bool {
            match (state, event) {
                (Light::Off, "flip") => self.transition_to(log, Light::On),
                (Light::On, "flip") => self.transition_to(log, Light::Off),
                _ => return false,
            }
            true
        }
    }

    #[test]
    fn test_exit_runs_before_enter() {
        let mut log = Vec::new();
        let mut sm = Switch {
            core: HsmCore::new(Light::Off),
        };
        sm.start(&mut log);
        assert!(sm.dispatch(&mut log, "flip"));
        assert!(!sm.dispatch(&mut log, "kick"));

        assert_eq!(sm.state(), Light::On);
        assert_eq!(sm.previous_state(), Some(Light::Off));
        assert_eq!(
            log,
            vec![
                "enter Off from None".to_string(),
                "exit Off".to_string(),
                "enter On from Some(Off)".to_string(),
            ]
        );
    }
}
