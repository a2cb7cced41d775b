//! Tabular Q-learning for traffic light control.

use crate::config::LearningConfig;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// A decision a traffic light can take each tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Stay,
    Switch,
}

impl Action {
    /// Every action, in table order.
    pub const ALL: [Action; 2] = [Action::Stay, Action::Switch];

    fn index(self) -> usize {
        match self {
            Action::Stay => 0,
            Action::Switch => 1,
        }
    }
}

/// What a traffic light observes before deciding. All counts are clamped
/// so the state space stays finite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    /// Vehicles queued close to the stop point.
    pub queue: u8,
    /// Vehicles in the wider surrounding area.
    pub opposing: u8,
    /// Ticks since the last switch.
    pub since_switch: u8,
    /// Whether the light is green.
    pub green: bool,
}

/// The estimated value of each action in some state, in table order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActionValues([f64; 2]);

impl ActionValues {
    pub fn get(&self, action: Action) -> f64 {
        self.0[action.index()]
    }

    fn set(&mut self, action: Action, value: f64) {
        self.0[action.index()] = value;
    }

    /// The highest valued action. Ties go to the first action in table order.
    pub fn best_action(&self) -> Action {
        Action::ALL
            .into_iter()
            .fold((Action::Stay, f64::NEG_INFINITY), |best, action| {
                let value = self.get(action);
                if value > best.1 {
                    (action, value)
                } else {
                    best
                }
            })
            .0
    }

    pub fn max_value(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// An epsilon-greedy Q-learning agent shared by every traffic light.
///
/// The value table grows lazily: the first time a state is used, by either
/// [choose_action](Self::choose_action) or [update](Self::update), it is
/// inserted with a value of zero for every action. Entries are never removed.
#[derive(Clone, Debug)]
pub struct LightPolicy {
    alpha: f64,
    gamma: f64,
    epsilon: f64,
    table: HashMap<StateKey, ActionValues>,
}

impl LightPolicy {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            alpha: config.alpha,
            gamma: config.gamma,
            epsilon: config.epsilon,
            table: HashMap::new(),
        }
    }

    /// The number of states visited so far.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The action values of a state, if it has been visited.
    pub fn values(&self, state: &StateKey) -> Option<&ActionValues> {
        self.table.get(state)
    }

    /// Iterates over every visited state.
    pub fn states(&self) -> impl Iterator<Item = &StateKey> {
        self.table.keys()
    }

    /// The values of a state, inserting zeros if it has not been seen before.
    fn values_mut(&mut self, state: StateKey) -> &mut ActionValues {
        self.table.entry(state).or_default()
    }

    /// Chooses an action: a uniformly random one with probability epsilon,
    /// otherwise the best known action for the state.
    pub fn choose_action(&mut self, state: StateKey, rng: &mut impl Rng) -> Action {
        if rng.gen::<f64>() < self.epsilon {
            if let Some(action) = Action::ALL.choose(rng) {
                return *action;
            }
        }
        self.values_mut(state).best_action()
    }

    /// Applies the one-step Q-learning update for taking `action` in `state`.
    pub fn update(&mut self, state: StateKey, action: Action, reward: f64, next: StateKey) {
        let best_next = self.values_mut(next).max_value();
        let (alpha, gamma) = (self.alpha, self.gamma);
        let values = self.values_mut(state);
        let old = values.get(action);
        values.set(action, old + alpha * (reward + gamma * best_next - old));
    }
}
