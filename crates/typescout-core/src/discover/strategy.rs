//! Ordered fallback strategies
//!
//! A field that can be derived several ways gets a [`FallbackChain`]: strategies are
//! tried in order, each guarded by a precondition, and the first one producing an
//! offset wins.

use tracing::{debug, warn};

use crate::offset::FieldId;

type Precondition<'a, C> = Box<dyn Fn(&C) -> bool + 'a>;
type Resolve<'a, C> = Box<dyn Fn(&C) -> Option<i32> + 'a>;

pub struct Strategy<'a, C: ?Sized> {
    pub name: &'static str,
    /// Strategies after the first are fallbacks and log a warning when they win
    fallback: bool,
    precondition: Precondition<'a, C>,
    resolve: Resolve<'a, C>,
}

/// Which strategy produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub offset: i32,
    pub strategy: &'static str,
    pub fallback: bool,
}

pub struct FallbackChain<'a, C: ?Sized> {
    field: FieldId,
    strategies: Vec<Strategy<'a, C>>,
}

impl<'a, C: ?Sized> FallbackChain<'a, C> {
    pub fn new(field: FieldId) -> Self {
        Self {
            field,
            strategies: Vec::new(),
        }
    }

    /// Append a strategy that always runs when reached
    pub fn then<F>(self, name: &'static str, resolve: F) -> Self
    where
        F: Fn(&C) -> Option<i32> + 'a,
    {
        self.then_if(name, |_| true, resolve)
    }

    /// Append a strategy guarded by `precondition`
    pub fn then_if<P, F>(mut self, name: &'static str, precondition: P, resolve: F) -> Self
    where
        P: Fn(&C) -> bool + 'a,
        F: Fn(&C) -> Option<i32> + 'a,
    {
        let fallback = !self.strategies.is_empty();
        self.strategies.push(Strategy {
            name,
            fallback,
            precondition: Box::new(precondition),
            resolve: Box::new(resolve),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn evaluate(&self, ctx: &C) -> Option<Resolved> {
        for strategy in &self.strategies {
            if !(strategy.precondition)(ctx) {
                debug!("  {}: {} skipped (precondition)", self.field, strategy.name);
                continue;
            }
            match (strategy.resolve)(ctx) {
                Some(offset) => {
                    if strategy.fallback {
                        warn!(
                            "{}: primary search failed. Falling back to {} (0x{:X})",
                            self.field, strategy.name, offset
                        );
                    }
                    return Some(Resolved {
                        offset,
                        strategy: strategy.name,
                        fallback: strategy.fallback,
                    });
                }
                None => debug!("  {}: {} found nothing", self.field, strategy.name),
            }
        }
        None
    }
}
