//! Proptest strategies for coordination properties.

use proptest::prelude::*;

/// An operation against a single barrier counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOp {
    Init(i64),
    Signal,
    Delete,
}

pub fn counter_op_strategy() -> impl Strategy<Value = CounterOp> {
    prop_oneof![
        1 => (0i64..8).prop_map(CounterOp::Init),
        6 => Just(CounterOp::Signal),
        1 => Just(CounterOp::Delete),
    ]
}

pub fn counter_ops_strategy() -> impl Strategy<Value = Vec<CounterOp>> {
    prop::collection::vec(counter_op_strategy(), 1..40)
}

/// A stage size and an extra number of duplicate signals beyond it
pub fn stage_signals_strategy() -> impl Strategy<Value = (i64, usize)> {
    (1i64..12, 0usize..6)
}
