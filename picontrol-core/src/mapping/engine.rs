//! Parameter change to output action

use picontrol_protocol::{ParameterValue, ValueRange};

use super::action::OutputAction;
use super::table::{MappingKey, MappingTable};
use super::transform::{flip, normalize};
use crate::traits::OutputSink;

/// How values of one parameter are prepared before the curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueContext<'a> {
    pub range: Option<&'a ValueRange>,
    /// Mirror values about the range midpoint
    pub flip: bool,
}

impl ValueContext<'_> {
    /// Flip, then normalize to 0..=255
    pub fn prepare(&self, value: &ParameterValue) -> u8 {
        let value = if self.flip {
            flip(*value, self.range)
        } else {
            *value
        };
        normalize(&value, self.range)
    }
}

/// Stateless evaluator of the mapping table
///
/// Evaluation only reads the table, so it can run under the table lock.
/// Output goes through [`MappingEngine::dispatch`] once the lock is released.
pub struct MappingEngine;

impl MappingEngine {
    /// Output action for a value change of `key`
    ///
    /// A missing mapping or one with no action yields `None`.
    pub fn evaluate(
        table: &MappingTable,
        key: &MappingKey,
        context: ValueContext<'_>,
        current: &ParameterValue,
        previous: Option<&ParameterValue>,
    ) -> Option<OutputAction> {
        let mapping = table.get(key)?;

        let current = mapping.curve.eval(context.prepare(current));
        let previous = previous.map(|p| mapping.curve.eval(context.prepare(p)));

        mapping.action.evaluate(current, previous)
    }

    /// Hand an evaluated action to the output sink
    pub fn dispatch<S: OutputSink>(action: OutputAction, sink: &mut S) -> bool {
        let accepted = sink.send(action);
        if !accepted {
            warn!("output sink rejected {:?}", action);
        }
        accepted
    }
}
