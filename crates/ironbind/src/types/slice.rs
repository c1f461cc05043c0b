use crate::value::Value;

/// A `slice(start, stop, step)` object; bounds are unconverted Python values.
#[derive(Debug, Clone, Copy)]
pub struct Slice {
    pub start: Value,
    pub stop: Value,
    pub step: Value,
}

impl Slice {
    #[must_use]
    pub fn new(start: Value, stop: Value, step: Value) -> Self {
        Self { start, stop, step }
    }
}
