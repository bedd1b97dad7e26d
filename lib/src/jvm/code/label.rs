use std::fmt;

/// Opaque label
///
/// A label is only meaningful inside the sequence that created it. It becomes a position once a
/// [`super::Node::Label`] carrying it is placed in that sequence.
#[derive(Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Get the next fresh label
    pub fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

/// Generates new labels
pub trait LabelGenerator {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

/// Label generator that hands out labels in increasing order
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone, Debug)]
pub struct LabelCounter(Label);

impl LabelCounter {
    pub fn new() -> LabelCounter {
        LabelCounter(Label(0))
    }
}

impl Default for LabelCounter {
    fn default() -> Self {
        LabelCounter::new()
    }
}

impl LabelGenerator for LabelCounter {
    fn fresh_label(&mut self) -> Label {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("L{}", self.0))
    }
}
