/// Types whose values occupy a variable number of JVM slots
///
/// Locals and operand stack entries of type `long` or `double` take two slots, everything else
/// takes one.
pub trait Width {
    /// Number of slots taken
    fn width(&self) -> usize;
}
