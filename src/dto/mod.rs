/// Per-tick readout and display formatting.
pub mod readout;
/// Settings batch accepted from the control surface.
pub mod settings;
/// Storage event exchanged between contexts.
pub mod sync;
/// Shared validators for names and colors.
pub mod validation;
