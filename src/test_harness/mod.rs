// Stress harness: runs the simulated device against a capture element with
// streaming threads of different speeds and checks the delivery counters.

pub mod permutations;
pub mod runner;
pub mod validators;
