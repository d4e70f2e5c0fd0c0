// Test module organization
pub mod support;

pub mod test_coroutine;
pub mod test_metamethods;
pub mod test_table;
pub mod test_values;
