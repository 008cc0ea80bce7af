/// External participant profiles: skill groups, points, hints.
pub mod profile_store;
/// Question sources keyed by category.
pub mod question_bank;
/// Errors shared by storage backends.
pub mod storage;
