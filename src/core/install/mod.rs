// ─── Game Installation ───
// Building a version descriptor and fetching the files it needs.

mod builder;
mod libraries;

pub use builder::{BuildVersionTask, GameBuilder};
pub use libraries::LibrariesTask;
