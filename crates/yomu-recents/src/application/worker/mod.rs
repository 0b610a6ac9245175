pub mod recents;
