pub mod club_mapping;
pub mod config;
pub mod consolidator;
pub mod fake_league;
pub mod ingest;
pub mod logging;
pub mod membership_cache;
pub mod name_parser;
pub mod resolver;
pub mod store;
