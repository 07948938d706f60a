// Normalization, filtering and write path for ticketing events
pub mod denormalize;
pub mod extract;
pub mod filter;
pub mod listing;
pub mod loader;
pub mod normalize;
pub mod upsert;
