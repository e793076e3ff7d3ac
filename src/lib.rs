pub mod config;
pub mod cycle;
pub mod fetcher;
pub mod harvest;
pub mod model;
pub mod ordering;
pub mod playlist;
