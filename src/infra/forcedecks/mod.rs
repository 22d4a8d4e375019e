pub mod client;

pub use client::ForceDecksClient;
