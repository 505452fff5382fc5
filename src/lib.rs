// Meme-It game session engine: library surface used by the server binary and tests

pub mod api;
pub mod broadcast;
pub mod clock;
pub mod code;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod game;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
