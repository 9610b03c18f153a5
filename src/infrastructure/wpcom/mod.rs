pub mod client;

pub use client::WpComClient;
