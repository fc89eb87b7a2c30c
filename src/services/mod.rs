pub mod claim;
pub mod connection;
pub mod outbound;
pub mod pki;
pub mod render;
