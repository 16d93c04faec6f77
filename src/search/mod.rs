pub mod filter;
pub mod intent;
pub mod retriever;
pub mod vector;
