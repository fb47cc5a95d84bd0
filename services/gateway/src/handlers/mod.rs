pub mod book;
pub mod quantity;
