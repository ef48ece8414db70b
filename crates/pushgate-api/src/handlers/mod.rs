pub mod push;
pub mod scrape;
