pub mod aggregate;
pub mod fanout;
pub mod lexicon;
pub mod relevance;
pub mod sentiment;
