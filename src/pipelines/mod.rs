pub mod cache;
pub mod pipeline;
pub mod registry;
pub mod stats;
pub mod task;
pub mod utils;

pub mod aspect_sentiment;
pub mod sentiment;
pub mod token_classification;
