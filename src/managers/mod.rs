pub mod engine;
pub mod normalize;
pub mod pagination;
pub mod request_builder;
