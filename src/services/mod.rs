pub mod engine;
pub mod enricher;
pub mod providers;
pub mod recommendations;
pub mod token_manager;

pub use engine::{HttpEngine, RecommendationEngine};
pub use enricher::MetadataEnricher;
pub use recommendations::RecommendationService;
pub use token_manager::TokenManager;
