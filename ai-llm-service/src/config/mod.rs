pub mod llm_model_config;
pub mod llm_provider;
pub mod models_config;
