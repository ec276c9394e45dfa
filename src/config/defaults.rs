//! Default values for configuration

/// Default scrape API base URL (Firecrawl-compatible)
pub fn default_scrape_base_url() -> String {
    std::env::var("LEADFORGE_SCRAPE_URL").unwrap_or_else(|_| "https://api.firecrawl.dev".to_string())
}

/// Default environment variable holding the scrape API key
pub fn default_scrape_api_key_env() -> String {
    "FIRECRAWL_API_KEY".to_string()
}

/// Default delay between scrape calls (2 seconds)
pub fn default_scrape_delay_ms() -> u64 {
    2000
}

/// Default: ask the scraper for main content only
pub fn default_only_main_content() -> bool {
    true
}

/// Default generation API base URL (OpenAI-compatible chat completions)
pub fn default_generation_base_url() -> String {
    std::env::var("LEADFORGE_GENERATION_URL")
        .unwrap_or_else(|_| "https://ai.gateway.lovable.dev".to_string())
}

/// Default environment variable holding the generation API key
pub fn default_generation_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

/// Default generation model
pub fn default_generation_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

/// Default sampling temperature
pub fn default_generation_temperature() -> f32 {
    0.7
}

/// Default delay between generation calls (1 second)
pub fn default_generation_delay_ms() -> u64 {
    1000
}

/// Default maximum source characters sent to the model
pub fn default_max_source_chars() -> usize {
    8000
}

/// Default rewrite mode
pub fn default_rewrite_mode() -> String {
    "patient_experience".to_string()
}

/// Default request timeout in seconds
pub fn default_request_timeout() -> u64 {
    60
}

/// Default leads per batch
pub fn default_batch_size() -> usize {
    5
}

/// Default: keep running batches until the queue is drained
pub fn default_auto_continue() -> bool {
    true
}

/// Default similarity threshold for flagging a rewrite
pub fn default_similarity_threshold() -> f64 {
    0.85
}

/// Default target chunk size in words
pub fn default_chunk_target_words() -> usize {
    400
}

/// Default excerpt length for the worst chunk pair
pub fn default_excerpt_chars() -> usize {
    200
}

/// Default: attach comparative positions during generation
pub fn default_attach_on_generate() -> bool {
    true
}

/// Default comparison scope
pub fn default_positioning_scope() -> String {
    "city".to_string()
}

/// Default metrics to position
pub fn default_positioning_metrics() -> Vec<String> {
    vec!["rating".to_string(), "reviews".to_string()]
}

/// Default estimated cost per successful scrape (USD)
pub fn default_scrape_unit_cost() -> f64 {
    0.01
}

/// Default estimated cost per generation (USD)
pub fn default_generation_unit_cost() -> f64 {
    0.005
}

/// Default user agent
pub fn default_user_agent() -> String {
    format!("leadforge/{} (Profile Pipeline)", env!("CARGO_PKG_VERSION"))
}
