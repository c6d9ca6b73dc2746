mod json;

pub use json::render_metrics_json;
