pub mod sections;
pub mod synthesizer;

pub use sections::{ReportSections, extract_at_a_glance, split_report_sections, strip_at_a_glance};
pub use synthesizer::{ReportSynthesizer, build_report_prompt, fallback_report};
