//! Tests for breakdown prompt loading from config/prompts

use std::fs;
use std::path::Path;

use bubu_do::breakdown::{PromptStyle, Prompts};

#[test]
fn test_breakdown_a_prompt_file_exists() {
    let path = "config/prompts/breakdown_a.txt";
    assert!(fs::metadata(path).is_ok(), "breakdown_a.txt prompt file missing");
}

#[test]
fn test_breakdown_b_prompt_file_exists() {
    let path = "config/prompts/breakdown_b.txt";
    assert!(fs::metadata(path).is_ok(), "breakdown_b.txt prompt file missing");
}

#[test]
fn test_breakdown_prompt_template_vars() {
    for file in ["config/prompts/breakdown_a.txt", "config/prompts/breakdown_b.txt"] {
        let text = fs::read_to_string(file).unwrap();
        assert!(text.contains("{{task_title}}"), "{file} should contain {{{{task_title}}}} variable");
        assert!(
            text.contains("{{task_description}}"),
            "{file} should contain {{{{task_description}}}} variable"
        );
    }
}

#[test]
fn test_loaded_prompts_render_task() {
    let prompts = Prompts::load(Path::new("config/prompts"));
    let a = prompts.render(PromptStyle::A, "Plan a trip to Lisbon", Some("four days in May"));
    assert!(a.contains("Plan a trip to Lisbon"));
    assert!(a.contains("four days in May"));
    assert!(a.contains("3-7"));
    assert!(!a.contains("{{"));

    let b = prompts.render(PromptStyle::B, "Water plants", None);
    assert!(b.contains("No description provided"));
    assert!(b.contains("No breakdown needed"));
}

#[test]
fn test_shipped_config_loads() {
    let cfg = bubu_do::config::load_from(Path::new("config/default.toml"), None, None, None).unwrap();
    assert_eq!(cfg.server.bind, "127.0.0.1:5001");
    assert_eq!(cfg.breakdown.default_style, PromptStyle::A);
    assert_eq!(cfg.breakdown.time_buffer_percent, 20);
    assert_eq!(cfg.llm.provider, "dummy");
}
