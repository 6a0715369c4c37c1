//! Tests for identifier resolution over the built-in registry.

use tycho::config::TychoConfig;
use tycho::error::TychoError;
use tycho::registry::{ProviderRegistry, ProviderTag, Resolution};

fn configured() -> TychoConfig {
    let config = TychoConfig::new();
    config.set_api_key("openai", "sk-test".into());
    config.set_api_key("anthropic", "sk-ant-test".into());
    config.set_api_key("google", "g-test".into());
    config
}

#[test]
fn builtin_registry_tag_order_is_deterministic() {
    let registry = ProviderRegistry::builtin(&configured());
    assert_eq!(
        registry.tags(),
        vec![
            ProviderTag::OpenAi,
            ProviderTag::Anthropic,
            ProviderTag::Google,
            ProviderTag::Ollama,
        ]
    );
}

#[test]
fn tagged_identifier_selects_provider_and_strips_prefix() {
    let registry = ProviderRegistry::builtin(&configured());
    let model = registry.resolve("anthropic:claude-sonnet-4-5").unwrap();
    assert_eq!(model.provider_name(), "anthropic");
    assert_eq!(model.model_id(), "claude-sonnet-4-5");
}

#[test]
fn untagged_identifier_goes_whole_to_default() {
    let registry = ProviderRegistry::builtin(&configured());
    let model = registry.resolve("gpt-4o").unwrap();
    assert_eq!(model.provider_name(), "openai");
    assert_eq!(model.model_id(), "gpt-4o");
}

#[test]
fn unknown_tag_is_passed_unstripped_to_default() {
    let registry = ProviderRegistry::builtin(&configured());
    let model = registry.resolve("acme:model-x").unwrap();
    assert_eq!(model.provider_name(), "openai");
    assert_eq!(model.model_id(), "acme:model-x");
}

#[test]
fn ollama_resolves_without_credentials() {
    let registry = ProviderRegistry::builtin(&TychoConfig::new());
    let model = registry.resolve("ollama:llama3.3").unwrap();
    assert_eq!(model.provider_name(), "ollama");
    assert_eq!(model.model_id(), "llama3.3");
}

#[test]
fn missing_credentials_fail_synchronously() {
    let registry = ProviderRegistry::builtin(&TychoConfig::new());
    let err = registry.resolve("anthropic:claude-sonnet-4-5").err().unwrap();
    assert!(
        matches!(err, TychoError::Authentication(ref m) if m.contains("ANTHROPIC_API_KEY"))
    );
}

#[test]
fn resolution_is_pure_and_repeatable() {
    let registry = ProviderRegistry::builtin(&configured());
    for _ in 0..3 {
        assert_eq!(
            registry.resolution("google:gemini-2.0-flash"),
            Resolution::Tagged {
                tag: ProviderTag::Google,
                model_id: "gemini-2.0-flash",
            }
        );
    }
}

#[test]
fn model_id_with_extra_delimiters_stays_opaque() {
    let registry = ProviderRegistry::builtin(&configured());
    let model = registry.resolve("openai:ft:gpt-4o:org::id").unwrap();
    assert_eq!(model.model_id(), "ft:gpt-4o:org::id");
}
