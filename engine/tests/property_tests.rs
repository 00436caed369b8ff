use proptest::prelude::*;

use concierge_engine::conductor::clarity::parse_verdict;
use concierge_engine::conductor::memory::interpret_store_reply;
use concierge_engine::conductor::{validate_plan, ClarityVerdict, RecalledMemory, StoreDecision};
use concierge_engine::llm::{extract_json_object, strip_thinking};
use concierge_engine::secrets::scrub_secrets;

const KNOWN: &[&str] = &["search", "weather", "greeting", "memory"];

fn known() -> Vec<String> {
    KNOWN.iter().map(|s| s.to_string()).collect()
}

fn plan_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("search".to_string()),
        Just("weather".to_string()),
        Just("greeting".to_string()),
        Just("memory".to_string()),
        Just("Search".to_string()),
        Just("weather_agent".to_string()),
        Just("chat".to_string()),
        "[a-z]{1,10}",
    ]
}

proptest! {
    // A validated plan only names registered capabilities, each once
    #[test]
    fn test_validated_plan_is_known_and_unique(names in prop::collection::vec(plan_name(), 0..12)) {
        let plan = validate_plan(&names, &known());

        for name in &plan {
            prop_assert!(KNOWN.contains(&name.as_str()), "unknown name {}", name);
        }
        let mut deduped = plan.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), plan.len());
    }

    // Weather never runs without search having run first
    #[test]
    fn test_validated_plan_orders_search_before_weather(names in prop::collection::vec(plan_name(), 0..12)) {
        let plan = validate_plan(&names, &known());

        if let Some(weather_at) = plan.iter().position(|n| n == "weather") {
            let search_at = plan.iter().position(|n| n == "search");
            prop_assert!(matches!(search_at, Some(s) if s < weather_at), "plan: {:?}", plan);
        }
    }

    #[test]
    fn test_parse_verdict_is_total(text in "\\PC*") {
        let verdict = parse_verdict(&text);
        let upper = strip_thinking(&text).to_uppercase();
        if verdict == ClarityVerdict::NeedMore {
            prop_assert!(upper.contains("NEED_MORE"));
            prop_assert!(!upper.contains("PROCEED"));
        }
    }

    // Any reply carrying the sentinel is a skip, whatever surrounds it
    #[test]
    fn test_sentinel_reply_never_stores(prefix in "\\PC{0,20}", suffix in "\\PC{0,20}", input in "[a-z ]{1,30}") {
        let reply = format!("{}00000{}", prefix, suffix);
        let decision = interpret_store_reply(&reply, &input, &RecalledMemory::default());
        prop_assert!(matches!(decision, StoreDecision::Skip(_)));
    }

    #[test]
    fn test_extract_json_object_never_panics(text in "\\PC*") {
        if let Some(object) = extract_json_object(&text) {
            prop_assert!(object.starts_with('{'), "object should start with an opening brace");
            prop_assert!(object.ends_with('}'), "object should end with a closing brace");
        }
    }

    #[test]
    fn test_scrubbed_text_hides_api_keys(
        key in "[a-zA-Z0-9]{24,40}",
        before in "[a-z ]{0,20}",
        after in "[a-z ]{0,20}",
    ) {
        let text = format!("{}sk-{}{}", before, key, after);
        let scrubbed = scrub_secrets(&text);
        prop_assert!(!scrubbed.contains(&key));
        prop_assert!(scrubbed.contains("[REDACTED]"));
    }
}
