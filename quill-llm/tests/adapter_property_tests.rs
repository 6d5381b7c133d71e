//! Property-Based Tests for Provider Adapters
//!
//! Properties:
//! - Portable conversations survive a trip through every provider format
//! - Provider payloads survive their own JSON encoding
//! - Tool call ids and order are preserved
//! - Late system messages are rejected only where the format hoists them

use proptest::prelude::*;
use quill_llm::{from_provider_format, to_provider_format, ProviderPayload};
use quill_test_utils::generators::{arb_conversation, arb_plain_text, arb_user_message};
use quill_test_utils::{Message, ProviderKind, Role};

// ============================================================================
// ARBITRATORS
// ============================================================================

fn arb_provider() -> impl Strategy<Value = ProviderKind> {
    prop::sample::select(ProviderKind::ALL.to_vec())
}

fn call_ids(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .flat_map(|message| message.tool_calls())
        .map(|call| call.id.clone())
        .collect()
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_portable_conversations_round_trip(
        conversation in arb_conversation(),
        provider in arb_provider(),
    ) {
        let payload = to_provider_format(&conversation, provider)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(payload.kind(), provider);
        let back = from_provider_format(&payload)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(back, conversation);
    }

    #[test]
    fn prop_payload_json_round_trip(
        conversation in arb_conversation(),
        provider in arb_provider(),
    ) {
        let payload = to_provider_format(&conversation, provider)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let parsed = ProviderPayload::from_json(provider, payload.to_json())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(parsed, payload);
    }

    #[test]
    fn prop_tool_call_ids_preserved(conversation in arb_conversation()) {
        let expected = call_ids(&conversation);
        for provider in ProviderKind::ALL {
            let payload = to_provider_format(&conversation, provider)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let back = from_provider_format(&payload)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(call_ids(&back), expected.clone(), "provider {}", provider);
        }
    }

    #[test]
    fn prop_late_system_message(user in arb_user_message(), text in arb_plain_text()) {
        let conversation = vec![user, Message::system(text)];
        for provider in ProviderKind::ALL {
            let result = to_provider_format(&conversation, provider);
            match provider {
                ProviderKind::OpenAi => prop_assert!(result.is_ok()),
                _ => {
                    let err = result.expect_err("system after user");
                    prop_assert_eq!(err.role, Role::System);
                    prop_assert_eq!(err.provider, provider);
                }
            }
        }
    }
}
