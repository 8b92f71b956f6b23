//! Property tests for the signed payload

use proptest::prelude::*;
use soutu_proxy::payload::{DeliveryParams, SignedPayload};
use soutu_proxy::signing::SigningKey;

fn key() -> SigningKey {
    SigningKey::from_secret(b"property-secret").unwrap()
}

fn resource_id() -> impl Strategy<Value = String> {
    // Telegram file ids are base64url-ish, but anything non-empty must work
    prop_oneof![
        "[A-Za-z0-9_-]{1,80}",
        "\\PC{1,40}",
    ]
}

proptest! {
    #[test]
    fn issued_query_verifies(
        resource in resource_id(),
        exp in 1u64..=u64::from(u32::MAX),
        token in "[A-Za-z0-9_-]{22}",
    ) {
        let key = key();
        let payload = SignedPayload::new(resource.clone(), exp, token);
        let query = payload.query_with_signature(&key.sign(&payload.canonical()));

        let params = DeliveryParams::from_query(&query);
        let parsed = params.signed_payload().unwrap();
        prop_assert_eq!(&parsed.resource_id, &resource);
        prop_assert!(key.verify(&parsed.canonical(), params.signature.as_deref().unwrap()));
    }

    #[test]
    fn changing_one_field_breaks_the_signature(
        resource in resource_id(),
        exp in 1u64..1_000_000_000_000,
        token in "[A-Za-z0-9_-]{22}",
        field in 0usize..3,
    ) {
        let key = key();
        let original = SignedPayload::new(resource.clone(), exp, token.clone());
        let signature = key.sign(&original.canonical());

        let tampered = match field {
            0 => SignedPayload::new(format!("{resource}x"), exp, token),
            1 => SignedPayload::new(resource, exp + 1, token),
            _ => SignedPayload::new(resource, exp, format!("{token}x")),
        };
        prop_assert!(!key.verify(&tampered.canonical(), &signature));
    }
}
