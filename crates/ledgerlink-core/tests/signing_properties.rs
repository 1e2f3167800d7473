//! Property Tests: canonical serialization and signing
//!
//! - canonical bytes do not depend on field insertion order
//! - attached signatures verify against the canonical bytes
//! - independent signers never clobber each other's entries

use ledgerlink_core::{
    attach_signature, serialize_for_signing, verify, LedgerSigner, OutgoingRequest,
};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn fields() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::btree_map("[a-z]{1,6}", leaf(), 1..10)
        .prop_map(|map| map.into_iter().collect::<Vec<_>>())
}

fn object_from(fields: &[(String, Value)]) -> Value {
    let mut map = Map::new();
    for (key, value) in fields {
        map.insert(key.clone(), value.clone());
    }
    Value::Object(map)
}

proptest! {
    #[test]
    fn canonical_bytes_ignore_insertion_order(
        (ordered, shuffled) in fields().prop_flat_map(|fields| {
            let shuffled = Just(fields.clone()).prop_shuffle();
            (Just(fields), shuffled)
        })
    ) {
        let mut reversed = ordered.clone();
        reversed.reverse();

        let a = serialize_for_signing(&object_from(&ordered)).unwrap();
        let b = serialize_for_signing(&object_from(&shuffled)).unwrap();
        let c = serialize_for_signing(&object_from(&reversed)).unwrap();

        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&a, &c);
    }

    #[test]
    fn signature_fields_never_change_canonical_bytes(
        fields in fields(),
        noise in "[a-zA-Z0-9]{1,20}",
    ) {
        let plain = object_from(&fields);
        let mut with_signatures = plain.clone();
        if let Value::Object(map) = &mut with_signatures {
            map.insert("signature".to_string(), Value::from(noise.clone()));
            map.insert("signatures".to_string(), serde_json::json!({ "someone": noise }));
        }

        prop_assert_eq!(
            serialize_for_signing(&plain).unwrap(),
            serialize_for_signing(&with_signatures).unwrap()
        );
    }

    #[test]
    fn attached_signatures_verify(seed in any::<[u8; 32]>(), fields in fields()) {
        let signer = LedgerSigner::from_seed(&seed);
        let request = OutgoingRequest::from_value(object_from(&fields)).unwrap();

        let signed = attach_signature(&request, &signer.identity(), &signer);
        let encoded = signed.signature_for(&signer.identity()).unwrap();

        prop_assert!(verify(&signed, &signer.verkey(), encoded).is_ok());
        prop_assert!(verify(&request, &signer.verkey(), encoded).is_ok());
    }

    #[test]
    fn independent_signers_both_survive(
        seed_a in any::<[u8; 32]>(),
        seed_b in any::<[u8; 32]>(),
        fields in fields(),
    ) {
        prop_assume!(seed_a != seed_b);
        let a = LedgerSigner::from_seed(&seed_a);
        let b = LedgerSigner::from_seed(&seed_b);
        prop_assume!(a.identity() != b.identity());

        let request = OutgoingRequest::from_value(object_from(&fields)).unwrap();
        let signed = attach_signature(&attach_signature(&request, &a.identity(), &a), &b.identity(), &b);

        prop_assert_eq!(signed.signers().len(), 2);
        prop_assert!(verify(&signed, &a.verkey(), signed.signature_for(&a.identity()).unwrap()).is_ok());
        prop_assert!(verify(&signed, &b.verkey(), signed.signature_for(&b.identity()).unwrap()).is_ok());
    }
}

#[test]
fn reference_trustee_signature_is_stable() {
    let trustee = LedgerSigner::from_seed(b"000000000000000000000000Trustee1");
    let request = OutgoingRequest::from_json(
        r#"{"reqId":1514215425836443,"protocolVersion":2,"operation":{"type":"105","dest":"V4SGRU86Z58d6TV7PBUe6f"},"identifier":"V4SGRU86Z58d6TV7PBUe6f"}"#,
    )
    .unwrap();

    let signed = attach_signature(&request, &trustee.identity(), &trustee);
    assert_eq!(
        signed.signature_for("V4SGRU86Z58d6TV7PBUe6f"),
        Some("RzXy1QnJyw5KXzhLVAHPQj1J4b5HnTsDXCX6RsfquPxpR1cK4iGBPZN4YKfGETisTKJmQQh7ovMigxvhckU33Pd")
    );
}
