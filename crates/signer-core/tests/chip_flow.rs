//! Signing, key generation and data reads against a software chip.

mod common;

// Silence unused crate dependency warnings for test binary
use alloy_rlp as _;
use log as _;
use serde as _;
use thiserror as _;

use alloy_primitives::{B256, Bytes, U256};
use common::{FIRMWARE_VERSION, SoftChip, init_logger, key};
use halo_evm_signer_core::address::address_from_public_key_hex;
use halo_evm_signer_core::crypto::recover_address;
use halo_evm_signer_core::halo::{
    DataStructKey, HaloSession, KeyGenStep, KeyGenerator, NoPassword, ObjectType, Password, Slot,
    StaticPassword,
};
use halo_evm_signer_core::{
    ChipErrorCode, Eip1559Transaction, Error, MessagePayload, SignedTransaction, Signer,
    SigningIntent, SlotAccount, Transaction, TypedData,
};
use serde_json::json;

const MAIL: &str = r#"{
    "types": {
        "EIP712Domain": [
            {"name": "name", "type": "string"},
            {"name": "version", "type": "string"},
            {"name": "chainId", "type": "uint256"},
            {"name": "verifyingContract", "type": "address"}
        ],
        "Person": [
            {"name": "name", "type": "string"},
            {"name": "wallet", "type": "address"}
        ],
        "Mail": [
            {"name": "from", "type": "Person"},
            {"name": "to", "type": "Person"},
            {"name": "contents", "type": "string"}
        ]
    },
    "primaryType": "Mail",
    "domain": {
        "name": "Ether Mail",
        "version": "1",
        "chainId": 1,
        "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
    },
    "message": {
        "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
        "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
        "contents": "Hello, Bob!"
    }
}"#;

fn slot(n: u32) -> Slot {
    Slot::new(n).unwrap()
}

#[tokio::test]
async fn personal_message_recovers_slot_address() {
    init_logger();
    let chip = SoftChip::new().with_key(1, key(7), None);
    let signer = Signer::new(&chip, NoPassword);

    let text = SigningIntent::Message(MessagePayload::Text("hello halo".to_string()));
    let raw = SigningIntent::Message(MessagePayload::Hex(Bytes::from_static(b"hello halo")));

    let from_text = signer.sign(Slot::FIRST, &text).await.unwrap();
    let from_hex = signer.sign(Slot::FIRST, &raw).await.unwrap();

    assert_eq!(
        recover_address(&text.digest().unwrap(), &from_text).unwrap(),
        chip.address(1)
    );
    // RFC 6979 nonces make both encodings of one message sign identically.
    assert_eq!(from_text, from_hex);

    let sent = chip.sent();
    assert_eq!(sent[0]["format"], "text");
    assert_eq!(sent[1]["format"], "hex");
    assert_eq!(sent[1]["message"], hex::encode("hello halo"));
}

#[tokio::test]
async fn typed_data_signed_without_domain_type() {
    init_logger();
    let chip = SoftChip::new().with_key(2, key(9), None);
    let signer = Signer::new(&chip, NoPassword);
    let typed_data = TypedData::from_json(MAIL).unwrap();
    let intent = SigningIntent::TypedData(typed_data);

    let response = signer.sign_raw(slot(2), &intent).await.unwrap();
    let signature = response.chip_signature().unwrap();

    assert_eq!(
        response.input.digest.as_deref(),
        Some(hex::encode(intent.digest().unwrap()).as_str())
    );
    assert_eq!(
        recover_address(&intent.digest().unwrap(), &signature).unwrap(),
        chip.address(2)
    );

    let sent = chip.sent();
    let types = sent[0]["typedData"]["types"].as_object().unwrap();
    assert!(types.contains_key("Mail"));
    assert!(!types.contains_key("EIP712Domain"));
    assert_eq!(sent[0]["typedData"]["value"]["contents"], "Hello, Bob!");
}

#[tokio::test]
async fn domain_only_typed_data_signs_the_domain() {
    init_logger();
    let chip = SoftChip::new().with_key(2, key(9), None);
    let signer = Signer::new(&chip, NoPassword);
    let typed_data = TypedData::from_json(
        r#"{
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "chainId", "type": "uint256"}
                ]
            },
            "primaryType": "EIP712Domain",
            "domain": {"name": "Ether Mail", "chainId": "0x1"}
        }"#,
    )
    .unwrap();
    let intent = SigningIntent::TypedData(typed_data);

    let signature = signer.sign(slot(2), &intent).await.unwrap();

    assert_eq!(
        recover_address(&intent.digest().unwrap(), &signature).unwrap(),
        chip.address(2)
    );
    let sent = chip.sent();
    assert_eq!(
        sent[0]["typedData"]["value"],
        json!({"name": "Ether Mail", "chainId": 1})
    );
    assert_eq!(sent[0]["typedData"]["types"], json!({}));
}

#[tokio::test]
async fn wrong_password_keeps_reason_code() {
    init_logger();
    let chip = SoftChip::new().with_key(3, key(11), Some("5150"));

    let err = Signer::new(&chip, NoPassword)
        .sign_digest(slot(3), B256::repeat_byte(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol { command: "sign", .. }));
    assert_eq!(err.reason_code(), Some(ChipErrorCode::WrongPwd));

    let signer = Signer::new(&chip, StaticPassword(Password::new("5150")));
    let signature = signer
        .sign_digest(slot(3), B256::repeat_byte(1))
        .await
        .unwrap();
    assert_eq!(
        recover_address(&B256::repeat_byte(1), &signature).unwrap(),
        chip.address(3)
    );
    assert_eq!(chip.sent()[1]["password"], "5150");
}

#[tokio::test]
async fn uninitialized_slot() {
    init_logger();
    let chip = SoftChip::new();

    let err = SlotAccount::connect(&chip, NoPassword, slot(8), None)
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), Some(ChipErrorCode::KeyNotInitialized));
}

#[tokio::test]
async fn account_signs_with_pinned_key() {
    init_logger();
    let chip = SoftChip::new().with_key(1, key(0x33), None);

    let account = SlotAccount::connect(&chip, NoPassword, Slot::FIRST, None)
        .await
        .unwrap();
    assert_eq!(account.address(), chip.address(1));
    assert!(!account.key_info().unwrap().is_password_protected);

    let tx = Transaction::Eip1559(Eip1559Transaction {
        chain_id: 10,
        nonce: 1,
        max_priority_fee_per_gas: U256::from(1u64),
        max_fee_per_gas: U256::from(2u64),
        gas_limit: 21000,
        to: Some(chip.address(1)),
        value: U256::from(5u64),
        data: Bytes::new(),
        access_list: vec![],
    });
    let raw = account.sign_transaction(&tx).await.unwrap();
    let signed = SignedTransaction::decode(&raw).unwrap();
    assert_eq!(signed.recover_signer().unwrap(), account.address());

    let typed_data = TypedData::from_json(MAIL).unwrap();
    let digest = typed_data.signing_hash().unwrap();
    let signature = account.sign_typed_data(typed_data).await.unwrap();
    assert_eq!(recover_address(&digest, &signature).unwrap(), account.address());

    let pinned = account.key_info().unwrap().public_key_hex().unwrap();
    let sent = chip.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0]["name"], "get_key_info");
    for record in &sent[1..] {
        assert_eq!(record["publicKeyHex"], pinned.as_str());
    }
}

#[tokio::test]
async fn data_struct_reads_in_rounds() {
    init_logger();
    let chip = SoftChip::new()
        .with_key(1, key(1), None)
        .with_key(2, key(2), None)
        .objects_per_round(1);
    let session = HaloSession::new(&chip);

    let keys = [
        DataStructKey::new(ObjectType::PublicKey, 1),
        DataStructKey::new(ObjectType::PublicKey, 2),
        DataStructKey::new(ObjectType::FirmwareVersion, 0),
    ];
    let response = session.fetch_data_struct(&keys).await.unwrap();

    assert!(!response.is_partial);
    assert_eq!(response.data.len(), 3);
    assert_eq!(
        response.data["firmwareVersion:0"],
        Some(json!(FIRMWARE_VERSION))
    );
    let public_key = response.data["publicKey:2"].as_ref().unwrap().as_str().unwrap();
    assert_eq!(address_from_public_key_hex(public_key).unwrap(), chip.address(2));

    let specs: Vec<_> = chip.sent().iter().map(|r| r["spec"].clone()).collect();
    assert_eq!(
        specs,
        vec![
            json!("publicKey:1,publicKey:2,firmwareVersion:0"),
            json!("publicKey:2,firmwareVersion:0"),
            json!("firmwareVersion:0"),
        ]
    );
}

#[tokio::test]
async fn keygen_without_confirmation() {
    init_logger();
    let chip = SoftChip::new();
    let mut steps = Vec::new();

    let state = KeyGenerator::new(&chip, NoPassword)
        .with_observer(|s| steps.push(s.step))
        .generate(slot(4), B256::repeat_byte(0x99))
        .await
        .unwrap();

    assert_eq!(
        steps,
        vec![KeyGenStep::Initial, KeyGenStep::Finalizing, KeyGenStep::Completed]
    );
    assert_eq!(chip.sent_names(), ["gen_key", "gen_key_finalize"]);
    assert!(state.root_public_key.is_some());
    assert!(state.attest_sig.is_some());

    let address = address_from_public_key_hex(state.public_key.as_deref().unwrap()).unwrap();
    assert_eq!(address, chip.address(4));
}

#[tokio::test]
async fn keygen_with_confirmation_and_password() {
    init_logger();
    let chip = SoftChip::new().confirming_public_key();
    let mut generator = KeyGenerator::new(&chip, StaticPassword(Password::new("hunter2")));

    let state = generator
        .generate(slot(5), B256::repeat_byte(0x42))
        .await
        .unwrap();

    assert_eq!(state.step, KeyGenStep::Completed);
    assert_eq!(
        chip.sent_names(),
        ["gen_key", "gen_key_confirm", "gen_key_finalize"]
    );
    assert_eq!(chip.sent()[1]["publicKey"], json!(state.public_key));
    assert_eq!(chip.sent()[2]["password"], "hunter2");

    // The new slot is protected by the password it was finalized with.
    let account = SlotAccount::connect(&chip, NoPassword, slot(5), None)
        .await
        .unwrap();
    assert!(account.key_info().unwrap().is_password_protected);

    let err = account
        .sign_message(MessagePayload::Text("gm".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some(ChipErrorCode::WrongPwd));
}

#[tokio::test]
async fn finalize_without_gen_key_is_rejected() {
    init_logger();
    let chip = SoftChip::new();
    let session = HaloSession::new(&chip);

    let err = session.gen_key_finalize(slot(6), None).await.unwrap_err();

    assert!(matches!(err, Error::Protocol { command: "gen_key_finalize", .. }));
    assert_eq!(err.reason_code(), Some(ChipErrorCode::InvalidData));
}
