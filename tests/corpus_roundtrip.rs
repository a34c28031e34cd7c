//! Corpus bridge round-trip scenarios: a transaction mixing several ABI
//! tags survives an identity-model rewrite byte-for-byte, and a solved
//! model rewrites only the leaves it names.

use optik::corpus::{load_tx, update_tx};
use optik::value::VarContext;

fn mixed_tx() -> serde_json::Value {
    serde_json::json!({
        "_call": {
            "tag": "SolCall",
            "contents": ["deposit", [
                {"tag": "AbiInt", "contents": [256, "-17"]},
                {"tag": "AbiBytes", "contents": [4, "3q2+7w=="]},
                {"tag": "AbiArrayDynamic", "contents": [
                    {"tag": "AbiUInt", "contents": [256, 0]},
                    [
                        {"tag": "AbiUInt", "contents": [256, "1"]},
                        {"tag": "AbiUInt", "contents": [256, "2"]}
                    ]
                ]},
                {"tag": "AbiTuple", "contents": [
                    {"tag": "AbiBool", "contents": true},
                    {"tag": "AbiAddress", "contents": "0x0000000000000000000000000000000000000aaa"}
                ]}
            ]]
        },
        "_src": "0x0000000000000000000000000000000000000bbb",
        "_dst": "0x0000000000000000000000000000000000000ccc",
        "_value": "0x0",
        "_gas'": "0x7a1200",
        "_gasprice'": "0x3b9aca00",
        "_delay": ["0x5", "0x1"]
    })
}

#[test]
fn identity_model_round_trips_every_tag_byte_for_byte() {
    let tx = mixed_tx();
    let abstract_tx = load_tx(&tx, "tx0").unwrap();

    for name in [
        "tx0_arg0",
        "tx0_arg1_0",
        "tx0_arg1_1",
        "tx0_arg1_2",
        "tx0_arg1_3",
        "tx0_arg2_0",
        "tx0_arg2_1",
        "tx0_arg3_0",
        "tx0_arg3_1",
        "tx0_sender",
        "tx0_value",
        "tx0_block_timestamp_inc",
        "tx0_block_num_inc",
    ] {
        assert!(abstract_tx.ctx.contains(name), "missing seed {name}");
    }

    let rewritten = update_tx(&tx, "tx0", &abstract_tx.ctx).unwrap();
    assert_eq!(rewritten, tx, "an identity model must leave every byte untouched");
}

#[test]
fn solved_model_rewrites_only_named_leaves() {
    let tx = mixed_tx();
    let abstract_tx = load_tx(&tx, "tx0").unwrap();

    let mut model = abstract_tx.ctx.clone();
    model.insert("tx0_arg0".to_string(), optik::types::EVMU256::from(7u64));
    model.insert("tx0_arg2_0".to_string(), optik::types::EVMU256::from(99u64));

    let rewritten = update_tx(&tx, "tx0", &model).unwrap();

    assert_eq!(rewritten["_call"]["contents"][1][0]["contents"][1], "7");
    assert_eq!(rewritten["_call"]["contents"][1][2]["contents"][1][0]["contents"][1], "99");

    // Untouched leaves and envelope fields must read back exactly as given.
    assert_eq!(rewritten["_call"]["contents"][1][2]["contents"][1][1]["contents"][1], "2");
    assert_eq!(rewritten["_call"]["contents"][1][1]["contents"][1], "3q2+7w==");
    assert_eq!(rewritten["_gas'"], tx["_gas'"]);
    assert_eq!(rewritten["_dst"], tx["_dst"]);
}

#[test]
fn negative_int_round_trips_through_twos_complement() {
    let tx = mixed_tx();
    let abstract_tx = load_tx(&tx, "tx0").unwrap();
    let seed = *abstract_tx.ctx.get("tx0_arg0").unwrap();
    // -17 stored as a full 256-bit two's-complement word.
    assert_eq!(seed, !optik::types::EVMU256::from(16u64));

    let rewritten = update_tx(&tx, "tx0", &VarContext::new()).unwrap();
    assert_eq!(rewritten["_call"]["contents"][1][0]["contents"][1], "-17");
}
