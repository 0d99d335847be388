#![no_main]
use libfuzzer_sys::fuzz_target;
use searchrepo::patch::{PatchOperation, apply};

#[derive(arbitrary::Arbitrary, Debug)]
struct Input {
    doc: String,
    ops: String,
}

fuzz_target!(|input: Input| {
    let Ok(mut doc) = serde_json::from_str::<serde_json::Value>(&input.doc) else { return };
    let Ok(ops) = serde_json::from_str::<Vec<PatchOperation>>(&input.ops) else { return };
    let before = doc.clone();
    if apply(&mut doc, &ops).is_err() {
        assert_eq!(doc, before);
    }
});
