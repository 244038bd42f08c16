//! Property tests: any mutation of a committed entry is caught by chain
//! verification at or after the mutated entry.

use std::sync::Arc;

use concord_audit::{
    AuditConfig, AuditError, AuditKind, AuditLog, AuditPayload, AuditStore, MemoryAuditStore,
};
use concord_tests::helpers::t0;
use proptest::prelude::*;

fn build_log(len: usize) -> AuditLog {
    let log = AuditLog::in_memory();
    for i in 0..len {
        log.append(
            AuditPayload::new(
                AuditKind::Informational,
                format!("entry-{i}"),
                t0(),
                &serde_json::json!({ "n": i }),
            )
            .unwrap(),
        )
        .unwrap();
    }
    log
}

#[derive(Clone, Copy, Debug)]
enum Tamper {
    Subject,
    Body,
    PrevHash,
}

fn arb_tamper() -> impl Strategy<Value = Tamper> {
    prop_oneof![Just(Tamper::Subject), Just(Tamper::Body), Just(Tamper::PrevHash)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tampering_is_detected(
        len in 2usize..24,
        pick in any::<prop::sample::Index>(),
        how in arb_tamper(),
    ) {
        let source = build_log(len);
        let mut entries = source.all_entries();
        let victim = pick.index(len);
        match how {
            Tamper::Subject => entries[victim].payload.subject.push_str("-forged"),
            Tamper::Body => entries[victim].payload.body = serde_json::json!({ "n": "forged" }),
            Tamper::PrevHash => entries[victim].prev_hash = entries[victim].this_hash,
        }

        let store = Arc::new(MemoryAuditStore::new());
        for entry in &entries {
            store.persist(entry).unwrap();
        }
        let reopened = AuditLog::open(AuditConfig::default(), store).unwrap();
        match reopened.verify_all() {
            Err(AuditError::IntegrityViolation { seq, .. }) => {
                prop_assert!(seq >= entries[victim].seq);
            }
            other => prop_assert!(false, "tampering went unnoticed: {:?}", other),
        }
        prop_assert!(reopened.is_halted());
    }
}
