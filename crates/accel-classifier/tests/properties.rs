//! Property tests for the chain ordering and merge invariants

use std::sync::Arc;

use proptest::prelude::*;

use accel_classifier::{
    merge, AccelMode, Classifier, ClassifierChain, ClassifierType, DefaultClassifier,
    DscpClassifier, DscpMarks, NetlinkClassifier, ParentalControlClassifier, ProcessResponse,
    QosTags, Relevance,
};
use accel_common::Timestamp;

fn make(ty: ClassifierType) -> Arc<dyn Classifier> {
    match ty {
        ClassifierType::Default => Arc::new(DefaultClassifier::new()),
        ClassifierType::Dscp => Arc::new(DscpClassifier::new()),
        ClassifierType::Netlink => Arc::new(NetlinkClassifier::new()),
        ClassifierType::ParentalControl => Arc::new(ParentalControlClassifier::new(true)),
    }
}

fn classifier_type() -> impl Strategy<Value = ClassifierType> {
    prop_oneof![
        Just(ClassifierType::Default),
        Just(ClassifierType::Dscp),
        Just(ClassifierType::Netlink),
        Just(ClassifierType::ParentalControl),
    ]
}

fn relevance() -> impl Strategy<Value = Relevance> {
    prop_oneof![
        Just(Relevance::Maybe),
        Just(Relevance::No),
        Just(Relevance::Yes),
    ]
}

fn accel_mode() -> impl Strategy<Value = AccelMode> {
    prop_oneof![
        Just(AccelMode::DontCare),
        Just(AccelMode::No),
        Just(AccelMode::Accel),
    ]
}

prop_compose! {
    fn process_response()(
        relevance in relevance(),
        drop in proptest::option::of(any::<bool>()),
        qos in proptest::option::of((any::<u32>(), any::<u32>())),
        accel in proptest::option::of(accel_mode()),
        dscp in proptest::option::of((0u8..64, 0u8..64)),
        dscp_deny in any::<bool>(),
    ) -> ProcessResponse {
        ProcessResponse {
            relevance,
            became_relevant: Timestamp::now(),
            drop,
            qos_tags: qos.map(|(flow, ret)| QosTags { flow, ret }),
            accel_mode: accel,
            timer_group: None,
            dscp: dscp.map(|(flow, ret)| DscpMarks { flow, ret }),
            dscp_deny,
        }
    }
}

proptest! {
    // After any sequence of assign/unassign operations the chain walks in
    // non-decreasing type order and holds no duplicates.
    #[test]
    fn chain_stays_ascending(ops in proptest::collection::vec((classifier_type(), any::<bool>()), 0..32)) {
        let mut chain = ClassifierChain::new();
        chain.assign(make(ClassifierType::Default)).unwrap();

        for (ty, insert) in ops {
            if insert {
                let _ = chain.assign(make(ty));
            } else {
                let _ = chain.unassign(ty);
            }

            let types: Vec<ClassifierType> =
                chain.iter().map(|c| c.classifier_type()).collect();
            let mut sorted = types.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(&types, &sorted);
            prop_assert!(types.contains(&ClassifierType::Default));
        }
    }

    // Merging is a pure function of the response sequence.
    #[test]
    fn merge_is_deterministic(responses in proptest::collection::vec(process_response(), 0..6)) {
        let a = merge(responses.iter());
        let b = merge(responses.iter());
        prop_assert_eq!(a, b);
    }

    // Irrelevant responses contribute nothing wherever they sit.
    #[test]
    fn no_responses_are_inert(
        responses in proptest::collection::vec(process_response(), 0..5),
        noise in process_response(),
        at in 0usize..6,
    ) {
        let mut noise = noise;
        noise.relevance = Relevance::No;

        let baseline = merge(responses.iter());
        let mut padded = responses.clone();
        padded.insert(at.min(padded.len()), noise);
        prop_assert_eq!(merge(padded.iter()), baseline);
    }

    // Any relevant dscp_deny strips marks, whatever the priorities.
    #[test]
    fn dscp_deny_dominates(responses in proptest::collection::vec(process_response(), 1..6)) {
        let decision = merge(responses.iter());
        let denied = responses
            .iter()
            .any(|r| r.relevance == Relevance::Yes && r.dscp_deny);
        if denied {
            prop_assert!(decision.dscp.is_none());
            prop_assert!(decision.dscp_denied);
        }
    }

    // Any relevant drop means the packet is dropped and never accelerated.
    #[test]
    fn drop_dominates(responses in proptest::collection::vec(process_response(), 1..6)) {
        let decision = merge(responses.iter());
        let dropped = responses
            .iter()
            .any(|r| r.relevance == Relevance::Yes && r.drop == Some(true));
        if dropped {
            prop_assert!(decision.drop);
            prop_assert!(!decision.permits_acceleration());
        }
    }

    // Maybe-only chains never permit acceleration.
    #[test]
    fn maybe_only_denies_accel(responses in proptest::collection::vec(process_response(), 0..6)) {
        let mut responses = responses;
        for r in &mut responses {
            r.relevance = Relevance::Maybe;
        }
        let decision = merge(responses.iter());
        prop_assert_eq!(decision.relevance, Relevance::Maybe);
        prop_assert!(!decision.permits_acceleration());
    }
}
