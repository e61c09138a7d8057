//! Scan pipeline integration tests
//!
//! Drive a full session (buffer, resolver, duplicate guard, accumulation,
//! auto-commit) against the in-memory inventory on paused tokio time.

mod helpers;

use helpers::*;
use pickscan_common::events::{ErrorKind, PickEvent};
use pickscan_common::ScanEvent;
use pickscan_engine::inventory::CatalogItem;
use pickscan_engine::scan::{InputTarget, KeyPress};
use pickscan_engine::{FlushOutcome, ScanOutcome};
use std::time::Duration;
use tokio::time::sleep;

fn scan(code: &str) -> ScanEvent {
    ScanEvent::keyboard(code)
}

/// **Given:** An empty product cache
/// **When:** "100200300" is scanned, scanned again within 1s, then left idle
/// **Then:**
///   - Nothing is shown until the inventory answers (no optimistic event)
///   - The slot shows caseCount 1, then 2
///   - Exactly one commit with caseCount 2 after the quiet period
#[tokio::test(start_paused = true)]
async fn test_end_to_end_two_scans_one_commit() {
    let mut h = Harness::new();

    let outcome = h.session.process_scan(scan(VITAMINA_C)).await;
    assert!(matches!(outcome, ScanOutcome::Opened { .. }));

    let events = h.drain();
    match &events[0] {
        PickEvent::ScanResolved {
            product,
            optimistic,
            ..
        } => {
            assert!(!optimistic, "cache miss must not show an optimistic product");
            assert_eq!(product.name, "Vitamina C");
        }
        other => panic!("expected ScanResolved first, got {:?}", other),
    }
    assert!(events.iter().any(|e| matches!(
        e,
        PickEvent::SlotUpdated { case_count: 1, .. }
    )));

    sleep(Duration::from_secs(1)).await;
    let outcome = h.session.process_scan(scan(VITAMINA_C)).await;
    assert_eq!(
        outcome,
        ScanOutcome::Incremented {
            code: VITAMINA_C.to_string(),
            case_count: 2
        }
    );

    sleep(Duration::from_millis(4900)).await;
    assert!(committed(&h.drain()).is_empty(), "committed before the quiet period");

    sleep(Duration::from_millis(200)).await;
    let jobs = committed(&h.drain());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].code, VITAMINA_C);
    assert_eq!(jobs[0].case_count, 2);
    assert_eq!(jobs[0].units_per_case, 12);
    assert_eq!(jobs[0].name, "Vitamina C - 100 tabs");

    sleep(Duration::from_secs(30)).await;
    assert!(committed(&h.drain()).is_empty());
    assert_eq!(h.inventory.committed().len(), 1);
    assert!(h.session.active_slot().await.is_none());
}

/// **Given:** N scans of one code with no other code in between
/// **Then:** One commit with caseCount N, never N commits
#[tokio::test(start_paused = true)]
async fn test_repeated_scans_commit_once() {
    let mut h = Harness::new();
    for _ in 0..7 {
        h.session.process_scan(scan(PARACETAMOL)).await;
        sleep(Duration::from_millis(300)).await;
    }

    sleep(Duration::from_secs(6)).await;
    let jobs = committed(&h.drain());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].case_count, 7);
    assert_eq!(h.faults.commit_calls(), 1);
}

/// **Given:** Code A is accumulating
/// **When:** Code B is scanned before A's timer fires
/// **Then:** A is committed before B's slot opens, and B commits later
#[tokio::test(start_paused = true)]
async fn test_code_change_commits_in_scan_order() {
    let mut h = Harness::new();
    h.session.process_scan(scan(VITAMINA_C)).await;
    h.session.process_scan(scan(VITAMINA_C)).await;
    h.drain();

    let outcome = h.session.process_scan(scan(OMEPRAZOL)).await;
    assert!(matches!(outcome, ScanOutcome::Opened { .. }));

    let events = h.drain();
    let committed_at = events
        .iter()
        .position(|e| matches!(e, PickEvent::Committed { job, .. } if job.code == VITAMINA_C))
        .expect("A committed on code change");
    let opened_at = events
        .iter()
        .position(|e| matches!(e, PickEvent::SlotUpdated { code, case_count: 1, .. } if code == OMEPRAZOL))
        .expect("B slot opened");
    assert!(committed_at < opened_at);

    sleep(Duration::from_secs(6)).await;
    let order: Vec<String> = h
        .inventory
        .committed()
        .into_iter()
        .map(|job| job.code)
        .collect();
    assert_eq!(order, vec![VITAMINA_C.to_string(), OMEPRAZOL.to_string()]);
}

/// **Given:** A product already in the cache
/// **When:** It is scanned again after the inventory changed it
/// **Then:** The cached product is shown first, then corrected in place
#[tokio::test(start_paused = true)]
async fn test_cached_product_shown_then_corrected() {
    let mut h = Harness::new();
    // Fill the cache, then move on so the slot is closed
    h.session.process_scan(scan(OMEPRAZOL)).await;
    h.session.process_scan(scan(PARACETAMOL)).await;
    sleep(Duration::from_secs(6)).await;
    h.drain();

    // Two hours later, with a new case size the cache does not know about
    h.clock.advance(chrono::Duration::hours(2));
    h.inventory.insert(CatalogItem {
        code: OMEPRAZOL.to_string(),
        name: "Omeprazol".to_string(),
        presentation: "20 caps".to_string(),
        units_per_case: 8,
        active: true,
        aliases: vec![],
    });

    let outcome = h.session.process_scan(scan(OMEPRAZOL)).await;
    assert!(matches!(outcome, ScanOutcome::Opened { .. }));

    let resolved: Vec<(bool, u32)> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            PickEvent::ScanResolved {
                optimistic,
                product,
                ..
            } => Some((optimistic, product.units_per_case)),
            _ => None,
        })
        .collect();
    assert_eq!(resolved, vec![(true, 6), (false, 8)]);
    assert_eq!(
        h.session.active_slot().await.unwrap().product.units_per_case,
        8
    );
}

/// **Given:** A product in the cache
/// **When:** The inventory lookup fails on a rescan
/// **Then:** The cached product is used and the slot opens
#[tokio::test(start_paused = true)]
async fn test_cached_product_survives_lookup_failure() {
    let mut h = Harness::new();
    h.session.process_scan(scan(OMEPRAZOL)).await;
    h.session.process_scan(scan(PARACETAMOL)).await;
    sleep(Duration::from_secs(6)).await;
    h.clock.advance(chrono::Duration::hours(2));
    h.drain();

    h.faults.fail_lookups(true);
    let outcome = h.session.process_scan(scan(OMEPRAZOL)).await;
    assert!(matches!(outcome, ScanOutcome::Opened { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_lookup_failure_without_cache_is_transient() {
    let mut h = Harness::new();
    h.faults.fail_lookups(true);

    let outcome = h.session.process_scan(scan(VITAMINA_C)).await;
    assert!(matches!(outcome, ScanOutcome::LookupFailed { .. }));
    assert!(h.drain().iter().any(|e| matches!(
        e,
        PickEvent::Error {
            kind: ErrorKind::LookupTransient,
            ..
        }
    )));
    assert!(h.session.active_slot().await.is_none());

    // The caller retries once the inventory is back
    h.faults.fail_lookups(false);
    let outcome = h.session.process_scan(scan(VITAMINA_C)).await;
    assert!(matches!(outcome, ScanOutcome::Opened { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_code_is_not_found() {
    let mut h = Harness::new();
    let outcome = h.session.process_scan(scan("555555555")).await;
    assert_eq!(
        outcome,
        ScanOutcome::NotFound {
            code: "555555555".to_string()
        }
    );

    let events = h.drain();
    assert_eq!(event_types(&events), vec!["Error"]);
    assert!(matches!(
        events[0],
        PickEvent::Error {
            kind: ErrorKind::NotFound,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_short_input_dropped_silently() {
    let mut h = Harness::new();
    assert_eq!(
        h.session.process_scan(scan(" 123 ")).await,
        ScanOutcome::TooShort
    );
    assert!(h.drain().is_empty());
    assert_eq!(h.faults.lookup_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_alias_scan_resolves_to_principal() {
    let h = Harness::new();
    h.session.process_scan(scan(VITAMINA_C_ALIAS)).await;

    let slot = h.session.active_slot().await.unwrap();
    assert_eq!(slot.code, VITAMINA_C_ALIAS);
    assert_eq!(slot.product.principal_code, VITAMINA_C);
    assert_eq!(slot.units_per_case(), 12);
}

/// **Given:** A scan still waiting on the inventory
/// **When:** A second scan arrives
/// **Then:** The second scan is dropped, the first completes
#[tokio::test(start_paused = true)]
async fn test_scan_while_busy_is_dropped() {
    let h = Harness::new();
    h.faults.delay_lookups(Duration::from_millis(300));

    let (first, second) = tokio::join!(
        h.session.process_scan(scan(VITAMINA_C)),
        h.session.process_scan(scan(PARACETAMOL))
    );
    assert!(matches!(first, ScanOutcome::Opened { .. }));
    assert_eq!(second, ScanOutcome::DroppedBusy);
    assert!(!h.session.is_busy());
    assert_eq!(h.session.active_slot().await.unwrap().code, VITAMINA_C);
}

/// **Given:** A modal dialog is open
/// **Then:** Scans are ignored and the auto-commit timer is held until close
#[tokio::test(start_paused = true)]
async fn test_modal_blocks_input_and_holds_timer() {
    let mut h = Harness::new();
    h.session.process_scan(scan(VITAMINA_C)).await;
    h.drain();

    h.session.set_modal_open(true).await;
    assert_eq!(
        h.session.process_scan(scan(VITAMINA_C)).await,
        ScanOutcome::Ignored
    );
    sleep(Duration::from_secs(20)).await;
    assert!(h.drain().is_empty());
    assert_eq!(h.session.active_slot().await.unwrap().case_count, 1);

    h.session.set_modal_open(false).await;
    sleep(Duration::from_millis(5100)).await;
    let jobs = committed(&h.drain());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].case_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_keyboard_burst_with_enter() {
    let h = Harness::new();
    h.session.input("1002");
    h.session.input("100200300");
    assert!(h.session.key(&KeyPress::enter()));

    sleep(Duration::from_millis(10)).await;
    let slot = h.session.active_slot().await.unwrap();
    assert_eq!(slot.code, VITAMINA_C);
    assert_eq!(slot.case_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_keyboard_burst_without_terminator() {
    let h = Harness::new();
    h.session.input("200300400");

    // Enter typed into another field does not finalize the scan
    let elsewhere = KeyPress {
        target: InputTarget::Other,
        ..KeyPress::enter()
    };
    assert!(!h.session.key(&elsewhere));

    sleep(Duration::from_millis(150)).await;
    assert_eq!(h.session.active_slot().await.unwrap().code, PARACETAMOL);
}

/// **Given:** An armed auto-commit timer
/// **When:** The slot is committed explicitly first
/// **Then:** The stale timer does not commit again
#[tokio::test(start_paused = true)]
async fn test_explicit_commit_cancels_timer() {
    let mut h = Harness::new();
    h.session.process_scan(scan(VITAMINA_C)).await;

    let outcome = h.session.commit_now().await;
    assert_eq!(outcome.committed_job().unwrap().case_count, 1);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(committed(&h.drain()).len(), 1);
    assert_eq!(h.faults.commit_calls(), 1);
    assert_eq!(h.session.commit_now().await, FlushOutcome::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_flushes_commit_once() {
    let h = Harness::new();
    h.session.process_scan(scan(VITAMINA_C)).await;

    let (a, b) = tokio::join!(h.session.commit_now(), h.session.commit_now());
    let committed = [&a, &b]
        .iter()
        .filter(|o| o.committed_job().is_some())
        .count();
    assert_eq!(committed, 1);
    assert!(a == FlushOutcome::Idle || b == FlushOutcome::Idle);
    assert_eq!(h.faults.commit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slot_edits_flow_into_commit() {
    let h = Harness::new();
    h.session.process_scan(scan(VITAMINA_C)).await;

    assert_eq!(h.session.set_units_per_case(10).await.unwrap(), 10);
    assert_eq!(h.session.set_case_count(3).await.unwrap(), 3);
    assert!(h.session.set_case_count(0).await.is_err());

    let job = h.session.commit_now().await.committed_job().cloned().unwrap();
    assert_eq!(job.case_count, 3);
    assert_eq!(job.units_per_case, 10);
    assert_eq!(job.total_units(), 30);

    assert!(h.session.set_case_count(2).await.is_err(), "no active slot");
}

/// **Given:** An active slot
/// **When:** The inventory reports the product changed
/// **Then:** The slot's product is refreshed in place
#[tokio::test(start_paused = true)]
async fn test_inventory_change_corrects_active_slot() {
    let mut h = Harness::new();
    h.session.process_scan(scan(VITAMINA_C)).await;
    h.drain();

    h.inventory.insert(CatalogItem {
        code: VITAMINA_C.to_string(),
        name: "Vitamina C".to_string(),
        presentation: "60 tabs".to_string(),
        units_per_case: 20,
        active: true,
        aliases: vec![VITAMINA_C_ALIAS.to_string()],
    });
    h.session
        .apply_inventory_change(&[VITAMINA_C.to_string()])
        .await;

    let slot = h.session.active_slot().await.unwrap();
    assert_eq!(slot.units_per_case(), 20);
    assert_eq!(slot.case_count, 1);
    assert!(h.drain().iter().any(|e| matches!(
        e,
        PickEvent::ScanResolved {
            optimistic: false,
            ..
        }
    )));

    let job = h.session.commit_now().await.committed_job().cloned().unwrap();
    assert_eq!(job.name, "Vitamina C - 60 tabs");
}
