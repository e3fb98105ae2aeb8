mod support;

use std::sync::Arc;
use std::time::Duration;

use access_sync::{
    retry_failed, AccessStatus, AccessSyncService, AccountCredential, BulkItem, CancellationToken,
    MemoryAccessStore, PlatformType, Reconciler,
};
use support::{account, active, pending, registry_of, FakeProvider};

fn store_with(accounts: &[(&str, PlatformType)]) -> Arc<MemoryAccessStore> {
    let store = Arc::new(MemoryAccessStore::new());
    for (id, platform) in accounts {
        store.insert_account(
            account(id, "tenant-1", *platform, &format!("ext-{id}")),
            AccountCredential::new(format!("refresh-{id}")),
        );
    }
    store
}

#[tokio::test]
async fn reconcile_isolates_failing_account() {
    let ads = Arc::new(FakeProvider::listing(
        PlatformType::GoogleAds,
        vec![
            pending("Alice@Example.com", "STANDARD"),
            active("alice@example.com", "STANDARD"),
            active("bob@example.com", "ADMIN"),
        ],
    ));
    let linkedin = Arc::new(FakeProvider::failing_list(PlatformType::LinkedinAds));
    let store = store_with(&[("A", PlatformType::GoogleAds), ("B", PlatformType::LinkedinAds)]);
    let reconciler = Reconciler::new(registry_of(vec![ads, linkedin]), store.clone(), 4);

    let report = reconciler
        .reconcile("tenant-1", &CancellationToken::new())
        .await
        .expect("reconcile never raises for per-account failures");

    assert_eq!(report.accounts_reconciled, 1);
    assert_eq!(report.reconciled[0].account_id, "A");
    assert_eq!(report.reconciled[0].users.len(), 2);
    assert_eq!(report.reconciled[0].users[0].status, AccessStatus::Active);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].account_id, "B");
    assert!(report.errors[0].message.starts_with("TRANSPORT_ERROR"));

    let stored = store.records_for("A");
    assert_eq!(stored.len(), 2);
    assert!(store.records_for("B").is_empty());
}

#[tokio::test]
async fn reconcile_reports_platform_without_listing() {
    let meta = Arc::new(FakeProvider::write_only(PlatformType::MetaAds));
    let store = store_with(&[("M", PlatformType::MetaAds), ("T", PlatformType::GoogleTagManager)]);
    let reconciler = Reconciler::new(registry_of(vec![meta.clone()]), store, 2);

    let report = reconciler
        .reconcile("tenant-1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.accounts_reconciled, 0);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|e| e.message.starts_with("UNSUPPORTED")));
    assert_eq!(meta.calls(), 0);
}

#[tokio::test]
async fn reconcile_respects_concurrency_bound() {
    let ads = Arc::new(
        FakeProvider::listing(PlatformType::GoogleAds, vec![active("x@example.com", "ADMIN")])
            .with_delay(Duration::from_millis(25)),
    );
    let ids: Vec<String> = (0..8).map(|i| format!("acct-{i}")).collect();
    let accounts: Vec<(&str, PlatformType)> = ids
        .iter()
        .map(|id| (id.as_str(), PlatformType::GoogleAds))
        .collect();
    let store = store_with(&accounts);
    let reconciler = Reconciler::new(registry_of(vec![ads.clone()]), store, 2);

    let report = reconciler
        .reconcile("tenant-1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.accounts_reconciled, 8);
    assert_eq!(ads.calls(), 8);
    assert!(ads.max_in_flight.load(std::sync::atomic::Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn cancelled_reconcile_starts_no_new_accounts() {
    let ads = Arc::new(FakeProvider::listing(PlatformType::GoogleAds, Vec::new()));
    let store = store_with(&[("A", PlatformType::GoogleAds), ("B", PlatformType::GoogleAds)]);
    let reconciler = Reconciler::new(registry_of(vec![ads.clone()]), store, 1);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = reconciler.reconcile("tenant-1", &cancel).await.unwrap();

    assert_eq!(ads.calls(), 0);
    assert_eq!(report.cancelled.len(), 2);
    assert!(report.errors.is_empty());
    assert_eq!(report.accounts_reconciled, 0);
}

#[tokio::test]
async fn reconcile_only_touches_the_requested_tenant() {
    let ads = Arc::new(FakeProvider::listing(PlatformType::GoogleAds, Vec::new()));
    let store = store_with(&[("A", PlatformType::GoogleAds)]);
    store.insert_account(
        account("other", "tenant-2", PlatformType::GoogleAds, "ext-other"),
        AccountCredential::new("r"),
    );
    let reconciler = Reconciler::new(registry_of(vec![ads.clone()]), store, 4);

    let report = reconciler
        .reconcile("tenant-1", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.accounts_reconciled, 1);
    assert_eq!(ads.calls(), 1);
}

fn service(providers: Vec<Arc<FakeProvider>>, store: Arc<MemoryAccessStore>) -> AccessSyncService {
    AccessSyncService::new(registry_of(providers), store, 2, 3)
}

#[tokio::test]
async fn bulk_remove_returns_one_result_per_item() {
    let ads = Arc::new(FakeProvider::listing(PlatformType::GoogleAds, Vec::new()).failing_for("fail"));
    let store = store_with(&[("A", PlatformType::GoogleAds)]);
    let svc = service(vec![ads.clone()], store);

    let items = vec![
        BulkItem::new("google_ads", "ok1@example.com", "A"),
        BulkItem::new("google_ads", "fail1@example.com", "A"),
        BulkItem::new("google_ads", "ok2@example.com", "A"),
        BulkItem::new("tiktok_ads", "ok3@example.com", "A"),
        BulkItem::new("google_ads", "ok4@example.com", "missing-account"),
        BulkItem::new("google_ads", "fail2@example.com", "A"),
    ];
    let result = svc.bulk_remove(&items).await;

    assert_eq!(result.results.len(), items.len());
    assert_eq!(result.failed_count(), 4);
    for (item, outcome) in items.iter().zip(&result.results) {
        assert_eq!(outcome.id, item.id());
    }
    assert!(result.results[3].message.contains("not supported"));
    assert!(result.results[4].message.starts_with("NOT_FOUND"));
    assert!(result.results[1].message.contains("remote rejected"));

    let retry = retry_failed(&items, &result);
    assert_eq!(
        retry.iter().map(|i| i.email.as_str()).collect::<Vec<_>>(),
        vec!["fail1@example.com", "ok3@example.com", "ok4@example.com", "fail2@example.com"]
    );
    // Only the four known-platform, known-account items reached the adapter.
    assert_eq!(ads.calls(), 4);
}

#[tokio::test]
async fn bulk_respects_concurrency_bound() {
    let ads = Arc::new(
        FakeProvider::listing(PlatformType::GoogleAds, Vec::new())
            .with_delay(Duration::from_millis(20)),
    );
    let store = store_with(&[("A", PlatformType::GoogleAds)]);
    let svc = service(vec![ads.clone()], store);
    let items: Vec<BulkItem> = (0..9)
        .map(|i| BulkItem::new("google_ads", format!("u{i}@example.com"), "A"))
        .collect();

    let result = svc.bulk_remove(&items).await;

    assert_eq!(result.results.len(), 9);
    assert_eq!(result.failed_count(), 0);
    assert_eq!(ads.calls(), 9);
    let peak = ads.max_in_flight.load(std::sync::atomic::Ordering::SeqCst);
    // The facade runs bulk operations three at a time.
    assert!(peak <= 3, "peak in-flight {peak}");
    assert!(peak >= 2, "items never overlapped: {peak}");
}

#[tokio::test]
async fn bulk_resend_and_invite_share_the_cardinality_contract() {
    let ads = Arc::new(FakeProvider::listing(PlatformType::GoogleAds, Vec::new()));
    let store = store_with(&[("A", PlatformType::GoogleAds)]);
    let svc = service(vec![ads.clone()], store);
    let items: Vec<BulkItem> = (0..5)
        .map(|i| BulkItem::new("google_ads", format!("u{i}@example.com"), "A").with_role("ADMIN"))
        .collect();

    let resent = svc.bulk_resend(&items).await;
    assert_eq!(resent.results.len(), 5);
    assert_eq!(resent.failed_count(), 0);

    let invited = svc.bulk_invite(&[]).await;
    assert!(invited.results.is_empty());
    assert_eq!(ads.calls(), 5);
}

#[tokio::test]
async fn bulk_item_on_wrong_platform_account_fails_alone() {
    let ads = Arc::new(FakeProvider::listing(PlatformType::GoogleAds, Vec::new()));
    let meta = Arc::new(FakeProvider::write_only(PlatformType::MetaAds));
    let store = store_with(&[("A", PlatformType::GoogleAds)]);
    let svc = service(vec![ads, meta.clone()], store);

    let result = svc
        .bulk_remove(&[
            BulkItem::new("meta_ads", "x@example.com", "A"),
            BulkItem::new("google_ads", "x@example.com", "A"),
        ])
        .await;
    assert!(!result.results[0].success);
    assert!(result.results[0].message.starts_with("SEC_INVALID_INPUT"));
    assert!(result.results[1].success);
    assert_eq!(meta.calls(), 0);
}

#[tokio::test]
async fn facade_reports_unsupported_platforms_without_error() {
    let meta = Arc::new(FakeProvider::write_only(PlatformType::MetaAds));
    let store = store_with(&[("M", PlatformType::MetaAds)]);
    let svc = service(vec![meta], store);

    let listing = svc.list_users("meta_ads", "M").await.unwrap();
    assert!(!listing.supported);

    let listing = svc.list_users("google_ads", "M").await.unwrap();
    assert!(!listing.supported);

    let invite = svc
        .invite("tiktok_ads", "a@example.com", "ADMIN", "M")
        .await
        .unwrap();
    assert!(!invite.success);
    assert!(invite.message.contains("not supported"));
}

#[tokio::test]
async fn facade_list_deduplicates_records() {
    let ads = Arc::new(FakeProvider::listing(
        PlatformType::GoogleAds,
        vec![
            pending("dup@example.com", "READ_ONLY"),
            active("DUP@example.com", "READ_ONLY"),
        ],
    ));
    let store = store_with(&[("A", PlatformType::GoogleAds)]);
    let svc = service(vec![ads], store);

    let listing = svc.list_users("google_ads", "A").await.unwrap();
    assert!(listing.supported);
    assert_eq!(listing.users.len(), 1);
    assert_eq!(listing.users[0].status, AccessStatus::Active);
}

#[tokio::test]
async fn facade_reconcile_uses_configured_store() {
    let ads = Arc::new(FakeProvider::listing(
        PlatformType::GoogleAds,
        vec![active("z@example.com", "ADMIN")],
    ));
    let store = store_with(&[("A", PlatformType::GoogleAds)]);
    let svc = service(vec![ads], store.clone());

    let report = svc.reconcile("tenant-1").await.unwrap();
    assert_eq!(report.accounts_reconciled, 1);
    assert_eq!(store.records_for("A").len(), 1);
}
