use async_trait::async_trait;
use authz::{Decision, Principal, Requirement, Role};
use backoffice::{BackOffice, BackOfficeConfig, BackOfficeError};
use cancellation::{cancel_pair, CancelSignal};
use json_cache::{AlbumRecord, CatalogSource, MemoryCache, Price, RedbCache};
use membership::{DirectoryConfig, InMemoryDirectory, MembershipError, PrincipalDirectory, SqliteDirectory};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> BackOfficeConfig {
    let mut config = BackOfficeConfig::default();
    config.policies.insert(
        "EditCatalog".to_string(),
        vec![Requirement::claim("EditAlbums")],
    );
    config
}

async fn back_office() -> (Arc<InMemoryDirectory>, BackOffice) {
    let directory = Arc::new(InMemoryDirectory::new());
    directory
        .add_principal(
            Principal::new("u-editor", "erin").with_claim("EditAlbums", "EditAlbums"),
        )
        .await;
    directory
        .add_principal(
            Principal::new("u-admin", "dave")
                .with_email("dave@126.com")
                .with_role(Role::new("r-admin", "Administrators")),
        )
        .await;
    directory.add_principal(Principal::new("u-plain", "frank")).await;

    let office = BackOffice::new(
        &config(),
        directory.clone(),
        Arc::new(MemoryCache::new()),
    )
    .unwrap();
    (directory, office)
}

struct Catalog {
    calls: AtomicUsize,
}

#[async_trait]
impl CatalogSource for Catalog {
    async fn all_albums(&self) -> anyhow::Result<Vec<AlbumRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![AlbumRecord {
            id: 7,
            title: "Painkiller".into(),
            artist: "Judas Priest".into(),
            price: Price::from_cents(1450),
            release_date: "1990-09-03".parse().unwrap(),
            cover_url: "/covers/painkiller.jpg".into(),
        }])
    }
}

#[tokio::test]
async fn scenario_allow_with_claim() {
    let (_, office) = back_office().await;
    let decision = office
        .authorize("u-editor", "EditCatalog", &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(decision, Decision::Allow);
}

#[tokio::test]
async fn scenario_deny_without_claim() {
    let (_, office) = back_office().await;
    let decision = office
        .authorize("u-plain", "EditCatalog", &CancelSignal::never())
        .await
        .unwrap();
    assert!(decision.is_denied());
    assert_eq!(decision.reasons(), vec!["ClaimRequirement:EditAlbums".to_string()]);
}

#[tokio::test]
async fn scenario_unknown_policy_and_principal() {
    let (_, office) = back_office().await;
    let never = CancelSignal::never();

    let err = office.authorize("u-editor", "Nope", &never).await.unwrap_err();
    assert!(matches!(
        err,
        BackOfficeError::Authz(authz::AuthzError::UnknownPolicy(ref name)) if name == "Nope"
    ));

    let err = office
        .authorize("ghost", "EditCatalog", &never)
        .await
        .unwrap_err();
    assert!(matches!(err, BackOfficeError::PrincipalNotFound(_)));
}

#[tokio::test]
async fn scenario_cancelled_authorization() {
    let (_, office) = back_office().await;
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let decision = office
        .authorize("u-editor", "EditCatalog", &signal)
        .await
        .unwrap();
    assert_eq!(decision, Decision::Cancelled);
}

#[tokio::test]
async fn scenario_membership_edit_changes_next_decision() {
    let (_, office) = back_office().await;
    let never = CancelSignal::never();

    let before = office
        .authorize("u-plain", "AdministratorsOnly", &never)
        .await
        .unwrap();
    assert!(before.is_denied());

    office
        .reconciler()
        .set_role_membership("u-plain", "r-admin", true, &never)
        .await
        .unwrap();

    let after = office
        .authorize("u-plain", "AdministratorsOnly", &never)
        .await
        .unwrap();
    assert!(after.is_allowed());
}

#[tokio::test]
async fn scenario_duplicate_role() {
    let (_, office) = back_office().await;
    let never = CancelSignal::never();

    // "Administrators" was seeded with the admin principal
    let err = office
        .reconciler()
        .add_role("Administrators", &never)
        .await
        .unwrap_err();
    assert_eq!(err, MembershipError::DuplicateRole("Administrators".into()));

    office.reconciler().add_role("Moderators", &never).await.unwrap();
    let err = office
        .reconciler()
        .add_role("Moderators", &never)
        .await
        .unwrap_err();
    assert_eq!(err, MembershipError::DuplicateRole("Moderators".into()));
}

#[tokio::test]
async fn scenario_idempotent_membership_and_detach() {
    let (directory, office) = back_office().await;
    let never = CancelSignal::never();
    let reconciler = office.reconciler();

    reconciler
        .set_role_membership("u-editor", "r-admin", true, &never)
        .await
        .unwrap();
    reconciler
        .set_role_membership("u-editor", "r-admin", true, &never)
        .await
        .unwrap();
    let erin = directory.find_principal("u-editor").await.unwrap().unwrap();
    assert_eq!(erin.roles.len(), 1);

    let err = reconciler
        .set_role_membership("u-plain", "r-admin", false, &never)
        .await
        .unwrap_err();
    assert!(matches!(err, MembershipError::NotAMember { .. }));

    reconciler
        .detach_claim("u-plain", "EditAlbums", &never)
        .await
        .unwrap();
}

#[tokio::test]
async fn scenario_catalog_listing_cached_until_invalidated() {
    let (_, office) = back_office().await;
    let never = CancelSignal::never();
    let catalog = Catalog {
        calls: AtomicUsize::new(0),
    };

    let first = office.albums_of_today(&catalog, &never).await.unwrap();
    let second = office.albums_of_today(&catalog, &never).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);

    office.invalidate_albums(&never).await.unwrap();
    office.albums_of_today(&catalog, &never).await.unwrap();
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn scenario_available_claims_from_catalogue() {
    let (_, office) = back_office().await;
    let never = CancelSignal::never();

    office
        .reconciler()
        .attach_claim("u-plain", "Edit Albums", "Edit Albums", &never)
        .await
        .unwrap();
    let available = office.available_claims("u-plain", &never).await.unwrap();
    assert_eq!(
        available,
        vec!["Add Albums".to_string(), "Delete Albums".to_string()]
    );
}

#[tokio::test]
async fn scenario_persistent_stores() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.cache.path = dir.path().join("cache.redb");
    config.directory.database_path = dir.path().join("directory.db");

    let directory = SqliteDirectory::connect(&DirectoryConfig::from(&config.directory))
        .await
        .unwrap();
    directory
        .add_principal(&Principal::new("u1", "erin").with_claim("EditAlbums", "EditAlbums"))
        .await
        .unwrap();
    directory.close().await;

    let office = BackOffice::open(&config).await.unwrap();
    let never = CancelSignal::never();
    assert!(office
        .authorize("u1", "EditCatalog", &never)
        .await
        .unwrap()
        .is_allowed());

    let catalog = Catalog {
        calls: AtomicUsize::new(0),
    };
    office.albums_of_today(&catalog, &never).await.unwrap();
    office.albums_of_today(&catalog, &never).await.unwrap();
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    drop(office);

    let stats = RedbCache::open(PathBuf::from(&config.cache.path))
        .unwrap()
        .stats()
        .unwrap();
    assert_eq!(stats.total_entries, 1);
}
