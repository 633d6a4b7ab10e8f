use super::*;

#[test]
fn codes_are_stable() {
    assert_eq!(SyncError::InvalidArgument("x").code(), "E_INVALID_ARGUMENT");
    assert_eq!(
        SyncError::NotFound { collection: "apoiados".into(), id: "a1".into() }.code(),
        "E_NOT_FOUND"
    );
    assert_eq!(SyncError::Store(StoreError::Unavailable("net".into())).code(), "E_STORE");
}

#[test]
fn store_not_found_maps_to_not_found() {
    let err = SyncError::from(StoreError::NotFound { collection: "apoiados".into(), id: "a1".into() });
    assert!(matches!(err, SyncError::NotFound { ref collection, ref id } if collection == "apoiados" && id == "a1"));
}

#[test]
fn other_store_errors_pass_through() {
    let err = SyncError::from(StoreError::PermissionDenied("rules".into()));
    assert!(matches!(err, SyncError::Store(StoreError::PermissionDenied(_))));
    assert_eq!(err.to_string(), "permission denied: rules");
}
