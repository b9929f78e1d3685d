//! Behaviour every backend must share, written once against `dyn Storage`.

#![allow(dead_code)]

use snip_core::{BatchRequestRecord, Storage, StorageError, UrlId};

pub const YA: &str = "https://ya.ru";
pub const GOOGLE: &str = "https://google.com";

pub fn batch(items: &[(&str, &str)]) -> Vec<BatchRequestRecord> {
    items
        .iter()
        .map(|(correlation_id, url)| BatchRequestRecord {
            correlation_id: correlation_id.to_string(),
            original_url: url.to_string(),
        })
        .collect()
}

pub async fn ids_are_strictly_increasing(storage: &dyn Storage) {
    let mut last: UrlId = 0;
    for i in 0..20 {
        let id = storage
            .store(&format!("https://example.com/{i}"), "u1")
            .await
            .unwrap();
        assert!(id > last, "id {id} did not grow past {last}");
        last = id;
    }
}

/// Store, duplicate, resolve, delete, read the tombstone, list.
pub async fn shorten_duplicate_delete_scenario(storage: &dyn Storage) {
    let id = storage.store(YA, "u1").await.unwrap();

    let err = storage.store(YA, "u1").await.unwrap_err();
    assert!(matches!(err, StorageError::Duplicate(_)), "got {err:?}");

    let existing = storage.get_by_url(YA).await.unwrap();
    assert_eq!(existing.id, id);
    assert_eq!(existing.added_by, "u1");

    storage.delete_by_id(id).await.unwrap();
    storage.delete_by_id(id).await.unwrap();

    let row = storage.get_by_id(id).await.unwrap();
    assert_eq!(row.id, id);
    assert!(row.is_deleted);

    let err = storage.get_all_user_urls("u1").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    assert!(storage.get_by_url(YA).await.unwrap_err().is_not_found());
}

pub async fn unknown_ids(storage: &dyn Storage) {
    assert!(storage.get_by_id(404).await.unwrap_err().is_not_found());
    assert!(storage.get_by_id_multi(&[404, 405]).await.unwrap().is_empty());
    storage.delete_by_id_multi(&[404, 405]).await.unwrap();
    storage.delete_by_id_multi(&[]).await.unwrap();
}

pub async fn get_by_id_multi_is_partial_and_sorted(storage: &dyn Storage) {
    let ya = storage.store(YA, "u1").await.unwrap();
    let google = storage.store(GOOGLE, "u2").await.unwrap();
    storage.delete_by_id(google).await.unwrap();

    let rows = storage
        .get_by_id_multi(&[google, 9999, ya, ya])
        .await
        .unwrap();

    let ids: Vec<UrlId> = rows.iter().map(|row| row.id).collect();
    assert_eq!(ids, vec![ya, google]);
    assert!(rows[1].is_deleted);
}

pub async fn listing_is_per_owner(storage: &dyn Storage) {
    let ya = storage.store(YA, "u1").await.unwrap();
    let google = storage.store(GOOGLE, "u1").await.unwrap();
    storage.store("https://other.org", "u2").await.unwrap();

    let rows = storage.get_all_user_urls("u1").await.unwrap();
    let ids: Vec<UrlId> = rows.iter().map(|row| row.id).collect();
    assert_eq!(ids, vec![ya, google]);
    assert!(rows.iter().all(|row| row.added_by == "u1" && !row.is_deleted));
}

pub async fn batch_correlation_round_trip(storage: &dyn Storage) {
    let existing = storage.store(GOOGLE, "u0").await.unwrap();

    let input = batch(&[
        ("first", "https://a.example"),
        ("second", GOOGLE),
        ("third", "https://b.example"),
        ("fourth", "https://a.example"),
    ]);
    let output = storage.store_batch(&input, "u1").await.unwrap();

    assert_eq!(output.len(), input.len());
    for (request, response) in input.iter().zip(&output) {
        assert_eq!(request.correlation_id, response.correlation_id);
        let row = storage.get_by_id(response.id).await.unwrap();
        assert_eq!(row.original_url, request.original_url);
    }

    assert!(!output[0].duplicate);
    assert_eq!(output[1].id, existing);
    assert!(output[1].duplicate);
    assert!(!output[2].duplicate);
    assert_eq!(output[3].id, output[0].id);
    assert!(output[3].duplicate);

    assert!(storage.store_batch(&[], "u1").await.unwrap().is_empty());
}

pub async fn tombstoned_url_can_be_reshortened(storage: &dyn Storage) {
    let first = storage.store(YA, "u1").await.unwrap();
    storage.delete_by_id_multi(&[first]).await.unwrap();

    let second = storage.store(YA, "u2").await.unwrap();
    assert!(second > first);
    assert_eq!(storage.get_by_url(YA).await.unwrap().id, second);
}
