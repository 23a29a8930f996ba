//! CRUD behaviour of collection handles over the in-memory store.

use bson::{Bson, Document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use docshim_core::{
    backend::StoreBackendBuilder,
    client::DatabaseClient,
    document::{ID_FIELD, Record},
    error::DocumentStoreError,
    projection::Projection,
    query::{Expr, Filter, Query, SortDirection},
    results::InsertMode,
    update::Update,
};
use docshim_memory::InMemoryStore;

const USERS: &str = "users_data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    age: i32,
    city: String,
    #[serde(default)]
    interests: Vec<String>,
}

impl Record for User {
    fn collection_name() -> &'static str {
        USERS
    }
}

fn sample_users() -> Vec<Document> {
    vec![
        doc! { "name": "Alice", "age": 30, "city": "New York", "interests": ["reading", "hiking"] },
        doc! { "name": "Bob", "age": 25, "city": "London", "interests": ["gaming", "coding"] },
        doc! { "name": "Charlie", "age": 35, "city": "Paris", "interests": ["traveling", "cooking", "gaming"] },
        doc! { "name": "Diana", "age": 28, "city": "New York", "interests": ["sports"] },
    ]
}

fn names(documents: &[Document]) -> Vec<&str> {
    documents
        .iter()
        .map(|document| document.get_str("name").unwrap())
        .collect()
}

async fn connect() -> DatabaseClient<InMemoryStore> {
    DatabaseClient::connect(InMemoryStore::new()).await.unwrap()
}

#[tokio::test]
async fn inserted_document_is_found_by_its_id() {
    let client = connect().await;
    let users = client.collection(USERS);

    let id = users
        .insert_one(doc! { "name": "Alice", "age": 30 })
        .await
        .unwrap();

    assert!(matches!(id, Bson::ObjectId(_)));

    let found = users.find_one(Filter::eq(ID_FIELD, id.clone())).await.unwrap().unwrap();
    assert_eq!(found.get(ID_FIELD), Some(&id));
    assert_eq!(found.get_str("name").unwrap(), "Alice");
    assert_eq!(found.get_i32("age").unwrap(), 30);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn caller_supplied_id_is_kept() {
    let client = connect().await;
    let products = client.collection("products_inventory");

    let id = products
        .insert_one(doc! { "_id": "P001", "productName": "Laptop Pro" })
        .await
        .unwrap();

    assert_eq!(id, Bson::String("P001".to_string()));
    assert_eq!(products.count_documents(Filter::eq(ID_FIELD, "P001")).await.unwrap(), 1);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn find_one_without_match_is_none() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_many(sample_users()).await.unwrap();

    assert!(users.find_one(Filter::eq("name", "Zoe")).await.unwrap().is_none());
    assert!(client.collection("missing").find_one(Filter::all()).await.unwrap().is_none());

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn reads_follow_filters() {
    let client = connect().await;
    let users = client.collection(USERS);

    let ids = users.insert_many(sample_users()).await.unwrap();
    assert_eq!(ids.len(), 4);

    let all = users.find(Filter::all()).await.unwrap().try_collect_all().await.unwrap();
    assert_eq!(names(&all), ["Alice", "Bob", "Charlie", "Diana"]);

    let older = users.find(Filter::gt("age", 30)).await.unwrap().try_collect_all().await.unwrap();
    assert_eq!(names(&older), ["Charlie"]);

    let gamers = users
        .find(Filter::eq("interests", "gaming"))
        .await
        .unwrap()
        .try_collect_all()
        .await
        .unwrap();
    assert_eq!(names(&gamers), ["Bob", "Charlie"]);

    let both = Expr::try_from(&doc! { "interests": { "$all": ["reading", "hiking"] } }).unwrap();
    let both = users.find(both).await.unwrap().try_collect_all().await.unwrap();
    assert_eq!(names(&both), ["Alice"]);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn sort_offset_and_limit_page_through_results() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_many(sample_users()).await.unwrap();

    let query = Query::builder()
        .sort("age", SortDirection::Desc)
        .offset(1)
        .limit(2)
        .build();

    let page = users.find(query).await.unwrap().try_collect_all().await.unwrap();
    assert_eq!(names(&page), ["Alice", "Diana"]);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn projection_keeps_only_name_and_city() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_many(sample_users()).await.unwrap();

    let query = Query::builder()
        .projection(Projection::new().include("name").include("city").exclude(ID_FIELD))
        .build();

    let projected = users.find(query).await.unwrap().try_collect_all().await.unwrap();

    assert_eq!(projected.len(), 4);
    assert_eq!(projected[0], doc! { "name": "Alice", "city": "New York" });
    assert!(projected.iter().all(|document| document.len() == 2));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let client = connect().await;
    let users = client.collection(USERS);

    users.insert_one(doc! { "_id": 1, "name": "Alice" }).await.unwrap();
    let err = users
        .insert_one(doc! { "_id": 1, "name": "Impostor" })
        .await
        .unwrap_err();

    assert!(err.is_duplicate_key());
    assert_eq!(users.count_documents(Filter::all()).await.unwrap(), 1);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn all_or_nothing_batch_stores_nothing_on_collision() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_one(doc! { "_id": 2, "name": "Bob" }).await.unwrap();

    let err = users
        .insert_many(vec![
            doc! { "_id": 1, "name": "Alice" },
            doc! { "_id": 2, "name": "Bob again" },
            doc! { "_id": 3, "name": "Charlie" },
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentStoreError::DuplicateKey { .. }));

    let err = users
        .insert_many(vec![doc! { "_id": 4, "name": "Diana" }, doc! { "_id": 4, "name": "Diana" }])
        .await
        .unwrap_err();
    assert!(err.is_duplicate_key());

    let err = users
        .insert_many(vec![doc! { "_id": 5, "name": "Evelyn" }, doc! { "$name": "Frank" }])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentStoreError::Validation(_)));

    assert_eq!(users.count_documents(Filter::all()).await.unwrap(), 1);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn best_effort_batch_reports_failures_by_index() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_one(doc! { "_id": 2, "name": "Bob" }).await.unwrap();

    let outcome = users
        .insert_many_with(
            vec![
                doc! { "_id": 1, "name": "Alice" },
                doc! { "_id": 2, "name": "Bob again" },
                doc! { "bad.key": true },
                doc! { "_id": 3, "name": "Charlie" },
                doc! { "_id": 3, "name": "Charlie again" },
            ],
            InsertMode::BestEffort,
        )
        .await
        .unwrap();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.inserted_ids, vec![Bson::Int32(1), Bson::Int32(3)]);

    let failed = outcome.failures.iter().map(|(index, _)| *index).collect::<Vec<_>>();
    assert_eq!(failed, [1, 2, 4]);
    assert!(outcome.failures[0].1.is_duplicate_key());
    assert!(matches!(outcome.failures[1].1, DocumentStoreError::Validation(_)));

    assert_eq!(users.count_documents(Filter::all()).await.unwrap(), 3);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn empty_batch_inserts_nothing() {
    let client = connect().await;

    let ids = client.collection(USERS).insert_many(Vec::new()).await.unwrap();

    assert!(ids.is_empty());
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn updates_report_matched_and_modified_counts() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_many(sample_users()).await.unwrap();

    let result = users
        .update_one(Filter::eq("name", "Alice"), Update::new().set("city", "San Francisco"))
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 1));

    let alice = users.find_one(Filter::eq("name", "Alice")).await.unwrap().unwrap();
    assert_eq!(alice.get_str("city").unwrap(), "San Francisco");

    let result = users
        .update_many(Filter::eq("city", "New York"), Update::new().inc("age", 1))
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 1));

    let diana = users.find_one(Filter::eq("name", "Diana")).await.unwrap().unwrap();
    assert_eq!(diana.get_i32("age").unwrap(), 29);

    let result = users
        .update_one(Filter::eq("name", "Bob"), Update::new().set("city", "London"))
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 0));

    let result = users
        .update_many(Filter::eq("name", "Zoe"), Update::new().set("city", "Rome"))
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (0, 0));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn increments_accumulate() {
    let client = connect().await;
    let counters = client.collection("counters");
    counters.insert_one(doc! { "_id": "hits", "value": 10 }).await.unwrap();

    for amount in [1, 2, 3, -4] {
        counters
            .update_one(Filter::eq(ID_FIELD, "hits"), Update::new().inc("value", amount))
            .await
            .unwrap();
    }

    let counter = counters.find_one(Filter::eq(ID_FIELD, "hits")).await.unwrap().unwrap();
    assert_eq!(counter.get_i32("value").unwrap(), 12);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn increments_sum_across_single_and_batch_updates() {
    let client = connect().await;
    let counters = client.collection("counters");
    counters
        .insert_many(vec![
            doc! { "_id": "a", "group": "x", "value": 0 },
            doc! { "_id": "b", "group": "x", "value": 100 },
        ])
        .await
        .unwrap();

    let x = || Filter::eq("group", "x");
    let a = || Filter::eq(ID_FIELD, "a");

    counters.update_many(x(), Update::new().inc("value", 5)).await.unwrap();
    counters.update_one(a(), Update::new().inc("value", 7)).await.unwrap();
    counters.update_many(x(), Update::new().inc("value", -2)).await.unwrap();
    counters.update_one(a(), Update::new().inc("value", 10)).await.unwrap();
    let result = counters.update_many(x(), Update::new().inc("value", 1)).await.unwrap();
    assert_eq!((result.matched_count, result.modified_count), (2, 2));

    let a = counters.find_one(a()).await.unwrap().unwrap();
    let b = counters.find_one(Filter::eq(ID_FIELD, "b")).await.unwrap().unwrap();
    assert_eq!(a.get_i32("value").unwrap(), 5 + 7 - 2 + 10 + 1);
    assert_eq!(b.get_i32("value").unwrap(), 100 + 5 - 2 + 1);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn large_integer_ids_stay_distinct() {
    let client = connect().await;
    let events = client.collection("events");

    events
        .insert_one(doc! { "_id": 9_007_199_254_740_992_i64, "n": "a" })
        .await
        .unwrap();
    events
        .insert_one(doc! { "_id": 9_007_199_254_740_993_i64, "n": "b" })
        .await
        .unwrap();

    let found = events
        .find_one(Filter::eq(ID_FIELD, 9_007_199_254_740_993_i64))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get_str("n").unwrap(), "b");
    assert_eq!(events.count_documents(Filter::all()).await.unwrap(), 2);

    assert!(
        events
            .insert_one(doc! { "_id": 9_007_199_254_740_993_i64, "n": "c" })
            .await
            .unwrap_err()
            .is_duplicate_key()
    );

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn add_to_set_is_idempotent_and_pull_removes_every_occurrence() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_many(sample_users()).await.unwrap();

    for _ in 0..2 {
        users
            .update_one(Filter::eq("name", "Bob"), Update::new().add_to_set("interests", "traveling"))
            .await
            .unwrap();
    }

    let bob = users.find_one(Filter::eq("name", "Bob")).await.unwrap().unwrap();
    assert_eq!(bob.get_array("interests").unwrap(), &vec![
        Bson::from("gaming"),
        Bson::from("coding"),
        Bson::from("traveling"),
    ]);

    let result = users
        .update_one(Filter::eq("name", "Charlie"), Update::new().pull("interests", "gaming"))
        .await
        .unwrap();
    assert_eq!(result.modified_count, 1);

    users
        .update_one(Filter::eq("name", "Charlie"), Update::new().add_to_set("interests", "gaming"))
        .await
        .unwrap();

    let charlie = users.find_one(Filter::eq("name", "Charlie")).await.unwrap().unwrap();
    assert_eq!(charlie.get_array("interests").unwrap(), &vec![
        Bson::from("traveling"),
        Bson::from("cooking"),
        Bson::from("gaming"),
    ]);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn failing_update_leaves_every_document_untouched() {
    let client = connect().await;
    let users = client.collection(USERS);
    users
        .insert_many(vec![
            doc! { "name": "Alice", "age": 30 },
            doc! { "name": "Bob", "age": "unknown" },
        ])
        .await
        .unwrap();

    let err = users
        .update_many(Filter::all(), Update::new().inc("age", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentStoreError::Validation(_)));

    let alice = users.find_one(Filter::eq("name", "Alice")).await.unwrap().unwrap();
    assert_eq!(alice.get_i32("age").unwrap(), 30);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn deletes_remove_first_or_every_match() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_many(sample_users()).await.unwrap();

    let result = users.delete_one(Filter::eq("name", "Diana")).await.unwrap();
    assert_eq!(result.deleted_count, 1);
    assert_eq!(users.count_documents(Filter::all()).await.unwrap(), 3);

    let result = users.delete_many(Filter::lt("age", 30)).await.unwrap();
    assert_eq!(result.deleted_count, 1);

    let remaining = users.find(Filter::all()).await.unwrap().try_collect_all().await.unwrap();
    assert_eq!(names(&remaining), ["Alice", "Charlie"]);

    let result = users.delete_many(Filter::eq("name", "Zoe")).await.unwrap();
    assert_eq!(result.deleted_count, 0);

    assert_eq!(users.delete_all().await.unwrap().deleted_count, 2);
    assert_eq!(users.count_documents(Filter::all()).await.unwrap(), 0);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn typed_collection_round_trips_records() {
    let client = connect().await;
    let users = client.typed_collection::<User>();

    let alice = User {
        id: None,
        name: "Alice".to_string(),
        age: 30,
        city: "New York".to_string(),
        interests: vec!["reading".to_string()],
    };

    let id = users.insert_one(&alice).await.unwrap();
    let stored = users.find_one(Filter::eq("name", "Alice")).await.unwrap().unwrap();

    assert_eq!(stored.id.map(Bson::ObjectId), Some(id));
    assert_eq!(User { id: None, ..stored }, alice);

    users
        .update_one(Filter::eq("name", "Alice"), Update::new().inc("age", 1))
        .await
        .unwrap();
    let older = users.find(Filter::gte("age", 31)).await.unwrap();
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].age, 31);

    assert_eq!(client.list_collections().await.unwrap(), [USERS]);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn builder_seeds_collections() {
    let store = InMemoryStore::builder()
        .with_documents("products_inventory", vec![
            doc! { "_id": "P001", "productName": "Laptop Pro" },
            doc! { "_id": "P002", "productName": "Wireless Mouse" },
        ])
        .build()
        .await
        .unwrap();
    let client = DatabaseClient::connect(store).await.unwrap();

    let products = client.collection("products_inventory");
    assert_eq!(products.count_documents(Filter::all()).await.unwrap(), 2);
    assert!(
        products
            .insert_one(doc! { "_id": "P002", "productName": "Duplicate" })
            .await
            .unwrap_err()
            .is_duplicate_key()
    );

    client.drop_collection("products_inventory").await.unwrap();
    client.drop_collection("products_inventory").await.unwrap();
    assert!(client.list_collections().await.unwrap().is_empty());

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn deleting_users_under_thirty_leaves_two() {
    let client = connect().await;
    let users = client.collection(USERS);
    users.insert_many(sample_users()).await.unwrap();

    let result = users.delete_many(Filter::lt("age", 30)).await.unwrap();

    assert_eq!(result.deleted_count, 2);
    assert_eq!(users.count_documents(Filter::all()).await.unwrap(), 2);
    assert!(users.find_one(Filter::eq("name", "Bob")).await.unwrap().is_none());
    assert!(users.find_one(Filter::eq("name", "Diana")).await.unwrap().is_none());

    client.disconnect().await.unwrap();
}
