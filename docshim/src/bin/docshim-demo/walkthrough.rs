use bson::{Document, doc};
use std::fmt::Debug;

use docshim::prelude::*;

use crate::records::{self, PRODUCTS, USERS, User};

fn print_all<T: Debug>(heading: &str, items: &[T]) {
    println!("\n{heading}");

    for item in items {
        println!("  {item:?}");
    }
}

fn print_documents(heading: &str, documents: &[Document]) {
    println!("\n{heading}");

    for document in documents {
        println!("  {document}");
    }
}

fn print_found<T: Debug>(found: Option<T>) {
    match found {
        Some(item) => println!("  {item:?}"),
        None => println!("  (no match)"),
    }
}

pub async fn insert_and_read(client: &DynDatabaseClient) -> DocumentStoreResult<()> {
    println!("\n--- Insertion Operations ---");

    let users = client.typed_collection::<User>();
    users.delete_all().await?;
    println!("Cleared '{USERS}' collection.");

    let (first, rest) = records::crud_users();
    let id = users.insert_one(&first).await?;
    println!("Inserted single user, _id: {id}");

    let ids = users.insert_many(&rest).await?;
    println!("Inserted {} users.", ids.len());

    println!("\n--- Read Operations ---");

    print_all("All users:", &users.find(Filter::all()).await?);
    print_all("Users older than 30:", &users.find(Filter::gt("age", 30)).await?);

    println!("\nFind user named 'Bob':");
    print_found(users.find_one(Filter::eq("name", "Bob")).await?);

    print_all("Users interested in 'gaming':", &users.find(Filter::eq("interests", "gaming")).await?);

    let reading_and_hiking = Expr::try_from(&doc! { "interests": { "$all": ["reading", "hiking"] } })?;
    print_all(
        "Users interested in both 'reading' and 'hiking' ($all):",
        &users.find(reading_and_hiking).await?,
    );

    let names_and_cities = users
        .untyped()
        .find(
            Query::builder()
                .projection(Projection::new().include("name").include("city").exclude(ID_FIELD))
                .build(),
        )
        .await?
        .try_collect_all()
        .await?;
    print_documents("All users, only name and city:", &names_and_cities);

    Ok(())
}

pub async fn update(client: &DynDatabaseClient) -> DocumentStoreResult<()> {
    println!("\n--- Update Operations ---");

    let users = client.typed_collection::<User>();

    println!("\nUpdate 'Alice's city to 'San Francisco':");
    let result = users
        .update_one(Filter::eq("name", "Alice"), Update::new().set("city", "San Francisco"))
        .await?;
    println!("Matched {} docs, modified {} docs.", result.matched_count, result.modified_count);
    print_found(users.find_one(Filter::eq("name", "Alice")).await?);

    println!("\nIncrease age by 1 for all users in 'New York':");
    let result = users
        .update_many(Filter::eq("city", "New York"), Update::new().inc("age", 1))
        .await?;
    println!("Matched {} docs, modified {} docs.", result.matched_count, result.modified_count);
    print_all("Updated New York users:", &users.find(Filter::eq("city", "New York")).await?);

    println!("\nAdd unique interest 'traveling' to 'Bob' ($addToSet):");
    users
        .update_one(Filter::eq("name", "Bob"), Update::new().add_to_set("interests", "traveling"))
        .await?;
    print_found(users.find_one(Filter::eq("name", "Bob")).await?);

    println!("\nRemove 'gaming' from 'Charlie's interests ($pull):");
    users
        .update_one(Filter::eq("name", "Charlie"), Update::new().pull("interests", "gaming"))
        .await?;
    print_found(users.find_one(Filter::eq("name", "Charlie")).await?);

    Ok(())
}

pub async fn delete(client: &DynDatabaseClient) -> DocumentStoreResult<()> {
    println!("\n--- Delete Operations ---");

    let users = client.collection(USERS);

    println!("\nDelete user named 'Diana':");
    let result = users.delete_one(Filter::eq("name", "Diana")).await?;
    println!("Deleted {} document(s).", result.deleted_count);
    println!("Remaining documents count: {}", users.count_documents(Filter::all()).await?);

    println!("\nDelete all users younger than 30:");
    let result = users.delete_many(Filter::lt("age", 30)).await?;
    println!("Deleted {} document(s).", result.deleted_count);
    println!("Remaining documents count: {}", users.count_documents(Filter::all()).await?);

    Ok(())
}

pub async fn aggregate(client: &DynDatabaseClient) -> DocumentStoreResult<()> {
    println!("\n--- Aggregation Pipeline Operations ---");

    let users = client.typed_collection::<User>();
    users.delete_all().await?;
    users.insert_many(&records::ordering_users()).await?;
    println!("Re-populated data for aggregation pipeline demo.");

    let users = users.untyped();

    let city_stats = Pipeline::new()
        .stage(PipelineStage::group(
            Expression::field("city"),
            [
                ("userCount", Accumulator::Count),
                ("averageAge", Accumulator::Avg(Expression::field("age"))),
            ],
        )?)
        .stage(PipelineStage::Sort(vec![Sort::desc("userCount")]));
    print_documents(
        "User statistics grouped by city:",
        &users.aggregate(city_stats).await?.try_collect_all().await?,
    );

    let order_totals = Pipeline::new()
        .stage(PipelineStage::unwind("orders", false)?)
        .stage(PipelineStage::group(
            Expression::field("name"),
            [(
                "totalAmount",
                Accumulator::Sum(Expression::multiply([
                    Expression::field("orders.qty"),
                    Expression::field("orders.price"),
                ])),
            )],
        )?)
        .stage(PipelineStage::Sort(vec![Sort::desc("totalAmount")]));
    print_documents(
        "Total order amount for each user:",
        &users.aggregate(order_totals).await?.try_collect_all().await?,
    );

    let large_orders = Pipeline::try_from(vec![
        doc! {
            "$project": {
                "name": 1,
                "largeQuantityOrders": {
                    "$filter": {
                        "input": "$orders",
                        "as": "order",
                        "cond": { "$gt": ["$$order.qty", 1] },
                    },
                },
            },
        },
        doc! { "$match": { "largeQuantityOrders": { "$ne": [] } } },
    ])?;
    print_documents(
        "Users with orders containing items with quantity greater than 1:",
        &users.aggregate(large_orders).await?.try_collect_all().await?,
    );

    Ok(())
}

pub async fn lookup(client: &DynDatabaseClient) -> DocumentStoreResult<()> {
    println!("\n--- $lookup Operation ---");

    let products = client.collection(PRODUCTS);
    products.delete_all().await?;
    println!("Cleared '{PRODUCTS}' collection.");
    products.insert_many(records::products()).await?;
    println!("Populated '{PRODUCTS}' collection with sample data.");

    let users = client.collection(USERS);
    users.delete_all().await?;
    users.insert_many(records::shoppers()).await?;
    println!("Re-populated '{USERS}' collection for $lookup demo.");

    let purchases = Pipeline::new()
        .stage(PipelineStage::unwind("purchasedProducts", false)?)
        .stage(PipelineStage::lookup(PRODUCTS, "purchasedProducts", ID_FIELD, "productDetails")?)
        .stage(PipelineStage::unwind("productDetails", true)?)
        .stage(PipelineStage::group(
            Expression::field(ID_FIELD),
            [
                ("name", Accumulator::First(Expression::field("name"))),
                ("allProductDetails", Accumulator::Push(Expression::field("productDetails"))),
            ],
        )?);
    print_documents(
        "Users with their purchased product details ($lookup):",
        &users.aggregate(purchases).await?.try_collect_all().await?,
    );

    Ok(())
}
