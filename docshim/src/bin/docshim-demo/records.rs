use bson::{Document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use docshim::document::Record;

pub const USERS: &str = "users_data";
pub const PRODUCTS: &str = "products_inventory";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub age: i32,
    pub city: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<Order>,
}

impl Record for User {
    fn collection_name() -> &'static str {
        USERS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub item: String,
    pub qty: i32,
    pub price: f64,
}

impl User {
    pub fn new(name: &str, age: i32, city: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            age,
            city: city.to_string(),
            interests: Vec::new(),
            status: None,
            orders: Vec::new(),
        }
    }

    pub fn interested_in(mut self, interests: &[&str]) -> Self {
        self.interests = interests.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn ordered(mut self, item: &str, qty: i32, price: f64) -> Self {
        self.orders.push(Order {
            item: item.to_string(),
            qty,
            price,
        });
        self
    }
}

/// Users for the insert, read, update and delete walkthrough.
pub fn crud_users() -> (User, Vec<User>) {
    (
        User::new("Alice", 30, "New York").interested_in(&["reading", "hiking"]),
        vec![
            User::new("Bob", 25, "London").interested_in(&["gaming", "coding"]),
            User::new("Charlie", 35, "Paris").interested_in(&["traveling", "cooking", "gaming"]),
            User::new("Diana", 28, "New York").interested_in(&["sports"]),
        ],
    )
}

/// Users with orders for the aggregation walkthrough.
pub fn ordering_users() -> Vec<User> {
    vec![
        User::new("Alice", 30, "New York")
            .with_status("active")
            .ordered("Laptop", 1, 1200.0)
            .ordered("Mouse", 2, 25.0),
        User::new("Bob", 25, "London")
            .with_status("inactive")
            .ordered("Keyboard", 1, 75.0),
        User::new("Charlie", 35, "Paris")
            .with_status("active")
            .ordered("Monitor", 1, 300.0),
        User::new("Diana", 30, "New York")
            .with_status("active")
            .ordered("Laptop", 1, 1200.0)
            .ordered("Headphones", 1, 150.0),
    ]
}

pub fn products() -> Vec<Document> {
    vec![
        doc! { "_id": "P001", "productName": "Laptop Pro", "category": "Electronics", "price": 1200.0 },
        doc! { "_id": "P002", "productName": "Wireless Mouse", "category": "Accessories", "price": 25.0 },
        doc! { "_id": "P003", "productName": "Mechanical Keyboard", "category": "Accessories", "price": 75.0 },
    ]
}

/// Shoppers referencing products by id; `P999` has no match.
pub fn shoppers() -> Vec<Document> {
    vec![
        doc! { "name": "Evelyn", "purchasedProducts": ["P001", "P002"] },
        doc! { "name": "Frank", "purchasedProducts": ["P003"] },
        doc! { "name": "Grace", "purchasedProducts": ["P999"] },
    ]
}
