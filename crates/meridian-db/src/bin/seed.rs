//! # Seed Data Generator
//!
//! Populates the database with test products for development.
//!
//! ## Usage
//! ```bash
//! # Generate 400 products (default)
//! cargo run -p meridian-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p meridian-db --bin seed -- --count 200
//!
//! # Specify database path
//! cargo run -p meridian-db --bin seed -- --db ./data/meridian.db
//! ```
//!
//! ## Generated Products
//! Creates realistic product data across categories:
//! - Beverages (sodas, water, juice)
//! - Snacks (chips, candy, biscuits)
//! - Dairy (milk, cheese, yogurt)
//! - Household (soap, detergent, paper goods)
//! - Grocery (rice, flour, canned goods)
//!
//! Each product has:
//! - Unique name: `{Base} {Size}`
//! - Random price: $0.99 - $19.99
//! - Random stock: 0 - 119 units
//! - Alert threshold: 5 - 14 units (so some rows start in low-stock)
//!
//! Finishes by queueing one offline sale payload so the reconciliation
//! drain has something to replay on first run.

use chrono::Utc;
use std::env;
use tracing_subscriber::EnvFilter;

use meridian_core::{NewQueueEntry, NewSale, NewSaleLine, Product, SyncDataType};
use meridian_db::{Database, DbConfig};
use uuid::Uuid;

const DEMO_BUSINESS_ID: &str = "demo-business";
const DEMO_STORE_ID: &str = "main-store";
const DEMO_DEVICE_ID: &str = "seed-till";

/// Product categories for realistic test data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Beverages",
        &[
            "Cola",
            "Lemon Soda",
            "Orange Soda",
            "Mineral Water",
            "Sparkling Water",
            "Mango Juice",
            "Apple Juice",
            "Iced Tea",
            "Energy Drink",
            "Lassi",
            "Green Tea",
            "Instant Coffee",
        ],
    ),
    (
        "Snacks",
        &[
            "Salted Chips",
            "Masala Chips",
            "Nimko Mix",
            "Salted Peanuts",
            "Chocolate Bar",
            "Caramel Toffee",
            "Digestive Biscuits",
            "Cream Biscuits",
            "Rusk",
            "Popcorn",
            "Fruit Gums",
            "Wafer Rolls",
        ],
    ),
    (
        "Dairy",
        &[
            "Full Cream Milk",
            "Low Fat Milk",
            "Butter",
            "Cheddar Cheese",
            "Cream Cheese",
            "Plain Yogurt",
            "Fruit Yogurt",
            "Fresh Cream",
            "Desi Ghee",
            "Eggs Tray",
            "Condensed Milk",
            "Milk Powder",
        ],
    ),
    (
        "Household",
        &[
            "Bar Soap",
            "Hand Wash",
            "Dish Liquid",
            "Laundry Powder",
            "Bleach",
            "Floor Cleaner",
            "Tissue Box",
            "Paper Towels",
            "Trash Bags",
            "Matchboxes",
            "Mosquito Coils",
            "Air Freshener",
        ],
    ),
    (
        "Grocery",
        &[
            "Basmati Rice",
            "Broken Rice",
            "Wheat Flour",
            "Gram Flour",
            "White Sugar",
            "Brown Sugar",
            "Iodized Salt",
            "Cooking Oil",
            "Red Lentils",
            "Chickpeas",
            "Canned Tomatoes",
            "Tea Leaves",
        ],
    ),
];

/// Size variants for products
const SIZES: &[(&str, i64)] = &[
    ("Small", 0),
    ("Medium", 100),
    ("Large", 250),
    ("250ml", 0),
    ("500ml", 80),
    ("1L", 180),
    ("6-Pack", 450),
    ("Family Pack", 600),
];

/// Initializes logging so repository debug output surfaces under RUST_LOG.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meridian=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 400;
    let mut db_path = String::from("./meridian_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(400);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Meridian POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 400)");
                println!("  -d, --db <PATH>    Database file path (default: ./meridian_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Meridian POS Seed Data Generator");
    println!("===================================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    // Connect to database
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing products
    let existing = db.stock().count(DEMO_BUSINESS_ID, DEMO_STORE_ID).await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Generate products
    println!();
    println!("Generating products...");

    let mut generated = 0;
    let mut first_product: Option<Product> = None;
    let start = std::time::Instant::now();

    for (category_idx, (category, bases)) in CATEGORIES.iter().enumerate() {
        for (base_idx, base) in bases.iter().enumerate() {
            for (size_idx, (size, price_addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break;
                }

                let product = generate_product(
                    category,
                    base,
                    size,
                    *price_addon,
                    category_idx * 1000 + base_idx * 20 + size_idx,
                );

                if let Err(e) = db.stock().insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.name, e);
                    continue;
                }

                if first_product.is_none() {
                    first_product = Some(product);
                }
                generated += 1;

                if generated % 100 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }

            if generated >= count {
                break;
            }
        }

        if generated >= count {
            break;
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} products in {:?}", generated, elapsed);
    println!(
        "  Rate: {:.0} products/second",
        generated as f64 / elapsed.as_secs_f64()
    );

    // Verify low-stock reporting
    println!();
    println!("Verifying low-stock report...");
    let low = db
        .stock()
        .list_below_alert(DEMO_BUSINESS_ID, DEMO_STORE_ID)
        .await?;
    println!("  {} products at or below their alert threshold", low.len());
    for level in low.iter().take(5) {
        println!(
            "    {} ({} on hand, alert at {})",
            level.name, level.quantity, level.stock_alert
        );
    }

    // Queue one offline sale so the first drain has work to do
    if let Some(product) = first_product {
        let sale = NewSale {
            business_id: DEMO_BUSINESS_ID.to_string(),
            store_id: DEMO_STORE_ID.to_string(),
            device_id: DEMO_DEVICE_ID.to_string(),
            client_ref: Some(Uuid::new_v4().to_string()),
            biller_name: "Seed Till".to_string(),
            customer_id: None,
            customer_name: None,
            payment_method: None,
            lines: vec![NewSaleLine {
                product_id: product.id.clone(),
                quantity: 2,
                unit_price_cents: product.price_cents,
            }],
            subtotal_cents: product.price_cents * 2,
            discount_cents: 0,
            tax_cents: 0,
            total_cents: product.price_cents * 2,
            note: Some("Seeded offline sale".to_string()),
            sale_date: Some(Utc::now()),
        };

        let entry = NewQueueEntry {
            business_id: DEMO_BUSINESS_ID.to_string(),
            store_id: DEMO_STORE_ID.to_string(),
            device_id: DEMO_DEVICE_ID.to_string(),
            data_type: SyncDataType::Sale,
            payload: serde_json::to_string(&sale)?,
        };
        let stored = db
            .sync_queue()
            .enqueue(&Uuid::new_v4().to_string(), &entry)
            .await?;

        println!();
        println!(
            "✓ Queued 1 offline sale (seq {}) for the reconciliation drain",
            stored.seq
        );
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates a single product with realistic data.
fn generate_product(
    category: &str,
    base: &str,
    size: &str,
    price_addon: i64,
    seed: usize,
) -> Product {
    let now = Utc::now();

    // Generate barcode (EAN-13 shaped, checksum not valid)
    let barcode = Some(format!("880{:010}", seed));

    // Generate price: base $0.99-$19.99 + size addon
    let base_price = 99 + ((seed * 23) % 1900) as i64;
    let price_cents = base_price + price_addon;

    // Generate cost (55-79% of price)
    let cost_pct = 55 + (seed % 25) as i64;
    let cost_price_cents = Some(price_cents * cost_pct / 100);

    // Stock 0-119, alert 5-14: a slice of rows starts in low-stock
    let quantity = (seed % 120) as i64;
    let stock_alert = 5 + (seed % 10) as i64;

    Product {
        id: Uuid::new_v4().to_string(),
        business_id: DEMO_BUSINESS_ID.to_string(),
        store_id: DEMO_STORE_ID.to_string(),
        name: format!("{} {}", base, size),
        category: Some(category.to_string()),
        brand: None,
        barcode,
        description: None,
        image_url: None,
        quantity,
        stock_alert,
        price_cents,
        cost_price_cents,
        created_at: now,
        updated_at: now,
    }
}
